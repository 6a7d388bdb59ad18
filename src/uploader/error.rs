// 上传错误分类

use crate::api::ApiError;
use thiserror::Error;

/// 上传子系统错误
///
/// 所有错误都在单个文件的边界被捕获，转成该文件的失败进度记录，
/// 不会影响同批次的其他文件。
#[derive(Debug, Error)]
pub enum UploadError {
    /// 初始化失败：会话未创建，服务端无残留
    #[error("初始化分片上传失败: {0}")]
    InitFailure(#[source] ApiError),

    /// 分片发送失败：服务端可能残留部分会话，不自动重试也不自动取消
    #[error("分片 #{index} 上传失败: {source}")]
    ChunkSendFailure {
        index: usize,
        #[source]
        source: ApiError,
    },

    /// 所有分片已送达但服务端合并失败
    #[error("完成分片上传失败: {0}")]
    CompleteFailure(#[source] ApiError),

    /// 同名检查失败（按“无同名文件”处理）
    #[error("检查同名文件失败: {0}")]
    DuplicateCheckFailure(#[source] ApiError),

    /// 服务端取消失败（本地仍然视为已取消）
    #[error("取消服务端会话失败: {0}")]
    CancelFailure(#[source] ApiError),

    /// 单次上传失败
    #[error("上传失败: {0}")]
    SimpleUploadFailure(#[source] ApiError),

    /// 读取本地文件失败
    #[error("读取本地文件失败: {0}")]
    SourceRead(#[from] std::io::Error),
}

impl UploadError {
    /// 失败时服务端是否可能残留分片会话
    pub fn leaves_partial_session(&self) -> bool {
        matches!(
            self,
            UploadError::ChunkSendFailure { .. }
                | UploadError::CompleteFailure(_)
                | UploadError::SourceRead(_)
        )
    }
}

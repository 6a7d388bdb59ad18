// CloudDrive API 模块
//
// 上传子系统只通过 FileApi 访问服务端，HTTP 实现见 client.rs

pub mod client;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use client::CloudDriveClient;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// 简单上传的字节进度回调（参数为已发送字节数）
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络/传输层错误
    #[error("请求发送失败: {0}")]
    Http(#[from] reqwest::Error),

    /// 非 2xx 响应
    #[error("服务端返回 {status}: {detail}")]
    Status { status: u16, detail: String },

    /// 2xx 但 success=false
    #[error("服务端拒绝请求: {0}")]
    Rejected(String),

    /// 响应体无法解析
    #[error("解析响应失败: {0}")]
    Decode(#[from] serde_json::Error),

    /// success=true 但缺少 data
    #[error("响应缺少 data 字段")]
    MissingData,
}

/// 上传子系统依赖的服务端接口
#[async_trait]
pub trait FileApi: Send + Sync {
    /// GET /api/files?folder_id=
    async fn list_folder(&self, folder_id: Option<&str>) -> Result<Vec<FileItem>, ApiError>;

    /// DELETE /api/files/{id}
    async fn delete_file(&self, file_id: &str) -> Result<(), ApiError>;

    /// POST /api/files/upload（multipart 单次上传）
    async fn upload_file(
        &self,
        filename: &str,
        folder_id: Option<&str>,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> Result<FileItem, ApiError>;

    /// POST /api/files/upload/init
    async fn init_upload(
        &self,
        request: &InitUploadRequest,
    ) -> Result<InitUploadResponse, ApiError>;

    /// POST /api/files/upload/chunk/{upload_id}
    async fn upload_chunk(
        &self,
        upload_id: &str,
        chunk_index: usize,
        data: Vec<u8>,
    ) -> Result<ChunkAck, ApiError>;

    /// POST /api/files/upload/complete/{upload_id}
    async fn complete_upload(&self, upload_id: &str) -> Result<FileItem, ApiError>;

    /// DELETE /api/files/upload/cancel/{upload_id}
    async fn cancel_upload(&self, upload_id: &str) -> Result<(), ApiError>;

    /// GET /api/files/upload/status/{upload_id}
    async fn upload_status(&self, upload_id: &str) -> Result<UploadStatus, ApiError>;

    /// GET /api/storage/quota
    async fn storage_quota(&self) -> Result<StorageQuota, ApiError>;
}

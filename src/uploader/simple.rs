// 单次上传（不超过分片阈值的文件）

use crate::api::{FileApi, FileItem, ProgressFn};
use crate::uploader::{
    ProgressReporter, RecordState, SimpleState, TransferMode, UploadError, UploadRequest,
};
use std::sync::Arc;
use tracing::{error, info};

/// 整个文件一次 multipart 上传，字节进度来自请求体的发送进度
pub async fn upload_simple(
    api: &dyn FileApi,
    request: &UploadRequest,
    key: &str,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<FileItem, UploadError> {
    reporter.state_changed(key, RecordState::Simple(SimpleState::InFlight));

    let data = match request.source().read_all().await {
        Ok(data) => data,
        Err(e) => {
            let err = UploadError::SourceRead(e);
            error!("读取文件失败: 文件={}, 错误={}", request.filename(), err);
            reporter.fail(key, &err.to_string());
            return Err(err);
        }
    };

    let total = request.size();
    let progress: ProgressFn = {
        let reporter = reporter.clone();
        let key = key.to_string();
        Arc::new(move |sent| reporter.report(&key, sent, total, TransferMode::Simple))
    };

    match api
        .upload_file(
            request.filename(),
            request.destination_folder_id(),
            data,
            progress,
        )
        .await
    {
        Ok(item) => {
            info!(
                "上传成功: 文件={}, 文件ID={}, 大小={}",
                item.original_filename, item.id, item.file_size
            );
            reporter.report(key, total, total, TransferMode::Simple);
            reporter.complete(key);
            Ok(item)
        }
        Err(e) => {
            let err = UploadError::SimpleUploadFailure(e);
            error!("上传失败: 文件={}, 错误={}", request.filename(), err);
            reporter.fail(key, &err.to_string());
            Err(err)
        }
    }
}

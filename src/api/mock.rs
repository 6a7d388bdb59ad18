// 测试用的内存 FileApi：记录所有调用，可按需让任意接口失败

use crate::api::{
    ApiError, ChunkAck, FileApi, FileItem, InitUploadRequest, InitUploadResponse, ProgressFn,
    StorageQuota, UploadStatus,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 收到分片时的回调：(upload_id, chunk_index)
pub type ChunkHook = Arc<dyn Fn(&str, usize) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    List(Option<String>),
    Delete(String),
    Upload {
        filename: String,
        folder_id: Option<String>,
        size: u64,
    },
    Init(InitUploadRequest),
    Chunk {
        upload_id: String,
        index: usize,
        size: u64,
    },
    Complete(String),
    Cancel(String),
    Status(String),
    Quota,
}

#[derive(Default)]
struct Failures {
    list: bool,
    delete: bool,
    complete: bool,
    cancel: bool,
    upload: HashSet<String>,
    init: HashSet<String>,
    /// filename -> 失败的分片序号
    chunk: HashMap<String, usize>,
}

#[derive(Default)]
pub struct MockFileApi {
    calls: Mutex<Vec<ApiCall>>,
    files: Mutex<Vec<FileItem>>,
    failures: Mutex<Failures>,
    /// upload_id -> filename
    sessions: Mutex<HashMap<String, String>>,
    /// upload_id -> 已收到的分片（序号, 字节）
    received: Mutex<HashMap<String, Vec<(usize, Vec<u8>)>>>,
    chunk_hook: Mutex<Option<ChunkHook>>,
    next_id: AtomicUsize,
}

fn server_error(detail: &str) -> ApiError {
    ApiError::Status {
        status: 500,
        detail: detail.to_string(),
    }
}

pub fn remote_file(id: &str, name: &str) -> FileItem {
    FileItem {
        id: id.to_string(),
        filename: format!("{}.bin", id),
        original_filename: name.to_string(),
        file_size: 1,
        file_type: Some("document".to_string()),
        mime_type: None,
        parent_folder_id: None,
        is_folder: false,
        created_at: None,
        modified_at: None,
    }
}

impl MockFileApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(self, item: FileItem) -> Self {
        self.files.lock().push(item);
        self
    }

    pub fn fail_list(&self) {
        self.failures.lock().list = true;
    }

    pub fn fail_delete(&self) {
        self.failures.lock().delete = true;
    }

    pub fn fail_complete(&self) {
        self.failures.lock().complete = true;
    }

    pub fn fail_cancel(&self) {
        self.failures.lock().cancel = true;
    }

    pub fn fail_upload_for(&self, filename: &str) {
        self.failures.lock().upload.insert(filename.to_string());
    }

    pub fn fail_init_for(&self, filename: &str) {
        self.failures.lock().init.insert(filename.to_string());
    }

    pub fn fail_chunk(&self, filename: &str, index: usize) {
        self.failures
            .lock()
            .chunk
            .insert(filename.to_string(), index);
    }

    pub fn on_chunk(&self, hook: ChunkHook) {
        *self.chunk_hook.lock() = Some(hook);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// 某个会话按到达顺序收到的分片序号
    pub fn chunk_indices(&self, upload_id: &str) -> Vec<usize> {
        self.received
            .lock()
            .get(upload_id)
            .map(|chunks| chunks.iter().map(|(i, _)| *i).collect())
            .unwrap_or_default()
    }

    /// 按序拼接某个会话收到的全部字节
    pub fn assembled(&self, upload_id: &str) -> Vec<u8> {
        self.received
            .lock()
            .get(upload_id)
            .map(|chunks| chunks.iter().flat_map(|(_, d)| d.clone()).collect())
            .unwrap_or_default()
    }

    /// 按文件名查会话ID
    pub fn session_for(&self, filename: &str) -> Option<String> {
        self.sessions
            .lock()
            .iter()
            .find(|(_, name)| name.as_str() == filename)
            .map(|(id, _)| id.clone())
    }

    /// 成功落盘的文件名（单次上传 + 分片完成）
    pub fn stored_names(&self) -> Vec<String> {
        self.files
            .lock()
            .iter()
            .filter(|f| f.id.starts_with("new-"))
            .map(|f| f.original_filename.clone())
            .collect()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().push(call);
    }

    fn store(&self, name: &str, size: u64, folder_id: Option<String>) -> FileItem {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut item = remote_file(&format!("new-{}", n), name);
        item.file_size = size;
        item.parent_folder_id = folder_id;
        self.files.lock().push(item.clone());
        item
    }
}

#[async_trait]
impl FileApi for MockFileApi {
    async fn list_folder(&self, folder_id: Option<&str>) -> Result<Vec<FileItem>, ApiError> {
        self.record(ApiCall::List(folder_id.map(str::to_string)));
        tokio::task::yield_now().await;
        if self.failures.lock().list {
            return Err(server_error("list failed"));
        }
        Ok(self.files.lock().clone())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ApiError> {
        self.record(ApiCall::Delete(file_id.to_string()));
        if self.failures.lock().delete {
            return Err(server_error("delete failed"));
        }
        self.files.lock().retain(|f| f.id != file_id);
        Ok(())
    }

    async fn upload_file(
        &self,
        filename: &str,
        folder_id: Option<&str>,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> Result<FileItem, ApiError> {
        let size = data.len() as u64;
        self.record(ApiCall::Upload {
            filename: filename.to_string(),
            folder_id: folder_id.map(str::to_string),
            size,
        });

        progress(size / 2);
        tokio::task::yield_now().await;

        if self.failures.lock().upload.contains(filename) {
            return Err(server_error("upload failed"));
        }
        progress(size);
        Ok(self.store(filename, size, folder_id.map(str::to_string)))
    }

    async fn init_upload(
        &self,
        request: &InitUploadRequest,
    ) -> Result<InitUploadResponse, ApiError> {
        self.record(ApiCall::Init(request.clone()));
        tokio::task::yield_now().await;

        if self.failures.lock().init.contains(&request.filename) {
            return Err(ApiError::Rejected("Failed to init upload".to_string()));
        }

        let upload_id = format!("upload-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sessions
            .lock()
            .insert(upload_id.clone(), request.filename.clone());
        Ok(InitUploadResponse {
            upload_id,
            chunk_size: None,
        })
    }

    async fn upload_chunk(
        &self,
        upload_id: &str,
        chunk_index: usize,
        data: Vec<u8>,
    ) -> Result<ChunkAck, ApiError> {
        self.record(ApiCall::Chunk {
            upload_id: upload_id.to_string(),
            index: chunk_index,
            size: data.len() as u64,
        });
        tokio::task::yield_now().await;

        let filename = self.sessions.lock().get(upload_id).cloned();
        let should_fail = filename
            .as_ref()
            .and_then(|name| self.failures.lock().chunk.get(name).copied())
            == Some(chunk_index);
        if should_fail {
            return Err(server_error("chunk rejected"));
        }

        let uploaded = {
            let mut received = self.received.lock();
            let chunks = received.entry(upload_id.to_string()).or_default();
            chunks.push((chunk_index, data));
            chunks.len()
        };

        let hook = self.chunk_hook.lock().clone();
        if let Some(hook) = hook {
            hook(upload_id, chunk_index);
        }

        Ok(ChunkAck {
            chunk_index,
            uploaded_chunks: uploaded,
            total_chunks: 0,
        })
    }

    async fn complete_upload(&self, upload_id: &str) -> Result<FileItem, ApiError> {
        self.record(ApiCall::Complete(upload_id.to_string()));
        tokio::task::yield_now().await;

        if self.failures.lock().complete {
            return Err(server_error("merge failed"));
        }
        let name = self
            .sessions
            .lock()
            .get(upload_id)
            .cloned()
            .ok_or_else(|| server_error("Upload session not found"))?;
        let size = self.assembled(upload_id).len() as u64;
        Ok(self.store(&name, size, None))
    }

    async fn cancel_upload(&self, upload_id: &str) -> Result<(), ApiError> {
        self.record(ApiCall::Cancel(upload_id.to_string()));
        if self.failures.lock().cancel {
            return Err(server_error("cancel failed"));
        }
        self.received.lock().remove(upload_id);
        Ok(())
    }

    async fn upload_status(&self, upload_id: &str) -> Result<UploadStatus, ApiError> {
        self.record(ApiCall::Status(upload_id.to_string()));
        let filename = self
            .sessions
            .lock()
            .get(upload_id)
            .cloned()
            .ok_or_else(|| server_error("Upload session not found"))?;
        let mut uploaded = self.chunk_indices(upload_id);
        uploaded.sort_unstable();
        Ok(UploadStatus {
            upload_id: upload_id.to_string(),
            filename,
            uploaded_chunks: uploaded,
            total_chunks: 0,
            status: "in_progress".to_string(),
        })
    }

    async fn storage_quota(&self) -> Result<StorageQuota, ApiError> {
        self.record(ApiCall::Quota);
        Ok(StorageQuota {
            total: 1024,
            used: 10,
            available: 1014,
            percentage_used: 1.0,
            total_files: self.files.lock().len() as u64,
        })
    }
}

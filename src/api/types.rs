// CloudDrive API 数据类型

use serde::{Deserialize, Serialize};

/// 通用响应信封：{ success, message, data }
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

/// 错误响应体（非 2xx 时服务端返回 { detail }）
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// 提取可读的错误描述
    pub fn describe(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => self.message.clone(),
        }
    }
}

/// 文件/文件夹记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileItem {
    /// 记录ID
    pub id: String,
    /// 服务端存储文件名
    #[serde(default)]
    pub filename: String,
    /// 用户可见的原始文件名
    pub original_filename: String,
    /// 文件大小（字节）
    #[serde(default)]
    pub file_size: u64,
    /// 文件类型（image / video / folder ...）
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// 所在文件夹
    #[serde(default)]
    pub parent_folder_id: Option<String>,
    /// 是否是文件夹
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

impl FileItem {
    /// 是否是与 `name` 同名的普通文件（大小写敏感）
    pub fn is_file_named(&self, name: &str) -> bool {
        !self.is_folder && self.original_filename == name
    }
}

/// 文件夹列表（GET /api/files 的 data）
#[derive(Debug, Clone, Deserialize)]
pub struct FolderListing {
    #[serde(default)]
    pub items: Vec<FileItem>,
    #[serde(default)]
    pub current_folder: Option<serde_json::Value>,
    #[serde(default)]
    pub breadcrumb: Vec<serde_json::Value>,
}

/// 分片上传初始化请求
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InitUploadRequest {
    pub filename: String,
    pub file_size: u64,
    pub total_chunks: usize,
    pub folder_id: Option<String>,
}

/// 分片上传初始化响应
#[derive(Debug, Clone, Deserialize)]
pub struct InitUploadResponse {
    /// 服务端会话ID
    pub upload_id: String,
    /// 服务端建议的分片大小
    #[serde(default)]
    pub chunk_size: Option<u64>,
}

/// 单个分片确认
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkAck {
    #[serde(default)]
    pub chunk_index: usize,
    /// 服务端已收到的分片数
    #[serde(default)]
    pub uploaded_chunks: usize,
    #[serde(default)]
    pub total_chunks: usize,
}

/// 分片上传会话状态（/upload/status）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadStatus {
    pub upload_id: String,
    pub filename: String,
    #[serde(default)]
    pub uploaded_chunks: Vec<usize>,
    pub total_chunks: usize,
    /// in_progress / completed / cancelled
    pub status: String,
}

impl UploadStatus {
    /// 服务端尚未收到的分片序号
    pub fn missing_chunks(&self) -> Vec<usize> {
        (0..self.total_chunks)
            .filter(|i| !self.uploaded_chunks.contains(i))
            .collect()
    }
}

/// 存储配额
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageQuota {
    pub total: u64,
    pub used: u64,
    #[serde(default)]
    pub available: i64,
    #[serde(default)]
    pub percentage_used: f64,
    #[serde(default)]
    pub total_files: u64,
}

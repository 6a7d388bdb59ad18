// 上传方式选择
//
// 文件大小严格大于阈值才走分片上传，等于阈值仍走单次上传

use crate::config::UploadConfig;
use crate::uploader::DEFAULT_UPLOAD_CHUNK_SIZE;
use serde::{Deserialize, Serialize};

/// 默认分片上传阈值: 10MB
pub const DEFAULT_CHUNKED_THRESHOLD: u64 = 10 * 1024 * 1024;

/// 传输方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// 单次 multipart 上传
    Simple,
    /// 分片上传会话
    Chunked,
}

/// 使用默认阈值选择传输方式
pub fn choose_mode(size_bytes: u64) -> TransferMode {
    choose_mode_with_threshold(size_bytes, DEFAULT_CHUNKED_THRESHOLD)
}

/// 使用指定阈值选择传输方式
pub fn choose_mode_with_threshold(size_bytes: u64, threshold: u64) -> TransferMode {
    if size_bytes > threshold {
        TransferMode::Chunked
    } else {
        TransferMode::Simple
    }
}

/// 分片大小与分片阈值（字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLayout {
    pub chunk_size: u64,
    pub chunked_threshold: u64,
}

impl TransferLayout {
    pub fn mode_for(&self, size_bytes: u64) -> TransferMode {
        choose_mode_with_threshold(size_bytes, self.chunked_threshold)
    }
}

impl Default for TransferLayout {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            chunked_threshold: DEFAULT_CHUNKED_THRESHOLD,
        }
    }
}

impl From<&UploadConfig> for TransferLayout {
    fn from(config: &UploadConfig) -> Self {
        Self {
            chunk_size: config.chunk_size().max(1),
            chunked_threshold: config.chunked_threshold(),
        }
    }
}

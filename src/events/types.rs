//! 上传事件类型定义

use crate::uploader::{RecordState, TransferMode};
use serde::{Deserialize, Serialize};

/// 进度记录事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 记录创建
    Created {
        key: String,
        filename: String,
        total_bytes: u64,
        mode: TransferMode,
    },
    /// 进度更新
    Progress {
        key: String,
        bytes_transferred: u64,
        total_bytes: u64,
        percentage: f64,
    },
    /// 状态变更
    StateChanged {
        key: String,
        old_state: RecordState,
        new_state: RecordState,
    },
    /// 上传完成
    Completed { key: String, completed_at: i64 },
    /// 上传失败
    Failed { key: String, error: String },
    /// 用户取消
    Cancelled { key: String },
    /// 记录从进度面板移除
    Dismissed { key: String },
}

impl UploadEvent {
    /// 获取记录ID
    pub fn key(&self) -> &str {
        match self {
            UploadEvent::Created { key, .. }
            | UploadEvent::Progress { key, .. }
            | UploadEvent::StateChanged { key, .. }
            | UploadEvent::Completed { key, .. }
            | UploadEvent::Failed { key, .. }
            | UploadEvent::Cancelled { key }
            | UploadEvent::Dismissed { key } => key,
        }
    }

    /// 获取事件类型名称
    pub fn event_type_name(&self) -> &'static str {
        match self {
            UploadEvent::Created { .. } => "created",
            UploadEvent::Progress { .. } => "progress",
            UploadEvent::StateChanged { .. } => "state_changed",
            UploadEvent::Completed { .. } => "completed",
            UploadEvent::Failed { .. } => "failed",
            UploadEvent::Cancelled { .. } => "cancelled",
            UploadEvent::Dismissed { .. } => "dismissed",
        }
    }
}

/// 批次结束后的刷新信号
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RefreshSignal {
    /// 当前目录列表需要重新拉取
    DirectoryListing,
    /// 存储配额需要重新拉取
    StorageQuota,
}

// 上传状态与进度记录

use crate::uploader::TransferMode;
use serde::{Deserialize, Serialize};

/// 分片上传会话状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// 初始化中（等待服务端返回 upload_id）
    Initializing,
    /// 上传中
    Transferring,
    /// 已暂停
    Paused,
    /// 所有分片已发送，等待服务端合并
    Completing,
    /// 已完成
    Completed,
    /// 已取消
    Cancelled,
    /// 失败
    Failed,
}

impl SessionState {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }
}

/// 单次上传状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SimpleState {
    Pending,
    InFlight,
    Done,
    Error,
}

impl SimpleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SimpleState::Done | SimpleState::Error)
    }
}

/// 进度记录的状态：分片上传镜像会话状态，单次上传用简单状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "mode", content = "state", rename_all = "lowercase")]
pub enum RecordState {
    Simple(SimpleState),
    Chunked(SessionState),
}

impl RecordState {
    /// 新记录的初始状态
    pub fn initial(mode: TransferMode) -> Self {
        match mode {
            TransferMode::Simple => RecordState::Simple(SimpleState::Pending),
            TransferMode::Chunked => RecordState::Chunked(SessionState::Initializing),
        }
    }

    pub fn mode(&self) -> TransferMode {
        match self {
            RecordState::Simple(_) => TransferMode::Simple,
            RecordState::Chunked(_) => TransferMode::Chunked,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            RecordState::Simple(s) => s.is_terminal(),
            RecordState::Chunked(s) => s.is_terminal(),
        }
    }

    /// 状态名（用于日志与事件）
    pub fn label(&self) -> String {
        let value = match self {
            RecordState::Simple(s) => serde_json::to_value(s),
            RecordState::Chunked(s) => serde_json::to_value(s),
        };
        value
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }
}

/// 单个文件的进度记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// 记录ID（每个上传请求一个，稳定不变）
    pub key: String,
    pub filename: String,
    /// 已传输字节数（终态前单调不减）
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub mode: TransferMode,
    pub state: RecordState,
    /// 分片会话ID（初始化成功后才有）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// 错误信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 进入终态的时间 (Unix timestamp)
    pub finished_at: Option<i64>,
}

impl ProgressRecord {
    pub fn new(key: String, filename: String, total_bytes: u64, mode: TransferMode) -> Self {
        Self {
            key,
            filename,
            bytes_transferred: 0,
            total_bytes,
            mode,
            state: RecordState::initial(mode),
            session_id: None,
            error: None,
            created_at: chrono::Utc::now().timestamp(),
            finished_at: None,
        }
    }

    /// 计算进度百分比
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.state == RecordState::Chunked(SessionState::Completed)
                || self.state == RecordState::Simple(SimpleState::Done)
            {
                100.0
            } else {
                0.0
            };
        }
        (self.bytes_transferred as f64 / self.total_bytes as f64) * 100.0
    }

    /// 更新已传输字节数；返回是否有变化（回退的值被忽略）
    pub fn advance(&mut self, bytes: u64) -> bool {
        let bytes = bytes.min(self.total_bytes);
        if bytes > self.bytes_transferred {
            self.bytes_transferred = bytes;
            true
        } else {
            false
        }
    }

    /// 标记为已完成
    pub fn mark_completed(&mut self) {
        self.state = match self.mode {
            TransferMode::Simple => RecordState::Simple(SimpleState::Done),
            TransferMode::Chunked => RecordState::Chunked(SessionState::Completed),
        };
        self.bytes_transferred = self.total_bytes;
        self.finished_at = Some(chrono::Utc::now().timestamp());
    }

    /// 标记为失败（已传输字节数保留）
    pub fn mark_failed(&mut self, error: String) {
        self.state = match self.mode {
            TransferMode::Simple => RecordState::Simple(SimpleState::Error),
            TransferMode::Chunked => RecordState::Chunked(SessionState::Failed),
        };
        self.error = Some(error);
        self.finished_at = Some(chrono::Utc::now().timestamp());
    }
}

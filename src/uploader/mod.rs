// 分片上传子系统
//
// - policy: 按文件大小选择单次上传或分片上传
// - duplicate: 上传前的同名检查与处理
// - session: 分片上传会话（init → chunk × N → complete）
// - coordinator: 批量上传、暂停/恢复/取消、批次结束信号
// - progress: 进度记录与事件

pub mod chunk;
pub mod coordinator;
pub mod duplicate;
pub mod error;
pub mod policy;
pub mod progress;
pub mod request;
pub mod session;
pub mod simple;
pub mod task;

pub use chunk::{UploadChunk, UploadChunkManager, DEFAULT_UPLOAD_CHUNK_SIZE};
pub use coordinator::{BatchSummary, FileOutcome, FileResult, UploadCoordinator};
pub use duplicate::{
    keep_both_name, DuplicateDecision, DuplicateOutcome, DuplicatePrompt, DuplicateResolver,
    FixedDecision,
};
pub use error::UploadError;
pub use policy::{
    choose_mode, choose_mode_with_threshold, TransferLayout, TransferMode,
    DEFAULT_CHUNKED_THRESHOLD,
};
pub use progress::{ProgressBoard, ProgressReporter, DEFAULT_DISMISS_AFTER_MS};
pub use request::{SourceFile, UploadRequest};
pub use session::{ActiveSessions, SessionControl, SessionOutcome, StepOutcome, TransferSession};
pub use task::{ProgressRecord, RecordState, SessionState, SimpleState};

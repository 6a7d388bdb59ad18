//! 上传事件
//!
//! 进度面板通过 broadcast 通道发布记录变化，批次结束时发布刷新信号

pub mod throttle;
pub mod types;

pub use throttle::{ProgressThrottler, DEFAULT_THROTTLE_INTERVAL_MS};
pub use types::{RefreshSignal, UploadEvent};

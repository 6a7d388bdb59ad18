// CloudDrive 上传客户端核心库

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// CloudDrive API 模块
pub mod api;

// 上传事件模块
pub mod events;

// 分片上传模块
pub mod uploader;

// 导出常用类型
pub use api::{ApiError, CloudDriveClient, FileApi, FileItem};
pub use config::AppConfig;
pub use events::{RefreshSignal, UploadEvent};
pub use uploader::{
    BatchSummary, DuplicateDecision, DuplicatePrompt, FileOutcome, ProgressBoard,
    ProgressReporter, TransferLayout, UploadCoordinator, UploadError, UploadRequest,
};

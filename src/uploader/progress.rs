// 进度上报
//
// 上传核心只面向 ProgressReporter 上报，渲染交给订阅者。
// ProgressBoard 是默认实现：保存每个文件的进度记录，并通过 broadcast 发布事件。

use crate::events::{ProgressThrottler, UploadEvent, DEFAULT_THROTTLE_INTERVAL_MS};
use crate::uploader::{ProgressRecord, RecordState, TransferMode};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// 成功记录默认保留时长
pub const DEFAULT_DISMISS_AFTER_MS: u64 = 2000;

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// 进度数据接收端
///
/// 同一个 key 的已传输字节数在终态前单调不减；
/// `complete` / `fail` / `cancelled` 对同一个 key 只会生效一次。
pub trait ProgressReporter: Send + Sync {
    /// 文件开始处理
    fn start(&self, key: &str, filename: &str, total_bytes: u64, mode: TransferMode);

    /// 字节进度
    fn report(&self, key: &str, bytes_transferred: u64, total_bytes: u64, mode: TransferMode);

    /// 非终态的状态变化（如暂停/恢复）
    fn state_changed(&self, key: &str, state: RecordState);

    /// 分片会话已在服务端创建
    fn session_started(&self, _key: &str, _session_id: &str) {}

    fn complete(&self, key: &str);

    fn fail(&self, key: &str, reason: &str);

    /// 用户取消
    fn cancelled(&self, key: &str);
}

/// 进度面板
#[derive(Debug, Clone)]
pub struct ProgressBoard {
    records: Arc<DashMap<String, ProgressRecord>>,
    events: broadcast::Sender<UploadEvent>,
    throttler: Arc<ProgressThrottler>,
    dismiss_after: Duration,
}

impl ProgressBoard {
    pub fn new(dismiss_after: Duration, progress_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            records: Arc::new(DashMap::new()),
            events,
            throttler: Arc::new(ProgressThrottler::new(progress_interval)),
            dismiss_after,
        }
    }

    /// 订阅进度事件
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, key: &str) -> Option<ProgressRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// 所有记录快照，按创建时间排序
    pub fn records(&self) -> Vec<ProgressRecord> {
        let mut records: Vec<ProgressRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 手动移除一条已结束的记录（失败记录只能这样移除）
    pub fn dismiss(&self, key: &str) -> bool {
        let removed = self
            .records
            .remove_if(key, |_, record| record.state.is_terminal())
            .is_some();
        if removed {
            self.throttler.forget(key);
            self.emit(UploadEvent::Dismissed {
                key: key.to_string(),
            });
        }
        removed
    }

    fn emit(&self, event: UploadEvent) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.events.send(event);
    }

    /// 宽限期后移除成功记录
    fn schedule_dismiss(&self, key: &str) {
        if self.dismiss_after.is_zero() {
            self.dismiss(key);
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("不在 tokio 运行时内，成功记录保留: key={}", key);
            return;
        };

        let board = self.clone();
        let key = key.to_string();
        handle.spawn(async move {
            tokio::time::sleep(board.dismiss_after).await;
            board.dismiss(&key);
        });
    }
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_DISMISS_AFTER_MS),
            Duration::from_millis(DEFAULT_THROTTLE_INTERVAL_MS),
        )
    }
}

impl ProgressReporter for ProgressBoard {
    fn start(&self, key: &str, filename: &str, total_bytes: u64, mode: TransferMode) {
        let record = ProgressRecord::new(key.to_string(), filename.to_string(), total_bytes, mode);
        self.records.insert(key.to_string(), record);

        debug!(
            "创建进度记录: key={}, 文件={}, 大小={}, 方式={:?}",
            key, filename, total_bytes, mode
        );
        self.emit(UploadEvent::Created {
            key: key.to_string(),
            filename: filename.to_string(),
            total_bytes,
            mode,
        });
    }

    fn report(&self, key: &str, bytes_transferred: u64, total_bytes: u64, mode: TransferMode) {
        let snapshot = {
            let Some(mut record) = self.records.get_mut(key) else {
                debug!(
                    "忽略无记录的进度: key={}, {}/{} 字节, 方式={:?}",
                    key, bytes_transferred, total_bytes, mode
                );
                return;
            };
            if record.state.is_terminal() || !record.advance(bytes_transferred) {
                return;
            }
            (record.bytes_transferred, record.total_bytes, record.percentage())
        };

        let (bytes_transferred, total_bytes, percentage) = snapshot;
        let is_last = bytes_transferred >= total_bytes;
        if is_last {
            self.throttler.force_emit(key);
        } else if !self.throttler.should_emit(key) {
            return;
        }

        self.emit(UploadEvent::Progress {
            key: key.to_string(),
            bytes_transferred,
            total_bytes,
            percentage,
        });
    }

    fn state_changed(&self, key: &str, state: RecordState) {
        if state.is_terminal() {
            warn!("终态必须通过 complete/fail/cancelled 上报: key={}", key);
            return;
        }

        let old_state = {
            let Some(mut record) = self.records.get_mut(key) else {
                return;
            };
            if record.state.is_terminal() || record.state == state {
                return;
            }
            std::mem::replace(&mut record.state, state)
        };

        self.emit(UploadEvent::StateChanged {
            key: key.to_string(),
            old_state,
            new_state: state,
        });
    }

    fn session_started(&self, key: &str, session_id: &str) {
        if let Some(mut record) = self.records.get_mut(key) {
            record.session_id = Some(session_id.to_string());
        }
    }

    fn complete(&self, key: &str) {
        let completed_at = {
            let Some(mut record) = self.records.get_mut(key) else {
                return;
            };
            if record.state.is_terminal() {
                debug!("忽略重复终态: key={}", key);
                return;
            }
            record.mark_completed();
            info!("✓ 上传完成: {}", record.filename);
            record.finished_at.unwrap_or_default()
        };

        self.throttler.forget(key);
        self.emit(UploadEvent::Completed {
            key: key.to_string(),
            completed_at,
        });
        self.schedule_dismiss(key);
    }

    fn fail(&self, key: &str, reason: &str) {
        {
            let Some(mut record) = self.records.get_mut(key) else {
                return;
            };
            if record.state.is_terminal() {
                debug!("忽略重复终态: key={}", key);
                return;
            }
            record.mark_failed(reason.to_string());
        }

        self.throttler.forget(key);
        self.emit(UploadEvent::Failed {
            key: key.to_string(),
            error: reason.to_string(),
        });
    }

    fn cancelled(&self, key: &str) {
        let removed = self
            .records
            .remove_if(key, |_, record| !record.state.is_terminal())
            .is_some();
        if !removed {
            return;
        }

        self.throttler.forget(key);
        self.emit(UploadEvent::Cancelled {
            key: key.to_string(),
        });
    }
}

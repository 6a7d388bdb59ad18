//! 进度事件节流
//!
//! 每条进度记录独立节流，避免多文件并发时互相抢占发布窗口

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// 默认节流间隔（毫秒）
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 200;

/// 按记录ID节流的进度事件节流器
#[derive(Debug)]
pub struct ProgressThrottler {
    /// 每条记录上次发布的时间
    last_emit: DashMap<String, Instant>,
    /// 最小发布间隔
    interval: Duration,
}

impl ProgressThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_emit: DashMap::new(),
            interval,
        }
    }

    /// 使用指定毫秒间隔创建节流器
    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// 距离该记录上次发布已超过间隔时返回 true 并记下本次时间
    ///
    /// 第一次调用总是返回 true
    pub fn should_emit(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.last_emit.get_mut(key) {
            Some(mut last) => {
                if now.duration_since(*last) >= self.interval {
                    *last = now;
                    true
                } else {
                    false
                }
            }
            None => {
                self.last_emit.insert(key.to_string(), now);
                true
            }
        }
    }

    /// 不检查间隔，直接记下本次发布（用于最后一次更新）
    pub fn force_emit(&self, key: &str) {
        self.last_emit.insert(key.to_string(), Instant::now());
    }

    /// 记录进入终态后释放节流状态
    pub fn forget(&self, key: &str) {
        self.last_emit.remove(key);
    }

    /// 当前跟踪的记录数
    pub fn tracked(&self) -> usize {
        self.last_emit.len()
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::with_millis(DEFAULT_THROTTLE_INTERVAL_MS)
    }
}

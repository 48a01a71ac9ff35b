//! 服务端限速
//!
//! 每指纹一个滑动窗口，判定逻辑与客户端软闸门共用同一个
//! [`RateWindow`]，保证两层拒绝行为一致。

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::simplify::rate::{now_ms, RateDecision, RateWindow};

/// 按指纹记账的限速器
pub struct FingerprintLimiter {
    windows: DashMap<String, RateWindow>,
    ceiling: u32,
    window_ms: u64,
}

impl FingerprintLimiter {
    /// 创建新的限速器
    pub fn new(ceiling: u32, window_ms: u64) -> Self {
        Self {
            windows: DashMap::new(),
            ceiling,
            window_ms,
        }
    }

    /// 以给定时间戳对指纹做一次放行判定
    pub fn check(&self, fingerprint: &str, now_ms: u64) -> RateDecision {
        let mut window = self.windows.entry(fingerprint.to_string()).or_default();
        window.try_acquire(now_ms, self.ceiling, self.window_ms)
    }

    /// 清理窗口已过期的指纹，防止长驻进程无界增长
    pub fn purge_expired(&self, now_ms: u64) {
        let window_ms = self.window_ms;
        self.windows.retain(|_, window| match window.window_start_ms {
            Some(start) => now_ms.saturating_sub(start) <= window_ms,
            None => false,
        });
    }

    /// 当前记账的指纹数（测试与观测用）
    pub fn tracked_fingerprints(&self) -> usize {
        self.windows.len()
    }
}

/// 启动定期清理任务
///
/// 长驻进程里每隔一个窗口回收一次过期指纹，限速表的大小随活跃
/// 客户端数有界。返回的句柄可用于停机时中止任务。
pub fn spawn_purge_task(
    limiter: Arc<FingerprintLimiter>,
    interval_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        loop {
            ticker.tick().await;
            limiter.purge_expired(now_ms());
            tracing::trace!(tracked = limiter.tracked_fingerprints(), "限速窗口清理完成");
        }
    })
}

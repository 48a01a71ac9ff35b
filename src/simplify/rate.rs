//! 速率闸门
//!
//! 固定滑动窗口计数（非令牌桶）。客户端软闸门与服务端硬限制共用同一个
//! `RateWindow` 判定逻辑，保证无论哪一层拒绝，行为都可预期。

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::simplify::error::{SimplifyError, SimplifyResult};
use crate::simplify::options::MAX_TEXT_CHARS;

/// 客户端软闸门默认窗口时长（毫秒）
pub const RATE_WINDOW_MS: u64 = 60 * 1000;

/// 客户端软闸门默认窗口内请求上限
pub const RATE_CEILING: u32 = 30;

/// 当前 Unix 毫秒时间戳
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// 闸门判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// 允许通过，计数已递增
    Allowed,
    /// 拒绝，携带距窗口重置的毫秒数
    Limited { retry_after_ms: u64 },
}

/// 滑动窗口状态
///
/// 不变式：`count` 达到上限后，闸门持续拒绝直至
/// `window_start + window_ms`。
#[derive(Debug, Clone, Copy, Default)]
pub struct RateWindow {
    /// 窗口内已放行的请求数
    pub count: u32,
    /// 窗口起点（Unix 毫秒）；`None` 表示尚未开窗
    pub window_start_ms: Option<u64>,
}

impl RateWindow {
    /// 尝试获取一次放行
    ///
    /// 窗口过期时重置计数并以 `now_ms` 开新窗；达到上限时拒绝并给出
    /// 重试等待时间；否则递增计数放行。
    pub fn try_acquire(&mut self, now_ms: u64, ceiling: u32, window_ms: u64) -> RateDecision {
        match self.window_start_ms {
            Some(start) if now_ms.saturating_sub(start) <= window_ms => {}
            _ => {
                self.count = 0;
                self.window_start_ms = Some(now_ms);
            }
        }

        let start = self.window_start_ms.unwrap_or(now_ms);
        if self.count >= ceiling {
            return RateDecision::Limited {
                retry_after_ms: (start + window_ms).saturating_sub(now_ms),
            };
        }

        self.count += 1;
        RateDecision::Allowed
    }
}

/// 客户端速率闸门（软限制）
///
/// 在任何网络请求之前短路检查。每个客户端作用域一个实例。
pub struct RateGate {
    ceiling: u32,
    window_ms: u64,
    window: Mutex<RateWindow>,
}

impl RateGate {
    /// 创建新的速率闸门
    pub fn new(ceiling: u32, window_ms: u64) -> Self {
        Self {
            ceiling,
            window_ms,
            window: Mutex::new(RateWindow::default()),
        }
    }

    /// 以给定时间戳尝试放行
    pub fn try_acquire(&self, now_ms: u64) -> RateDecision {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.try_acquire(now_ms, self.ceiling, self.window_ms)
    }

    /// 当前窗口内计数（测试与展示用）
    pub fn count_in_window(&self) -> u32 {
        self.window.lock().unwrap_or_else(|e| e.into_inner()).count
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(RATE_CEILING, RATE_WINDOW_MS)
    }
}

/// 纯文本长度校验
///
/// 长度按 Unicode 标量计数；超出 `max_chars` 时返回 `TooLong`。
pub fn validate_length(text: &str, max_chars: usize) -> SimplifyResult<()> {
    if text.chars().count() > max_chars {
        return Err(SimplifyError::too_long());
    }
    Ok(())
}

/// 以默认上限校验文本长度
pub fn validate_default_length(text: &str) -> SimplifyResult<()> {
    validate_length(text, MAX_TEXT_CHARS)
}

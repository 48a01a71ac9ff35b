//! 速率闸门与长度校验测试
//!
//! 客户端软闸门与服务端限速器共用同一窗口判定，这里覆盖边界计数、
//! 窗口重置与按指纹独立记账

use twelvify::simplify::error::SimplifyError;
use twelvify::simplify::rate::{
    validate_default_length, validate_length, RateDecision, RateGate, RateWindow,
};

/// 测试窗口计数：上限内全部放行，超限拒绝并给出重试等待
#[test]
fn window_allows_up_to_ceiling_then_limits() {
    let mut window = RateWindow::default();
    let now = 1_000_000;

    for i in 0..30 {
        assert_eq!(
            window.try_acquire(now + i, 30, 60_000),
            RateDecision::Allowed,
            "request {} within ceiling must pass",
            i
        );
    }

    match window.try_acquire(now + 30, 30, 60_000) {
        RateDecision::Limited { retry_after_ms } => {
            assert!(retry_after_ms > 0 && retry_after_ms <= 60_000);
        }
        RateDecision::Allowed => panic!("request over ceiling must be limited"),
    }
}

/// 测试窗口重置：窗口过期后计数清零重新记账
#[test]
fn window_resets_after_expiry() {
    let mut window = RateWindow::default();
    let start = 1_000_000;

    for _ in 0..30 {
        assert_eq!(window.try_acquire(start, 30, 60_000), RateDecision::Allowed);
    }
    assert!(matches!(
        window.try_acquire(start + 1, 30, 60_000),
        RateDecision::Limited { .. }
    ));

    // 窗口过期，重新开窗
    let later = start + 60_001;
    assert_eq!(window.try_acquire(later, 30, 60_000), RateDecision::Allowed);
    assert_eq!(window.count, 1, "expired window must restart the count");
    assert_eq!(window.window_start_ms, Some(later));
}

/// 测试闸门封装：计数透出且判定与裸窗口一致
#[test]
fn gate_tracks_count_in_window() {
    let gate = RateGate::new(2, 60_000);
    let now = 5_000_000;

    assert_eq!(gate.try_acquire(now), RateDecision::Allowed);
    assert_eq!(gate.try_acquire(now + 1), RateDecision::Allowed);
    assert_eq!(gate.count_in_window(), 2);
    assert!(matches!(
        gate.try_acquire(now + 2),
        RateDecision::Limited { .. }
    ));
}

/// 测试长度校验边界：恰好 5000 字符通过，5001 拒绝，按标量而非字节计数
#[test]
fn length_validation_boundaries() {
    assert!(validate_default_length(&"x".repeat(5000)).is_ok());
    assert!(matches!(
        validate_default_length(&"x".repeat(5001)),
        Err(SimplifyError::TooLong { .. })
    ));

    // 多字节字符按 Unicode 标量计数
    let cjk = "字".repeat(5000);
    assert!(cjk.len() > 5000, "sanity: more bytes than chars");
    assert!(validate_default_length(&cjk).is_ok());

    assert!(validate_length("abc", 2).is_err());
    assert!(validate_length("", 5).is_ok());
}

#[cfg(feature = "web")]
mod server_side {
    use std::sync::Arc;
    use std::time::Duration;

    use twelvify::simplify::rate::{now_ms, RateDecision};
    use twelvify::web::{spawn_purge_task, FingerprintLimiter};

    /// 测试按指纹独立记账：一个指纹被限不影响其他指纹
    #[test]
    fn fingerprints_are_tracked_independently() {
        let limiter = FingerprintLimiter::new(1, 60_000);
        let now = 9_000_000;

        assert_eq!(limiter.check("aaaa", now), RateDecision::Allowed);
        assert!(matches!(
            limiter.check("aaaa", now + 1),
            RateDecision::Limited { .. }
        ));
        assert_eq!(
            limiter.check("bbbb", now + 2),
            RateDecision::Allowed,
            "a limited fingerprint must not affect others"
        );
    }

    /// 测试过期清理：窗口结束后的指纹被回收
    #[test]
    fn expired_windows_are_purged() {
        let limiter = FingerprintLimiter::new(5, 60_000);
        let now = 9_000_000;

        limiter.check("aaaa", now);
        limiter.check("bbbb", now + 30_000);
        assert_eq!(limiter.tracked_fingerprints(), 2);

        limiter.purge_expired(now + 70_000);
        assert_eq!(
            limiter.tracked_fingerprints(),
            1,
            "only the still-active window may remain"
        );
    }

    /// 测试后台清理任务：过期指纹被定期回收，活跃窗口保留
    #[tokio::test(start_paused = true)]
    async fn purge_task_evicts_expired_windows() {
        let limiter = Arc::new(FingerprintLimiter::new(5, 60_000));
        let stale = now_ms().saturating_sub(120_000);
        limiter.check("aaaa", stale);
        limiter.check("bbbb", stale);
        limiter.check("cccc", now_ms());
        assert_eq!(limiter.tracked_fingerprints(), 3);

        let task = spawn_purge_task(limiter.clone(), 60_000);
        // 首次滴答立即触发一轮清理
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            limiter.tracked_fingerprints(),
            1,
            "expired windows must be evicted without an explicit purge call"
        );
        task.abort();
    }
}

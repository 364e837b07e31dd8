//! 重试退避

use std::time::Duration;

/// 退避上限
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// 默认退避基数
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;

/// 第 `attempt_index` 次重试前的等待时间（毫秒）
///
/// `attempt_index` 从 0 开始：第一次尝试失败后用 0。
/// `min(base * 2^attempt_index, 30000)`，不加抖动。
pub fn backoff_ms(attempt_index: u32, base_ms: u64) -> u64 {
    let factor = 1u64.checked_shl(attempt_index).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

pub fn backoff(attempt_index: u32, base_ms: u64) -> Duration {
    Duration::from_millis(backoff_ms(attempt_index, base_ms))
}

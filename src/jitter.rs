//! Randomized delays for retries and polling

use rand::Rng;
use std::time::Duration;

/// Random duration in `[base * (1 - factor), base * (1 + factor)]`.
///
/// `factor` is clamped to `[0, 1]`; a zero factor returns `base` unchanged.
pub fn jitter(base: Duration, factor: f64) -> Duration {
    let factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
    if factor == 0.0 || base.is_zero() {
        return base;
    }

    let spread = rand::thread_rng().gen_range(-factor..=factor);
    base.mul_f64(1.0 + spread)
}

/// Sleep for a jittered `base`
pub async fn sleep_jittered(base: Duration, factor: f64) {
    tokio::time::sleep(jitter(base, factor)).await;
}

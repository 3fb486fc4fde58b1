use crate::constants::{PROGRESS_CURVE_SCALE, PROGRESS_CURVE_UNIT_MS, PROGRESS_ESTIMATE_CEILING};

/// Time-based progress estimate used until Gradle reports task counts.
///
/// `min(99, floor(30 * log10(1 + elapsed / 2s)))`: climbs quickly at first,
/// flattens out, and never reaches 100 so only a finished build can.
pub fn estimate(elapsed_ms: u64) -> u8 {
    let units = elapsed_ms as f64 / PROGRESS_CURVE_UNIT_MS;
    let raw = (PROGRESS_CURVE_SCALE * (1.0 + units).log10()).floor();
    if raw.is_nan() || raw < 0.0 {
        return 0;
    }
    raw.min(PROGRESS_ESTIMATE_CEILING as f64) as u8
}

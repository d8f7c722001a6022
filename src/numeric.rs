//! Numeric helpers shared by the leveled entities and the aggregator.
//!
//! Percentages and rates are rounded to a fixed number of decimal places
//! after scaling so that displayed and compared values stay stable.

/// Level curve for characters, weapons and monsters.
///
/// Entry `i` is the stat multiplier at level `i + 1`, relative to level 1.
pub const LEVEL_CURVE: [f64; 80] = [
    1.0, 1.0422, 1.086, 1.1305, 1.1774, 1.3988, 1.4474, 1.5012, 1.5589, 1.6157, 1.8331, 1.8921,
    1.9527, 2.0162, 2.0813, 2.3128, 2.3809, 2.4505, 2.5186, 2.5897, 2.8339, 2.9053, 2.9795,
    3.0538, 3.1288, 3.3098, 3.5538, 3.6327, 3.7117, 3.7921, 4.1028, 4.1842, 4.2765, 4.3725,
    4.4705, 4.8047, 4.9053, 5.0059, 5.1021, 5.1933, 5.5294, 5.621, 5.7141, 5.8079, 5.9032,
    6.2508, 6.348, 6.4451, 6.5437, 6.6416, 6.8191, 7.1079, 7.2107, 7.3127, 7.4155, 7.7876,
    7.8938, 7.9999, 8.1061, 8.5685, 8.6863, 8.803, 8.9214, 9.0424, 9.7101, 9.7488, 9.8684,
    9.9916, 10.1107, 10.2122, 11.236, 11.3504, 11.459, 11.5667, 11.9809, 12.093, 12.2051,
    12.3222, 12.4372, 12.5522,
];

/// Minimum character/weapon level.
pub const MIN_LEVEL: u32 = 1;
/// Maximum character/weapon level; static records store stats at this level.
pub const MAX_LEVEL: u32 = 80;

/// Fraction of level-80 stats available at `level` (clamped into 1..=80).
///
/// # Examples
///
/// ```rust
/// use buildscore::numeric::level_scale;
///
/// assert_eq!(level_scale(80), 1.0);
/// assert_eq!(level_scale(200), 1.0);
/// assert!(level_scale(1) < 0.1);
/// ```
pub fn level_scale(level: u32) -> f64 {
    let idx = level.clamp(MIN_LEVEL, MAX_LEVEL) as usize - 1;
    LEVEL_CURVE[idx] / LEVEL_CURVE[LEVEL_CURVE.len() - 1]
}

/// Linear ramp `(rank + 1) / (max + 1)` used by modifiers and buffs.
pub fn linear_ramp(rank: u32, max: u32) -> f64 {
    (rank as f64 + 1.0) / (max as f64 + 1.0)
}

/// Round to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

/// Compare two floats within a small absolute tolerance.
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9
}

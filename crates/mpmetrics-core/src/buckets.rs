//! Default histogram bucket boundaries.
//!
//! Every histogram created through the factory shares this set unless the
//! caller supplies explicit buckets. Values are seconds and cover sub-ms
//! feature lookups up to six-minute batch inferences.

pub const CUSTOM_BUCKETS: [f64; 50] = [
    0.0005, 0.001, 0.01, 0.015, 0.02, 0.025, 0.03, 0.035, 0.04, 0.045, 0.05, 0.06, 0.07, 0.08, 0.09,
    0.1, 0.125, 0.15, 0.175, 0.2, 0.225, 0.25, 0.275, 0.3, 0.325, 0.35, 0.375, 0.4, 0.425, 0.45,
    0.475, 0.5, 0.525, 0.55, 0.575, 0.6, 0.7, 0.8, 0.9, 1.0, 1.25, 1.5, 2.0, 2.5, 5.0, 10.0, 30.0,
    60.0, 180.0, 360.0,
];

/// Owned copy of [`CUSTOM_BUCKETS`], the form metric constructors take.
pub fn custom_buckets() -> Vec<f64> {
    CUSTOM_BUCKETS.to_vec()
}

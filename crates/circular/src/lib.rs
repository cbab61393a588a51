//! Circular statistics for compass headings expressed in degrees.
//!
//! Headings wrap at 360°, so 0° and 360° name the same direction. Every
//! free function here is total on finite input.

pub const FULL_TURN_DEG: f64 = 360.0;
pub const HALF_TURN_DEG: f64 = 180.0;
pub const QUARTER_TURN_DEG: f64 = 90.0;

/// Reduces any finite angle to `[0, 360)`.
pub fn normalize(angle: f64) -> f64 {
    let reduced = angle.rem_euclid(FULL_TURN_DEG);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if reduced >= FULL_TURN_DEG {
        0.0
    } else {
        reduced
    }
}

/// Unsigned minimal angular distance between two headings, in `[0, 180]`.
pub fn circular_distance(a: f64, b: f64) -> f64 {
    let raw = (a - b).abs() % FULL_TURN_DEG;
    raw.min(FULL_TURN_DEG - raw)
}

/// Signed minimal rotation taking `from` onto `to`, in `(-180, 180]`.
///
/// Positive values are clockwise (heading increases).
pub fn signed_circular_delta(from: f64, to: f64) -> f64 {
    let forward = normalize(to - from);
    if forward > HALF_TURN_DEG {
        forward - FULL_TURN_DEG
    } else {
        forward
    }
}

/// Running sum of unit vectors, so a growing set of headings has its mean
/// available after every push without revisiting earlier angles.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CircularAccumulator {
    sum_sin: f64,
    sum_cos: f64,
    count: usize,
}

impl CircularAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, angle: f64) {
        let rad = angle.to_radians();
        self.sum_sin += rad.sin();
        self.sum_cos += rad.cos();
        self.count += 1;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Same value as [`circular_mean`] over every pushed angle.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        normalize(self.sum_sin.atan2(self.sum_cos).to_degrees())
    }
}

/// Mean heading from the sum of unit vectors, normalized to `[0, 360)`.
///
/// Returns 0 for an empty slice.
pub fn circular_mean(angles: &[f64]) -> f64 {
    let mut accumulator = CircularAccumulator::new();
    for &angle in angles {
        accumulator.push(angle);
    }
    accumulator.mean()
}

/// How far a single step is from a quarter turn.
#[inline]
pub fn quarter_turn_deviation(diff: f64) -> f64 {
    (diff - QUARTER_TURN_DEG).abs()
}

/// Deviation of a summed rotation from one full turn, reflected so that
/// it never exceeds 180°.
pub fn full_turn_deviation(sum: f64) -> f64 {
    let deviation = (sum - FULL_TURN_DEG).abs();
    if deviation > HALF_TURN_DEG {
        FULL_TURN_DEG - deviation
    } else {
        deviation
    }
}

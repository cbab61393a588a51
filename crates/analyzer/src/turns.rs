use compass_circular::{quarter_turn_deviation, signed_circular_delta};
use serde::Serialize;

use crate::segments::Segment;
use crate::sink::Trace;

/// A rotation between two stable segments.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// Position of the earlier segment in the segment list.
    pub from_segment: usize,
    /// Position of the later segment in the segment list.
    pub to_segment: usize,
    pub start_angle: f64,
    pub end_angle: f64,
    /// Unsigned step, in `[0, 180]`.
    pub diff: f64,
    /// Signed step, in `(-180, 180]`; positive is clockwise.
    pub signed_diff: f64,
    pub is_clockwise: bool,
    /// Last reading of the earlier segment.
    pub start_index: usize,
    /// First reading of the later segment.
    pub end_index: usize,
}

impl Turn {
    /// Describes the step from `segments[from]` to `segments[to]`, or `None`
    /// when either position is out of range.
    pub fn between(segments: &[Segment], from: usize, to: usize) -> Option<Self> {
        let earlier = segments.get(from)?;
        let later = segments.get(to)?;
        let signed_diff = signed_circular_delta(earlier.avg_angle, later.avg_angle);
        Some(Self {
            from_segment: from,
            to_segment: to,
            start_angle: earlier.avg_angle,
            end_angle: later.avg_angle,
            diff: signed_diff.abs(),
            signed_diff,
            is_clockwise: signed_diff > 0.0,
            start_index: earlier.end_index,
            end_index: later.start_index,
        })
    }
}

/// Every clockwise quarter turn between consecutive stable segments, in
/// segment order.
pub fn detect_turns(
    segments: &[Segment],
    turn_tolerance: f64,
    trace: &mut Trace<'_>,
) -> Vec<Turn> {
    let stable: Vec<usize> = segments
        .iter()
        .enumerate()
        .filter(|(_, segment)| segment.is_stable)
        .map(|(position, _)| position)
        .collect();

    let mut turns = Vec::new();
    for pair in stable.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let Some(turn) = Turn::between(segments, from, to) else {
            continue;
        };
        if quarter_turn_deviation(turn.diff) > turn_tolerance {
            continue;
        }
        if !turn.is_clockwise {
            trace.line(format_args!(
                "detector: reject counter-clockwise step {} -> {} ({:.2}° -> {:.2}°, {:+.2}°)",
                from, to, turn.start_angle, turn.end_angle, turn.signed_diff
            ));
            continue;
        }
        trace.line(format_args!(
            "detector: turn {} -> {} ({:.2}° -> {:.2}°, {:.2}°)",
            from, to, turn.start_angle, turn.end_angle, turn.diff
        ));
        turns.push(turn);
    }
    turns
}

use compass_circular::{circular_distance, circular_mean, CircularAccumulator};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::sink::Trace;

/// A dwell period: consecutive readings that stay close to their running
/// circular mean.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start_index: usize,
    /// Index of the last accepted reading, inclusive.
    pub end_index: usize,
    /// Accepted readings only; skipped outliers are not represented.
    pub angles: Vec<f64>,
    /// Circular mean of `angles`, in `[0, 360)`.
    pub avg_angle: f64,
    pub is_stable: bool,
    /// Readings inside `[start_index, end_index]` that were skipped.
    pub outliers: usize,
}

impl Segment {
    /// Number of accepted readings.
    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    fn absorb(&mut self, other: Segment) {
        self.end_index = self.end_index.max(other.end_index);
        self.angles.extend(other.angles);
        self.avg_angle = circular_mean(&self.angles);
        self.outliers += other.outliers;
    }
}

/// Greedy single pass over `readings`, emitting every run of at least
/// `min_stable_len` accepted readings.
pub fn build_segments(
    readings: &[f64],
    config: &AnalysisConfig,
    trace: &mut Trace<'_>,
) -> Vec<Segment> {
    let count = readings.len();
    let mut segments = Vec::new();
    if count == 0 || count < config.min_stable_len {
        trace.line(format_args!(
            "builder: {} readings, need at least {}; no segments",
            count, config.min_stable_len
        ));
        return segments;
    }

    let mut start = 0;
    while start < count {
        let mut accepted = vec![readings[start]];
        let mut running = CircularAccumulator::new();
        running.push(readings[start]);
        let mut end = start;
        let mut outlier_run = 0usize;
        let mut first_outlier: Option<usize> = None;

        let mut next = start + 1;
        while next < count {
            let mean = running.mean();
            let distance = circular_distance(readings[next], mean);
            if distance <= config.stability_threshold {
                accepted.push(readings[next]);
                running.push(readings[next]);
                end = next;
                outlier_run = 0;
                first_outlier = None;
            } else if outlier_run < config.max_outliers {
                outlier_run += 1;
                first_outlier.get_or_insert(next);
                trace.line(format_args!(
                    "builder: skip outlier {} at {} ({:.2}° from mean {:.2}°, run {}/{})",
                    readings[next], next, distance, mean, outlier_run, config.max_outliers
                ));
            } else {
                break;
            }
            next += 1;
        }

        if accepted.len() >= config.min_stable_len {
            let avg_angle = running.mean();
            let outliers = end - start + 1 - accepted.len();
            trace.line(format_args!(
                "builder: segment [{}, {}] with {} readings at {:.2}°",
                start,
                end,
                accepted.len(),
                avg_angle
            ));
            segments.push(Segment {
                start_index: start,
                end_index: end,
                angles: accepted,
                avg_angle,
                is_stable: true,
                outliers,
            });
            start = match first_outlier {
                Some(index) if index <= end + 1 => index,
                _ => next,
            };
        } else {
            trace.line(format_args!(
                "builder: discard run at {} ({} of {} readings)",
                start,
                accepted.len(),
                config.min_stable_len
            ));
            start += 1;
        }
    }

    segments
}

/// Fuses each segment into the last retained one when their representative
/// angles are within `stability_threshold`.
pub fn merge_segments(
    segments: Vec<Segment>,
    stability_threshold: f64,
    trace: &mut Trace<'_>,
) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(last)
                if circular_distance(last.avg_angle, segment.avg_angle) <= stability_threshold =>
            {
                trace.line(format_args!(
                    "merger: fuse [{}, {}] at {:.2}° into [{}, {}] at {:.2}°",
                    segment.start_index,
                    segment.end_index,
                    segment.avg_angle,
                    last.start_index,
                    last.end_index,
                    last.avg_angle
                ));
                last.absorb(segment);
            }
            _ => merged.push(segment),
        }
    }
    merged
}

use compass_circular::{circular_distance, full_turn_deviation, normalize, quarter_turn_deviation};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::selection::{turn_sum, SEQUENCE_LEN};
use crate::sink::Trace;
use crate::turns::Turn;

/// Largest gap (degrees) between one turn's end heading and the next turn's
/// start heading before a continuity warning is raised.
pub const CONTINUITY_TOLERANCE_DEG: f64 = 20.0;

/// Extra margin beyond `turn_tolerance` within which a turn is flagged as a
/// warning rather than failed.
pub const WARNING_MARGIN_DEG: f64 = 5.0;

/// The hard rule that rejected a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    TurnCount,
    RotationalSense,
    IndexOverlap,
    Closure,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TurnCount => "TURN_COUNT",
            Self::RotationalSense => "ROTATIONAL_SENSE",
            Self::IndexOverlap => "INDEX_OVERLAP",
            Self::Closure => "CLOSURE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Success,
    Warning,
    Failed,
}

impl TurnStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnAssessment {
    pub status: TurnStatus,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub is_valid: bool,
    pub failed_rule: Option<Rule>,
    /// Hard failures, in check order.
    pub diagnostics: Vec<String>,
    /// Advisory findings that do not affect `is_valid`.
    pub warnings: Vec<String>,
    /// One entry per evaluated turn.
    pub assessments: Vec<TurnAssessment>,
    pub turn_sum: Option<f64>,
    pub sum_deviation: Option<f64>,
}

impl Verdict {
    fn reject(&mut self, rule: Rule, trace: &mut Trace<'_>) {
        self.is_valid = false;
        self.failed_rule = Some(rule);
        trace.line(format_args!("validator: rejected by {}", rule.as_str()));
    }
}

/// Applies the pass/fail policy to the selected turns.
///
/// Hard checks run in order and stop at the first violation: turn count,
/// rotational sense, index overlap, closure. Chain continuity only warns.
pub fn validate_sequence(
    turns: &[Turn],
    config: &AnalysisConfig,
    trace: &mut Trace<'_>,
) -> Verdict {
    let mut verdict = Verdict::default();

    if turns.len() < SEQUENCE_LEN {
        verdict.assessments = assess(turns, &[], config);
        verdict.diagnostics.push(format!(
            "turn count: found {} turns, need {}",
            turns.len(),
            SEQUENCE_LEN
        ));
        verdict.reject(Rule::TurnCount, trace);
        return verdict;
    }
    if turns.len() > SEQUENCE_LEN {
        trace.line(format_args!(
            "validator: {} turns supplied, evaluating the first {}",
            turns.len(),
            SEQUENCE_LEN
        ));
    }
    let turns = &turns[..SEQUENCE_LEN];

    let gaps = continuity_gaps(turns);
    verdict.assessments = assess(turns, &gaps, config);

    let mut reversed = false;
    for (position, turn) in turns.iter().enumerate() {
        if !turn.is_clockwise {
            reversed = true;
            verdict.diagnostics.push(format!(
                "rotational sense: turn {} is counter-clockwise ({:.2}° -> {:.2}°, {:+.2}°)",
                position + 1,
                turn.start_angle,
                turn.end_angle,
                turn.signed_diff
            ));
        }
    }
    if reversed {
        verdict.reject(Rule::RotationalSense, trace);
        return verdict;
    }

    for (position, pair) in turns.windows(2).enumerate() {
        if pair[1].start_index <= pair[0].end_index {
            verdict.diagnostics.push(format!(
                "index overlap: turn {} starts at reading {}, not after turn {} ends at reading {}",
                position + 2,
                pair[1].start_index,
                position + 1,
                pair[0].end_index
            ));
            verdict.reject(Rule::IndexOverlap, trace);
            return verdict;
        }
    }

    for gap in &gaps {
        let message = format!(
            "chain continuity: gap of {:.2}° between turn {} ({:.2}°) and turn {} ({:.2}°)",
            gap.distance,
            gap.position + 1,
            gap.end_angle,
            gap.position + 2,
            gap.start_angle
        );
        trace.line(format_args!("validator: warning: {}", message));
        verdict.warnings.push(message);
    }

    let sum = turn_sum(turns);
    let deviation = full_turn_deviation(normalize(sum));
    verdict.turn_sum = Some(sum);
    verdict.sum_deviation = Some(deviation);
    trace.line(format_args!(
        "validator: turn sum {:.2}° deviates {:.2}° from 360° (tolerance {:.2}°)",
        sum, deviation, config.sum_tolerance
    ));
    if deviation >= config.sum_tolerance {
        verdict.diagnostics.push(format!(
            "closure: turn sum {:.2}° deviates {:.2}° from 360°, tolerance {:.2}°",
            sum, deviation, config.sum_tolerance
        ));
        verdict.reject(Rule::Closure, trace);
        return verdict;
    }

    verdict.is_valid = true;
    trace.line(format_args!("validator: accepted"));
    verdict
}

struct Gap {
    /// Position of the earlier turn.
    position: usize,
    end_angle: f64,
    start_angle: f64,
    distance: f64,
}

fn continuity_gaps(turns: &[Turn]) -> Vec<Gap> {
    turns
        .windows(2)
        .enumerate()
        .filter_map(|(position, pair)| {
            let distance = circular_distance(pair[0].end_angle, pair[1].start_angle);
            (distance > CONTINUITY_TOLERANCE_DEG).then_some(Gap {
                position,
                end_angle: pair[0].end_angle,
                start_angle: pair[1].start_angle,
                distance,
            })
        })
        .collect()
}

fn assess(turns: &[Turn], gaps: &[Gap], config: &AnalysisConfig) -> Vec<TurnAssessment> {
    turns
        .iter()
        .enumerate()
        .map(|(position, turn)| {
            if !turn.is_clockwise {
                return TurnAssessment {
                    status: TurnStatus::Failed,
                    reason: Some("counter-clockwise".to_string()),
                };
            }
            let deviation = quarter_turn_deviation(turn.diff);
            if deviation > config.turn_tolerance + WARNING_MARGIN_DEG {
                return TurnAssessment {
                    status: TurnStatus::Failed,
                    reason: Some(format!("{:.2}° from 90°", deviation)),
                };
            }
            if deviation > config.turn_tolerance {
                return TurnAssessment {
                    status: TurnStatus::Warning,
                    reason: Some(format!(
                        "{:.2}° from 90° exceeds tolerance {:.2}°",
                        deviation, config.turn_tolerance
                    )),
                };
            }
            let gap = gaps
                .iter()
                .find(|gap| gap.position == position || gap.position + 1 == position);
            match gap {
                Some(gap) => TurnAssessment {
                    status: TurnStatus::Warning,
                    reason: Some(format!(
                        "continuity gap of {:.2}° between turns {} and {}",
                        gap.distance,
                        gap.position + 1,
                        gap.position + 2
                    )),
                },
                None => TurnAssessment {
                    status: TurnStatus::Success,
                    reason: None,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(diffs: &[f64]) -> Vec<Turn> {
        let mut heading = 0.0;
        diffs
            .iter()
            .enumerate()
            .map(|(position, &diff)| {
                let start_angle = normalize(heading);
                heading += diff;
                Turn {
                    from_segment: position,
                    to_segment: position + 1,
                    start_angle,
                    end_angle: normalize(heading),
                    diff,
                    signed_diff: diff,
                    is_clockwise: true,
                    start_index: position * 10 + 1,
                    end_index: position * 10 + 10,
                }
            })
            .collect()
    }

    fn check(turns: &[Turn]) -> Verdict {
        validate_sequence(turns, &AnalysisConfig::default(), &mut Trace::silent())
    }

    #[test]
    fn four_quarter_turns_pass() {
        let verdict = check(&chain(&[90.0, 90.0, 90.0, 90.0]));
        assert!(verdict.is_valid);
        assert!(verdict.diagnostics.is_empty());
        assert!(verdict.warnings.is_empty());
        assert_eq!(verdict.sum_deviation, Some(0.0));
        assert!(verdict
            .assessments
            .iter()
            .all(|assessment| assessment.status == TurnStatus::Success));
    }

    #[test]
    fn three_turns_fail_count() {
        let verdict = check(&chain(&[90.0, 90.0, 90.0]));
        assert!(!verdict.is_valid);
        assert_eq!(verdict.failed_rule, Some(Rule::TurnCount));
        assert_eq!(verdict.diagnostics, vec!["turn count: found 3 turns, need 4"]);
        assert_eq!(verdict.assessments.len(), 3);
    }

    #[test]
    fn extra_turns_are_truncated() {
        let verdict = check(&chain(&[90.0, 90.0, 90.0, 90.0, 170.0]));
        assert!(verdict.is_valid);
        assert_eq!(verdict.assessments.len(), 4);
    }

    #[test]
    fn counter_clockwise_turns_are_each_listed() {
        let mut turns = chain(&[90.0, 90.0, 90.0, 90.0]);
        for position in [1, 3] {
            turns[position].signed_diff = -90.0;
            turns[position].is_clockwise = false;
        }
        let verdict = check(&turns);
        assert_eq!(verdict.failed_rule, Some(Rule::RotationalSense));
        assert_eq!(verdict.diagnostics.len(), 2);
        assert!(verdict.diagnostics[0].starts_with("rotational sense: turn 2"));
        assert!(verdict.diagnostics[1].starts_with("rotational sense: turn 4"));
        assert_eq!(verdict.assessments[1].status, TurnStatus::Failed);
    }

    #[test]
    fn overlapping_indices_fail() {
        let mut turns = chain(&[90.0, 90.0, 90.0, 90.0]);
        turns[2].start_index = turns[1].end_index;
        let verdict = check(&turns);
        assert_eq!(verdict.failed_rule, Some(Rule::IndexOverlap));
        assert!(verdict.diagnostics[0].starts_with("index overlap: turn 3"));
        assert_eq!(verdict.turn_sum, None);
    }

    #[test]
    fn closure_boundary_is_exclusive() {
        let verdict = check(&chain(&[90.0, 90.0, 90.0, 105.0]));
        assert!(!verdict.is_valid);
        assert_eq!(verdict.failed_rule, Some(Rule::Closure));

        let verdict = check(&chain(&[90.0, 90.0, 90.0, 104.99]));
        assert!(verdict.is_valid, "{:?}", verdict.diagnostics);
        assert_eq!(verdict.assessments[3].status, TurnStatus::Success);
    }

    #[test]
    fn zero_sum_tolerance_always_fails_closure() {
        let config = AnalysisConfig {
            sum_tolerance: 0.0,
            ..AnalysisConfig::default()
        };
        let verdict = validate_sequence(
            &chain(&[90.0, 90.0, 90.0, 90.0]),
            &config,
            &mut Trace::silent(),
        );
        assert_eq!(verdict.failed_rule, Some(Rule::Closure));
    }

    #[test]
    fn continuity_gap_only_warns() {
        let mut turns = chain(&[90.0, 90.0, 90.0, 90.0]);
        turns[2].start_angle = normalize(turns[2].start_angle + 30.0);
        let verdict = check(&turns);
        assert!(verdict.is_valid);
        assert_eq!(verdict.warnings.len(), 1);
        assert!(verdict.warnings[0].starts_with("chain continuity: gap of 30.00°"));
        let statuses: Vec<TurnStatus> = verdict
            .assessments
            .iter()
            .map(|assessment| assessment.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                TurnStatus::Success,
                TurnStatus::Warning,
                TurnStatus::Warning,
                TurnStatus::Success
            ]
        );
    }

    #[test]
    fn assessment_bands() {
        let turns = chain(&[104.0, 108.0, 112.0, 36.0]);
        let verdict = check(&turns);
        let statuses: Vec<TurnStatus> = verdict
            .assessments
            .iter()
            .map(|assessment| assessment.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                TurnStatus::Success,
                TurnStatus::Warning,
                TurnStatus::Failed,
                TurnStatus::Failed
            ]
        );
        assert!(verdict.is_valid);
    }
}

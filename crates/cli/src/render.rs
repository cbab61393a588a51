use compass_analyzer::{AnalysisOutcome, Rule, Segment, Turn, TurnAssessment, TurnStatus};
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompassReport {
    pub compass: String,
    pub source: String,
    pub is_valid: bool,
    pub failed_rule: Option<Rule>,
    pub turn_sum: Option<f64>,
    pub sum_deviation: Option<f64>,
    pub turns: Vec<TurnRow>,
    pub candidate_turns: usize,
    pub segments: Vec<SegmentRow>,
    pub diagnostics: Vec<String>,
    pub warnings: Vec<String>,
    pub all_angles: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TurnRow {
    pub start_angle: f64,
    pub end_angle: f64,
    pub diff: f64,
    pub signed_diff: f64,
    pub is_clockwise: bool,
    pub start_index: usize,
    pub end_index: usize,
    pub status: TurnStatus,
    pub warning_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SegmentRow {
    pub start_index: usize,
    pub end_index: usize,
    pub avg_angle: f64,
    pub length: usize,
    pub outliers: usize,
}

impl From<&Segment> for SegmentRow {
    fn from(segment: &Segment) -> Self {
        Self {
            start_index: segment.start_index,
            end_index: segment.end_index,
            avg_angle: segment.avg_angle,
            length: segment.len(),
            outliers: segment.outliers,
        }
    }
}

impl TurnRow {
    fn new(turn: &Turn, assessment: Option<&TurnAssessment>) -> Self {
        let (status, warning_reason) = match assessment {
            Some(assessment) => (assessment.status, assessment.reason.clone()),
            None => (TurnStatus::Failed, Some("not evaluated".to_string())),
        };
        Self {
            start_angle: turn.start_angle,
            end_angle: turn.end_angle,
            diff: turn.diff,
            signed_diff: turn.signed_diff,
            is_clockwise: turn.is_clockwise,
            start_index: turn.start_index,
            end_index: turn.end_index,
            status,
            warning_reason,
        }
    }
}

impl CompassReport {
    pub fn new(
        compass: String,
        source: String,
        all_angles: Vec<f64>,
        outcome: AnalysisOutcome,
        trace: Option<Vec<String>>,
    ) -> Self {
        let verdict = outcome.verdict;
        let turns = outcome
            .turns
            .iter()
            .enumerate()
            .map(|(position, turn)| TurnRow::new(turn, verdict.assessments.get(position)))
            .collect();
        Self {
            compass,
            source,
            is_valid: verdict.is_valid,
            failed_rule: verdict.failed_rule,
            turn_sum: verdict.turn_sum,
            sum_deviation: verdict.sum_deviation,
            turns,
            candidate_turns: outcome.candidate_turns.len(),
            segments: outcome.segments.iter().map(SegmentRow::from).collect(),
            diagnostics: verdict.diagnostics,
            warnings: verdict.warnings,
            all_angles,
            trace,
        }
    }
}

pub(crate) fn print_compass_report(report: &CompassReport) {
    let verdict = if report.is_valid { "VALID" } else { "INVALID" };
    println!("compass {}: {}", report.compass, verdict);
    println!(
        "readings={} segments={} candidate_turns={} source={}",
        report.all_angles.len(),
        report.segments.len(),
        report.candidate_turns,
        report.source
    );
    if let (Some(sum), Some(deviation)) = (report.turn_sum, report.sum_deviation) {
        println!("turn sum: {:.2}° (deviation {:.2}°)", sum, deviation);
    }

    for (position, turn) in report.turns.iter().enumerate() {
        println!(
            "turn {}: {:.2}° -> {:.2}° ({:+.2}°) readings {} -> {} [{}]",
            position + 1,
            turn.start_angle,
            turn.end_angle,
            turn.signed_diff,
            turn.start_index,
            turn.end_index,
            turn.status.as_str()
        );
        if let Some(reason) = &turn.warning_reason {
            println!("  {}", reason);
        }
    }

    for line in &report.diagnostics {
        println!("error: {}", line);
    }
    for line in &report.warnings {
        println!("warning: {}", line);
    }
    if let Some(trace) = &report.trace {
        println!("trace:");
        for line in trace {
            println!("  {}", line);
        }
    }
}

pub(crate) fn print_segments(rows: &[SegmentRow]) {
    if rows.is_empty() {
        println!("no stable segments");
        return;
    }
    for (position, row) in rows.iter().enumerate() {
        println!(
            "segment {}: readings {}..={} avg={:.2}° length={} outliers={}",
            position, row.start_index, row.end_index, row.avg_angle, row.length, row.outliers
        );
    }
}

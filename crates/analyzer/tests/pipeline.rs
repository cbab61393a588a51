use approx::assert_abs_diff_eq;
use compass_analyzer::{
    analyze, analyze_with_sink, get_segments, merge_segments, validate_sequence, AnalysisConfig,
    Rule, Trace, TracingSink, Turn, TurnStatus,
};
use compass_circular::circular_distance;

const CANONICAL: [f64; 10] = [0.0, 0.0, 90.0, 90.0, 180.0, 180.0, 270.0, 270.0, 0.0, 0.0];
const REVERSED: [f64; 10] = [0.0, 0.0, 90.0, 90.0, 0.0, 0.0, 270.0, 270.0, 0.0, 0.0];

fn quarter_turn(position: usize, diff: f64) -> Turn {
    Turn {
        from_segment: position,
        to_segment: position + 1,
        start_angle: 90.0 * position as f64,
        end_angle: 90.0 * (position + 1) as f64 % 360.0,
        diff,
        signed_diff: diff,
        is_clockwise: true,
        start_index: position * 2 + 1,
        end_index: position * 2 + 2,
    }
}

#[test]
fn canonical_run_is_valid() {
    let outcome = analyze(&CANONICAL, &AnalysisConfig::default());

    let angles: Vec<f64> = outcome.segments.iter().map(|s| s.avg_angle).collect();
    assert_eq!(angles.len(), 5);
    for (actual, expected) in angles.iter().zip([0.0, 90.0, 180.0, 270.0, 0.0]) {
        assert!(circular_distance(*actual, expected) < 1e-9, "{actual} vs {expected}");
        assert!((0.0..360.0).contains(actual));
    }

    assert_eq!(outcome.candidate_turns.len(), 4);
    assert_eq!(outcome.turns, outcome.candidate_turns);
    for turn in &outcome.turns {
        assert_abs_diff_eq!(turn.diff, 90.0, epsilon = 1e-9);
        assert!(turn.is_clockwise);
    }

    assert!(outcome.is_valid);
    assert!(outcome.diagnostics.is_empty());
    assert!(outcome.verdict.warnings.is_empty());
    assert_eq!(outcome.verdict.failed_rule, None);
}

#[test]
fn rotation_after_calibration_is_tolerated() {
    let config = AnalysisConfig::default();

    // A half turn out of the final dwell is no quarter turn.
    let readings = [
        0.0, 0.0, 90.0, 90.0, 180.0, 180.0, 270.0, 270.0, 0.0, 0.0, 180.0, 180.0,
    ];
    let outcome = analyze(&readings, &config);
    let pairs: Vec<(usize, usize)> = outcome
        .candidate_turns
        .iter()
        .map(|turn| (turn.from_segment, turn.to_segment))
        .collect();
    assert_eq!(pairs, vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
    assert!(outcome.is_valid, "{:?}", outcome.diagnostics);

    // A fifth clockwise quarter turn leaves two closing windows.
    let readings = [
        0.0, 0.0, 90.0, 90.0, 180.0, 180.0, 270.0, 270.0, 0.0, 0.0, 90.0, 90.0,
    ];
    let outcome = analyze(&readings, &config);
    assert_eq!(outcome.candidate_turns.len(), 5);
    assert!(outcome.is_valid, "{:?}", outcome.diagnostics);
    assert_eq!(outcome.turns.len(), 4);
    assert!(outcome
        .turns
        .windows(2)
        .all(|pair| pair[1].from_segment == pair[0].to_segment));
}

#[test]
fn reversed_step_fails_rotational_sense() {
    let config = AnalysisConfig::default();
    let segments = get_segments(&REVERSED, &config);
    assert_eq!(segments.len(), 5);

    let steps: Vec<Turn> = (0..4)
        .filter_map(|position| Turn::between(&segments, position, position + 1))
        .collect();
    assert_eq!(steps.len(), 4);

    let verdict = validate_sequence(&steps, &config, &mut Trace::silent());
    assert!(!verdict.is_valid);
    assert_eq!(verdict.failed_rule, Some(Rule::RotationalSense));
    assert!(verdict
        .diagnostics
        .iter()
        .all(|line| line.starts_with("rotational sense:")));
    assert_eq!(verdict.diagnostics.len(), 2);

    let outcome = analyze(&REVERSED, &config);
    assert!(!outcome.is_valid);
    assert!(outcome.turns.iter().all(|turn| turn.is_clockwise));
}

#[test]
fn min_stable_len_boundary() {
    let config = AnalysisConfig {
        min_stable_len: 3,
        ..AnalysisConfig::default()
    };
    let segments = get_segments(&[10.0, 10.0, 10.0, 50.0, 50.0], &config);
    assert_eq!(segments.len(), 1);
    assert_eq!((segments[0].start_index, segments[0].end_index), (0, 2));

    let config = AnalysisConfig {
        min_stable_len: 2,
        ..config
    };
    assert_eq!(get_segments(&[10.0, 10.0, 10.0, 50.0, 50.0], &config).len(), 2);
}

#[test]
fn merging_merged_segments_changes_nothing() {
    let config = AnalysisConfig::default();
    // The 30 breaks the first run and cannot seed its own segment, leaving
    // two runs near 10° and 12° that fuse.
    let readings = [10.0, 10.0, 30.0, 12.0, 12.0, 100.0, 100.0];
    let once = get_segments(&readings, &config);
    assert_eq!(once.len(), 2);
    assert_eq!((once[0].start_index, once[0].end_index), (0, 4));
    assert_eq!(once[0].len(), 4);

    let twice = merge_segments(once.clone(), config.stability_threshold, &mut Trace::silent());
    assert_eq!(once, twice);
}

#[test]
fn sum_tolerance_boundary() {
    let config = AnalysisConfig::default();

    let at_limit: Vec<Turn> = [90.0, 90.0, 90.0, 105.0]
        .iter()
        .enumerate()
        .map(|(position, &diff)| quarter_turn(position, diff))
        .collect();
    let verdict = validate_sequence(&at_limit, &config, &mut Trace::silent());
    assert!(!verdict.is_valid);
    assert_eq!(verdict.failed_rule, Some(Rule::Closure));
    assert!(verdict.diagnostics[0].starts_with("closure:"));

    let inside: Vec<Turn> = [90.0, 90.0, 90.0, 104.99]
        .iter()
        .enumerate()
        .map(|(position, &diff)| quarter_turn(position, diff))
        .collect();
    let verdict = validate_sequence(&inside, &config, &mut Trace::silent());
    assert!(verdict.is_valid, "{:?}", verdict.diagnostics);
    assert_abs_diff_eq!(verdict.sum_deviation.unwrap_or(f64::NAN), 14.99, epsilon = 1e-9);
}

#[test]
fn outliers_are_skipped_inside_dwells() {
    let config = AnalysisConfig {
        max_outliers: 1,
        ..AnalysisConfig::default()
    };
    let readings = [
        0.0, 0.0, 200.0, 0.0, 90.0, 90.0, 180.0, 180.0, 270.0, 270.0, 0.0, 0.0,
    ];
    let outcome = analyze(&readings, &config);
    assert!(outcome.is_valid, "{:?}", outcome.diagnostics);
    assert_eq!(outcome.segments.len(), 5);
    assert_eq!(
        (outcome.segments[0].start_index, outcome.segments[0].end_index),
        (0, 3)
    );
    assert_eq!(outcome.segments[0].outliers, 1);
    assert_eq!(outcome.segments[1].start_index, 4);
}

#[test]
fn assessments_follow_selected_turns() {
    let outcome = analyze(&CANONICAL, &AnalysisConfig::default());
    assert_eq!(outcome.verdict.assessments.len(), 4);
    assert!(outcome
        .verdict
        .assessments
        .iter()
        .all(|assessment| assessment.status == TurnStatus::Success));
}

#[test]
fn tracing_sink_leaves_results_alone() {
    let config = AnalysisConfig::default();
    let mut sink = TracingSink;
    assert_eq!(
        analyze_with_sink(&CANONICAL, &config, &mut sink),
        analyze(&CANONICAL, &config)
    );
}

#[test]
fn config_reads_camel_case_json() {
    let config: AnalysisConfig = serde_json::from_str(
        r#"{"stabilityThreshold": 3.5, "minStableLen": 4, "sumTolerance": 20}"#,
    )
    .unwrap();
    assert_eq!(config.stability_threshold, 3.5);
    assert_eq!(config.min_stable_len, 4);
    assert_eq!(config.sum_tolerance, 20.0);
    assert_eq!(config.turn_tolerance, 15.0);
    assert!(config.validate().is_ok());

    let json = serde_json::to_value(AnalysisConfig::default()).unwrap();
    assert_eq!(json["maxOutliers"], 0);
    assert_eq!(json["turnTolerance"], 15.0);
}

//! Quarter-turn validation of compass calibration runs.
//!
//! Readings flow through a fixed pipeline: stable segments, merged segments,
//! candidate turns, the best four-turn window and finally a [`Verdict`].

mod config;
mod pipeline;
mod segments;
mod selection;
mod sink;
mod turns;
mod validation;

pub use config::{
    AnalysisConfig, ConfigError, DEFAULT_MAX_OUTLIERS, DEFAULT_MIN_STABLE_LEN,
    DEFAULT_STABILITY_THRESHOLD, DEFAULT_SUM_TOLERANCE, DEFAULT_TURN_TOLERANCE,
    MAX_OUTLIERS_RANGE, MIN_STABLE_LEN_RANGE, STABILITY_THRESHOLD_RANGE, SUM_TOLERANCE_RANGE,
    TURN_TOLERANCE_RANGE,
};
pub use pipeline::{analyze, analyze_with_sink, get_segments, AnalysisOutcome};
pub use segments::{build_segments, merge_segments, Segment};
pub use selection::{is_chain_continuous, select_best_sequence, turn_sum, SEQUENCE_LEN};
pub use sink::{DiagnosticSink, Trace, TracingSink, TRACE_TARGET};
pub use turns::{detect_turns, Turn};
pub use validation::{
    validate_sequence, Rule, TurnAssessment, TurnStatus, Verdict, CONTINUITY_TOLERANCE_DEG,
    WARNING_MARGIN_DEG,
};

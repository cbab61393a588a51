use compass_circular::full_turn_deviation;

use crate::sink::Trace;
use crate::turns::Turn;

pub const SEQUENCE_LEN: usize = 4;

/// True when each turn starts on the segment where the previous one ended.
pub fn is_chain_continuous(turns: &[Turn]) -> bool {
    turns
        .windows(2)
        .all(|pair| pair[1].from_segment == pair[0].to_segment)
}

pub fn turn_sum(turns: &[Turn]) -> f64 {
    turns.iter().map(|turn| turn.diff).sum()
}

/// Picks the chain-continuous window of four turns whose summed magnitude is
/// closest to a full turn.
///
/// Fewer than four turns are returned unchanged. When no window is
/// continuous the first four turns are returned as they are; the validator
/// only warns about the gaps between them.
pub fn select_best_sequence(turns: &[Turn], trace: &mut Trace<'_>) -> Vec<Turn> {
    if turns.len() < SEQUENCE_LEN {
        trace.line(format_args!(
            "selector: only {} turns, nothing to choose",
            turns.len()
        ));
        return turns.to_vec();
    }

    let mut best: Option<(usize, f64)> = None;
    for (offset, window) in turns.windows(SEQUENCE_LEN).enumerate() {
        if !is_chain_continuous(window) {
            continue;
        }
        let sum = turn_sum(window);
        let deviation = full_turn_deviation(sum);
        trace.line(format_args!(
            "selector: window at {} sums to {:.2}° (deviation {:.2}°)",
            offset, sum, deviation
        ));
        if best.map_or(true, |(_, best_deviation)| deviation < best_deviation) {
            best = Some((offset, deviation));
        }
    }

    match best {
        Some((offset, _)) => {
            trace.line(format_args!("selector: chose window at {}", offset));
            turns[offset..offset + SEQUENCE_LEN].to_vec()
        }
        None => {
            trace.line(format_args!(
                "selector: no chain-continuous window, falling back to the first {} turns",
                SEQUENCE_LEN
            ));
            turns[..SEQUENCE_LEN].to_vec()
        }
    }
}

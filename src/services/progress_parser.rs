//! Heuristic progress extraction from child-process output.
//!
//! This is line scraping, not a protocol. Any line may carry nothing useful,
//! and a missed line only means stale progress, never a wrong status.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::models::ProgressDelta;

static BEST_REWARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Best reward:\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)")
        .expect("best reward pattern is valid")
});

static ITERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bIteration\s+(\d+)\s*/\s*(\d+)").expect("iteration pattern is valid")
});

static COLLISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)collision found").expect("collision pattern is valid"));

/// Extract whatever progress signals `line` carries.
pub fn parse_line(line: &str) -> Option<ProgressDelta> {
    let delta = ProgressDelta {
        best_reward: BEST_REWARD
            .captures(line)
            .and_then(|c| c[1].parse::<f64>().ok())
            .filter(|r| r.is_finite()),
        current_iteration: ITERATION
            .captures(line)
            .and_then(|c| c[1].parse::<u32>().ok()),
        collision_found: COLLISION.is_match(line),
    };

    if delta.is_empty() {
        tracing::debug!(line, "No progress signal in output line");
        None
    } else {
        Some(delta)
    }
}

//! Progress bar for experiments followed in the foreground.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::domain::models::Progress;

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Create an iteration progress bar.
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS);
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

/// Reflect the latest progress snapshot on the bar.
pub fn update_progress_bar(pb: &ProgressBar, progress: &Progress) {
    pb.set_position(u64::from(progress.current_iteration));
    pb.set_message(progress_message(progress));
}

fn progress_message(progress: &Progress) -> String {
    let mut parts = Vec::new();
    if let Some(best) = progress.best_reward {
        parts.push(format!("best {best:.3}"));
    }
    if progress.collision_found {
        parts.push("collision found".to_string());
    }
    parts.join(", ")
}

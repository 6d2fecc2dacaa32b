//! Table output formatting for CLI commands
//!
//! Experiment listings rendered with comfy-table, with color-coded status
//! cells unless colors are disabled.

use crate::domain::models::{ExperimentStatus, ExperimentSummary};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self { use_colors, max_width }
    }

    /// Format a list of experiments as a table
    pub fn format_experiments(&self, experiments: &[ExperimentSummary]) -> String {
        let mut table = self.create_base_table();

        table.set_header(
            ["ID", "Status", "Route", "Route File", "Method", "Iter", "Best", "Collision", "Created"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

        for exp in experiments {
            let id_short = exp.id.to_string()[..8].to_string();
            let status_cell = if self.use_colors {
                Cell::new(exp.status.as_str()).fg(status_color(exp.status))
            } else {
                Cell::new(format!("{} {}", status_icon(exp.status), exp.status))
            };
            let best = exp
                .best_reward
                .map_or_else(|| "-".to_string(), |r| format!("{r:.3}"));
            let collision = if exp.collision_found { "yes" } else { "no" };

            table.add_row(vec![
                Cell::new(id_short),
                status_cell,
                Cell::new(&exp.route_id),
                Cell::new(truncate(&exp.route_file, 30)),
                Cell::new(&exp.search_method),
                Cell::new(exp.current_iteration),
                Cell::new(best),
                Cell::new(collision),
                Cell::new(exp.created_at.format("%Y-%m-%d %H:%M").to_string()),
            ]);
        }

        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn status_color(status: ExperimentStatus) -> Color {
    match status {
        ExperimentStatus::Created => Color::White,
        ExperimentStatus::Running => Color::Cyan,
        ExperimentStatus::Completed => Color::Green,
        ExperimentStatus::Failed => Color::Red,
        ExperimentStatus::Stopped => Color::DarkGrey,
    }
}

fn status_icon(status: ExperimentStatus) -> &'static str {
    match status {
        ExperimentStatus::Created => "○",
        ExperimentStatus::Running => "⟳",
        ExperimentStatus::Completed => "✓",
        ExperimentStatus::Failed => "✗",
        ExperimentStatus::Stopped => "⊘",
    }
}

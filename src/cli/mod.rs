//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

pub use output::progress::create_progress_bar;
pub use types::{Cli, Commands};

use crate::domain::errors::DomainError;

/// Print `err` and exit with a non-zero status.
///
/// Unknown experiments exit with 2, every other failure with 1.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }

    let code = match err.downcast_ref::<DomainError>() {
        Some(DomainError::ExperimentNotFound(_)) => 2,
        _ => 1,
    };
    std::process::exit(code)
}

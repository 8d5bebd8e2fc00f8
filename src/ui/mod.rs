//! Terminal output for the fetchgate CLI
//!
//! Uses `cliclack` and `indicatif` on interactive terminals with automatic
//! fallback to plain lines in CI/non-interactive environments. All UI
//! output goes to stderr so `fetchgate pull` can print just the path.

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{step_info, step_ok_detail, step_warn_hint};
pub use progress::DownloadProgress;
pub use prompts::confirm;

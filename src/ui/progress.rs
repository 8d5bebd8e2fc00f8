//! Download progress with CI fallback

use super::context::UiContext;
use crate::remote::ProgressSink;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Download progress bar.
///
/// Shows an indicatif byte bar in interactive mode and a single plain
/// line per transfer in CI.
pub struct DownloadProgress {
    bar: Option<ProgressBar>,
    label: String,
}

impl DownloadProgress {
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = ctx.is_interactive().then(|| {
            let bar = ProgressBar::hidden();
            bar.set_prefix(label.to_string());
            bar
        });
        Self {
            bar,
            label: label.to_string(),
        }
    }

    fn bytes_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("  {spinner:.cyan} {prefix}  {bar:24.cyan/dim} {bytes}/{total_bytes} {bytes_per_sec:.dim}  {eta:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .progress_chars("━╸─")
    }

    fn unknown_size_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("  {spinner:.cyan} {prefix}  {bytes} {bytes_per_sec:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
    }
}

impl ProgressSink for DownloadProgress {
    fn start(&self, total: Option<u64>) {
        let Some(ref bar) = self.bar else {
            eprintln!("Downloading {}...", self.label);
            return;
        };

        match total {
            Some(len) => {
                bar.set_length(len);
                bar.set_style(Self::bytes_style());
            }
            None => bar.set_style(Self::unknown_size_style()),
        }
        bar.set_position(0);
        bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn advance(&self, bytes: u64) {
        if let Some(ref bar) = self.bar {
            bar.inc(bytes);
        }
    }

    fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

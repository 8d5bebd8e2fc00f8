//! Confirmation prompt with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{FetchError, FetchResult};

/// Ask for confirmation; returns `default` when there is nobody to ask
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> FetchResult<bool> {
    if ctx.auto_yes() {
        eprintln!("  {} (auto-approved)", message);
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on stdin
    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| FetchError::User(format!("Prompt task failed: {}", e)))?
    .map_err(|e| FetchError::User(format!("Prompt failed: {}", e)))
}

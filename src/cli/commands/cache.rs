//! Cache command - inspect and clean the image cache

use crate::cache::{format_bytes, CachedImage, FsCache};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::{FetchError, FetchResult};
use crate::ui::{self, UiContext};
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> FetchResult<()> {
    match args.action {
        CacheAction::Path => {
            println!("{}", config.cache_root().display());
            Ok(())
        }
        CacheAction::List { format } => list_images(&open_enabled(config)?, format),
        CacheAction::Clean { yes } => clean_images(&open_enabled(config)?, yes).await,
    }
}

fn open_enabled(config: &Config) -> FetchResult<FsCache> {
    let cache = config.open_cache()?;
    if cache.root().is_none() {
        return Err(FetchError::User(
            "Image cache is disabled; nothing to manage".to_string(),
        ));
    }
    Ok(cache)
}

fn list_images(cache: &FsCache, format: OutputFormat) -> FetchResult<()> {
    let images = cache
        .list()
        .map_err(|e| FetchError::User(format!("Unable to list image cache: {}", e)))?;

    match format {
        OutputFormat::Table => print_image_table(&images),
        OutputFormat::Json => print_image_json(&images)?,
        OutputFormat::Plain => print_image_plain(&images),
    }
    Ok(())
}

fn print_image_table(images: &[CachedImage]) {
    if images.is_empty() {
        println!("No cached images.");
        return;
    }

    println!("{:<72} {:>10} {:<20}", "HASH", "SIZE", "MODIFIED");
    println!("{}", "-".repeat(104));

    let mut total = 0;
    for image in images {
        total += image.size_bytes;
        println!(
            "{:<72} {:>10} {:<20}",
            image.hash,
            format_bytes(image.size_bytes),
            image.modified.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!(
        "Total: {} image(s), {}",
        images.len(),
        style(format_bytes(total)).bold()
    );
}

fn print_image_json(images: &[CachedImage]) -> FetchResult<()> {
    #[derive(serde::Serialize)]
    struct ImageJson<'a> {
        hash: &'a str,
        path: String,
        size_bytes: u64,
        modified: String,
    }

    let json: Vec<ImageJson<'_>> = images
        .iter()
        .map(|i| ImageJson {
            hash: &i.hash,
            path: i.path.display().to_string(),
            size_bytes: i.size_bytes,
            modified: i.modified.to_rfc3339(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_image_plain(images: &[CachedImage]) {
    for image in images {
        println!("{}", image.path.display());
    }
}

async fn clean_images(cache: &FsCache, yes: bool) -> FetchResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);
    let images = cache
        .list()
        .map_err(|e| FetchError::User(format!("Unable to list image cache: {}", e)))?;

    if images.is_empty() {
        ui::step_info(&ctx, "Image cache is already empty");
        return Ok(());
    }

    let total: u64 = images.iter().map(|i| i.size_bytes).sum();
    let prompt = format!(
        "Remove {} cached image(s) ({})?",
        images.len(),
        format_bytes(total)
    );
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::step_info(&ctx, "Aborted");
        return Ok(());
    }

    let removed = cache
        .clean()
        .map_err(|e| FetchError::User(format!("Unable to clean image cache: {}", e)))?;
    ui::step_ok_detail(
        &ctx,
        &format!("Removed {} cached image(s)", removed),
        &format_bytes(total),
    );
    Ok(())
}

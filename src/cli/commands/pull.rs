//! Pull command - fetch a library image through the cache

use crate::cache::FsCache;
use crate::cancel::CancelToken;
use crate::cli::args::PullArgs;
use crate::config::Config;
use crate::error::FetchResult;
use crate::fetch::{Fetcher, Pulled};
use crate::hash::LibraryHasher;
use crate::reference::ArtifactReference;
use crate::remote::LibraryClient;
use crate::trust::CommandVerifier;
use crate::ui::{self, DownloadProgress, UiContext};
use std::sync::Arc;
use tracing::debug;

/// Execute the pull command
pub async fn execute(args: PullArgs, config: &Config, cancel: CancelToken) -> FetchResult<()> {
    let ctx = UiContext::detect();
    let reference = ArtifactReference::parse(&args.reference)?;
    let arch = args
        .arch
        .clone()
        .unwrap_or_else(|| config.library.default_arch.clone());

    let cache = if args.no_cache {
        debug!("Cache bypassed for this pull (--no-cache)");
        FsCache::disabled()
    } else {
        config.open_cache()?
    };

    let fetcher = build_fetcher(&args, config, &ctx, &reference);

    let Some(ref dest) = args.output else {
        let path = fetcher.pull(&cancel, &cache, &reference, &arch).await?;
        println!("{}", path.display());
        return Ok(());
    };

    let pulled = fetcher
        .pull_to_path(&cancel, &cache, &reference, &arch, dest)
        .await?;

    if args.require_signed || config.trust.require_signed {
        let path = pulled.require_signed(&reference)?;
        ui::step_ok_detail(&ctx, "Pulled and verified", &path.display().to_string());
        return Ok(());
    }

    match pulled {
        Pulled::Verified(path) => {
            ui::step_ok_detail(&ctx, "Pulled and verified", &path.display().to_string())
        }
        Pulled::Unsigned { path, reason } => {
            ui::step_warn_hint(
                &ctx,
                &format!("Pulled {} but it is not signed: {}", path.display(), reason),
                "Only run unsigned images from publishers you trust",
            );
        }
    }
    Ok(())
}

fn build_fetcher(
    args: &PullArgs,
    config: &Config,
    ctx: &UiContext,
    reference: &ArtifactReference,
) -> Fetcher {
    let client = Arc::new(LibraryClient::from_config(&config.library));
    let mut options = config.fetch_options();
    options.strict_hash |= args.strict_hash;

    Fetcher::new(
        client.clone(),
        client,
        Arc::new(LibraryHasher),
        Arc::new(CommandVerifier::new(config.trust.command.clone())),
    )
    .with_options(options)
    .with_trust_config(config.trust_config())
    .with_progress(Arc::new(DownloadProgress::new(ctx, &reference.path())))
}

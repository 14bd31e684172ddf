use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use slotimg::domain::{LoadOutcome, SlotContent};
use slotimg::infrastructure::{
    AppConfig, CatalogClient, CliArgs, ConfigStore, HttpTransport, ImageLoader,
};
use slotimg::presentation::ImageSlot;

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> AppConfig {
    let loaded = match &args.config {
        Some(path) => {
            let dir = path.parent().map(ToOwned::to_owned).unwrap_or_default();
            ConfigStore::with_dir(dir).load_config(Some(path))
        }
        None => ConfigStore::new().and_then(|store| store.load_config(None)),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("Failed to load configuration ({e}), using defaults");
        AppConfig::default()
    });
    config.merge_with_args(args);
    config
}

async fn collect_urls(args: &CliArgs, config: &AppConfig) -> Result<Vec<String>> {
    if !args.urls.is_empty() {
        return Ok(args.urls.clone());
    }
    let Some(catalog_url) = &config.catalog_url else {
        return Err(eyre!("no image URLs given and no catalog_url configured"));
    };
    let catalog = CatalogClient::new(
        catalog_url.clone(),
        Duration::from_secs(config.loader.timeout_secs),
    )?;
    let items = catalog.fetch().await?;
    info!(count = items.len(), url = %catalog.url(), "Loaded catalog");
    Ok(items.into_iter().map(|item| item.url).collect())
}

fn describe(outcome: LoadOutcome, slot: &ImageSlot) -> String {
    match (outcome, slot.displayed()) {
        (LoadOutcome::Delivered(source), SlotContent::Image { image, .. }) => {
            format!("{source} {}x{}", image.width(), image.height())
        }
        (LoadOutcome::Delivered(source), _) => source.to_string(),
        (LoadOutcome::ErrorShown, _) => "failed".to_string(),
        (LoadOutcome::Discarded, _) => "discarded".to_string(),
        (LoadOutcome::Skipped, _) => "skipped".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args);
    init_logging(&config)?;

    info!(version = slotimg::VERSION, "Starting {}", slotimg::NAME);
    if let Some(path) = config.effective_config_path() {
        info!(path = %path.display(), "Using configuration");
    }

    let transport = Arc::new(HttpTransport::new(&config.loader)?);
    let loader = ImageLoader::new(
        config.loader.clone(),
        transport,
        &config.effective_cache_root(),
    )?;

    if args.invalidate_cache {
        loader.invalidate_cache()?;
        println!("cache cleared");
    }

    let urls = collect_urls(&args, &config).await?;
    let mut pending = Vec::with_capacity(urls.len());
    for url in urls {
        let slot = Arc::new(ImageSlot::with_size(args.width, args.height));
        let mut request = loader.load(url.clone());
        if args.fade_in {
            request = request.with_fade_in_animation();
        }
        let handle = request.into(Arc::clone(&slot));
        pending.push((url, slot, handle));
    }

    let mut failures = 0usize;
    for (url, slot, handle) in pending {
        let handle_slot = handle.slot();
        let outcome = handle.finished().await;
        if outcome == LoadOutcome::ErrorShown {
            failures += 1;
            warn!(url = %url, slot = %handle_slot, "Image failed to load");
        }
        println!("{url}: {}", describe(outcome, &slot));
    }

    info!(stats = %loader.memory_cache_stats(), failures, "Done");
    Ok(())
}

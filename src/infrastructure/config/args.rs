use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "slotimg",
    version,
    about = "Loads images into display slots through a memory and disk cache",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Disk cache root directory.
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// JSON catalog to read image URLs from.
    #[arg(long, value_name = "URL")]
    pub catalog_url: Option<String>,

    /// Maximum concurrent downloads.
    #[arg(long)]
    pub max_downloads: Option<usize>,

    /// Slot width in pixels.
    #[arg(long, default_value_t = 256)]
    pub width: u32,

    /// Slot height in pixels.
    #[arg(long, default_value_t = 256)]
    pub height: u32,

    /// Fade delivered images in.
    #[arg(long)]
    pub fade_in: bool,

    /// Wipe both cache tiers before loading.
    #[arg(long)]
    pub invalidate_cache: bool,

    /// Image URLs to load, one slot each.
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,
}

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use marquee::config::MarqueeConfig;

#[derive(Parser)]
#[command(name = "marquee")]
#[command(about = "A borderless, draggable Wayland window that shows a text label")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/marquee/marquee.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Override the label text
    #[arg(short, long)]
    text: Option<String>,

    /// Skip server-side decoration negotiation
    #[arg(long)]
    no_decoration: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting marquee {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match MarqueeConfig::load(&cli.config) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {e:#}");
            info!("📝 Using default configuration");
            MarqueeConfig::default()
        }
    };

    // Override config with CLI flags
    if let Some(text) = cli.text {
        config.label.text = text;
    }
    if cli.no_decoration {
        config.window.server_side_decorations = false;
    }
    config.validate()?;

    marquee::wayland::run(&config).context("window session failed")?;

    info!("👋 marquee shutting down");
    Ok(())
}

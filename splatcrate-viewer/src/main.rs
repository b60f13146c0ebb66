use clap::Parser;
use splatcrate_viewer::{SplatViewer, ViewerConfig};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ViewerConfig::parse();
    if let Err(e) = SplatViewer::new(config).run() {
        tracing::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

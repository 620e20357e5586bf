use clap::Parser;

mod config;
mod session;

use config::{Args, SessionConfig};

fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let args = Args::parse();
    let config = match SessionConfig::load(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = session::record(&config).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

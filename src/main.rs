#[macro_use]
extern crate log;

use anyhow::Result;
use log::LevelFilter;
use splicecast::{config, net, stdin, Station};

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let config = config::load_or_default().await?;
    info!(
        "Base source {}, effects in {}",
        config.stream.base_source.display(),
        config.stream.fx_directory.display()
    );

    let station = Station::from_config(config);

    stdin::start(station.clone());
    net::start(station.clone()).await?;

    station.controller().stop().await?;

    Ok(())
}

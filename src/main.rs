use clap::Parser;
use sno2_lib::config::{Cli, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_cli_and_env(Cli::parse())?;
    sno2_lib::run(config).await
}

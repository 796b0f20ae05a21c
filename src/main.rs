use std::path::PathBuf;

use clap::Parser;

use rendr::{Application, config::Config, telemetry};

#[derive(Parser, Debug)]
#[command(name = "rendr", about = "Document conversion API service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short = 'f', long, env = "RENDR_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    if args.validate {
        println!("Configuration OK");
        return Ok(());
    }

    telemetry::init();
    Application::new(config)?.serve().await
}

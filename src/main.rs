use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use locust::{
    cli::Cli,
    config::{LaunchConfig, Settings, SETTINGS_FILE},
    launcher, telemetry,
};
use tracing::debug;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("ignoring .env: {e}");
        }
    }

    let cli = Cli::parse();
    if cli.version {
        println!("Locust {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(1);
        }
    };
    telemetry::init_tracing(&settings.log, cli.verbose);

    match run(cli, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn load_settings() -> anyhow::Result<Settings> {
    Settings::load()
        .with_context(|| format!("invalid settings in {SETTINGS_FILE} or LOCUST__ environment"))
}

async fn run(cli: Cli, settings: &Settings) -> Result<(), locust::error::LaunchError> {
    let config = LaunchConfig::from_cli(cli, settings)?;
    debug!(?config, "launch configuration");
    let mut stdout = std::io::stdout();
    launcher::launch(config, &mut stdout, telemetry::shutdown_signal()).await
}

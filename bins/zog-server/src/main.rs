mod cmd;
mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands, Effective, LogFormat};
use error::ServerError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    match cli.command {
        Commands::Start(args) => {
            let eff = Effective::new(&args)?;
            init_tracing(cli.log_format.unwrap_or(eff.log_format));
            cmd::start::run(eff).await
        }
        Commands::Send(args) => {
            init_tracing(cli.log_format.unwrap_or_default());
            cmd::send::run(args).await
        }
        Commands::GenConfig(args) => {
            init_tracing(cli.log_format.unwrap_or_default());
            cmd::gen_config::run(args, cli.log_format)
        }
        Commands::GenProgram(args) => {
            init_tracing(cli.log_format.unwrap_or_default());
            cmd::gen_program::run(args)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

//! simfuzz CLI entry point.

use anyhow::Result;
use clap::Parser;

use simfuzz::cli::commands::{self, experiment, init};
use simfuzz::cli::{Cli, Commands};
use simfuzz::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        simfuzz::cli::handle_error(&err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = commands::load_config(cli.config.as_deref())?;
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;
    let json = cli.json;

    match cli.command {
        Commands::Init { force } => init::execute(&config, force, json).await,
        Commands::Recover => {
            let service = commands::build_service(&config).await?;
            experiment::handle_recover(&service, json).await
        }
        Commands::Create(args) => {
            let service = commands::open_service(&config).await?;
            experiment::handle_create(&service, args, json).await
        }
        Commands::Run(args) => {
            let service = commands::open_service(&config).await?;
            experiment::handle_run(&service, args, json).await
        }
        Commands::Start { id } => {
            let service = commands::open_service(&config).await?;
            experiment::handle_start(&service, id, json).await
        }
        Commands::Stop { id } => {
            let service = commands::open_service(&config).await?;
            experiment::handle_stop(&service, id, json).await
        }
        Commands::List(args) => {
            let service = commands::open_service(&config).await?;
            experiment::handle_list(&service, args, json).await
        }
        Commands::Show { id } => {
            let service = commands::open_service(&config).await?;
            experiment::handle_show(&service, id, json).await
        }
        Commands::Results { id } => {
            let service = commands::open_service(&config).await?;
            experiment::handle_results(&service, id, json).await
        }
        Commands::Update(args) => {
            let service = commands::open_service(&config).await?;
            experiment::handle_update(&service, args, json).await
        }
        Commands::Delete { id } => {
            let service = commands::open_service(&config).await?;
            experiment::handle_delete(&service, id, json).await
        }
        Commands::File { id, name } => {
            let service = commands::open_service(&config).await?;
            experiment::handle_file(&service, id, &name, json).await
        }
    }
}

pub mod aggregator;
pub mod cli;
pub mod core;
pub mod providers;
pub mod server;

use crate::aggregator::ExchangeAggregator;
use crate::core::config::AppConfig;
use crate::server::{AuditLog, CommandHandler, Server};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    /// One-shot fetch of the last `days` days; `days` is validated like the socket command.
    Fetch { days: String, table: bool },
    Serve {
        host: Option<String>,
        port: Option<u16>,
    },
}

pub fn build_aggregator(config: &AppConfig) -> Result<ExchangeAggregator> {
    let provider = providers::PrivatBankProvider::new(&config.provider.base_url)?;
    Ok(ExchangeAggregator::new(
        Arc::new(provider),
        config.currencies.clone(),
        config.provider.max_concurrent_requests,
    ))
}

pub async fn build_server(config: &AppConfig) -> Result<Server> {
    let aggregator = Arc::new(build_aggregator(config)?);
    let audit_path = config.audit_log_path()?;
    info!("Audit log at {}", audit_path.display());
    let handler = CommandHandler::new(aggregator, Arc::new(AuditLog::new(audit_path)));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    Server::bind(&addr, handler).await
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let mut config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Fetch { days, table } => {
            let aggregator = build_aggregator(&config)?;
            cli::fetch::run(&aggregator, &days, table).await
        }
        AppCommand::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let server = build_server(&config).await?;
            server
                .run_until(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
        }
    }
}

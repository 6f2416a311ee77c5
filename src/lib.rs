pub mod cli;
pub mod core;
pub mod providers;
pub mod service;

use crate::core::config::AppConfig;
use crate::providers::cbr::CbrClient;
use crate::service::RateService;
use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Rate { codes: Vec<String> },
    Rates { date: Option<NaiveDate> },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("cbrates starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let client = CbrClient::new(&config.client.url, config.client.timeout())?;
    let service = RateService::new(Arc::new(client), config.cache.ttl());

    match command {
        AppCommand::Rate { codes } => cli::rate::run(&service, &codes).await,
        AppCommand::Rates { date } => cli::rates::run(&service, date).await,
    }
}

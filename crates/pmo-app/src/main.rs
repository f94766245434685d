//! PMO application binary - composition root.
//!
//! 1. Parse CLI arguments and load the TOML configuration
//! 2. Open the SQLite database (migrations run on open)
//! 3. Wire the proposal, decision, execution, and audit services
//! 4. Serve the axum API until Ctrl-C

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pmo_api::auth::generate_token;
use pmo_api::state::AppState;
use pmo_core::access::Role;
use pmo_core::config::{ApiTokenConfig, PmoConfig};
use pmo_storage::Database;

use cli::{CliArgs, Command};

/// Expand ~ to the home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    match data_dir.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(rest)
        }
        None => PathBuf::from(data_dir),
    }
}

fn print_token_entry(user: &str, org: &str, role: &str) -> Result<(), Box<dyn std::error::Error>> {
    let entry = ApiTokenConfig {
        token: generate_token(),
        user_id: user.to_string(),
        organization_id: org.to_string(),
        role: role.parse::<Role>()?,
    };
    println!("{}", render_token_entry(&entry));
    Ok(())
}

/// Render one `[[auth.tokens]]` table for pasting into the config file.
fn render_token_entry(entry: &ApiTokenConfig) -> String {
    format!(
        "[[auth.tokens]]\ntoken = \"{}\"\nuser_id = \"{}\"\norganization_id = \"{}\"\nrole = \"{}\"\n",
        entry.token, entry.user_id, entry.organization_id, entry.role
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    if let Some(Command::GenToken { user, org, role }) = &args.command {
        return print_token_entry(user, org, role);
    }

    let config_file = args.resolve_config_path();
    let loaded = PmoConfig::load_if_present(&config_file);

    // RUST_LOG wins over --log-level, which wins over the config file.
    let level = args
        .resolve_log_level()
        .or_else(|| loaded.as_ref().ok().map(|c| c.general.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %config_file.display(), error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    tracing::info!("Starting PMO decision service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    config.server.port = args.resolve_port(config.server.port);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    config.validate()?;

    if config.auth.tokens.is_empty() {
        tracing::warn!("No auth tokens configured; every protected route will return 401");
    }

    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join(&config.storage.db_file);
    let db = Database::new(&db_path, config.storage.busy_timeout_ms)?;
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let state = AppState::new(config, Arc::new(db));
    pmo_api::start_server(state).await?;

    tracing::info!("Server stopped");
    Ok(())
}

//! Serve command - starts the API server.

use anyhow::{Context, Result};
use colored::Colorize;
use rto_api::{ApiServer, ApiServerConfig, AppState};
use rto_core::db::{create_email_log_repository, DbPool};
use rto_integrations::{AccelerateClient, GoogleDriveClient, XeroClient};
use rto_notify::{DigestScheduler, EmailService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::commands::database::prepare_database;
use crate::config::AppConfig;

/// Runs the API server until Ctrl+C or SIGTERM.
pub async fn run_server(config: AppConfig) -> Result<()> {
    println!("{} Starting RTO Compliance API Server...", "[server]".cyan());
    rto_observability::register_metrics();

    let db_pool = prepare_database(&config.database.url).await?;

    let state = build_state(&config, db_pool.clone())?;

    let bind_address: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid bind address")?;

    let server_config = ApiServerConfig {
        bind_address,
        request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        enable_swagger: config.server.swagger,
        cors_origins: config.server.cors_origins.clone(),
        ..Default::default()
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let digest = match (&state.email, config.email.digest.enabled) {
        (Some(service), true) => {
            let scheduler = DigestScheduler::new(
                db_pool.clone(),
                service.clone(),
                config.email.digest_interval(),
            );
            Some(tokio::spawn(scheduler.run(shutdown_rx)))
        }
        _ => None,
    };

    print_banner(&config, &state, bind_address, digest.is_some());

    let server = ApiServer::new(state, server_config);
    let outcome = server.run().await.context("Server error");

    // The digest loop only stops once the server has drained.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = digest {
        if let Err(e) = handle.await {
            warn!(error = %e, "Digest scheduler task ended abnormally");
        }
    }
    db_pool.close().await;

    outcome?;
    println!();
    println!("{} Server stopped", "[server]".cyan());
    Ok(())
}

/// Wires the configured collaborators into the shared application state.
fn build_state(config: &AppConfig, db_pool: DbPool) -> Result<AppState> {
    let mut state =
        AppState::new(db_pool.clone(), config.jwt_config()).with_login_limiter(config.login_limiter());

    if let Some(provider) = config
        .email
        .build_provider()
        .context("Failed to configure email provider")?
    {
        let logs = Arc::from(create_email_log_repository(&db_pool));
        let service = EmailService::from_config(&config.email, provider, logs);
        info!(provider = service.provider_name(), "Email enabled");
        state = state.with_email(Arc::new(service));
    }

    let integrations = &config.integrations;
    if let Some(drive) = &integrations.google_drive {
        let client = GoogleDriveClient::new(drive.clone())
            .context("Failed to configure Google Drive client")?;
        state = state.with_drive(Arc::new(client));
    }
    if let Some(xero) = &integrations.xero {
        let client = XeroClient::new(xero.clone()).context("Failed to configure Xero client")?;
        state = state.with_xero(Arc::new(client));
    }
    if let Some(accelerate) = &integrations.accelerate {
        let client = AccelerateClient::new(accelerate.clone())
            .context("Failed to configure Accelerate client")?;
        state = state.with_accelerate(Arc::new(client));
    }

    Ok(state)
}

fn print_banner(config: &AppConfig, state: &AppState, bind_address: SocketAddr, digest: bool) {
    let on_off = |enabled: bool| {
        if enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        }
    };

    println!();
    println!("{}", "RTO Compliance API Server".bold());
    println!("{}", "═".repeat(40));
    println!("  {} http://{}", "Address:".cyan(), bind_address);
    println!("  {} {}", "Database:".cyan(), config.database.url);
    if config.server.swagger {
        println!(
            "  {} http://{}/swagger-ui",
            "Swagger UI:".cyan(),
            bind_address
        );
    }
    println!("  {} {}", "Email:".cyan(), on_off(state.email.is_some()));
    println!("  {} {}", "Digest:".cyan(), on_off(digest));
    println!("  {} {}", "Google Drive:".cyan(), on_off(state.drive.is_some()));
    println!("  {} {}", "Xero:".cyan(), on_off(state.xero.is_some()));
    println!("  {} {}", "Accelerate:".cyan(), on_off(state.accelerate.is_some()));
    println!();
    println!("Press {} to stop", "Ctrl+C".yellow());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rto_core::db::{create_pool_with_options, run_migrations, PoolOptions};
    use rto_integrations::XeroConfig;
    use rto_notify::ProviderKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

    async fn test_pool() -> DbPool {
        let url = format!(
            "sqlite:file:cli_test_{}_{}?mode=memory&cache=shared",
            std::process::id(),
            NEXT_DB.fetch_add(1, Ordering::SeqCst)
        );
        let options = PoolOptions {
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            max_lifetime: None,
            idle_timeout: None,
        };
        let pool = create_pool_with_options(&url, options).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_state_without_integrations() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "k".repeat(32);

        let state = build_state(&config, test_pool().await).unwrap();
        assert!(state.email.is_none());
        assert!(state.drive.is_none());
        assert!(state.xero.is_none());
        assert!(state.accelerate.is_none());
    }

    #[tokio::test]
    async fn test_state_with_configured_collaborators() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "k".repeat(32);
        config.email.provider = ProviderKind::Mock;
        config.integrations.xero = Some(XeroConfig::new("tenant", "token"));

        let state = build_state(&config, test_pool().await).unwrap();
        assert_eq!(state.email.as_ref().unwrap().provider_name(), "mock");
        assert!(state.xero.is_some());
        assert!(state.accelerate.is_none());
    }
}

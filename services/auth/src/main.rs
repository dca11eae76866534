use std::sync::Arc;

use anyhow::{Context, Result};
use auth::{
    AppState, MIGRATOR,
    config::AppConfig,
    cooldown::{CooldownStore, MemoryCooldownStore, ResendCooldown},
    otp::OtpService,
    rate_limiter::RateLimiter,
    repositories::{UserRepository, UserStore},
    routes,
};
use common::{
    cache::{RedisConfig, RedisPool},
    database::{self, DatabaseConfig},
    mail::{LogMailer, Mailer, SmtpMailer},
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting authentication service");

    let config = AppConfig::load()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if !database::health_check(&pool).await {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool, &MIGRATOR).await?;

    let mailer: Arc<dyn Mailer> = match config.smtp()? {
        Some(smtp) => {
            let smtp_mailer = SmtpMailer::new(&smtp).context("configure SMTP mailer")?;
            match smtp_mailer.test_connection().await {
                Ok(true) => info!("SMTP relay reachable"),
                Ok(false) => warn!("SMTP relay refused the connection test"),
                Err(e) => warn!(error = %e, "SMTP relay unreachable; mails will fail until it recovers"),
            }
            Arc::new(smtp_mailer)
        }
        None => {
            warn!("SMTP_HOST not set; verification mails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let cooldown_store: Arc<dyn CooldownStore> = match config.redis_url() {
        Some(url) => Arc::new(RedisPool::new(&RedisConfig {
            url: url.to_string(),
        })?),
        None => Arc::new(MemoryCooldownStore::default()),
    };
    let resend_cooldown = ResendCooldown::new(cooldown_store, config.resend_cooldown());
    let verify_limiter = RateLimiter::new(config.verify_rate_limit());

    info!(
        otp_ttl_seconds = config.otp_ttl_seconds,
        resend_cooldown_seconds = resend_cooldown.period().as_secs(),
        verify_max_attempts = verify_limiter.config().max_attempts,
        "OTP policy loaded"
    );

    let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(pool.clone()));
    let otp = OtpService::new(users.clone(), mailer, config.otp_ttl()?);
    let app_state = AppState::new(users, otp, verify_limiter, resend_cooldown);

    let app = routes::create_router(app_state);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("Authentication service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("Authentication service stopped");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("auth=info,common=info,tower_http=info"));
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Gracefully shutdown");
}

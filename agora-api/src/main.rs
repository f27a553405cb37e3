use agora_api::{
    config::{ConfigError, Env},
    server::{self, CookieSettings, ServerState},
};
use agora_common::{
    model::auth::{SESSION_LIFETIME, SessionKeys},
    util::PositiveDuration,
};
use agora_db::client::{DbClient, DbError};
use axum::http::{HeaderValue, Method, header};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Error connecting to the database: {0}")]
    DatabaseConnect(sqlx::Error),
    #[error("Error migrating the database: {0}")]
    Migrate(DbError),
    #[error("Invalid CORS origin {0:?}")]
    CorsOrigin(String),
    #[error("The session lifetime is not positive")]
    SessionLifetime,
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "agora_api=debug,agora_db=debug,agora_common=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn connect_database(env: &Env) -> Result<PgPool, InitError> {
    let attempts = env.database_connect_attempts.max(1);
    let mut attempt = 1;

    loop {
        let connection = PgPoolOptions::new()
            .max_connections(env.database_max_connections)
            .connect(&env.database_url)
            .await;

        match connection {
            Ok(pool) => return Ok(pool),
            Err(err) if attempt < attempts => {
                warn!(attempt, attempts, error = %err, "Database not reachable, retrying");
                attempt += 1;
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(err) => return Err(InitError::DatabaseConnect(err)),
        }
    }
}

fn cors_layer(origins: &[String]) -> Result<Option<CorsLayer>, InitError> {
    if origins.is_empty() {
        return Ok(None);
    }

    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| InitError::CorsOrigin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let layer = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Ok(Some(layer))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = Env::load()?;

    let pool = connect_database(&env).await?;
    let db_client = DbClient::new(pool);
    db_client.migrate().await.map_err(InitError::Migrate)?;
    info!("Database migrated");

    let lifetime = PositiveDuration::new(SESSION_LIFETIME).ok_or(InitError::SessionLifetime)?;
    let state = ServerState {
        db_client: Arc::new(db_client),
        session_keys: Arc::new(SessionKeys::new(env.jwt_secret.as_bytes(), lifetime)),
        cookie_settings: CookieSettings {
            secure: env.cookie_secure,
        },
    };

    let mut app = server::app(state);
    if let Some(cors) = cors_layer(&env.cors_allowed_origins)? {
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(env.socket_address())
        .await
        .map_err(InitError::TcpBind)?;
    info!(address = %env.socket_address(), "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}

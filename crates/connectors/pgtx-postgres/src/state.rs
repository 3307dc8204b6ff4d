//! Runtime state: the pool, the metrics and the engine built on them.
//!
//! This is initialized on startup.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info_span, Instrument};

use pgtx_configuration::Configuration;
use query_engine_execution::metrics::Metrics;
use query_engine_execution::{Database, DatabaseOptions};

use crate::driver::PgDriver;
use crate::metrics::PoolMetrics;

/// Everything needed to run work against the configured database.
#[derive(Debug, Clone)]
pub struct State {
    pub pool: PgPool,
    pub metrics: Metrics,
    pub pool_metrics: PoolMetrics,
    pub database: Database,
}

/// Create a connection pool and wrap it inside a State.
pub async fn create_state(
    configuration: &Configuration,
    metrics_registry: &mut prometheus::Registry,
) -> Result<State, InitializationError> {
    let pool = create_pool(configuration)
        .instrument(info_span!("Create connection pool"))
        .await?;

    let (metrics, pool_metrics) = async {
        let metrics = Metrics::initialize(metrics_registry)?;
        let pool_metrics = PoolMetrics::initialize(metrics_registry)?;
        Ok::<_, prometheus::Error>((metrics, pool_metrics))
    }
    .instrument(info_span!("Setup metrics"))
    .await
    .map_err(InitializationError::MetricsError)?;
    pool_metrics.update(&pool);

    let database = Database::with_options(
        Arc::new(PgDriver::new(pool.clone())),
        DatabaseOptions {
            capitalize_sql: configuration.engine.capitalize_sql,
            default_mode: configuration.engine.default_transaction_mode,
            metrics: Some(metrics.clone()),
            ..DatabaseOptions::default()
        },
    );

    Ok(State {
        pool,
        metrics,
        pool_metrics,
        database,
    })
}

/// Create a connection pool from the configured pool settings.
/// - <https://docs.rs/sqlx/latest/sqlx/pool/struct.PoolOptions.html>
async fn create_pool(configuration: &Configuration) -> Result<PgPool, InitializationError> {
    let pool_settings = &configuration.pool_settings;

    PgPoolOptions::new()
        .max_connections(pool_settings.max_connections)
        .acquire_timeout(Duration::from_secs(pool_settings.pool_timeout))
        .idle_timeout(pool_settings.idle_timeout.map(Duration::from_secs))
        .max_lifetime(pool_settings.connection_lifetime.map(Duration::from_secs))
        .connect(&configuration.connection_uri)
        .await
        .map_err(InitializationError::UnableToCreatePool)
}

/// State initialization error.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("unable to initialize connection pool: {0}")]
    UnableToCreatePool(sqlx::Error),
    #[error("error initializing metrics: {0}")]
    MetricsError(prometheus::Error),
}

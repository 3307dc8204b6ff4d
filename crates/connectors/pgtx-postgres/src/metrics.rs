//! Connection pool gauges.

use std::time::Duration;

use prometheus::core::{AtomicF64, AtomicI64, GenericGauge};

/// Gauges describing the sqlx pool behind a [`crate::PgDriver`].
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub pool_size: GenericGauge<AtomicI64>,
    pub pool_idle_count: GenericGauge<AtomicI64>,
    pub pool_active_count: GenericGauge<AtomicI64>,
    pub pool_max_connections: GenericGauge<AtomicI64>,
    pub pool_min_connections: GenericGauge<AtomicI64>,
    pub pool_acquire_timeout: GenericGauge<AtomicF64>,
    pub pool_idle_timeout: GenericGauge<AtomicF64>,
    pub pool_max_lifetime: GenericGauge<AtomicF64>,
}

impl PoolMetrics {
    /// Set up the gauges and register them with the provided Prometheus Registry.
    pub fn initialize(
        metrics_registry: &mut prometheus::Registry,
    ) -> Result<PoolMetrics, prometheus::Error> {
        let pool_size = add_int_gauge_metric(
            metrics_registry,
            "pgtx_pool_size",
            "The number of connections currently active, including idle connections.",
        )?;

        let pool_idle_count = add_int_gauge_metric(
            metrics_registry,
            "pgtx_pool_idle",
            "The number of connections active and idle (not in use).",
        )?;

        let pool_active_count = add_int_gauge_metric(
            metrics_registry,
            "pgtx_pool_active",
            "The number of connections current active. This does not include idle connections.",
        )?;

        let pool_max_connections = add_int_gauge_metric(
            metrics_registry,
            "pgtx_pool_max_connections",
            "The maximum number of connections that this pool should maintain.",
        )?;

        let pool_min_connections = add_int_gauge_metric(
            metrics_registry,
            "pgtx_pool_min_connections",
            "The minimum number of connections that this pool should maintain.",
        )?;

        let pool_acquire_timeout = add_gauge_metric(
            metrics_registry,
            "pgtx_pool_acquire_timeout",
            "Get the maximum amount of time to spend waiting for a connection, in seconds.",
        )?;

        let pool_idle_timeout = add_gauge_metric(
            metrics_registry,
            "pgtx_pool_idle_timeout",
            "Get the maximum idle duration for individual connections, in seconds.",
        )?;

        let pool_max_lifetime = add_gauge_metric(
            metrics_registry,
            "pgtx_pool_max_lifetime",
            "Get the maximum lifetime of individual connections, in seconds.",
        )?;

        Ok(PoolMetrics {
            pool_size,
            pool_idle_count,
            pool_active_count,
            pool_max_connections,
            pool_min_connections,
            pool_acquire_timeout,
            pool_idle_timeout,
            pool_max_lifetime,
        })
    }

    /// Refresh every gauge from the pool's current state and options.
    pub fn update(&self, pool: &sqlx::PgPool) {
        let pool_size: i64 = pool.size().into();
        self.pool_size.set(pool_size);

        let pool_idle = i64::try_from(pool.num_idle()).unwrap_or(i64::MAX);
        self.pool_idle_count.set(pool_idle);

        self.pool_active_count.set(pool_size - pool_idle);

        let pool_options = pool.options();

        self.pool_max_connections
            .set(pool_options.get_max_connections().into());
        self.pool_min_connections
            .set(pool_options.get_min_connections().into());
        self.pool_acquire_timeout
            .set(pool_options.get_acquire_timeout().as_secs_f64());

        // if nothing is set, report 0
        self.pool_idle_timeout.set(
            pool_options
                .get_idle_timeout()
                .unwrap_or(Duration::ZERO)
                .as_secs_f64(),
        );
        self.pool_max_lifetime.set(
            pool_options
                .get_max_lifetime()
                .unwrap_or(Duration::ZERO)
                .as_secs_f64(),
        );
    }
}

fn add_int_gauge_metric(
    metrics_registry: &mut prometheus::Registry,
    metric_name: &str,
    metric_description: &str,
) -> Result<GenericGauge<AtomicI64>, prometheus::Error> {
    let int_gauge =
        prometheus::IntGauge::with_opts(prometheus::Opts::new(metric_name, metric_description))?;
    metrics_registry.register(Box::new(int_gauge.clone()))?;
    Ok(int_gauge)
}

fn add_gauge_metric(
    metrics_registry: &mut prometheus::Registry,
    metric_name: &str,
    metric_description: &str,
) -> Result<GenericGauge<AtomicF64>, prometheus::Error> {
    let gauge =
        prometheus::Gauge::with_opts(prometheus::Opts::new(metric_name, metric_description))?;
    metrics_registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

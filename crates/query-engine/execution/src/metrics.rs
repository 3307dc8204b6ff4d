//! Metrics setup and update for the execution engine.

use prometheus::core::{AtomicI64, AtomicU64, GenericCounter, GenericGauge};

/// Counters and gauges describing connection leases, contexts and queries.
#[derive(Debug, Clone)]
pub struct Metrics {
    pub connections_acquired: GenericCounter<AtomicU64>,
    pub connections_released: GenericCounter<AtomicU64>,
    pub leases_open: GenericGauge<AtomicI64>,
    pub tasks_total: GenericCounter<AtomicU64>,
    pub transactions_total: GenericCounter<AtomicU64>,
    pub commits_total: GenericCounter<AtomicU64>,
    pub rollbacks_total: GenericCounter<AtomicU64>,
    pub rollback_failures_total: GenericCounter<AtomicU64>,
    pub query_total: GenericCounter<AtomicU64>,
    pub query_errors_total: GenericCounter<AtomicU64>,
}

impl Metrics {
    /// Set up counters and gauges and register them with the provided Prometheus Registry.
    pub fn initialize(
        metrics_registry: &mut prometheus::Registry,
    ) -> Result<Metrics, prometheus::Error> {
        let connections_acquired = add_int_counter_metric(
            metrics_registry,
            "pgtx_connections_acquired_total",
            "Total connections leased from the driver.",
        )?;

        let connections_released = add_int_counter_metric(
            metrics_registry,
            "pgtx_connections_released_total",
            "Total connections handed back to the driver.",
        )?;

        let leases_open = add_int_gauge_metric(
            metrics_registry,
            "pgtx_leases_open",
            "The number of connection leases currently held by a context chain.",
        )?;

        let tasks_total = add_int_counter_metric(
            metrics_registry,
            "pgtx_tasks_total",
            "Total task contexts opened, nested ones included.",
        )?;

        let transactions_total = add_int_counter_metric(
            metrics_registry,
            "pgtx_transactions_total",
            "Total transaction contexts opened, nested ones included.",
        )?;

        let commits_total = add_int_counter_metric(
            metrics_registry,
            "pgtx_commits_total",
            "Total physical transactions committed.",
        )?;

        let rollbacks_total = add_int_counter_metric(
            metrics_registry,
            "pgtx_rollbacks_total",
            "Total physical transactions rolled back.",
        )?;

        let rollback_failures_total = add_int_counter_metric(
            metrics_registry,
            "pgtx_rollback_failures_total",
            "Total ROLLBACK statements rejected by the driver.",
        )?;

        let query_total = add_int_counter_metric(
            metrics_registry,
            "pgtx_query_total",
            "Total statements sent to the driver.",
        )?;

        let query_errors_total = add_int_counter_metric(
            metrics_registry,
            "pgtx_query_errors_total",
            "Total statements rejected by the driver.",
        )?;

        Ok(Metrics {
            connections_acquired,
            connections_released,
            leases_open,
            tasks_total,
            transactions_total,
            commits_total,
            rollbacks_total,
            rollback_failures_total,
            query_total,
            query_errors_total,
        })
    }
}

/// Create a new int counter metric and register it with the provided Prometheus Registry
fn add_int_counter_metric(
    metrics_registry: &mut prometheus::Registry,
    metric_name: &str,
    metric_description: &str,
) -> Result<GenericCounter<AtomicU64>, prometheus::Error> {
    let int_counter =
        prometheus::IntCounter::with_opts(prometheus::Opts::new(metric_name, metric_description))?;
    metrics_registry.register(Box::new(int_counter.clone()))?;
    Ok(int_counter)
}

/// Create a new int gauge metric and register it with the provided Prometheus Registry
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

//! Connection leases: one physical connection shared by a chain of contexts.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::driver::{Connection, Driver};
use crate::error::{ConnectionError, UsageError};
use crate::metrics::Metrics;

static NEXT_LEASE_KEY: AtomicU64 = AtomicU64::new(1);

/// Identifies the physical connection behind a lease, for logs and context info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseKey(pub u64);

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reference-counted hold on one connection.
///
/// The reference count is the number of open contexts using the connection,
/// plus the statements in flight on it. The connection goes back to the driver on the transition to zero, and
/// never again.
#[derive(Clone)]
pub struct Lease {
    inner: Arc<LeaseInner>,
}

struct LeaseInner {
    key: LeaseKey,
    connection: Box<dyn Connection>,
    state: Mutex<LeaseState>,
    metrics: Option<Metrics>,
}

#[derive(Debug, Default)]
struct LeaseState {
    ref_count: usize,
    released: bool,
}

impl Lease {
    /// Open one physical connection. The lease starts with no references;
    /// the context that owns it retains it first.
    pub async fn acquire(
        driver: &dyn Driver,
        metrics: Option<&Metrics>,
    ) -> Result<Lease, ConnectionError> {
        let connection = driver.acquire().await?;
        let key = LeaseKey(NEXT_LEASE_KEY.fetch_add(1, Ordering::Relaxed));
        if let Some(metrics) = metrics {
            metrics.connections_acquired.inc();
            metrics.leases_open.inc();
        }
        tracing::debug!(connection = %key, "connection acquired");
        Ok(Lease {
            inner: Arc::new(LeaseInner {
                key,
                connection,
                state: Mutex::new(LeaseState::default()),
                metrics: metrics.cloned(),
            }),
        })
    }

    pub fn key(&self) -> LeaseKey {
        self.inner.key
    }

    pub fn connection(&self) -> &dyn Connection {
        self.inner.connection.as_ref()
    }

    pub fn ref_count(&self) -> usize {
        self.inner.state().ref_count
    }

    pub fn is_released(&self) -> bool {
        self.inner.state().released
    }

    /// Add a reference for a newly opened context.
    pub fn retain(&self) -> Result<usize, UsageError> {
        let mut state = self.inner.state();
        if state.released {
            return Err(UsageError::ContextClosed);
        }
        state.ref_count += 1;
        Ok(state.ref_count)
    }

    /// Keep the connection out of the driver's hands until the guard drops,
    /// even if every context settles meanwhile.
    pub fn hold(&self) -> Result<LeaseHold<'_>, UsageError> {
        self.retain()?;
        Ok(LeaseHold { lease: self })
    }

    /// Drop a reference. Returns `true` when this call handed the connection
    /// back to the driver.
    pub fn release(&self) -> bool {
        let hand_back = {
            let mut state = self.inner.state();
            if state.released || state.ref_count == 0 {
                false
            } else {
                state.ref_count -= 1;
                state.released = state.ref_count == 0;
                state.released
            }
        };

        if hand_back {
            self.inner.connection.release();
            if let Some(metrics) = &self.inner.metrics {
                metrics.connections_released.inc();
                metrics.leases_open.dec();
            }
            tracing::debug!(connection = %self.inner.key, "connection released");
        }
        hand_back
    }
}

/// A reference taken by [`Lease::hold`].
pub struct LeaseHold<'a> {
    lease: &'a Lease,
}

impl Drop for LeaseHold<'_> {
    fn drop(&mut self) {
        self.lease.release();
    }
}

impl LeaseInner {
    fn state(&self) -> std::sync::MutexGuard<'_, LeaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for LeaseInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.released {
            tracing::warn!(connection = %self.key, "connection lease dropped without release");
            self.connection.release();
            if let Some(metrics) = &self.metrics {
                metrics.connections_released.inc();
                metrics.leases_open.dec();
            }
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("Lease")
            .field("key", &self.inner.key)
            .field("ref_count", &state.ref_count)
            .field("released", &state.released)
            .finish()
    }
}

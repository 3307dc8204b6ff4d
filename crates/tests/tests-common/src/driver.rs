//! A scripted in-memory driver.
//!
//! Statements are matched against rules by case-insensitive substring. The
//! driver records every statement it receives and simulates transaction
//! visibility: writes sent between BEGIN and COMMIT only count as committed
//! once COMMIT arrives, and ROLLBACK discards them. A BEGIN inside an open
//! transaction changes nothing, as on the server. A released connection
//! rejects every statement without recording it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use query_engine_execution::{Connection, ConnectionError, Driver, QueryError, Row, SQL};

#[derive(Debug, Clone)]
enum Action {
    Rows(Vec<Row>),
    Fail(QueryError),
    Delay(Duration),
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    action: Action,
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<Rule>,
    refuse: bool,
    statements: Vec<String>,
    committed: Vec<String>,
    acquired: usize,
    released: usize,
    double_releases: usize,
}

/// See the module documentation.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<State>>,
}

impl MockDriver {
    pub fn new() -> MockDriver {
        MockDriver::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn rule(self, pattern: &str, action: Action) -> MockDriver {
        self.state().rules.push(Rule {
            pattern: pattern.to_lowercase(),
            action,
        });
        self
    }

    /// Statements containing `pattern` return `rows`.
    #[must_use]
    pub fn respond(self, pattern: &str, rows: Vec<Row>) -> MockDriver {
        self.rule(pattern, Action::Rows(rows))
    }

    /// Statements containing `pattern` fail with `message`.
    #[must_use]
    pub fn fail(self, pattern: &str, message: &str) -> MockDriver {
        self.rule(pattern, Action::Fail(QueryError::new(message)))
    }

    /// Statements containing `pattern` take `delay` to complete.
    #[must_use]
    pub fn delay(self, pattern: &str, delay: Duration) -> MockDriver {
        self.rule(pattern, Action::Delay(delay))
    }

    /// Every acquire fails.
    #[must_use]
    pub fn refuse_connections(self) -> MockDriver {
        self.state().refuse = true;
        self
    }

    /// The driver as the engine sees it.
    pub fn shared(&self) -> Arc<dyn Driver> {
        Arc::new(self.clone())
    }

    /// Every statement received, in arrival order.
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    /// Writes that became durable: sent outside a transaction, or committed.
    pub fn committed_writes(&self) -> Vec<String> {
        self.state().committed.clone()
    }

    pub fn acquired(&self) -> usize {
        self.state().acquired
    }

    pub fn released(&self) -> usize {
        self.state().released
    }

    /// Releases of a connection that had already been released.
    pub fn double_releases(&self) -> usize {
        self.state().double_releases
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn acquire(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        let mut state = self.state();
        if state.refuse {
            tracing::debug!("mock driver refused a connection");
            return Err(ConnectionError::new("connection refused"));
        }
        state.acquired += 1;
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            transaction: Mutex::new(None),
            released: AtomicBool::new(false),
        }))
    }
}

struct MockConnection {
    state: Arc<Mutex<State>>,
    /// Writes pending in the open transaction, if one is open.
    transaction: Mutex<Option<Vec<String>>>,
    released: AtomicBool,
}

fn is_write(statement: &str) -> bool {
    ["insert", "update", "delete", "create", "drop"]
        .iter()
        .any(|verb| statement.starts_with(verb))
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&self, statement: &SQL) -> Result<Vec<Row>, QueryError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(QueryError::new("the connection has been released"));
        }
        let text = statement.sql.trim().to_string();
        let lower = text.to_lowercase();

        // record on arrival, before any delay, so the log shows dispatch order
        let (delay, outcome) = {
            let mut state = self.state.lock().unwrap();
            state.statements.push(text.clone());
            let matching: Vec<&Rule> = state
                .rules
                .iter()
                .filter(|rule| lower.contains(rule.pattern.as_str()))
                .collect();
            let delay = matching.iter().find_map(|rule| match rule.action {
                Action::Delay(delay) => Some(delay),
                _ => None,
            });
            let outcome = matching.iter().find_map(|rule| match &rule.action {
                Action::Rows(rows) => Some(Ok(rows.clone())),
                Action::Fail(error) => Some(Err(error.clone())),
                Action::Delay(_) => None,
            });
            (delay, outcome)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let rows = outcome.unwrap_or_else(|| Ok(vec![]))?;

        let mut transaction = self.transaction.lock().unwrap();
        if lower.starts_with("begin") {
            transaction.get_or_insert_with(Vec::new);
        } else if lower.starts_with("commit") {
            let writes = transaction.take().unwrap_or_default();
            self.state.lock().unwrap().committed.extend(writes);
        } else if lower.starts_with("rollback") {
            *transaction = None;
        } else if is_write(&lower) {
            match transaction.as_mut() {
                Some(pending) => pending.push(text),
                None => self.state.lock().unwrap().committed.push(text),
            }
        }
        Ok(rows)
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap();
        if self.released.swap(true, Ordering::SeqCst) {
            state.double_releases += 1;
        } else {
            state.released += 1;
        }
    }
}

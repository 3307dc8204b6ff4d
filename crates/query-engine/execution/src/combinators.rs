//! Run many operations and collect every outcome.
//!
//! None of the combinators short-circuit on their own: each settles what it
//! started before deciding, and the error carries every settled outcome in
//! input order.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use futures::future::{self, FutureExt};

use crate::error::{Error, Result};

/// The outcome of one operation.
#[derive(Debug, Clone)]
pub enum Settled<T> {
    Fulfilled(T),
    Rejected(Error),
}

impl<T> Settled<T> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Settled::Fulfilled(_) => None,
            Settled::Rejected(error) => Some(error),
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            Settled::Fulfilled(value) => Ok(value),
            Settled::Rejected(error) => Err(error),
        }
    }
}

impl<T> From<Result<T>> for Settled<T> {
    fn from(result: Result<T>) -> Settled<T> {
        match result {
            Ok(value) => Settled::Fulfilled(value),
            Err(error) => Settled::Rejected(error),
        }
    }
}

/// Some operations of a batch failed. `data` holds one outcome per
/// operation, in input order.
#[derive(Debug, Clone)]
pub struct BatchError<T> {
    pub data: Vec<Settled<T>>,
}

impl<T> BatchError<T> {
    pub fn first_error(&self) -> Option<&Error> {
        self.data.iter().find_map(Settled::error)
    }

    pub fn failed_count(&self) -> usize {
        self.data.iter().filter(|settled| !settled.is_fulfilled()).count()
    }
}

impl<T> fmt::Display for BatchError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} of {} operations in the batch failed",
            self.failed_count(),
            self.data.len()
        )?;
        match self.first_error() {
            Some(error) => write!(f, ": {error}"),
            None => Ok(()),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for BatchError<T> {}

/// Run every operation concurrently and wait for all of them.
pub async fn batch<T, Fut>(operations: impl IntoIterator<Item = Fut>) -> Result<Vec<T>, BatchError<T>>
where
    Fut: Future<Output = Result<T>>,
{
    let data: Vec<Settled<T>> =
        future::join_all(operations.into_iter().map(|operation| operation.map(Settled::from)))
            .await;

    if data.iter().all(Settled::is_fulfilled) {
        Ok(data.into_iter().filter_map(Settled::into_value).collect())
    } else {
        let error = BatchError { data };
        tracing::debug!(
            total = error.data.len(),
            failed = error.failed_count(),
            "batch settled with failures"
        );
        Err(error)
    }
}

/// What a sequence does after a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop producing steps.
    #[default]
    Stop,
    /// Keep producing steps and report every failure at the end.
    Continue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceOptions {
    /// Produce at most this many steps.
    pub limit: Option<usize>,
    pub policy: FailurePolicy,
}

/// A sequence step failed. `index` is the first failed step; `data` holds
/// every step that settled.
#[derive(Debug, Clone)]
pub struct SequenceError<T> {
    pub index: usize,
    pub data: Vec<Settled<T>>,
}

impl<T> SequenceError<T> {
    pub fn error(&self) -> Option<&Error> {
        self.data.get(self.index).and_then(Settled::error)
    }
}

impl<T> fmt::Display for SequenceError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "sequence step {} failed", self.index)?;
        match self.error() {
            Some(error) => write!(f, ": {error}"),
            None => Ok(()),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for SequenceError<T> {}

/// Run steps one at a time. `source(index, previous)` produces the next
/// step from the previous value (`None` first, and after a failure); the
/// sequence ends when it returns `None`.
pub async fn sequence<T, Fut, S>(
    mut source: S,
    options: SequenceOptions,
) -> Result<Vec<T>, SequenceError<T>>
where
    S: FnMut(usize, Option<&T>) -> Option<Fut>,
    Fut: Future<Output = Result<T>>,
{
    let mut data: Vec<Settled<T>> = vec![];
    let mut first_failure = None;

    for index in 0.. {
        if options.limit.is_some_and(|limit| index >= limit) {
            break;
        }
        let Some(step) = source(index, data.last().and_then(Settled::value)) else {
            break;
        };

        let settled = Settled::from(step.await);
        let failed = !settled.is_fulfilled();
        data.push(settled);

        if failed {
            first_failure.get_or_insert(index);
            if options.policy == FailurePolicy::Stop {
                break;
            }
        }
    }

    match first_failure {
        Some(index) => Err(SequenceError { index, data }),
        None => Ok(data.into_iter().filter_map(Settled::into_value).collect()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOptions {
    /// Produce at most this many pages.
    pub limit: Option<usize>,
}

/// Totals of a completed paging run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSummary {
    pub pages: usize,
    pub total: usize,
    pub duration: Duration,
}

/// A page failed. Pages before `index` completed.
#[derive(Debug, Clone)]
pub struct PageError<T> {
    pub index: usize,
    pub error: BatchError<T>,
}

impl<T> fmt::Display for PageError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "page {} failed: {}", self.index, self.error)
    }
}

impl<T: fmt::Debug> std::error::Error for PageError<T> {}

/// Run pages one after another, each page as a [`batch`].
/// `source(index, previous_page)` produces the operations of the next page;
/// paging ends on `None` or an empty page.
pub async fn page<T, Fut, S>(mut source: S, options: PageOptions) -> Result<PageSummary, PageError<T>>
where
    S: FnMut(usize, Option<&[T]>) -> Option<Vec<Fut>>,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut previous: Option<Vec<T>> = None;
    let mut pages = 0;
    let mut total = 0;

    loop {
        if options.limit.is_some_and(|limit| pages >= limit) {
            break;
        }
        let operations = match source(pages, previous.as_deref()) {
            Some(operations) if !operations.is_empty() => operations,
            _ => break,
        };

        let count = operations.len();
        match batch(operations).await {
            Ok(values) => {
                pages += 1;
                total += count;
                previous = Some(values);
            }
            Err(error) => return Err(PageError { index: pages, error }),
        }
    }

    Ok(PageSummary {
        pages,
        total,
        duration: started.elapsed(),
    })
}

fn aggregate<T>(data: &[Settled<T>]) -> Error {
    let failed = data.iter().filter(|settled| !settled.is_fulfilled()).count();
    let first = data
        .iter()
        .find_map(Settled::error)
        .cloned()
        .unwrap_or_else(|| Error::msg("operation failed"));
    Error::Aggregate {
        total: data.len(),
        failed,
        first: Box::new(first),
    }
}

impl<T> From<BatchError<T>> for Error {
    fn from(error: BatchError<T>) -> Error {
        aggregate(&error.data)
    }
}

impl<T> From<SequenceError<T>> for Error {
    fn from(error: SequenceError<T>) -> Error {
        aggregate(&error.data)
    }
}

impl<T> From<PageError<T>> for Error {
    fn from(error: PageError<T>) -> Error {
        aggregate(&error.error.data)
    }
}

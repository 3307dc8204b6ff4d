//! Units of work assembled at runtime, and the adapter that settles them.
//!
//! The typed `task`/`tx` API only accepts callbacks returning a future, so a
//! callback that returns a plain value cannot be written against it. Callers
//! that build their work dynamically (from a script, a plugin or a JSON
//! request) go through [`Returned`] instead, and the engine rejects the shapes
//! that are not a pending result.

use std::fmt;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

use crate::context::Context;
use crate::error::{Error, Result, UsageError};

pub type DynamicFuture = BoxFuture<'static, Result<serde_json::Value>>;

/// What a dynamic callback handed back.
pub enum Returned {
    /// An asynchronous result: the only valid shape.
    Pending(DynamicFuture),
    /// A plain value where an asynchronous result was expected.
    Value(serde_json::Value),
    /// Nothing at all.
    Nothing,
}

impl fmt::Debug for Returned {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Returned::Pending(_) => write!(f, "Pending"),
            Returned::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Returned::Nothing => write!(f, "Nothing"),
        }
    }
}

pub type DynamicCallback = Box<dyn FnOnce(Context) -> Returned + Send>;

pub type Construct = dyn Fn(DynamicFuture) -> DynamicFuture + Send + Sync;
pub type Resolve = dyn Fn(serde_json::Value) -> DynamicFuture + Send + Sync;
pub type Reject = dyn Fn(Error) -> DynamicFuture + Send + Sync;

/// The capability the engine uses to build and settle asynchronous results
/// of dynamic work: wrap a pending result, resolve with a value, reject with
/// an error.
#[derive(Clone)]
pub struct PromiseAdapter {
    construct: Arc<Construct>,
    resolve: Arc<Resolve>,
    reject: Arc<Reject>,
}

impl PromiseAdapter {
    /// Build an adapter from its parts. `resolve` and `reject` are required;
    /// without `construct` pending results are used as they are.
    pub fn new(
        construct: Option<Arc<Construct>>,
        resolve: Option<Arc<Resolve>>,
        reject: Option<Arc<Reject>>,
    ) -> Result<PromiseAdapter, UsageError> {
        match (resolve, reject) {
            (Some(resolve), Some(reject)) => Ok(PromiseAdapter {
                construct: construct.unwrap_or_else(pass_through),
                resolve,
                reject,
            }),
            _ => Err(UsageError::InvalidPromiseLibrary),
        }
    }

    pub fn construct(&self, pending: DynamicFuture) -> DynamicFuture {
        (self.construct)(pending)
    }

    pub fn resolve(&self, value: serde_json::Value) -> DynamicFuture {
        (self.resolve)(value)
    }

    pub fn reject(&self, error: Error) -> DynamicFuture {
        (self.reject)(error)
    }
}

impl Default for PromiseAdapter {
    fn default() -> PromiseAdapter {
        PromiseAdapter {
            construct: pass_through(),
            resolve: Arc::new(|value| future::ready(Ok(value)).boxed()),
            reject: Arc::new(|error| future::ready(Err(error)).boxed()),
        }
    }
}

fn pass_through() -> Arc<Construct> {
    Arc::new(|pending| pending)
}

impl fmt::Debug for PromiseAdapter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PromiseAdapter").finish_non_exhaustive()
    }
}

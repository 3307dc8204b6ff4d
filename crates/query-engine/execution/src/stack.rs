//! The chain of contexts sharing one connection lease.
//!
//! Frames are addressed by slot and serial. A frame refers to its parent and,
//! for a delegating transaction, to the transaction that owns
//! BEGIN/COMMIT/ROLLBACK on the connection. Closed frames at the top of the
//! table are reclaimed; an id whose slot was reused no longer matches the
//! slot's serial and reads as settled.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, UsageError};

/// The two kinds of execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Task,
    Transaction,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContextKind::Task => write!(f, "task"),
            ContextKind::Transaction => write!(f, "tx"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameId {
    slot: usize,
    serial: u64,
}

/// What a context does about transaction control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    /// A task: no transaction-control statements.
    Task,
    /// The outermost transaction on the connection.
    Owner,
    /// A transaction nested inside an open one.
    Delegate { owner: FrameId },
}

#[derive(Debug)]
struct Frame {
    serial: u64,
    kind: ContextKind,
    parent: Option<FrameId>,
    level: usize,
    tx_level: Option<usize>,
    role: Role,
    open: bool,
    rollback_only: bool,
    failure: Option<Error>,
    started: Instant,
}

#[derive(Debug, Clone)]
pub(crate) struct Opened {
    pub id: FrameId,
    pub role: Role,
    pub info: FrameInfo,
}

/// A snapshot of one frame, taken when it opens.
#[derive(Debug, Clone)]
pub(crate) struct FrameInfo {
    pub kind: ContextKind,
    pub tag: Option<String>,
    pub level: usize,
    pub tx_level: Option<usize>,
    pub started: Instant,
}

#[derive(Debug, Default)]
struct Frames {
    table: Vec<Frame>,
    next_serial: u64,
    open: usize,
    /// The open transaction that owns the physical transaction, if any.
    owner: Option<FrameId>,
}

impl Frames {
    fn get(&self, id: FrameId) -> Option<&Frame> {
        self.table
            .get(id.slot)
            .filter(|frame| frame.serial == id.serial)
    }

    fn get_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.table
            .get_mut(id.slot)
            .filter(|frame| frame.serial == id.serial)
    }

    /// The nearest transaction among `from` and its ancestors.
    fn nearest_transaction(&self, from: Option<FrameId>) -> Option<FrameId> {
        let mut current = from;
        while let Some(id) = current {
            let frame = self.get(id)?;
            if frame.kind == ContextKind::Transaction {
                return Some(id);
            }
            current = frame.parent;
        }
        None
    }
}

#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    frames: Mutex<Frames>,
}

impl ContextStack {
    fn frames(&self) -> MutexGuard<'_, Frames> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a frame for a new context under `parent`, deciding whether a
    /// transaction owns the physical transaction or delegates to an open one.
    pub fn open(
        &self,
        kind: ContextKind,
        parent: Option<FrameId>,
        tag: Option<String>,
    ) -> Result<Opened, UsageError> {
        let mut frames = self.frames();

        let level = match parent {
            None => 0,
            Some(id) => match frames.get(id) {
                Some(frame) if frame.open => frame.level + 1,
                _ => return Err(UsageError::ContextClosed),
            },
        };

        let (role, tx_level) = match (kind, frames.nearest_transaction(parent)) {
            (ContextKind::Task, None) => (Role::Task, None),
            (ContextKind::Task, Some(ancestor)) => (
                Role::Task,
                frames.get(ancestor).and_then(|frame| frame.tx_level),
            ),
            (ContextKind::Transaction, Some(ancestor)) => {
                let (owner, tx_level) = match frames.get(ancestor) {
                    Some(frame) => match frame.role {
                        Role::Delegate { owner } => (owner, frame.tx_level),
                        _ => (ancestor, frame.tx_level),
                    },
                    None => (ancestor, None),
                };
                (
                    Role::Delegate { owner },
                    tx_level.map(|tx_level| tx_level + 1),
                )
            }
            // no transaction above, so any open owner is a sibling
            (ContextKind::Transaction, None) => {
                if frames.owner.is_some() {
                    return Err(UsageError::TransactionInProgress);
                }
                (Role::Owner, Some(0))
            }
        };

        let serial = frames.next_serial;
        frames.next_serial += 1;
        let id = FrameId {
            slot: frames.table.len(),
            serial,
        };
        let started = Instant::now();
        frames.table.push(Frame {
            serial,
            kind,
            parent,
            level,
            tx_level,
            role,
            open: true,
            rollback_only: false,
            failure: None,
            started,
        });
        frames.open += 1;
        if role == Role::Owner {
            frames.owner = Some(id);
        }

        Ok(Opened {
            id,
            role,
            info: FrameInfo {
                kind,
                tag,
                level,
                tx_level,
                started,
            },
        })
    }

    /// Mark a frame settled and reclaim the closed frames at the top of the
    /// table. Returns how long it was open.
    pub fn close(&self, id: FrameId) -> Duration {
        let mut frames = self.frames();
        let duration = match frames.get_mut(id) {
            Some(frame) if frame.open => {
                frame.open = false;
                frame.started.elapsed()
            }
            _ => return Duration::ZERO,
        };
        frames.open -= 1;
        if frames.owner == Some(id) {
            frames.owner = None;
        }
        while frames.table.last().is_some_and(|frame| !frame.open) {
            frames.table.pop();
        }
        duration
    }

    pub fn is_open(&self, id: FrameId) -> bool {
        self.frames().get(id).is_some_and(|frame| frame.open)
    }

    pub fn open_count(&self) -> usize {
        self.frames().open
    }

    /// Doom the physical transaction owned by `owner`. The first failure is
    /// kept; later ones are already consequences of it.
    pub fn mark_rollback(&self, owner: FrameId, error: &Error) {
        let mut frames = self.frames();
        if let Some(frame) = frames.get_mut(owner) {
            frame.rollback_only = true;
            if frame.failure.is_none() {
                frame.failure = Some(error.clone());
            }
        }
    }

    /// The failure a nested transaction reported to this owner, if any.
    pub fn take_failure(&self, id: FrameId) -> Option<Error> {
        let mut frames = self.frames();
        let frame = frames.get_mut(id)?;
        if frame.rollback_only {
            frame.failure.take()
        } else {
            None
        }
    }

    #[cfg(test)]
    fn table_len(&self) -> usize {
        self.frames().table.len()
    }
}

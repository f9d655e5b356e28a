//! Asynchronous host work, drained on the update path.
//!
//! Long-running host operations issued on a script's behalf (database
//! queries, mostly) complete on other threads. Their completions are
//! never injected into an in-progress callback: they queue on a channel
//! and the environment runs them during `update`, so a completion can
//! never race a reload. Outstanding work defers reload until it has
//! drained.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mlua::RegistryKey;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::marshal::Args;

/// Marshals one completion's payload into handler arguments.
pub type PushPayload = Box<dyn FnOnce(&mut Args) + Send>;

pub(crate) struct Completion {
    pub handler: RegistryKey,
    pub generation: u64,
    pub push: PushPayload,
}

/// Receipt for one in-flight host operation.
///
/// Handed to whatever host thread performs the work; completing (or
/// dropping) it settles the environment's outstanding count.
pub struct QueryTicket {
    tx: UnboundedSender<Completion>,
    outstanding: Arc<AtomicUsize>,
    generation: u64,
    handler: Option<RegistryKey>,
}

impl QueryTicket {
    /// Delivers the result; the handler runs on the environment's next
    /// update.
    pub fn complete(mut self, push: impl FnOnce(&mut Args) + Send + 'static) {
        if let Some(handler) = self.handler.take() {
            let completion = Completion {
                handler,
                generation: self.generation,
                push: Box::new(push),
            };
            if self.tx.send(completion).is_err() {
                // Environment is gone; settle the count ourselves.
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

impl Drop for QueryTicket {
    fn drop(&mut self) {
        // Abandoned without completing.
        if self.handler.is_some() {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Per-environment queue of pending async completions.
pub(crate) struct QueryQueue {
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
    outstanding: Arc<AtomicUsize>,
    generation: u64,
}

impl QueryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            outstanding: Arc::new(AtomicUsize::new(0)),
            generation: 0,
        }
    }

    /// Registers one in-flight operation whose result `handler` will
    /// receive.
    pub fn issue(&self, handler: RegistryKey) -> QueryTicket {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        QueryTicket {
            tx: self.tx.clone(),
            outstanding: Arc::clone(&self.outstanding),
            generation: self.generation,
            handler: Some(handler),
        }
    }

    /// Operations issued but not yet drained.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Invalidates everything currently queued or still in flight; late
    /// completions from the old generation are discarded at drain time.
    pub fn cancel_pending(&mut self) {
        self.generation += 1;
        let mut dropped = 0usize;
        while let Ok(completion) = self.rx.try_recv() {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            drop(completion);
            dropped += 1;
        }
        if dropped > 0 {
            debug!(target: "scripting", "Cancelled {dropped} queued async completions");
        }
    }

    /// Takes every completed operation that is still current.
    pub fn drain(&mut self) -> Vec<Completion> {
        let mut ready = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            if completion.generation == self.generation {
                ready.push(completion);
            } else {
                debug!(target: "scripting", "Discarding async completion from a cancelled generation");
            }
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    fn handler_key(lua: &Lua) -> RegistryKey {
        let func = lua.create_function(|_, ()| Ok(())).unwrap();
        lua.create_registry_value(func).unwrap()
    }

    #[test]
    fn outstanding_tracks_issue_and_drain() {
        let lua = Lua::new();
        let mut queue = QueryQueue::new();

        let ticket = queue.issue(handler_key(&lua));
        assert_eq!(queue.outstanding(), 1);

        ticket.complete(|args| {
            args.push_uint(1);
        });
        // Still outstanding until the update path drains it.
        assert_eq!(queue.outstanding(), 1);
        assert_eq!(queue.drain().len(), 1);
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn dropped_ticket_settles_the_count() {
        let lua = Lua::new();
        let queue = QueryQueue::new();

        let ticket = queue.issue(handler_key(&lua));
        assert_eq!(queue.outstanding(), 1);
        drop(ticket);
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn cancelled_generation_is_discarded() {
        let lua = Lua::new();
        let mut queue = QueryQueue::new();

        let ticket = queue.issue(handler_key(&lua));
        queue.cancel_pending();
        ticket.complete(|_| {});

        assert!(queue.drain().is_empty());
        assert_eq!(queue.outstanding(), 0);
    }
}

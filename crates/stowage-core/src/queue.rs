//! Operation queue handing out the single store ticket
//!
//! The queue is a ticket lock: every acquisition draws a serial number and
//! waits until the serving counter reaches it, so at most one [`Ticket`] is
//! outstanding and blocking callers are admitted in arrival order. Blocking
//! acquisition has no timeout; a caller waits for as long as the holders in
//! front of it keep their tickets.
//!
//! Non-blocking requests are handed to a dispatcher thread owned by the
//! queue. It serves them one at a time in submission order, drawing each
//! request's serial when it picks the request up, and runs the callback on
//! that thread with the ticket. A callback must not block on the same queue
//! while it holds the ticket; nested work takes the ticket by reference.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::errors::{ExError, ExErrorKind, Result, StowageError};

struct Gate {
    next_serial: u64,
    now_serving: u64,
}

struct Shared {
    gate: Mutex<Gate>,
    turn: Condvar,
}

impl Shared {
    fn wait_for_turn(self: &Arc<Self>) -> Ticket {
        let mut gate = self.gate.lock();
        let serial = gate.next_serial;
        gate.next_serial += 1;
        while gate.now_serving != serial {
            self.turn.wait(&mut gate);
        }
        drop(gate);
        tracing::trace!(ticket = serial, "ticket acquired");
        Ticket {
            serial,
            shared: Arc::clone(self),
        }
    }

    fn advance(&self) {
        let mut gate = self.gate.lock();
        gate.now_serving += 1;
        drop(gate);
        self.turn.notify_all();
    }
}

/// Exclusive ownership of the store connection
///
/// Nested work borrows the ticket instead of acquiring another one.
/// Dropping a ticket releases it.
pub struct Ticket {
    serial: u64,
    shared: Arc<Shared>,
}

impl Ticket {
    /// Position of this ticket in admission order
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        tracing::trace!(ticket = self.serial, "ticket released");
        self.shared.advance();
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket").field("serial", &self.serial).finish()
    }
}

type Job = Box<dyn FnOnce(Ticket) + Send + 'static>;

/// Serializes every operation against the store
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct OperationQueue {
    shared: Arc<Shared>,
    dispatcher: UnboundedSender<Job>,
}

impl OperationQueue {
    /// Create a queue and start its dispatcher thread
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared {
            gate: Mutex::new(Gate {
                next_serial: 0,
                now_serving: 0,
            }),
            turn: Condvar::new(),
        });
        let (sender, receiver) = unbounded_channel();
        let dispatch_shared = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("stowage-dispatch".to_string())
            .spawn(move || dispatch(dispatch_shared, receiver))
            .map_err(|e| {
                ExError::new(ExErrorKind::Io)
                    .with_op("queue_start")
                    .with_message(e.to_string())
            })?;
        Ok(Self {
            shared,
            dispatcher: sender,
        })
    }

    /// Block the calling thread until the ticket is free
    pub fn acquire_blocking(&self) -> Ticket {
        self.shared.wait_for_turn()
    }

    /// Ask for the ticket without blocking
    ///
    /// `on_ready` runs later on the dispatcher thread. Fails only when the
    /// dispatcher is gone, in which case `on_ready` is dropped unrun.
    pub fn acquire_async<F>(&self, on_ready: F) -> Result<()>
    where
        F: FnOnce(Ticket) + Send + 'static,
    {
        self.dispatcher
            .send(Box::new(on_ready))
            .map_err(|_| StowageError::QueueClosed.into())
    }

    /// Return a ticket, admitting the next waiter
    pub fn release(&self, ticket: Ticket) {
        debug_assert!(
            Arc::ptr_eq(&self.shared, &ticket.shared),
            "ticket released to a queue that did not issue it"
        );
        drop(ticket);
    }

    /// Tickets issued or waiting that have not been released yet
    pub fn pending(&self) -> u64 {
        let gate = self.shared.gate.lock();
        gate.next_serial - gate.now_serving
    }
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

fn dispatch(shared: Arc<Shared>, mut receiver: UnboundedReceiver<Job>) {
    while let Some(job) = receiver.blocking_recv() {
        let ticket = shared.wait_for_turn();
        let serial = ticket.serial();
        // the ticket is dropped during unwinding, so a panicking callback still releases it
        if catch_unwind(AssertUnwindSafe(move || job(ticket))).is_err() {
            tracing::error!(ticket = serial, "asynchronous operation panicked");
        }
    }
    tracing::debug!("operation queue dispatcher stopped");
}

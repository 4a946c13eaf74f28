//! Single-threaded cooperative event loop.
//!
//! Two kinds of work are queued here: message deliveries (owned by each
//! [`MessageChannel`](crate::channel::MessageChannel) and drained one turn at a
//! time through the [`Pump`] trait) and spawned local futures such as record
//! fetches. Everything runs on the thread that drives the loop; a queued item
//! runs to completion before the next one starts.

use futures::future::{poll_fn, LocalBoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};
use std::task::Poll;

/// A queue of deferred deliveries the loop can drain.
pub trait Pump {
    /// Delivers what was queued before this call. Returns the number of
    /// envelopes delivered.
    fn pump(&self) -> usize;

    fn has_pending(&self) -> bool;
}

type LocalTask = LocalBoxFuture<'static, ()>;

#[derive(Default)]
struct LoopInner {
    pumps: RefCell<Vec<Weak<dyn Pump>>>,
    /// Futures spawned while `running` may be borrowed by a poll.
    spawned: RefCell<Vec<LocalTask>>,
    running: RefCell<FuturesUnordered<LocalTask>>,
    in_flight: Cell<usize>,
}

/// Handle to the loop. Clones share the same queues.
#[derive(Clone, Default)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, pump: Weak<dyn Pump>) {
        self.inner.pumps.borrow_mut().push(pump);
    }

    /// Queues a future to be polled by the loop.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let inner = Rc::downgrade(&self.inner);
        self.inner.in_flight.set(self.inner.in_flight.get() + 1);
        self.inner.spawned.borrow_mut().push(
            async move {
                fut.await;
                if let Some(inner) = inner.upgrade() {
                    inner.in_flight.set(inner.in_flight.get().saturating_sub(1));
                }
            }
            .boxed_local(),
        );
    }

    /// Number of spawned futures that have not completed yet.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.get()
    }

    /// One turn over every live channel. Returns the number of deliveries made.
    pub fn turn(&self) -> usize {
        let pumps: Vec<Rc<dyn Pump>> = {
            let mut registered = self.inner.pumps.borrow_mut();
            registered.retain(|p| p.strong_count() > 0);
            registered.iter().filter_map(Weak::upgrade).collect()
        };
        pumps.iter().map(|p| p.pump()).sum()
    }

    fn has_pending_deliveries(&self) -> bool {
        self.inner
            .pumps
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .any(|p| p.has_pending())
    }

    fn admit_spawned(&self) {
        let spawned: Vec<LocalTask> = self.inner.spawned.borrow_mut().drain(..).collect();
        if spawned.is_empty() {
            return;
        }
        let running = self.inner.running.borrow();
        for task in spawned {
            running.push(task);
        }
    }

    /// Drives deliveries and spawned futures until nothing is queued and
    /// nothing is in flight.
    #[tracing::instrument(skip(self))]
    pub async fn run_until_idle(&self) {
        let mut turns = 0usize;
        loop {
            if self.turn() > 0 {
                turns += 1;
                continue;
            }

            self.admit_spawned();
            if self.inner.running.borrow().is_empty() {
                if self.inner.spawned.borrow().is_empty() && !self.has_pending_deliveries() {
                    break;
                }
                continue;
            }

            poll_fn(|cx| {
                self.admit_spawned();
                let polled = self.inner.running.borrow_mut().poll_next_unpin(cx);
                match polled {
                    Poll::Ready(_) => Poll::Ready(()),
                    // a task published or spawned without completing
                    Poll::Pending
                        if self.has_pending_deliveries()
                            || !self.inner.spawned.borrow().is_empty() =>
                    {
                        Poll::Ready(())
                    }
                    Poll::Pending => Poll::Pending,
                }
            })
            .await;
        }
        tracing::trace!(turns, "event loop idle");
    }
}

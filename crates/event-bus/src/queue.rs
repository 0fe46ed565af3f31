//! Deferred dispatch.
//!
//! Calls queued on a context run the next time
//! [`BusContext::execute_queued_events`] is called, typically once per frame
//! or tick by whoever owns the loop.

use alloc::boxed::Box;
use alloc::collections::VecDeque;

use crate::context::BusContext;
use crate::policy::{BusConfig, BusId};

pub(crate) type QueuedCall<B> = Box<dyn FnOnce(&BusContext<B>) + Send>;

impl<B: BusConfig> BusContext<B> {
    fn enqueue(&self, call: QueuedCall<B>) {
        self.queue.lock(|queue| queue.borrow_mut().push_back(call));
    }

    /// Queue a [`broadcast`](Self::broadcast).
    pub fn queue_broadcast(&self, f: impl FnMut(&B::Interface) + Send + 'static) {
        self.enqueue(Box::new(move |context: &BusContext<B>| context.broadcast(f)));
    }

    /// Queue an [`event`](Self::event) to `id`.
    pub fn queue_event(
        &self,
        id: BusId<B>,
        f: impl FnMut(&B::Interface) + Send + 'static,
    ) where
        BusId<B>: Send,
    {
        self.enqueue(Box::new(move |context: &BusContext<B>| context.event(&id, f)));
    }

    /// Queue an arbitrary function to run with the other queued calls.
    pub fn queue_function(&self, f: impl FnOnce() + Send + 'static) {
        self.enqueue(Box::new(move |_: &BusContext<B>| f()));
    }

    /// Run the calls queued before this call, in queue order. Calls queued
    /// while they run are kept for the next execution.
    ///
    /// Returns the number of calls executed.
    pub fn execute_queued_events(&self) -> usize {
        let pending = self
            .queue
            .lock(|queue| core::mem::take(&mut *queue.borrow_mut()));
        let count = pending.len();
        if count > 0 {
            trace!("executing {} queued calls", count);
        }
        for call in pending {
            call(self);
        }
        count
    }

    /// Discard every queued call without running it.
    pub fn clear_queued_events(&self) {
        let dropped: VecDeque<QueuedCall<B>> = self
            .queue
            .lock(|queue| core::mem::take(&mut *queue.borrow_mut()));
        if !dropped.is_empty() {
            debug!("discarded {} queued calls", dropped.len());
        }
    }

    /// Number of calls waiting for [`execute_queued_events`](Self::execute_queued_events).
    pub fn queued_event_count(&self) -> usize {
        self.queue.lock(|queue| queue.borrow().len())
    }
}

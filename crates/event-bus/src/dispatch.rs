//! Broadcast and addressed dispatch.
//!
//! Every dispatch takes a snapshot of the matching handler nodes, then calls
//! the handlers with the connection lock held but the address table not
//! borrowed. A disconnect from another thread therefore waits for the
//! handlers being called, while a handler on the dispatching thread may
//! connect, disconnect or dispatch on the same bus from inside its callback,
//! provided `B::Mutex` is reentrant on that thread:
//!
//! - handlers connected during the dispatch are not called by it;
//! - handlers disconnected during the dispatch are skipped if they have not
//!   been reached yet;
//! - a nested dispatch takes its own snapshot and does not disturb the outer
//!   one.
//!
//! Taking the snapshot also unlinks handlers that were dropped without
//! disconnecting.
//!
//! Panics raised by a handler propagate to the caller and end the dispatch.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::context::BusContext;
use crate::node::Node;
use crate::policy::{BusConfig, BusId};
use crate::table::AddressStorage;

enum Target<'a, B: BusConfig> {
    All,
    Address(&'a BusId<B>),
}

/// Snapshot being iterated by one dispatch call.
///
/// Counts as an in-flight dispatch until dropped, which keeps the context
/// from releasing its address table underneath a running dispatch.
struct DispatchFrame<'a, B: BusConfig> {
    context: &'a BusContext<B>,
    nodes: Vec<Arc<Node<B>>>,
}

impl<'a, B: BusConfig> DispatchFrame<'a, B> {
    fn new(context: &'a BusContext<B>, target: Target<'_, B>, reverse: bool) -> Self {
        let nodes = context.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.in_flight += 1;
            let table = state.table();
            let mut nodes = Vec::new();
            match target {
                Target::All => {
                    for handlers in table.values() {
                        nodes.extend(handlers.nodes().iter().cloned());
                    }
                }
                Target::Address(id) => {
                    if let Some(handlers) = table.get(id) {
                        nodes.extend(handlers.nodes().iter().cloned());
                    }
                }
            }
            context.prune_orphans(&mut state, &mut nodes);
            if reverse {
                nodes.reverse();
            }
            nodes
        });
        trace!("dispatching to {} handlers", nodes.len());
        Self { context, nodes }
    }

    /// Call `f` on every handler still connected when its turn comes.
    fn run(&self, mut f: impl FnMut(&B::Interface)) {
        self.context.state.lock(|_| {
            for node in &self.nodes {
                if let Some(handler) = node.handler() {
                    f(&*handler);
                }
            }
        });
    }
}

impl<B: BusConfig> Drop for DispatchFrame<'_, B> {
    fn drop(&mut self) {
        self.context.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.in_flight -= 1;
            state.release_if_unused();
        });
    }
}

impl<B: BusConfig> BusContext<B> {
    /// Call `f` on every handler at every address.
    ///
    /// Handlers at one address are visited in handler-policy order. Addresses
    /// are visited in key order for
    /// [`ByIdOrdered`](crate::address::ByIdOrdered), in no particular order
    /// for [`ById`](crate::address::ById).
    pub fn broadcast(&self, f: impl FnMut(&B::Interface)) {
        DispatchFrame::new(self, Target::All, false).run(f);
    }

    /// [`broadcast`](Self::broadcast), visiting handlers and addresses back
    /// to front.
    pub fn broadcast_reverse(&self, f: impl FnMut(&B::Interface)) {
        DispatchFrame::new(self, Target::All, true).run(f);
    }

    /// Call `f` on every handler at `id`. Does nothing if `id` has no
    /// handlers.
    pub fn event(&self, id: &BusId<B>, f: impl FnMut(&B::Interface)) {
        DispatchFrame::new(self, Target::Address(id), false).run(f);
    }

    /// [`event`](Self::event), visiting handlers back to front.
    pub fn event_reverse(&self, id: &BusId<B>, f: impl FnMut(&B::Interface)) {
        DispatchFrame::new(self, Target::Address(id), true).run(f);
    }

    /// [`broadcast`](Self::broadcast) returning the result of the last
    /// handler called, or `R::default()` if none was.
    pub fn broadcast_result<R: Default>(
        &self,
        mut f: impl FnMut(&B::Interface) -> R,
    ) -> R {
        let mut result = R::default();
        DispatchFrame::new(self, Target::All, false).run(|h| result = f(h));
        result
    }

    /// [`event`](Self::event) returning the result of the last handler
    /// called, or `R::default()` if none was.
    pub fn event_result<R: Default>(
        &self,
        id: &BusId<B>,
        mut f: impl FnMut(&B::Interface) -> R,
    ) -> R {
        let mut result = R::default();
        DispatchFrame::new(self, Target::Address(id), false)
            .run(|h| result = f(h));
        result
    }

    /// [`broadcast`](Self::broadcast) returning every handler's result in
    /// call order.
    pub fn broadcast_collect<R>(&self, mut f: impl FnMut(&B::Interface) -> R) -> Vec<R> {
        let mut results = Vec::new();
        DispatchFrame::new(self, Target::All, false).run(|h| results.push(f(h)));
        results
    }

    /// [`event`](Self::event) returning every handler's result in call order.
    pub fn event_collect<R>(
        &self,
        id: &BusId<B>,
        mut f: impl FnMut(&B::Interface) -> R,
    ) -> Vec<R> {
        let mut results = Vec::new();
        DispatchFrame::new(self, Target::Address(id), false)
            .run(|h| results.push(f(h)));
        results
    }
}

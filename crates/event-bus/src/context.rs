use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicUsize, Ordering};

use crate::error::BusError;
use crate::handle::ScopedConnection;
use crate::node::{HandlerNode, Node};
use crate::policy::{BusConfig, BusId};
use crate::queue::QueuedCall;
use crate::table::{new_table, AddressStorage, AddressTable, AddressView, Handlers};

/// Phase state machine for the context lifecycle.
pub(crate) enum Phase<B: BusConfig> {
    /// No address table; nothing connected and no dispatch running.
    Idle,
    /// Address table allocated.
    Active(AddressTable<B>),
}

pub(crate) struct State<B: BusConfig> {
    pub(crate) phase: Phase<B>,
    /// Dispatch frames currently alive.
    pub(crate) in_flight: usize,
}

impl<B: BusConfig> State<B> {
    /// The address table, allocating it on first use.
    pub(crate) fn table(&mut self) -> &mut AddressTable<B> {
        if let Phase::Idle = self.phase {
            trace!("bus context activated");
            self.phase = Phase::Active(new_table::<B>());
        }
        match &mut self.phase {
            Phase::Active(table) => table,
            Phase::Idle => unreachable!(),
        }
    }

    pub(crate) fn table_ref(&self) -> Option<&AddressTable<B>> {
        match &self.phase {
            Phase::Active(table) => Some(table),
            Phase::Idle => None,
        }
    }

    fn is_linked(&self, node: &Arc<Node<B>>) -> bool {
        self.table_ref()
            .and_then(|table| table.get(node.id()))
            .is_some_and(|handlers| handlers.contains(node))
    }

    /// Handlers currently linked at `id`.
    fn nodes_at(&self, id: &BusId<B>) -> Vec<Arc<Node<B>>> {
        self.table_ref()
            .and_then(|table| table.get(id))
            .map_or_else(Vec::new, |handlers| handlers.nodes().to_vec())
    }

    pub(crate) fn unlink(&mut self, node: &Arc<Node<B>>) {
        let Phase::Active(table) = &mut self.phase else {
            return;
        };
        let Some(handlers) = table.get_mut(node.id()) else {
            return;
        };
        handlers.remove(node);
        if handlers.is_empty() {
            table.remove(node.id());
        }
    }

    /// Drop the address table once nothing is connected and no dispatch is
    /// iterating a snapshot taken from it.
    pub(crate) fn release_if_unused(&mut self) {
        if self.in_flight > 0 {
            return;
        }
        if let Phase::Active(table) = &self.phase {
            if table.is_empty() {
                trace!("bus context released");
                self.phase = Phase::Idle;
            }
        }
    }
}

/// Shared state of one bus: the address table, the connection lock and the
/// dispatch bookkeeping.
///
/// The address table is allocated on the first connect or dispatch and freed
/// again when the last handler disconnects and no dispatch is running. A
/// context is either owned by the caller and passed around explicitly, or
/// placed in a `static` through [`global_bus!`](crate::global_bus).
pub struct BusContext<B: BusConfig> {
    pub(crate) state: Mutex<B::Mutex, RefCell<State<B>>>,
    pub(crate) queue: Mutex<B::Mutex, RefCell<VecDeque<QueuedCall<B>>>>,
    connections: AtomicUsize,
}

impl<B: BusConfig> BusContext<B> {
    /// Create an idle context.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                phase: Phase::Idle,
                in_flight: 0,
            })),
            queue: Mutex::new(RefCell::new(VecDeque::new())),
            connections: AtomicUsize::new(0),
        }
    }

    /// Connect `handler` at `id`.
    ///
    /// The bus keeps only a weak reference; the caller stays responsible for
    /// keeping the handler alive. Handlers at `id` that were dropped without
    /// disconnecting are unlinked first. [`BusConfig::on_connect`] runs before
    /// the lock is released; if it panics the connection is rolled back.
    ///
    /// # Errors
    ///
    /// [`BusError::AlreadyConnected`] if the bus uses
    /// [`HandlerPolicy::Single`](crate::HandlerPolicy::Single) and `id`
    /// already has a handler. The existing connection is left untouched.
    pub fn connect(
        &self,
        id: BusId<B>,
        handler: Arc<B::Interface>,
    ) -> Result<HandlerNode<B>, BusError> {
        self.state.lock(|state| {
            let mut existing = state.borrow().nodes_at(&id);
            self.prune_orphans(&mut state.borrow_mut(), &mut existing);
            let before = Handlers::insertion_point(&existing, &handler);
            drop(existing);

            let node = Arc::new(Node::new(id.clone(), Arc::downgrade(&handler)));
            let result = state
                .borrow_mut()
                .table()
                .get_or_insert_default(id)
                .insert(node.clone(), before.as_ref());
            if let Err(e) = result {
                warn!("connect rejected: address already has a handler");
                return Err(e);
            }
            let count = self.connections.fetch_add(1, Ordering::AcqRel) + 1;
            debug!("handler connected ({} total)", count);

            // Borrow released so the hook may reenter this bus.
            let guard = ConnectGuard { context: self, state, node: Some(node.clone()) };
            B::on_connect(&handler, node.id());
            guard.disarm();
            Ok(HandlerNode::new(node))
        })
    }

    /// Connect `handler` at `id` and wrap the node in a guard that
    /// disconnects it when dropped.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub fn connect_scoped(
        &self,
        id: BusId<B>,
        handler: Arc<B::Interface>,
    ) -> Result<ScopedConnection<'_, B>, BusError> {
        self.connect(id, handler)
            .map(|node| ScopedConnection::new(self, node))
    }

    /// Disconnect `node`.
    ///
    /// Disconnecting a node that is no longer connected, or that belongs to
    /// another context, does nothing. Dispatches hold the connection lock
    /// while calling handlers, so a call running on another thread finishes
    /// before this returns. Afterwards no dispatch reaches the handler;
    /// dispatches already running on this thread skip it.
    pub fn disconnect(&self, node: &HandlerNode<B>) {
        let node = &node.node;
        self.state.lock(|state| {
            if !state.borrow().is_linked(node) || !node.tombstone() {
                return;
            }
            let count = self.connections.fetch_sub(1, Ordering::AcqRel) - 1;

            if let Some(handler) = node.handler_unchecked() {
                B::on_disconnect(&handler, node.id());
            }

            let mut state = state.borrow_mut();
            state.unlink(node);
            state.release_if_unused();
            debug!("handler disconnected ({} remaining)", count);
        })
    }

    /// Unlink the nodes in `nodes` whose handler was dropped without
    /// disconnecting, and keep only the others.
    pub(crate) fn prune_orphans(
        &self,
        state: &mut State<B>,
        nodes: &mut Vec<Arc<Node<B>>>,
    ) {
        let mut pruned = 0usize;
        nodes.retain(|node| {
            if !node.is_orphaned() {
                return true;
            }
            if node.tombstone() {
                state.unlink(node);
                pruned += 1;
            }
            false
        });
        if pruned > 0 {
            self.connections.fetch_sub(pruned, Ordering::AcqRel);
            debug!("pruned {} dropped handlers", pruned);
        }
    }

    /// Snapshot of the handlers connected at `id`; empty if the address is
    /// unknown.
    pub fn find_address(&self, id: &BusId<B>) -> AddressView<B> {
        self.state.lock(|state| {
            let state = state.borrow();
            match state.table_ref().and_then(|table| table.get(id)) {
                Some(handlers) => AddressView { nodes: handlers.nodes().to_vec() },
                None => AddressView::empty(),
            }
        })
    }

    /// First live handler connected at `id`.
    pub fn find_first_handler(&self, id: &BusId<B>) -> Option<Arc<B::Interface>> {
        self.find_address(id).handlers().next()
    }

    /// Whether `handler` is connected at `id`.
    pub fn is_connected_at<H: ?Sized>(&self, id: &BusId<B>, handler: &Arc<H>) -> bool {
        self.find_address(id)
            .nodes
            .iter()
            .any(|node| node.is_connected() && node.refers_to(handler))
    }

    /// Number of connected handlers across all addresses.
    pub fn handler_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    pub fn has_handlers(&self) -> bool {
        self.handler_count() > 0
    }

    /// Number of handlers connected at `id`.
    pub fn handler_count_at(&self, id: &BusId<B>) -> usize {
        self.state.lock(|state| {
            state
                .borrow()
                .table_ref()
                .and_then(|table| table.get(id))
                .map_or(0, |handlers| handlers.len())
        })
    }

    /// Number of addresses with at least one handler.
    pub fn address_count(&self) -> usize {
        self.state.lock(|state| {
            state.borrow().table_ref().map_or(0, |table| table.len())
        })
    }

    /// Whether the address table is currently allocated.
    pub fn is_active(&self) -> bool {
        self.state
            .lock(|state| matches!(state.borrow().phase, Phase::Active(_)))
    }

    /// Disconnect every handler, discard queued calls and release the
    /// address table.
    ///
    /// [`BusConfig::on_disconnect`] runs for every handler still alive.
    pub fn shutdown(&self) {
        self.clear_queued_events();
        self.state.lock(|state| {
            let nodes: Vec<Arc<Node<B>>> = {
                let mut state = state.borrow_mut();
                let mut nodes = Vec::new();
                if let Phase::Active(table) = &mut state.phase {
                    let old = core::mem::replace(table, new_table::<B>());
                    for handlers in old.values() {
                        nodes.extend(handlers.nodes().iter().cloned());
                    }
                }
                state.release_if_unused();
                nodes
            };

            let mut disconnected = 0usize;
            for node in nodes {
                if !node.tombstone() {
                    continue;
                }
                disconnected += 1;
                if let Some(handler) = node.handler_unchecked() {
                    B::on_disconnect(&handler, node.id());
                }
            }
            self.connections.fetch_sub(disconnected, Ordering::AcqRel);
            debug!("bus shut down, {} handlers disconnected", disconnected);
        })
    }
}

/// Unlinks a freshly connected node if `on_connect` unwinds.
struct ConnectGuard<'a, B: BusConfig> {
    context: &'a BusContext<B>,
    state: &'a RefCell<State<B>>,
    node: Option<Arc<Node<B>>>,
}

impl<B: BusConfig> ConnectGuard<'_, B> {
    fn disarm(mut self) {
        self.node = None;
    }
}

impl<B: BusConfig> Drop for ConnectGuard<'_, B> {
    fn drop(&mut self) {
        let Some(node) = self.node.take() else {
            return;
        };
        if !node.tombstone() {
            return;
        }
        self.context.connections.fetch_sub(1, Ordering::AcqRel);
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.unlink(&node);
            state.release_if_unused();
        }
        warn!("on_connect hook panicked, connection rolled back");
    }
}

impl<B: BusConfig> Default for BusContext<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BusConfig> Drop for BusContext<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

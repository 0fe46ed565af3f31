use alloc::sync::{Arc, Weak};
use core::fmt;

use portable_atomic::{AtomicBool, Ordering};

use crate::policy::{BusConfig, BusId};

/// Connection record shared by the address table, dispatch snapshots and the
/// caller's [`HandlerNode`].
pub(crate) struct Node<B: BusConfig> {
    id: BusId<B>,
    handler: Weak<B::Interface>,
    connected: AtomicBool,
}

impl<B: BusConfig> Node<B> {
    pub(crate) fn new(id: BusId<B>, handler: Weak<B::Interface>) -> Self {
        Self { id, handler, connected: AtomicBool::new(true) }
    }

    pub(crate) fn id(&self) -> &BusId<B> {
        &self.id
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Mark the node disconnected. Returns `true` for the caller that flipped
    /// the flag.
    pub(crate) fn tombstone(&self) -> bool {
        self.connected.swap(false, Ordering::AcqRel)
    }

    /// The handler, unless the node is disconnected or the handler dropped.
    pub(crate) fn handler(&self) -> Option<Arc<B::Interface>> {
        if self.is_connected() {
            self.handler.upgrade()
        } else {
            None
        }
    }

    /// Still linked although its handler was dropped without disconnecting.
    pub(crate) fn is_orphaned(&self) -> bool {
        self.is_connected() && self.handler.strong_count() == 0
    }

    /// The handler regardless of the tombstone, for the disconnect hook.
    pub(crate) fn handler_unchecked(&self) -> Option<Arc<B::Interface>> {
        self.handler.upgrade()
    }

    pub(crate) fn refers_to<H: ?Sized>(&self, handler: &Arc<H>) -> bool {
        core::ptr::addr_eq(self.handler.as_ptr(), Arc::as_ptr(handler))
    }
}

/// Handle to one connection, returned by
/// [`BusContext::connect`](crate::BusContext::connect).
///
/// Cloning the handle does not duplicate the connection: every clone refers to
/// the same record, and disconnecting through any of them disconnects it.
/// The handle does not keep the handler alive.
pub struct HandlerNode<B: BusConfig> {
    pub(crate) node: Arc<Node<B>>,
}

impl<B: BusConfig> HandlerNode<B> {
    pub(crate) fn new(node: Arc<Node<B>>) -> Self {
        Self { node }
    }

    /// Address the handler was connected to.
    pub fn id(&self) -> &BusId<B> {
        self.node.id()
    }

    pub fn is_connected(&self) -> bool {
        self.node.is_connected()
    }

    /// The connected handler, or `None` once disconnected or dropped.
    pub fn handler(&self) -> Option<Arc<B::Interface>> {
        self.node.handler()
    }

    /// Whether both handles refer to the same connection.
    pub fn same_connection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl<B: BusConfig> Clone for HandlerNode<B> {
    fn clone(&self) -> Self {
        Self { node: self.node.clone() }
    }
}

impl<B: BusConfig> fmt::Debug for HandlerNode<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerNode")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

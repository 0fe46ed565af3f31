use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::context::BusContext;
use crate::error::BusError;
use crate::node::HandlerNode;
use crate::policy::{BusConfig, BusId};

/// RAII guard owning one connection.
///
/// Dropping the guard disconnects the handler. [`release`](Self::release)
/// gives the node back without disconnecting, after which dropping the guard
/// does nothing. Moving the guard moves the connection; it cannot be cloned.
pub struct ScopedConnection<'a, B: BusConfig> {
    context: &'a BusContext<B>,
    node: Option<HandlerNode<B>>,
}

impl<'a, B: BusConfig> ScopedConnection<'a, B> {
    /// Take ownership of `node`, which must have been connected on `context`.
    pub fn new(context: &'a BusContext<B>, node: HandlerNode<B>) -> Self {
        Self { context, node: Some(node) }
    }

    /// The owned node, or `None` after [`release`](Self::release).
    #[inline]
    pub fn node(&self) -> Option<&HandlerNode<B>> {
        self.node.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.node.as_ref().is_some_and(HandlerNode::is_connected)
    }

    /// Give up ownership of the node without disconnecting it.
    pub fn release(mut self) -> Option<HandlerNode<B>> {
        self.node.take()
    }

    /// Disconnect now instead of on drop.
    pub fn disconnect(mut self) {
        if let Some(node) = self.node.take() {
            self.context.disconnect(&node);
        }
    }
}

impl<B: BusConfig> Drop for ScopedConnection<'_, B> {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            self.context.disconnect(&node);
        }
    }
}

impl<B: BusConfig> fmt::Debug for ScopedConnection<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedConnection").field("node", &self.node).finish()
    }
}

/// One handler connected to any number of addresses.
///
/// Every connection made through the guard is disconnected when it drops.
pub struct MultiConnection<'a, B: BusConfig> {
    context: &'a BusContext<B>,
    nodes: Vec<HandlerNode<B>>,
}

impl<'a, B: BusConfig> MultiConnection<'a, B> {
    pub fn new(context: &'a BusContext<B>) -> Self {
        Self { context, nodes: Vec::new() }
    }

    /// Connect `handler` at `id`. Does nothing if this guard is already
    /// connected there.
    ///
    /// # Errors
    ///
    /// Same as [`BusContext::connect`].
    pub fn connect(
        &mut self,
        id: BusId<B>,
        handler: Arc<B::Interface>,
    ) -> Result<(), BusError> {
        self.prune();
        if self.is_connected_id(&id) {
            return Ok(());
        }
        let node = self.context.connect(id, handler)?;
        self.nodes.push(node);
        Ok(())
    }

    /// Disconnect from `id`, if connected there.
    pub fn disconnect_id(&mut self, id: &BusId<B>) {
        if let Some(pos) = self.nodes.iter().position(|node| node.id() == id) {
            let node = self.nodes.remove(pos);
            self.context.disconnect(&node);
        }
    }

    /// Disconnect from every address.
    pub fn disconnect_all(&mut self) {
        for node in self.nodes.drain(..) {
            self.context.disconnect(&node);
        }
    }

    pub fn is_connected_id(&self, id: &BusId<B>) -> bool {
        self.nodes
            .iter()
            .any(|node| node.id() == id && node.is_connected())
    }

    pub fn is_connected(&self) -> bool {
        self.nodes.iter().any(HandlerNode::is_connected)
    }

    /// Addresses this guard is connected to, in connection order.
    pub fn ids(&self) -> impl Iterator<Item = &BusId<B>> + '_ {
        self.nodes
            .iter()
            .filter(|node| node.is_connected())
            .map(HandlerNode::id)
    }

    // Nodes disconnected behind the guard's back, e.g. by `shutdown`.
    fn prune(&mut self) {
        self.nodes.retain(HandlerNode::is_connected);
    }
}

impl<B: BusConfig> Drop for MultiConnection<'_, B> {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

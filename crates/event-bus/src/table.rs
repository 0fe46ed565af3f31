//! Address table storage and the per-address handler sequence.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::hash::Hash;

use hashbrown::HashMap;

use crate::error::BusError;
use crate::node::Node;
use crate::policy::{AddressPolicy, BusConfig, BusId, HandlerPolicy};

/// Map from address to value used by an [`AddressPolicy`].
pub trait AddressStorage<K, V> {
    fn new() -> Self;

    fn get(&self, id: &K) -> Option<&V>;

    fn get_mut(&mut self, id: &K) -> Option<&mut V>;

    fn get_or_insert_default(&mut self, id: K) -> &mut V
    where
        V: Default;

    fn remove(&mut self, id: &K) -> Option<V>;

    /// Number of addresses present.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values in broadcast order.
    fn values<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a V>
    where
        V: 'a;
}

/// Storage for [`address::Single`](crate::address::Single).
pub struct SingleAddress<V>(Option<V>);

impl<V> AddressStorage<(), V> for SingleAddress<V> {
    fn new() -> Self {
        Self(None)
    }

    fn get(&self, _id: &()) -> Option<&V> {
        self.0.as_ref()
    }

    fn get_mut(&mut self, _id: &()) -> Option<&mut V> {
        self.0.as_mut()
    }

    fn get_or_insert_default(&mut self, _id: ()) -> &mut V
    where
        V: Default,
    {
        self.0.get_or_insert_with(V::default)
    }

    fn remove(&mut self, _id: &()) -> Option<V> {
        self.0.take()
    }

    fn len(&self) -> usize {
        usize::from(self.0.is_some())
    }

    fn values<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a V>
    where
        V: 'a,
    {
        self.0.iter()
    }
}

/// Storage for [`address::ById`](crate::address::ById).
pub struct UnorderedAddresses<K, V>(HashMap<K, V>);

impl<K: Eq + Hash, V> AddressStorage<K, V> for UnorderedAddresses<K, V> {
    fn new() -> Self {
        Self(HashMap::new())
    }

    fn get(&self, id: &K) -> Option<&V> {
        self.0.get(id)
    }

    fn get_mut(&mut self, id: &K) -> Option<&mut V> {
        self.0.get_mut(id)
    }

    fn get_or_insert_default(&mut self, id: K) -> &mut V
    where
        V: Default,
    {
        self.0.entry(id).or_default()
    }

    fn remove(&mut self, id: &K) -> Option<V> {
        self.0.remove(id)
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    // hashbrown iterators are not double-ended; the order is arbitrary anyway,
    // so collect the references to give reverse dispatch something to walk.
    fn values<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a V>
    where
        V: 'a,
    {
        self.0.values().collect::<Vec<_>>().into_iter()
    }
}

/// Storage for [`address::ByIdOrdered`](crate::address::ByIdOrdered).
pub struct OrderedAddresses<K, V>(BTreeMap<K, V>);

impl<K: Ord, V> AddressStorage<K, V> for OrderedAddresses<K, V> {
    fn new() -> Self {
        Self(BTreeMap::new())
    }

    fn get(&self, id: &K) -> Option<&V> {
        self.0.get(id)
    }

    fn get_mut(&mut self, id: &K) -> Option<&mut V> {
        self.0.get_mut(id)
    }

    fn get_or_insert_default(&mut self, id: K) -> &mut V
    where
        V: Default,
    {
        self.0.entry(id).or_default()
    }

    fn remove(&mut self, id: &K) -> Option<V> {
        self.0.remove(id)
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn values<'a>(&'a self) -> impl DoubleEndedIterator<Item = &'a V>
    where
        V: 'a,
    {
        self.0.values()
    }
}

/// Address table of the bus `B`.
pub(crate) type AddressTable<B> =
    <<B as BusConfig>::Address as AddressPolicy>::Storage<Handlers<B>>;

pub(crate) fn new_table<B: BusConfig>() -> AddressTable<B> {
    <AddressTable<B> as AddressStorage<BusId<B>, Handlers<B>>>::new()
}

/// Handlers connected at one address, in invocation order.
pub(crate) struct Handlers<B: BusConfig> {
    nodes: Vec<Arc<Node<B>>>,
}

impl<B: BusConfig> Default for Handlers<B> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<B: BusConfig> Handlers<B> {
    /// Node a new handler must be linked in front of, for
    /// [`HandlerPolicy::MultipleOrdered`]. `None` appends.
    ///
    /// Runs the user comparator, so callers must not hold the table borrowed.
    pub(crate) fn insertion_point(
        existing: &[Arc<Node<B>>],
        handler: &B::Interface,
    ) -> Option<Arc<Node<B>>> {
        if B::HANDLER_POLICY != HandlerPolicy::MultipleOrdered {
            return None;
        }
        // First handler that sorts strictly after the new one. Dropped
        // handlers never compare, so they never reorder live ones.
        existing
            .iter()
            .find(|node| {
                node.handler().is_some_and(|existing| {
                    B::compare(handler, &existing) == Ordering::Less
                })
            })
            .cloned()
    }

    /// Link `node` at the position required by the handler policy, in front
    /// of `before` when it is still linked here.
    pub(crate) fn insert(
        &mut self,
        node: Arc<Node<B>>,
        before: Option<&Arc<Node<B>>>,
    ) -> Result<(), BusError> {
        match B::HANDLER_POLICY {
            HandlerPolicy::Single => {
                if !self.nodes.is_empty() {
                    return Err(BusError::AlreadyConnected);
                }
                self.nodes.push(node);
            }
            HandlerPolicy::Multiple => self.nodes.push(node),
            HandlerPolicy::MultipleOrdered => {
                let pos = before
                    .and_then(|before| {
                        self.nodes.iter().position(|n| Arc::ptr_eq(n, before))
                    })
                    .unwrap_or(self.nodes.len());
                self.nodes.insert(pos, node);
            }
        }
        Ok(())
    }

    /// Unlink `node`. Returns `false` if it was not linked here.
    pub(crate) fn remove(&mut self, node: &Arc<Node<B>>) -> bool {
        match self.nodes.iter().position(|n| Arc::ptr_eq(n, node)) {
            Some(pos) => {
                self.nodes.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, node: &Arc<Node<B>>) -> bool {
        self.nodes.iter().any(|n| Arc::ptr_eq(n, node))
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn nodes(&self) -> &[Arc<Node<B>>] {
        &self.nodes
    }
}

/// Snapshot of the handlers connected at one or more addresses.
///
/// Taken under the connection lock, read without it. Handlers disconnected
/// after the snapshot was taken are skipped.
pub struct AddressView<B: BusConfig> {
    pub(crate) nodes: Vec<Arc<Node<B>>>,
}

impl<B: BusConfig> AddressView<B> {
    pub(crate) fn empty() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Number of handlers captured by the snapshot.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Handlers that are still connected and alive, in invocation order.
    pub fn handlers(&self) -> impl Iterator<Item = Arc<B::Interface>> + '_ {
        self.nodes.iter().filter_map(|node| node.handler())
    }
}

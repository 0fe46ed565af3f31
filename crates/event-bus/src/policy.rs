use core::cmp::Ordering;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::table::AddressStorage;

/// How many handlers an address accepts and in which order they are called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandlerPolicy {
    /// At most one handler per address.
    Single,
    /// Any number of handlers, called in connection order.
    Multiple,
    /// Any number of handlers, called in [`BusConfig::compare`] order.
    /// Handlers that compare equal keep their connection order.
    MultipleOrdered,
}

/// Selects the address key of a bus and the table that stores it.
///
/// Implemented by the markers in [`address`]. The policy only exists at
/// compile time.
pub trait AddressPolicy: 'static {
    /// Address key.
    type Id: Clone + Eq + 'static;
    /// Table mapping each address to its value.
    type Storage<V>: AddressStorage<Self::Id, V>;
}

/// Address policy markers.
pub mod address {
    use core::hash::Hash;
    use core::marker::PhantomData;

    use super::AddressPolicy;
    use crate::table::{OrderedAddresses, SingleAddress, UnorderedAddresses};

    /// One implicit address, keyed by `()`.
    pub struct Single;

    /// Arbitrary addresses; broadcasts visit them in no particular order.
    pub struct ById<K>(PhantomData<fn() -> K>);

    /// Arbitrary addresses; broadcasts visit them in ascending key order.
    pub struct ByIdOrdered<K>(PhantomData<fn() -> K>);

    impl AddressPolicy for Single {
        type Id = ();
        type Storage<V> = SingleAddress<V>;
    }

    impl<K: Clone + Eq + Hash + 'static> AddressPolicy for ById<K> {
        type Id = K;
        type Storage<V> = UnorderedAddresses<K, V>;
    }

    impl<K: Clone + Ord + 'static> AddressPolicy for ByIdOrdered<K> {
        type Id = K;
        type Storage<V> = OrderedAddresses<K, V>;
    }
}

/// Compile-time description of one bus.
///
/// A bus is identified by the type implementing this trait. The implementor
/// picks the message interface (usually `dyn SomeTrait`, plus `Send + Sync`
/// when the bus is shared between threads), the address policy, the handler
/// policy and the lock used to guard the shared context.
///
/// ```ignore
/// trait TickEvents {
///     fn on_tick(&self, dt: f32);
/// }
///
/// struct TickBus;
///
/// impl BusConfig for TickBus {
///     type Interface = dyn TickEvents + Send + Sync;
///     type Address = address::Single;
///     type Mutex = CriticalSectionRawMutex;
/// }
/// ```
pub trait BusConfig: Sized + 'static {
    /// The message interface handlers implement.
    type Interface: ?Sized + 'static;
    /// Address policy, one of the [`address`] markers.
    type Address: AddressPolicy;
    /// Lock discipline of the shared context.
    ///
    /// The lock is held while handlers run, so handlers that reenter the bus
    /// need a mutex that is reentrant on the calling thread
    /// (`NoopRawMutex`, `CriticalSectionRawMutex`, `ThreadModeRawMutex`).
    /// `NoopRawMutex` gives a single-threaded bus; such a context cannot be
    /// placed in a `static` and must be owned by the caller.
    type Mutex: RawMutex;

    const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::Multiple;

    /// Ordering of handlers under [`HandlerPolicy::MultipleOrdered`].
    ///
    /// Evaluated once, when a handler connects.
    fn compare(_a: &Self::Interface, _b: &Self::Interface) -> Ordering {
        Ordering::Equal
    }

    /// Runs right after `handler` is linked at `id`, with the connection lock
    /// held.
    ///
    /// The hook may connect or dispatch on other buses. Reentering this bus
    /// is only sound when `Mutex` is reentrant on the calling thread
    /// (`NoopRawMutex`, `CriticalSectionRawMutex`). A panicking hook rolls
    /// the connection back.
    fn on_connect(_handler: &Self::Interface, _id: &BusId<Self>) {}

    /// Runs while `handler` is being disconnected from `id`, with the
    /// connection lock held. The node is already marked disconnected, so no
    /// new dispatch reaches the handler. Skipped when the handler was dropped
    /// before disconnecting.
    fn on_disconnect(_handler: &Self::Interface, _id: &BusId<Self>) {}
}

/// Address key of the bus `B`.
pub type BusId<B> = <<B as BusConfig>::Address as AddressPolicy>::Id;

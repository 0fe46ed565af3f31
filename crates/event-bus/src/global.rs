use alloc::sync::Arc;
use alloc::vec::Vec;
use core::marker::PhantomData;

use crate::context::BusContext;
use crate::error::BusError;
use crate::handle::ScopedConnection;
use crate::node::HandlerNode;
use crate::policy::{BusConfig, BusId};

/// A bus with one process-wide context.
///
/// Implement through [`global_bus!`](crate::global_bus), which places the
/// context in a `static`. The context starts idle, allocates its address
/// table on first use and releases it when the last handler disconnects;
/// [`Bus::shutdown`] forces it back to idle. The `static` requires
/// `B::Mutex` to be `Sync` and the interface to be `Send + Sync`.
pub trait GlobalBus: BusConfig {
    fn context() -> &'static BusContext<Self>;
}

/// Give `$bus` a process-wide context.
///
/// ```ignore
/// global_bus!(TickBus);
///
/// Bus::<TickBus>::broadcast(|h| h.on_tick(0.016));
/// ```
#[macro_export]
macro_rules! global_bus {
    ($bus:ty) => {
        impl $crate::GlobalBus for $bus {
            fn context() -> &'static $crate::BusContext<$bus> {
                static CONTEXT: $crate::BusContext<$bus> = $crate::BusContext::new();
                &CONTEXT
            }
        }
    };
}

/// Operations on the context of a [`GlobalBus`].
pub struct Bus<B>(PhantomData<B>);

impl<B: GlobalBus> Bus<B> {
    pub fn connect(
        id: BusId<B>,
        handler: Arc<B::Interface>,
    ) -> Result<HandlerNode<B>, BusError> {
        B::context().connect(id, handler)
    }

    pub fn connect_scoped(
        id: BusId<B>,
        handler: Arc<B::Interface>,
    ) -> Result<ScopedConnection<'static, B>, BusError> {
        B::context().connect_scoped(id, handler)
    }

    pub fn disconnect(node: &HandlerNode<B>) {
        B::context().disconnect(node)
    }

    pub fn broadcast(f: impl FnMut(&B::Interface)) {
        B::context().broadcast(f)
    }

    pub fn broadcast_reverse(f: impl FnMut(&B::Interface)) {
        B::context().broadcast_reverse(f)
    }

    pub fn event(id: &BusId<B>, f: impl FnMut(&B::Interface)) {
        B::context().event(id, f)
    }

    pub fn event_reverse(id: &BusId<B>, f: impl FnMut(&B::Interface)) {
        B::context().event_reverse(id, f)
    }

    pub fn broadcast_result<R: Default>(f: impl FnMut(&B::Interface) -> R) -> R {
        B::context().broadcast_result(f)
    }

    pub fn event_result<R: Default>(
        id: &BusId<B>,
        f: impl FnMut(&B::Interface) -> R,
    ) -> R {
        B::context().event_result(id, f)
    }

    pub fn broadcast_collect<R>(f: impl FnMut(&B::Interface) -> R) -> Vec<R> {
        B::context().broadcast_collect(f)
    }

    pub fn event_collect<R>(id: &BusId<B>, f: impl FnMut(&B::Interface) -> R) -> Vec<R> {
        B::context().event_collect(id, f)
    }

    pub fn find_first_handler(id: &BusId<B>) -> Option<Arc<B::Interface>> {
        B::context().find_first_handler(id)
    }

    pub fn queue_broadcast(f: impl FnMut(&B::Interface) + Send + 'static) {
        B::context().queue_broadcast(f)
    }

    pub fn queue_event(id: BusId<B>, f: impl FnMut(&B::Interface) + Send + 'static)
    where
        BusId<B>: Send,
    {
        B::context().queue_event(id, f)
    }

    pub fn queue_function(f: impl FnOnce() + Send + 'static) {
        B::context().queue_function(f)
    }

    pub fn execute_queued_events() -> usize {
        B::context().execute_queued_events()
    }

    pub fn has_handlers() -> bool {
        B::context().has_handlers()
    }

    pub fn handler_count() -> usize {
        B::context().handler_count()
    }

    pub fn shutdown() {
        B::context().shutdown()
    }
}

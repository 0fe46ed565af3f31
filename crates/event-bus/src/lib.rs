#![no_std]
//! Address-routed, in-process event and request bus.
//!
//! A bus is a type implementing [`BusConfig`]. It names the message interface
//! handlers implement (a trait object), how handlers are addressed, how many
//! handlers an address takes and in which order they run, and the
//! [`RawMutex`](embassy_sync::blocking_mutex::raw::RawMutex) guarding the
//! shared [`BusContext`].
//!
//! Handlers connect to an address and receive calls dispatched either to that
//! address ([`BusContext::event`]) or to every address
//! ([`BusContext::broadcast`]). Dispatch is synchronous and runs on the
//! calling thread; handlers may connect, disconnect and dispatch again from
//! inside a call.

extern crate alloc;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod context;
mod dispatch;
mod error;
mod global;
mod handle;
mod node;
mod policy;
mod queue;
mod table;

pub use context::BusContext;
pub use error::BusError;
pub use global::{Bus, GlobalBus};
pub use handle::{MultiConnection, ScopedConnection};
pub use node::HandlerNode;
pub use policy::{address, AddressPolicy, BusConfig, BusId, HandlerPolicy};
pub use table::{
    AddressStorage, AddressView, OrderedAddresses, SingleAddress, UnorderedAddresses,
};

#![allow(dead_code)]

use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use event_bus::{address, BusConfig, HandlerPolicy};

// ---------------------------------------------------------------------------
// Message interface
// ---------------------------------------------------------------------------

pub trait Ping {
    fn ping(&self) -> i32;

    fn priority(&self) -> i32 {
        0
    }
}

/// Shared call log, in call order.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, name: &'static str) {
        self.0.lock().unwrap().push(name);
    }

    pub fn take(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Records its name and answers with a fixed value.
pub struct Pinger {
    pub name: &'static str,
    pub value: i32,
    pub priority: i32,
    pub log: CallLog,
}

impl Pinger {
    pub fn new(name: &'static str, value: i32, log: &CallLog) -> Arc<Self> {
        Self::with_priority(name, value, 0, log)
    }

    pub fn with_priority(
        name: &'static str,
        value: i32,
        priority: i32,
        log: &CallLog,
    ) -> Arc<Self> {
        Arc::new(Self { name, value, priority, log: log.clone() })
    }
}

impl Ping for Pinger {
    fn ping(&self) -> i32 {
        self.log.push(self.name);
        self.value
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

// ---------------------------------------------------------------------------
// Buses
// ---------------------------------------------------------------------------

/// One implicit address, any number of handlers.
pub struct PingBus;

impl BusConfig for PingBus {
    type Interface = dyn Ping;
    type Address = address::Single;
    type Mutex = NoopRawMutex;
}

/// String addresses, one handler each.
pub struct ExclusivePingBus;

impl BusConfig for ExclusivePingBus {
    type Interface = dyn Ping;
    type Address = address::ById<&'static str>;
    type Mutex = NoopRawMutex;

    const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::Single;
}

/// Numeric addresses, unordered.
pub struct IdPingBus;

impl BusConfig for IdPingBus {
    type Interface = dyn Ping;
    type Address = address::ById<u32>;
    type Mutex = NoopRawMutex;
}

/// Numeric addresses, broadcast in key order.
pub struct OrderedPingBus;

impl BusConfig for OrderedPingBus {
    type Interface = dyn Ping;
    type Address = address::ByIdOrdered<u32>;
    type Mutex = NoopRawMutex;
}

/// One implicit address, handlers sorted by ascending priority.
pub struct PriorityPingBus;

impl BusConfig for PriorityPingBus {
    type Interface = dyn Ping;
    type Address = address::Single;
    type Mutex = NoopRawMutex;

    const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::MultipleOrdered;

    fn compare(a: &Self::Interface, b: &Self::Interface) -> Ordering {
        a.priority().cmp(&b.priority())
    }
}

/// A context that outlives every handler, for handlers that call back into
/// the bus.
pub fn leak_context<B: BusConfig>() -> &'static event_bus::BusContext<B> {
    Box::leak(Box::new(event_bus::BusContext::new()))
}

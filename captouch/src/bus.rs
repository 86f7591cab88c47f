//! Delivery of touch events to the rest of the application.
//!
//! Sensors only need somewhere to [`raise`](EventSink::raise) an event. Two
//! destinations are provided: a callback table ([`EventBus`], or
//! [`SharedEventBus`] when handlers are registered from several contexts) and
//! `embassy_sync` pub/sub publishers carrying `(SensorId, TouchEvent)`.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::pubsub::{ImmediatePublisher, Publisher};
use heapless::Vec;

use crate::error::BusError;
use crate::{SensorId, TouchEvent};

/// Callback run when a subscribed event is raised
pub type Handler = fn();

pub trait EventSink {
    fn raise(&mut self, id: SensorId, event: TouchEvent);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn raise(&mut self, id: SensorId, event: TouchEvent) {
        (**self).raise(id, event)
    }
}

/// Adapts any closure into an [`EventSink`]
pub struct FnSink<F>(pub F);

impl<F: FnMut(SensorId, TouchEvent)> FnSink<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F: FnMut(SensorId, TouchEvent)> EventSink for FnSink<F> {
    fn raise(&mut self, id: SensorId, event: TouchEvent) {
        (self.0)(id, event)
    }
}

#[derive(Clone, Copy)]
struct Subscription {
    id: SensorId,
    event: TouchEvent,
    handler: Handler,
}

/// Fixed-capacity table of event handlers
pub struct EventBus<const N: usize> {
    subscriptions: Vec<Subscription, N>,
}

impl<const N: usize> EventBus<N> {
    pub const fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Register `handler` for `event` from sensor `id`
    ///
    /// Any number of handlers may share an event; they run in registration
    /// order.
    pub fn subscribe(
        &mut self,
        id: SensorId,
        event: TouchEvent,
        handler: Handler,
    ) -> Result<(), BusError> {
        self.subscriptions
            .push(Subscription { id, event, handler })
            .map_err(|_| BusError::Full { capacity: N })
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    fn matching(&self, id: SensorId, event: TouchEvent) -> impl Iterator<Item = Handler> + '_ {
        self.subscriptions
            .iter()
            .filter(move |s| s.id == id && s.event == event)
            .map(|s| s.handler)
    }
}

impl<const N: usize> Default for EventBus<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventSink for EventBus<N> {
    fn raise(&mut self, id: SensorId, event: TouchEvent) {
        for handler in self.matching(id, event) {
            handler();
        }
    }
}

/// [`EventBus`] behind a blocking mutex, so it can live in a `static` and take
/// registrations from any task while a poller raises events.
pub struct SharedEventBus<M: RawMutex, const N: usize> {
    inner: Mutex<M, RefCell<EventBus<N>>>,
}

impl<M: RawMutex, const N: usize> SharedEventBus<M, N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(EventBus::new())),
        }
    }

    pub fn subscribe(
        &self,
        id: SensorId,
        event: TouchEvent,
        handler: Handler,
    ) -> Result<(), BusError> {
        self.inner.lock(|bus| bus.borrow_mut().subscribe(id, event, handler))
    }

    pub fn len(&self) -> usize {
        self.inner.lock(|bus| bus.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sink handle for a poller
    pub fn sink(&self) -> SharedSink<'_, M, N> {
        SharedSink(self)
    }

    /// Run every handler subscribed to `event` from `id`
    ///
    /// Handlers are copied out first and run with the lock released, so a
    /// handler may subscribe further handlers.
    pub fn raise(&self, id: SensorId, event: TouchEvent) {
        let handlers: Vec<Handler, N> = self
            .inner
            .lock(|bus| bus.borrow().matching(id, event).collect());
        for handler in handlers {
            handler();
        }
    }
}

impl<M: RawMutex, const N: usize> Default for SharedEventBus<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SharedSink<'a, M: RawMutex, const N: usize>(&'a SharedEventBus<M, N>);

impl<M: RawMutex, const N: usize> EventSink for SharedSink<'_, M, N> {
    fn raise(&mut self, id: SensorId, event: TouchEvent) {
        self.0.raise(id, event)
    }
}

impl<M: RawMutex, const CAP: usize, const SUBS: usize, const PUBS: usize> EventSink
    for Publisher<'_, M, (SensorId, TouchEvent), CAP, SUBS, PUBS>
{
    fn raise(&mut self, id: SensorId, event: TouchEvent) {
        self.publish_immediate((id, event))
    }
}

impl<M: RawMutex, const CAP: usize, const SUBS: usize, const PUBS: usize> EventSink
    for ImmediatePublisher<'_, M, (SensorId, TouchEvent), CAP, SUBS, PUBS>
{
    fn raise(&mut self, id: SensorId, event: TouchEvent) {
        self.publish_immediate((id, event))
    }
}

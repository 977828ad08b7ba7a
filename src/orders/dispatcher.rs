//! Order dispatcher
//!
//! The dispatcher owns the receive loop. Messages are handled one at a time
//! in delivery order, and handling never waits on cooking: an accepted order
//! is spawned and the loop goes straight back to `recv`. There is no limit
//! on the number of cooking tasks in flight.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::cook::{CookTime, InFlight, spawn_cook};
use super::order::Order;
use crate::bus::{Connection, InboundMessage, Publisher};
use crate::utils::error::{ConnectionError, OrderError, panic_message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Listening,
    Terminated,
}

/// What happened to one inbound message.
#[derive(Debug)]
pub enum Dispatch {
    /// Not on the intake topic.
    Ignored,
    Rejected(OrderError),
    Cooking(JoinHandle<()>),
}

#[derive(Debug)]
pub struct Dispatcher<P: Publisher> {
    intake_topic: String,
    publisher: P,
    cook_time: CookTime,
    in_flight: InFlight,
    terminated: AtomicBool,
}

impl<P: Publisher> Dispatcher<P> {
    pub fn new(intake_topic: impl Into<String>, publisher: P, cook_time: CookTime) -> Self {
        Self {
            intake_topic: intake_topic.into(),
            publisher,
            cook_time,
            in_flight: InFlight::default(),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> DispatcherState {
        if self.terminated.load(Ordering::SeqCst) {
            DispatcherState::Terminated
        } else {
            DispatcherState::Listening
        }
    }

    /// Cooking tasks started by this dispatcher that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Moves to `Terminated`. There is no way back.
    pub fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            info!(topic = %self.intake_topic, "dispatcher terminated");
        }
    }

    /// Filters, parses and validates one message, spawning a cooking task
    /// for a valid order.
    pub fn handle(&self, message: &InboundMessage) -> Dispatch {
        if message.topic != self.intake_topic {
            info!(topic = %message.topic, "ignoring message outside the order topic");
            return Dispatch::Ignored;
        }
        debug!(topic = %message.topic, "order message received");

        match Order::parse(&message.payload) {
            Ok(order) => {
                info!(
                    table_id = order.table_id,
                    food = %order.food_name,
                    in_flight = self.in_flight.count(),
                    "order accepted"
                );
                Dispatch::Cooking(spawn_cook(
                    order,
                    self.publisher.clone(),
                    self.cook_time,
                    &self.in_flight,
                ))
            }
            Err(err @ OrderError::Decode(_)) => {
                error!(payload = %message.payload_preview(), error = %err, "could not decode order");
                Dispatch::Rejected(err)
            }
            Err(err @ OrderError::Validation(_)) => {
                warn!(payload = %message.payload_preview(), error = %err, "discarding invalid order");
                Dispatch::Rejected(err)
            }
        }
    }

    /// Runs the receive loop until the connection fails, and returns why.
    ///
    /// A bad message never ends the loop; even a panic while handling one is
    /// caught and logged.
    pub async fn run<C>(&self, connection: &mut C) -> ConnectionError
    where
        C: Connection,
    {
        info!(topic = %self.intake_topic, "listening for orders");
        loop {
            let message = match connection.recv().await {
                Ok(message) => message,
                Err(err) => {
                    error!(error = %err, "lost the order stream");
                    self.terminate();
                    return err;
                }
            };

            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.handle(&message))) {
                error!(
                    topic = %message.topic,
                    payload = %message.payload_preview(),
                    panic = %panic_message(&*panic),
                    "unexpected failure while dispatching"
                );
            }
        }
    }
}

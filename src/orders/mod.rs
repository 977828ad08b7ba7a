//! The `orders` module is the order-processing core.
//!
//! - `order`: the wire format of orders and ready events
//! - `cook`: one fire-and-forget cooking task per accepted order
//! - `dispatcher`: the receive loop that filters, validates and dispatches
//! - `service`: ties a connection, its subscription and the dispatcher
//!   together and releases the connection on every exit path

pub mod cook;
pub mod dispatcher;
pub mod order;
pub mod service;

pub use cook::{CookTime, InFlight, cook, spawn_cook};
pub use dispatcher::{Dispatch, Dispatcher, DispatcherState};
pub use order::{Order, READY_TOPIC_FILTER, ReadyEvent, parse_ready_topic, ready_topic};
pub use service::serve;

//! # Kitchen
//!
//! `kitchen` is the back-of-house half of a restaurant simulation built on an
//! MQTT bus. It listens for orders on one topic, cooks each of them for a
//! random amount of time on its own task, and announces the finished dish on
//! the ordering table's topic.
//!
//! ## Core Modules
//!
//! - `bus`: the broker session, with an MQTT implementation and an in-memory one.
//! - `config`: loads broker and kitchen settings from file and environment.
//! - `orders`: order parsing, the dispatcher loop, cooking tasks and the service runner.
//! - `utils`: error types and logging setup.

pub mod bus;
pub mod config;
pub mod orders;
pub mod utils;

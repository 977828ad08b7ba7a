//! The `utils` module provides the shared plumbing used across the `kitchen`
//! crate: the error taxonomy and logging initialization.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests;

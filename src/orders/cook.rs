//! Cooking tasks
//!
//! Each accepted order becomes one detached tokio task that waits a random
//! cook time and then makes exactly one publish attempt. A task shares
//! nothing with other tasks besides the publisher handle, and its failures,
//! panics included, end with a log line inside the task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::order::{Order, ReadyEvent, ready_topic};
use crate::bus::{Publisher, QoS};
use crate::config::{DEFAULT_COOK_TIME_MAX_SECS, DEFAULT_COOK_TIME_MIN_SECS, KitchenSettings};
use crate::utils::error::{PublishError, panic_message};

/// Closed interval of cook durations, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CookTime {
    min_secs: f64,
    max_secs: f64,
}

impl CookTime {
    /// Bounds are expected to be validated already (representable as a
    /// `Duration`, `min <= max`).
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    /// Always the same duration.
    pub fn fixed(secs: f64) -> Self {
        Self::new(secs, secs)
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min_secs, self.max_secs)
    }

    /// Draws a duration uniformly from the interval.
    pub fn sample(&self) -> Duration {
        let secs = if self.min_secs < self.max_secs {
            rand::thread_rng().gen_range(self.min_secs..=self.max_secs)
        } else {
            self.min_secs
        };
        Duration::try_from_secs_f64(secs).unwrap_or_else(|e| {
            warn!(secs, error = %e, "cook time out of range, using the longest wait");
            Duration::MAX
        })
    }
}

impl Default for CookTime {
    fn default() -> Self {
        Self::new(DEFAULT_COOK_TIME_MIN_SECS, DEFAULT_COOK_TIME_MAX_SECS)
    }
}

impl From<&KitchenSettings> for CookTime {
    fn from(settings: &KitchenSettings) -> Self {
        Self::new(settings.cook_time_min_secs, settings.cook_time_max_secs)
    }
}

/// Counts running cooking tasks. Observation only, never a limit.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlightGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(self.0.clone())
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cooks one order: waits a sampled cook time, then publishes the ready
/// event to the table's topic at QoS 2. Never retries.
pub async fn cook<P: Publisher>(
    order: Order,
    publisher: P,
    cook_time: CookTime,
) -> Result<ReadyEvent, PublishError> {
    let duration = cook_time.sample();
    info!(
        table_id = order.table_id,
        food = %order.food_name,
        eta_secs = %format!("{:.2}", duration.as_secs_f64()),
        "chef started cooking"
    );

    tokio::time::sleep(duration).await;

    let topic = ready_topic(order.table_id);
    let event = ReadyEvent {
        food_name: order.food_name,
    };
    let result = match serde_json::to_vec(&event) {
        Ok(payload) => publisher.publish(&topic, payload, QoS::ExactlyOnce).await,
        Err(e) => Err(PublishError::new(&topic, e)),
    };

    match result {
        Ok(()) => {
            info!(table_id = order.table_id, food = %event.food_name, %topic, "chef finished");
            Ok(event)
        }
        Err(e) => {
            error!(table_id = order.table_id, food = %event.food_name, %topic, error = %e, "chef could not deliver");
            Err(e)
        }
    }
}

/// Starts [`cook`] on its own task and returns immediately.
///
/// The handle may be dropped; the task then runs detached. Panics inside the
/// task are caught and logged there.
pub fn spawn_cook<P: Publisher>(
    order: Order,
    publisher: P,
    cook_time: CookTime,
    in_flight: &InFlight,
) -> JoinHandle<()> {
    let guard = in_flight.enter();
    tokio::spawn(async move {
        let _guard = guard;
        let table_id = order.table_id;
        let food = order.food_name.clone();

        if let Err(panic) = AssertUnwindSafe(cook(order, publisher, cook_time))
            .catch_unwind()
            .await
        {
            error!(table_id, %food, panic = %panic_message(&*panic), "cooking task panicked");
        }
    })
}

//! Kitchen runner
//!
//! Ties a connection, the order subscription and a dispatcher together for
//! the lifetime of one session.

use std::future::Future;

use tracing::{info, warn};

use super::cook::CookTime;
use super::dispatcher::Dispatcher;
use crate::bus::{Connection, QoS};
use crate::config::KitchenSettings;
use crate::utils::error::ConnectionError;

/// Runs the kitchen on `connection` until `shutdown` resolves or the
/// connection fails.
///
/// Subscribes to the order topic at QoS 2 first. The connection is closed on
/// every path out of this function. Cooking tasks still in flight at that
/// point are abandoned.
pub async fn serve<C, F>(
    mut connection: C,
    settings: &KitchenSettings,
    shutdown: F,
) -> Result<(), ConnectionError>
where
    C: Connection,
    F: Future<Output = ()>,
{
    if let Err(err) = connection
        .subscribe(&settings.order_topic, QoS::ExactlyOnce)
        .await
    {
        connection.close().await;
        return Err(err);
    }

    let cook_time = CookTime::from(settings);
    let (min, max) = cook_time.bounds();
    info!(topic = %settings.order_topic, min_secs = min, max_secs = max, "kitchen open");

    let dispatcher = Dispatcher::new(
        settings.order_topic.clone(),
        connection.publisher(),
        cook_time,
    );

    let result = tokio::select! {
        err = dispatcher.run(&mut connection) => Err(err),
        _ = shutdown => {
            info!("shutdown requested");
            Ok(())
        }
    };

    dispatcher.terminate();
    let abandoned = dispatcher.in_flight();
    if abandoned > 0 {
        warn!(abandoned, "closing with cooking tasks still in flight");
    }

    connection.close().await;
    result
}

//! CLI for the kitchen
//!
//! Subcommands:
//! - `serve`: run the kitchen until Ctrl-C
//! - `order`: publish one order, the way the dining room does
//! - `watch`: print ready events for every table

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kitchen::bus::{Connection, MqttConnection, QoS};
use kitchen::config::{DEFAULT_CONFIG_PATH, load_config_from};
use kitchen::orders::{Order, READY_TOPIC_FILTER, ReadyEvent, parse_ready_topic, serve};
use kitchen::utils::error::{ConnectionError, KitchenError, PublishError};
use kitchen::utils::logging;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "kitchen", about = "Cooks orders received over MQTT")]
struct Cli {
    /// Configuration file, without or with extension
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the kitchen
    Serve,
    /// Publish a single order to the order topic
    Order {
        #[arg(long)]
        table: i128,
        #[arg(long)]
        food: String,
    },
    /// Log every ready event published for any table
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let result = match cli.command {
        Command::Serve => run_serve(&cli.config).await,
        Command::Order { table, food } => run_order(&cli.config, Order::new(table, food)).await,
        Command::Watch => run_watch(&cli.config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Kitchen failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_serve(config_path: &str) -> Result<(), KitchenError> {
    let settings = load_config_from(config_path)?;
    let connection = MqttConnection::connect(&settings.broker).await?;

    serve(connection, &settings.kitchen, shutdown_signal()).await?;
    info!("Backend shut down cleanly.");
    Ok(())
}

async fn run_order(config_path: &str, order: Order) -> Result<(), KitchenError> {
    let settings = load_config_from(config_path)?;
    let topic = settings.kitchen.order_topic;
    let payload = order
        .to_payload()
        .map_err(|e| PublishError::new(&topic, e))?;

    let mut connection = MqttConnection::connect(&settings.broker).await?;
    let result = connection
        .publish_confirmed(&topic, payload, QoS::ExactlyOnce)
        .await;
    connection.close().await;
    result?;

    info!(table_id = order.table_id, food = %order.food_name, %topic, "order placed");
    Ok(())
}

async fn run_watch(config_path: &str) -> Result<(), KitchenError> {
    let settings = load_config_from(config_path)?;
    let mut connection = MqttConnection::connect(&settings.broker).await?;

    if let Err(e) = connection
        .subscribe(READY_TOPIC_FILTER, QoS::ExactlyOnce)
        .await
    {
        connection.close().await;
        return Err(e.into());
    }

    let result = tokio::select! {
        err = watch_ready_events(&mut connection) => Err(err),
        _ = shutdown_signal() => Ok(()),
    };
    connection.close().await;
    Ok(result?)
}

async fn watch_ready_events(connection: &mut MqttConnection) -> ConnectionError {
    loop {
        let message = match connection.recv().await {
            Ok(message) => message,
            Err(e) => return e,
        };
        let Some(table_id) = parse_ready_topic(&message.topic) else {
            warn!(topic = %message.topic, "not a ready topic");
            continue;
        };
        match serde_json::from_slice::<ReadyEvent>(&message.payload) {
            Ok(event) => info!(table_id, food = %event.food_name, "food ready"),
            Err(e) => warn!(table_id, payload = %message.payload_preview(), error = %e, "unreadable ready event"),
        }
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves,
/// so a broken signal setup cannot stop the process by itself.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received. Exiting gracefully."),
        Err(e) => {
            error!("Could not listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

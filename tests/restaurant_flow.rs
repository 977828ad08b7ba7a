use std::collections::HashMap;
use std::time::Duration;

use kitchen::bus::{Connection, MemoryBus, QoS};
use kitchen::config::KitchenSettings;
use kitchen::orders::{Order, READY_TOPIC_FILTER, ReadyEvent, parse_ready_topic, serve};
use tokio::sync::oneshot;

#[tokio::test(start_paused = true)]
async fn dining_room_gets_every_dish_exactly_once() {
    let bus = MemoryBus::new();

    let mut dining_room = bus.connect();
    dining_room
        .subscribe(READY_TOPIC_FILTER, QoS::ExactlyOnce)
        .await
        .unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let kitchen = bus.connect();
    let settings = KitchenSettings::new("osensa/orders");
    let serving = tokio::spawn(async move {
        serve(kitchen, &settings, async {
            let _ = stop_rx.await;
        })
        .await
    });
    while bus.subscriptions().len() < 2 {
        tokio::task::yield_now().await;
    }

    let orders = [
        Order::new(1, "Soup"),
        Order::new(2, "Steak"),
        Order::new(1, "Salad"),
        Order::new(3, "Pie"),
    ];
    for order in &orders {
        bus.inject("osensa/orders", order.to_payload().unwrap());
    }
    // Noise that must not reach the kitchen's cooks.
    bus.inject("osensa/orders", r#"{"tableId": "2", "foodName": "Soup"}"#);
    bus.inject("osensa/orders", "definitely not json");

    // Default cook times are between 5 and 15 seconds.
    tokio::time::sleep(Duration::from_secs(16)).await;

    let mut served: HashMap<i128, Vec<String>> = HashMap::new();
    for _ in 0..orders.len() {
        let message = dining_room.recv().await.unwrap();
        let table_id = parse_ready_topic(&message.topic).expect("ready topic");
        let event: ReadyEvent = serde_json::from_slice(&message.payload).unwrap();
        served.entry(table_id).or_default().push(event.food_name);
    }

    let mut table_one = served.remove(&1).unwrap();
    table_one.sort();
    assert_eq!(table_one, vec!["Salad", "Soup"]);
    assert_eq!(served.remove(&2).unwrap(), vec!["Steak"]);
    assert_eq!(served.remove(&3).unwrap(), vec!["Pie"]);
    assert!(served.is_empty());

    let published = bus.published();
    assert_eq!(published.len(), orders.len());
    assert!(published.iter().all(|m| m.qos == QoS::ExactlyOnce));

    stop_tx.send(()).unwrap();
    serving.await.unwrap().unwrap();
    assert_eq!(bus.open_connections(), 1);
}

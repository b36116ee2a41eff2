//! Redelivery, dead-lettering and expiry through the broker.

use bytes::Bytes;
use kaelix_broker::{Broker, BrokerError, CancelOutcome};
use kaelix_core::config::{AddressSettings, DeliveryConfig, KaelixConfig, QueueConfig};
use kaelix_core::message::headers::{HDR_ACTUAL_EXPIRY_TIME, HDR_ORIGINAL_ADDRESS, HDR_ORIGINAL_QUEUE};
use kaelix_core::types::now;
use kaelix_core::Message;

fn queue(name: &str, address: &str) -> QueueConfig {
    QueueConfig { name: name.to_string(), address: address.to_string(), filter: None, durable: true }
}

fn broker() -> Broker {
    let config = KaelixConfig {
        delivery: DeliveryConfig {
            max_delivery_attempts: 3,
            dead_letter_address: Some("DLA".to_string()),
            expiry_address: Some("EXP".to_string()),
        },
        queues: vec![queue("work", "jobs"), queue("dlq", "DLA"), queue("expired", "EXP")],
        ..Default::default()
    };
    Broker::new(config).unwrap()
}

#[test]
fn test_redelivered_until_dead_lettered() {
    let broker = broker();
    let message = Message::new("jobs", Bytes::from_static(b"job")).unwrap();
    let id = message.id;
    broker.publish(message).unwrap();

    for attempt in 1..=2 {
        let delivered = broker.receive("work").unwrap().unwrap();
        assert_eq!(delivered.delivery_count, attempt);
        match broker.cancel_delivery("work", id).unwrap() {
            CancelOutcome::Redelivered { delivery_count } => assert_eq!(delivery_count, attempt),
            other => panic!("unexpected {other:?}"),
        }
    }

    broker.receive("work").unwrap().unwrap();
    assert!(matches!(broker.cancel_delivery("work", id).unwrap(), CancelOutcome::DeadLetter { .. }));
    assert_eq!(broker.queue("work").unwrap().message_count(), 0);

    let dead = broker.receive("dlq").unwrap().unwrap();
    assert_ne!(dead.message.id, id);
    assert_eq!(&dead.message.body[..], b"job");
    assert_eq!(dead.message.address.as_str(), "DLA");
    assert_eq!(dead.message.properties.get_string(HDR_ORIGINAL_ADDRESS).unwrap().as_deref(), Some("jobs"));
    assert_eq!(dead.message.properties.get_string(HDR_ORIGINAL_QUEUE).unwrap().as_deref(), Some("work"));
    assert_eq!(broker.stats().messages_dead_lettered, 1);
}

#[test]
fn test_per_address_delivery_settings() {
    let broker = Broker::new(KaelixConfig::default()).unwrap();
    broker
        .add_address_settings("strict.#", AddressSettings { max_delivery_attempts: Some(1), ..Default::default() })
        .unwrap();
    broker.create_queue(&queue("strict", "strict.orders")).unwrap();

    let message = Message::new("strict.orders", Bytes::new()).unwrap();
    let id = message.id;
    broker.publish(message).unwrap();
    broker.receive("strict").unwrap().unwrap();

    // no dead-letter address anywhere: dropped
    match broker.cancel_delivery("strict", id).unwrap() {
        CancelOutcome::DeadLetter { address, .. } => assert!(address.is_none()),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(broker.stats().messages_held, 0);
}

#[test]
fn test_invalid_address_settings_rejected() {
    let broker = broker();
    let err = broker
        .add_address_settings("jobs", AddressSettings { max_delivery_attempts: Some(0), ..Default::default() })
        .unwrap_err();
    assert!(matches!(err, BrokerError::Core(kaelix_core::Error::Configuration(_))));
    assert!(broker
        .add_address_settings("jobs", AddressSettings { dead_letter_address: Some("DLA.*".to_string()), ..Default::default() })
        .is_err());

    // queues created afterwards still get the broker-wide defaults
    broker.create_queue(&queue("late", "jobs")).unwrap();
    let settings = broker.queue("late").unwrap().settings().clone();
    assert_eq!(settings.max_delivery_attempts, 3);
    assert_eq!(settings.dead_letter_address.as_ref().map(|a| a.as_str()), Some("DLA"));
}

#[test]
fn test_ack_requires_delivery() {
    let broker = broker();
    let message = Message::new("jobs", Bytes::new()).unwrap();
    let id = message.id;
    broker.publish(message).unwrap();

    assert!(matches!(broker.acknowledge("work", id), Err(BrokerError::ReferenceNotFound { .. })));
    broker.receive("work").unwrap().unwrap();
    broker.acknowledge("work", id).unwrap();
    assert_eq!(broker.stats().messages_acknowledged, 1);
    assert!(broker.receive("work").unwrap().is_none());
}

#[test]
fn test_expired_messages_move_to_expiry_address() {
    let broker = broker();
    let expiration = now() - chrono::Duration::milliseconds(5);
    let stale = Message::builder()
        .address("jobs")
        .body(Bytes::from_static(b"stale"))
        .expiration(expiration)
        .build()
        .unwrap();
    broker.publish(stale).unwrap();
    broker.publish(Message::new("jobs", Bytes::from_static(b"fresh")).unwrap()).unwrap();

    let at = now();
    assert_eq!(broker.expire_messages(at).unwrap(), 1);
    assert_eq!(broker.queue("work").unwrap().message_count(), 1);

    let moved = broker.receive("expired").unwrap().unwrap();
    assert_eq!(&moved.message.body[..], b"stale");
    assert_eq!(moved.message.expiration, None);
    assert_eq!(moved.message.properties.get_long(HDR_ACTUAL_EXPIRY_TIME).unwrap(), at.timestamp_millis());
    assert_eq!(broker.stats().messages_expired, 1);
}

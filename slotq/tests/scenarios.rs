//! End-to-end behaviour of the registry surface: capacity, oversize,
//! short reads, teardown.

use slotq::{MqError, QueueConfig, Registry};

#[test]
fn capacity_bound_and_fifo_after_wrap() {
    let registry = Registry::new();
    let h = registry.create(Some(&QueueConfig::new(2, 16))).unwrap();

    registry.push(&h, b"ab").unwrap();
    registry.push(&h, b"cd").unwrap();
    assert!(matches!(registry.push(&h, b"ef"), Err(MqError::QueueFull)));

    let mut buf = [0u8; 16];
    assert_eq!(registry.pop(&h, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"ab");

    registry.push(&h, b"ef").unwrap();
    assert_eq!(registry.pop(&h, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"cd");
    assert_eq!(registry.pop(&h, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"ef");
}

#[test]
fn oversized_message_rejected_without_occupying() {
    let registry = Registry::new();
    let h = registry.create(Some(&QueueConfig::new(1, 8))).unwrap();

    let msg = [0x5a_u8; 20];
    assert!(matches!(
        registry.push(&h, &msg),
        Err(MqError::MessageTooLarge { size: 20, max: 8 })
    ));
    assert_eq!(registry.len(&h).unwrap(), 0);
}

#[test]
fn short_read_is_retryable() {
    let registry = Registry::new();
    let h = registry.create(None).unwrap();
    registry.push(&h, b"hello").unwrap();

    let mut small = [0u8; 2];
    assert!(matches!(
        registry.pop(&h, &mut small),
        Err(MqError::BufferTooSmall { need: 5, have: 2 })
    ));

    let mut buf = [0u8; 8];
    assert_eq!(registry.pop(&h, &mut buf).unwrap(), 5);
    assert_eq!(&buf[..5], b"hello");
}

#[test]
fn destroyed_handle_is_invalid_everywhere() {
    let registry = Registry::new();
    let h = registry.create(None).unwrap();
    registry.push(&h, b"pending").unwrap();
    registry.destroy(&h).unwrap();

    let mut buf = [0u8; 16];
    assert!(matches!(registry.push(&h, b"x"), Err(MqError::InvalidHandle)));
    assert!(matches!(registry.pop(&h, &mut buf), Err(MqError::InvalidHandle)));
    assert!(matches!(registry.len(&h), Err(MqError::InvalidHandle)));
    assert!(matches!(registry.destroy(&h), Err(MqError::InvalidHandle)));
    assert!(!registry.contains(&h));
}

#[test]
fn handle_from_other_registry_is_invalid() {
    let a = Registry::new();
    let b = Registry::new();
    let h = a.create(None).unwrap();

    assert!(matches!(b.push(&h, b"x"), Err(MqError::InvalidHandle)));
    assert!(matches!(b.destroy(&h), Err(MqError::InvalidHandle)));
    assert!(a.contains(&h));
}

#[test]
fn empty_pop_leaves_state_unchanged() {
    let registry = Registry::new();
    let h = registry.create(Some(&QueueConfig::new(3, 4))).unwrap();

    let mut buf = [0u8; 4];
    assert!(matches!(registry.pop(&h, &mut buf), Err(MqError::QueueEmpty)));
    assert_eq!(registry.len(&h).unwrap(), 0);

    // Cursors did not move: three pushes still fit and come back in order.
    for i in 0..3u8 {
        registry.push(&h, &[i]).unwrap();
    }
    for i in 0..3u8 {
        assert_eq!(registry.pop(&h, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], i);
    }
}

#[test]
fn occupancy_matches_push_pop_balance() {
    let registry = Registry::new();
    let h = registry.create(Some(&QueueConfig::new(4, 8))).unwrap();
    let mut buf = [0u8; 8];
    let mut pushed = 0usize;
    let mut popped = 0usize;

    // Fixed pattern of pushes (true) and pops (false), including failures.
    let script = [
        true, true, false, true, true, true, true, false, false, false, false, false, true,
    ];
    for step in script {
        if step {
            if registry.push(&h, b"m").is_ok() {
                pushed += 1;
            }
        } else if registry.pop(&h, &mut buf).is_ok() {
            popped += 1;
        }
        let len = registry.len(&h).unwrap();
        assert_eq!(len, pushed - popped);
        assert!(len <= 4);
    }
}

#[test]
fn many_queues_are_independent() {
    let registry = Registry::new();
    let handles: Vec<_> = (0..16u8)
        .map(|_| registry.create(Some(&QueueConfig::new(2, 4))).unwrap())
        .collect();
    assert_eq!(registry.queue_count(), 16);

    for (i, h) in handles.iter().enumerate() {
        registry.push(h, &[i as u8]).unwrap();
    }
    for h in handles.iter().step_by(2) {
        registry.destroy(h).unwrap();
    }
    assert_eq!(registry.queue_count(), 8);

    let mut buf = [0u8; 4];
    for (i, h) in handles.iter().enumerate().skip(1).step_by(2) {
        assert_eq!(registry.pop(h, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], i as u8);
    }
}

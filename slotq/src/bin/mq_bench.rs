//! Queue throughput and round-trip benchmark.
//!
//! Usage:
//!     cargo run --release --bin mq_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin consumer to CPU 2 (default: 2)
//!     MSG_SIZE=64     Payload bytes per message (default: 64)

use std::env;
use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use minstant::Instant;
use slotq::{Handle, MqError, QueueConfig, Registry, Timeout};

const QUEUE_SLOTS: u8 = 255;
const ITERATIONS: usize = 1 << 20;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn pin_to_cpu(cpu: usize) {
    core_affinity::set_for_current(core_affinity::CoreId { id: cpu });
}

/// Writes the sequence number into the front of the payload.
fn stamp(buf: &mut [u8], seq: usize) {
    buf[..8].copy_from_slice(&(seq as u64).to_le_bytes());
}

fn read_stamp(buf: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[..8]);
    u64::from_le_bytes(raw)
}

fn push_spin(registry: &Registry, handle: &Handle, msg: &[u8]) {
    loop {
        match registry.push(handle, msg) {
            Ok(()) => return,
            Err(MqError::QueueFull) => hint::spin_loop(),
            Err(e) => panic!("push failed: {e}"),
        }
    }
}

fn bench_throughput(
    registry: &Arc<Registry>,
    msg_size: usize,
    producer_cpu: usize,
    consumer_cpu: usize,
) {
    let handle = registry
        .create(Some(&QueueConfig::new(QUEUE_SLOTS, msg_size)))
        .unwrap();

    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = Arc::clone(&ready);
    let consumer_registry = Arc::clone(registry);
    let consumer_handle = handle.clone();

    // Consumer thread parks on the eventfd between bursts.
    let consumer_thread = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        ready_clone.store(true, Ordering::Release);

        let mut buf = vec![0u8; msg_size];
        for expected in 0..ITERATIONS as u64 {
            consumer_registry
                .pop_timeout(&consumer_handle, &mut buf, Timeout::Infinite)
                .unwrap();
            let got = read_stamp(&buf);
            assert!(got == expected, "Data corruption: expected {expected}, got {got}");
        }
    });

    while !ready.load(Ordering::Acquire) {
        hint::spin_loop();
    }
    pin_to_cpu(producer_cpu);

    let mut msg = vec![0u8; msg_size];
    let start = Instant::now();
    for i in 0..ITERATIONS {
        stamp(&mut msg, i);
        push_spin(registry, &handle, &msg);
    }
    consumer_thread.join().unwrap();
    let elapsed = start.elapsed();

    registry.destroy(&handle).unwrap();

    let ops_per_ms = ITERATIONS as u128 * 1_000_000 / elapsed.as_nanos();
    println!("{ops_per_ms} msgs/ms");
}

fn bench_rtt(
    registry: &Arc<Registry>,
    msg_size: usize,
    producer_cpu: usize,
    consumer_cpu: usize,
) {
    let config = QueueConfig::new(QUEUE_SLOTS, msg_size);
    let ping = registry.create(Some(&config)).unwrap();
    let pong = registry.create(Some(&config)).unwrap();

    let responder_registry = Arc::clone(registry);
    let (responder_ping, responder_pong) = (ping.clone(), pong.clone());
    let responder = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        let mut buf = vec![0u8; msg_size];
        for _ in 0..ITERATIONS {
            let len = responder_registry
                .pop_timeout(&responder_ping, &mut buf, Timeout::Infinite)
                .unwrap();
            push_spin(&responder_registry, &responder_pong, &buf[..len]);
        }
    });

    pin_to_cpu(producer_cpu);

    let mut msg = vec![0u8; msg_size];
    let mut buf = vec![0u8; msg_size];
    let start = Instant::now();
    for i in 0..ITERATIONS {
        stamp(&mut msg, i);
        push_spin(registry, &ping, &msg);
        registry.pop_timeout(&pong, &mut buf, Timeout::Infinite).unwrap();
    }
    let elapsed = start.elapsed();
    responder.join().unwrap();

    registry.destroy(&ping).unwrap();
    registry.destroy(&pong).unwrap();

    let rtt_ns = elapsed.as_nanos() / ITERATIONS as u128;
    println!("{rtt_ns} ns RTT");
}

fn main() {
    slotq::init_tracing();

    let producer_cpu = env_or("PRODUCER_CPU", 0);
    let consumer_cpu = env_or("CONSUMER_CPU", 2);
    let msg_size = env_or("MSG_SIZE", 64usize).max(8);

    let registry = Arc::new(Registry::new());
    let info = slotq::version_info();
    println!(
        "{} {} (slots={QUEUE_SLOTS}, msg_size={msg_size}, iters={ITERATIONS}):",
        info.name, info.version
    );
    bench_throughput(&registry, msg_size, producer_cpu, consumer_cpu);
    bench_rtt(&registry, msg_size, producer_cpu, consumer_cpu);
}

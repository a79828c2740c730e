//! Isolate to isolate messaging across threads

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use isolate_types::{NativeValue, Value, ILLEGAL_PORT};
use message_ports::{post_value, Isolate, PortMap};
use parking_lot::Mutex;

#[test]
fn test_ping_pong_between_isolates() {
    const ROUNDS: i64 = 100;
    let (done_tx, done_rx) = mpsc::channel();
    let done_tx = Mutex::new(done_tx);

    // echoes every value back to the reply port
    let ponger = Isolate::new("ponger", |heap, message, decoded| {
        let n = decoded.ok().and_then(|v| heap.integer_value(v)).unwrap_or(-1);
        post_value(message.reply(), message.dest(), heap, Value::Smi(n)).is_ok()
    });

    let last = Arc::new(AtomicI64::new(0));
    let seen = Arc::clone(&last);
    let pinger = Isolate::new("pinger", move |heap, message, decoded| {
        let n = decoded.ok().and_then(|v| heap.integer_value(v)).unwrap_or(-1);
        seen.store(n, Ordering::SeqCst);
        if n >= ROUNDS {
            let _ = done_tx.lock().send(n);
            return true;
        }
        post_value(message.reply(), message.dest(), heap, Value::Smi(n + 1)).is_ok()
    });

    let pong_loop = ponger.spawn_loop().unwrap();
    let ping_loop = pinger.spawn_loop().unwrap();
    pinger
        .send(ponger.main_port(), pinger.main_port(), Value::Smi(0))
        .unwrap();

    let finished = done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(finished, ROUNDS);
    assert_eq!(last.load(Ordering::SeqCst), ROUNDS);

    ponger.shutdown();
    pinger.shutdown();
    pong_loop.join();
    ping_loop.join();
}

#[test]
fn test_shared_graph_crosses_into_isolate_heap() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let receiver = Isolate::new("graph-receiver", move |heap, _, decoded| {
        let root = decoded.unwrap().as_object().unwrap();
        let elements = heap.array_elements(root).unwrap().to_vec();
        let text = heap
            .string_value(elements[0])
            .and_then(|s| s.to_rust_string());
        let _ = tx.lock().send((elements[0] == elements[1], text, heap.len()));
        true
    });

    let sender = Isolate::new("graph-sender", |_, _, _| true);
    let root = sender.with_heap_mut(|heap| {
        let text = Value::Object(heap.new_string("shared").unwrap());
        Value::Object(heap.new_array_from(vec![text, text]).unwrap())
    });
    sender
        .send(receiver.main_port(), ILLEGAL_PORT, root)
        .unwrap();

    assert!(receiver.handle_next_message().unwrap());
    let (same, text, objects) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(same);
    assert_eq!(text.as_deref(), Some("shared"));
    assert_eq!(objects, 2);
}

#[test]
fn test_send_port_value_names_live_port() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let capture = message_ports::new_native_port(
        Some("port-inspector"),
        move |_, _, arena, root| {
            if let Some(NativeValue::SendPort(port)) = arena.get(root) {
                let _ = tx.lock().send(*port);
            }
        },
        false,
    )
    .unwrap();

    let owner = Isolate::new("port-owner", |_, _, _| true);
    let advertised = owner.open_port(true);
    let value = owner
        .with_heap_mut(|heap| message_ports::new_send_port(heap, advertised))
        .unwrap();
    owner.send(capture, ILLEGAL_PORT, value).unwrap();

    let port = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(port, advertised);
    assert!(PortMap::global().is_live(port));
    assert!(message_ports::close_native_port(capture));
}

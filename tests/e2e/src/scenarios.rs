//! End-to-end test scenarios
//!
//! Each scenario builds a graph in a managed heap, posts it through the
//! global port registry to a native port, and checks the decoded tree.

use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use isolate_types::{Heap, NativeValue, Value, ILLEGAL_PORT};
use message_ports::{post_int_array, post_value, Isolate};
use parking_lot::Mutex;
use snapshot_codec::SnapshotWriter;
use transport_config::CodecLimits;

use crate::fixtures::{self, CapturePort, LARGE_BIGINT_HEX};
use crate::framework::{TestFramework, TestMetrics, TestScenario};
use crate::validation::{elements, typed_data, validate_reencode, validate_shared};

fn encode(heap: &Heap, root: Value) -> Result<Vec<u8>> {
    Ok(SnapshotWriter::host()
        .with_limits(CodecLimits::default())
        .write_value(heap, root)?
        .as_bytes()
        .to_vec())
}

fn sent(bytes: &[u8], objects: usize) -> TestMetrics {
    TestMetrics {
        messages_posted: 1,
        messages_received: 1,
        payload_bytes: bytes.len() as u64,
        objects_decoded: objects as u64,
    }
}

/// Integer 42 arrives as Int32 and re-encodes identically
pub struct SmallIntegerTest;

impl TestScenario for SmallIntegerTest {
    fn execute(&self, framework: &TestFramework) -> Result<TestMetrics> {
        let capture = CapturePort::open("small-int", framework.config().receive_timeout())?;
        let heap = Heap::new();
        let root = Value::Smi(42);
        let original = encode(&heap, root)?;

        post_value(capture.port(), ILLEGAL_PORT, &heap, root)?;
        let (_, arena, node) = capture.recv()?;
        ensure!(
            arena.get(node) == Some(&NativeValue::Int32(42)),
            "decoded {:?}",
            arena.get(node)
        );
        validate_reencode(&original, &arena, node)?;
        Ok(sent(&original, arena.len()))
    }

    fn name(&self) -> &str {
        "small_int"
    }

    fn description(&self) -> &str {
        "Integer 42 decodes to Int32 and re-encodes byte for byte"
    }
}

/// Every slot of a list refers back to the list
pub struct CyclicListTest {
    pub length: usize,
}

impl TestScenario for CyclicListTest {
    fn execute(&self, framework: &TestFramework) -> Result<TestMetrics> {
        let capture = CapturePort::open("cyclic-list", framework.config().receive_timeout())?;
        let mut heap = Heap::new();
        let root = fixtures::self_referencing_list(&mut heap, self.length)?;
        let original = encode(&heap, root)?;

        post_value(capture.port(), ILLEGAL_PORT, &heap, root)?;
        let (_, arena, node) = capture.recv()?;
        let slots = elements(&arena, node)?;
        ensure!(slots.len() == self.length, "decoded length {}", slots.len());
        ensure!(
            slots.iter().all(|slot| *slot == node),
            "a slot does not point at the root"
        );
        validate_reencode(&original, &arena, node)?;
        Ok(sent(&original, arena.len()))
    }

    fn name(&self) -> &str {
        "cyclic_list"
    }

    fn description(&self) -> &str {
        "Self-referencing list keeps its cycle"
    }
}

/// Alternating shared string and shared double
pub struct SharedEntriesTest;

impl TestScenario for SharedEntriesTest {
    fn execute(&self, framework: &TestFramework) -> Result<TestMetrics> {
        let capture = CapturePort::open("shared-entries", framework.config().receive_timeout())?;
        let mut heap = Heap::new();
        let root = fixtures::alternating_shared_list(&mut heap)?;
        let original = encode(&heap, root)?;

        post_value(capture.port(), ILLEGAL_PORT, &heap, root)?;
        let (_, arena, node) = capture.recv()?;
        let slots = elements(&arena, node)?;
        ensure!(slots.len() == 10, "decoded length {}", slots.len());

        let evens: Vec<_> = slots.iter().step_by(2).copied().collect();
        let odds: Vec<_> = slots.iter().skip(1).step_by(2).copied().collect();
        validate_shared(&evens)?;
        validate_shared(&odds)?;
        ensure!(arena.get(evens[0]) == Some(&NativeValue::String("A".into())));
        ensure!(arena.get(odds[0]) == Some(&NativeValue::Double(2.72)));
        validate_reencode(&original, &arena, node)?;
        Ok(sent(&original, arena.len()))
    }

    fn name(&self) -> &str {
        "shared_entries"
    }

    fn description(&self) -> &str {
        "Repeated string and double decode to one node each"
    }
}

/// Ten overlapping views decode into windows of one buffer
pub struct TypedDataViewsTest;

impl TestScenario for TypedDataViewsTest {
    fn execute(&self, framework: &TestFramework) -> Result<TestMetrics> {
        let capture = CapturePort::open("typed-views", framework.config().receive_timeout())?;
        let mut heap = Heap::new();
        let root = fixtures::overlapping_views(&mut heap)?;
        let original = encode(&heap, root)?;

        post_value(capture.port(), ILLEGAL_PORT, &heap, root)?;
        let (_, arena, node) = capture.recv()?;
        let views = elements(&arena, node)?;
        ensure!(views.len() == 10, "decoded {} views", views.len());

        let first = typed_data(&arena, views[0])?;
        for (offset, view) in views.iter().enumerate() {
            let data = typed_data(&arena, *view)?;
            ensure!(data.buffer == first.buffer, "view {offset} has its own buffer");
            ensure!(data.offset == offset && data.byte_len == 10);
            let bytes = arena
                .typed_bytes(&data)
                .ok_or_else(|| anyhow!("view {offset} outside its buffer"))?;
            let expected: Vec<u8> = (offset as u8..offset as u8 + 10).collect();
            ensure!(bytes == expected.as_slice(), "view {offset} bytes {bytes:?}");
        }
        let buffer = arena
            .buffer(first.buffer)
            .context("shared buffer missing")?;
        ensure!(buffer.len() == 256, "shared buffer holds {} bytes", buffer.len());
        Ok(sent(&original, arena.len()))
    }

    fn name(&self) -> &str {
        "typed_data_views"
    }

    fn description(&self) -> &str {
        "Views over one Uint8 list share a decoded buffer"
    }
}

/// A 160-bit integer survives in canonical hex
pub struct BigintTest;

impl TestScenario for BigintTest {
    fn execute(&self, framework: &TestFramework) -> Result<TestMetrics> {
        let capture = CapturePort::open("bigint", framework.config().receive_timeout())?;
        let mut heap = Heap::new();
        let root = fixtures::large_bigint(&mut heap)?;
        let original = encode(&heap, root)?;

        post_value(capture.port(), ILLEGAL_PORT, &heap, root)?;
        let (_, arena, node) = capture.recv()?;
        ensure!(
            arena.get(node) == Some(&NativeValue::Bigint(LARGE_BIGINT_HEX.into())),
            "decoded {:?}",
            arena.get(node)
        );
        validate_reencode(&original, &arena, node)?;
        Ok(sent(&original, arena.len()))
    }

    fn name(&self) -> &str {
        "bigint"
    }

    fn description(&self) -> &str {
        "Bigint decodes to uppercase hex and re-encodes identically"
    }
}

/// Three posts arrive in order; a post after close is refused
pub struct PortOrderingTest;

impl TestScenario for PortOrderingTest {
    fn execute(&self, _framework: &TestFramework) -> Result<TestMetrics> {
        let seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let isolate = Isolate::new("ordering", move |heap, _, decoded| {
            let Ok(root) = decoded else {
                return false;
            };
            let Some(list) = root.as_object() else {
                return false;
            };
            if let Ok(values) = heap.array_elements(list) {
                let values: Vec<i64> = values.iter().filter_map(|v| heap.integer_value(*v)).collect();
                sink.lock().extend(values);
            }
            true
        });
        let port = isolate.open_port(true);

        for n in 1..=3 {
            ensure!(post_int_array(port, &[n]), "post of [{n}] refused");
        }
        let mut received = 0;
        while isolate.handle_next_message()? {
            received += 1;
        }
        ensure!(*seen.lock() == vec![1, 2, 3], "delivered {:?}", seen.lock());

        ensure!(isolate.close_port(port), "port already closed");
        ensure!(!post_int_array(port, &[4]), "post after close accepted");
        ensure!(!isolate.close_port(port), "second close succeeded");

        Ok(TestMetrics {
            messages_posted: 4,
            messages_received: received,
            payload_bytes: 0,
            objects_decoded: 3,
        })
    }

    fn name(&self) -> &str {
        "port_ordering"
    }

    fn description(&self) -> &str {
        "Posts are dequeued in order and refused after close"
    }
}

/// Every scenario with its default parameters
pub fn all_scenarios() -> Vec<Box<dyn TestScenario>> {
    vec![
        Box::new(SmallIntegerTest),
        Box::new(CyclicListTest { length: 10 }),
        Box::new(SharedEntriesTest),
        Box::new(TypedDataViewsTest),
        Box::new(BigintTest),
        Box::new(PortOrderingTest),
    ]
}

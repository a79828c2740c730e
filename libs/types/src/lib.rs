//! # Isolate Types
//!
//! Pure data structures shared by every layer of the isolate message transport.
//!
//! ## Design Philosophy
//!
//! - **No behaviour beyond invariants**: types here validate their own shape
//!   (view bounds, element sizes, smi range) but know nothing about the wire
//! - **Identity is explicit**: heap objects and native nodes are addressed by
//!   index handles, so sharing and cycles are plain integer equality
//! - **One owner per graph**: a [`Heap`] or a [`NativeArena`] owns every value
//!   reachable from a handle it returned
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → libs/ports
//!     ↑            ↓            ↓
//!  Value model  Snapshot    Routing, queues
//!  Heap/Arena   encoding    and handlers
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use isolate_types::{Heap, NativeArena, Value};
//!
//! let mut heap = Heap::new();
//! let list = heap.new_array(2).unwrap();
//! let name = heap.new_string("A").unwrap();
//! heap.array_set(list, 0, Value::Object(name)).unwrap();
//! heap.array_set(list, 1, Value::Object(name)).unwrap();
//!
//! let mut arena = NativeArena::new();
//! let answer = arena.int32(42);
//! let root = arena.array(vec![answer, answer]);
//! assert_eq!(arena.array_elements(root).map(|e| e.len()), Some(2));
//! ```

pub mod errors;
pub mod heap;
pub mod native;
pub mod ports;
pub mod typed_data;

pub use errors::{HeapError, HeapResult};
pub use heap::{
    Heap, HeapObject, HeapString, ObjectId, Value, SMI_MAX, SMI_MIN,
};
pub use native::{BufferId, NativeArena, NativeRef, NativeTypedData, NativeValue};
pub use ports::{PortId, Priority, ILLEGAL_PORT};
pub use typed_data::TypedDataKind;

pub use num_bigint::{BigInt, Sign};

//! # Snapshot Codec - Object Graph Transfer Between Isolates
//!
//! ## Purpose
//!
//! Serialize an object graph into a self-contained byte snapshot and
//! reconstruct it on the other side of an isolate boundary. The encoding
//! preserves object identity: a shared object is written once and every
//! further occurrence becomes a back-reference, so DAGs stay DAGs and cycles
//! terminate.
//!
//! Two graph representations are supported on both ends:
//! - **Managed**: objects in an isolate [`Heap`], rooted at a [`Value`]
//! - **Native**: an embedder [`NativeArena`], rooted at a [`NativeRef`]
//!
//! Any writer can be paired with any reader; the wire format is the same.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [snapshot codec] → libs/ports
//!     ↑              ↓                 ↓
//!  Heap /       Writer/Reader     Message queues
//!  Arena        Back-ref tables   Port registry
//! ```
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────┬──────┬─────────┬───────┐┌─────────────── records ───────────────┐
//! │ 0xD7 │ kind │ version │ flags ││ root record, children depth-first ... │
//! └──────┴──────┴─────────┴───────┘└───────────────────────────────────────┘
//! ```
//!
//! - `0x00..=0x3F`: six-bit signed immediate integer
//! - `0x40..=0x7F`: object record, see [`ObjectTag`]
//! - `0x80..=0xFF`: back-reference; low seven index bits in the tag, the rest
//!   as a varint
//!
//! ## What This Crate Does NOT Contain
//! - Port registry or message queues (belongs in libs/ports)
//! - Heap or arena storage (belongs in libs/types)
//! - Threads of any kind; every call runs on the caller's thread

pub mod alloc;
pub mod bigint;
pub mod buffers;
pub mod error;
pub mod reader;
pub mod stream;
pub mod tags;
pub mod varint;
pub mod writer;

pub use alloc::{
    AllocError, AllocatorKind, BoundedAllocator, HostAllocator, Reallocator, TrackingAllocator,
};
pub use bigint::BigintDigits;
pub use buffers::{with_scratch_buffer, ByteSink, Payload, WriteBuffer};
pub use error::{SnapshotError, SnapshotResult};
pub use reader::SnapshotReader;
pub use tags::{ObjectTag, SnapshotHeader, SnapshotKind, HEADER_SIZE, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use writer::SnapshotWriter;

use isolate_types::{Heap, NativeArena, NativeRef, Value};

/// Encode a managed value on the host allocator with the global limits
pub fn encode_value(heap: &Heap, root: Value) -> SnapshotResult<Payload> {
    SnapshotWriter::host().write_value(heap, root)
}

/// Encode a native tree on the host allocator with the global limits
pub fn encode_native(arena: &NativeArena, root: NativeRef) -> SnapshotResult<Payload> {
    SnapshotWriter::host().write_native(arena, root)
}

/// Decode a snapshot into `heap` with the global limits
pub fn decode_value(bytes: &[u8], heap: &mut Heap) -> SnapshotResult<Value> {
    SnapshotReader::new(bytes).read_value(heap)
}

/// Decode a snapshot into `arena` with the global limits
pub fn decode_native(bytes: &[u8], arena: &mut NativeArena) -> SnapshotResult<NativeRef> {
    SnapshotReader::new(bytes).read_native(arena)
}

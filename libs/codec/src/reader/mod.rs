//! Snapshot readers
//!
//! ## Purpose
//!
//! Decode a message snapshot into a destination graph. One driver,
//! [`GraphReader`], walks the record stream and resolves back-references;
//! what a record turns into is decided by a [`GraphBuilder`]:
//!
//! - `HeapBuilder`: allocates objects in a receiving isolate's [`Heap`]
//! - `ArenaBuilder`: builds nodes in an embedder [`NativeArena`]
//!
//! ## Registration Order
//!
//! Every registered record is appended to the back-reference table as soon
//! as it exists. Containers are created as empty shells and registered
//! *before* their children are decoded, so a child can refer back to the
//! container that holds it. This mirrors the writer, which takes a table
//! index before emitting a record's children.
//!
//! ## Untrusted Input
//!
//! A decoder never trusts a declared length: every length is checked
//! against the configured limit and against the bytes actually left in the
//! stream before anything is allocated for it.

mod managed;
mod native;

use isolate_types::{Heap, NativeArena, NativeRef, PortId, TypedDataKind, Value};
use tracing::{debug, trace};
use transport_config::CodecLimits;

use crate::bigint::BigintDigits;
use crate::error::{SnapshotError, SnapshotResult};
use crate::stream::ReadStream;
use crate::tags::{classify, ObjectTag, SnapshotHeader, TagClass, HEADER_SIZE};

pub(crate) use managed::HeapBuilder;
pub(crate) use native::ArenaBuilder;

/// Destination of a decode
pub(crate) trait GraphBuilder {
    /// Value as it is stored in containers and in the back-reference table
    type Node: Copy;
    /// Container created before its contents are known
    type Shell: Copy;

    fn shell_node(&self, shell: Self::Shell) -> Self::Node;

    fn null(&mut self) -> SnapshotResult<Self::Node>;
    fn boolean(&mut self, value: bool) -> SnapshotResult<Self::Node>;
    /// Integer from an immediate tag or a smi record
    fn small_integer(&mut self, value: i64) -> SnapshotResult<Self::Node>;
    fn mint(&mut self, value: i64) -> SnapshotResult<Self::Node>;
    fn bigint(&mut self, value: BigintDigits) -> SnapshotResult<Self::Node>;
    fn double(&mut self, value: f64) -> SnapshotResult<Self::Node>;
    fn latin1_string(&mut self, bytes: &[u8]) -> SnapshotResult<Self::Node>;
    fn utf16_string(&mut self, units: Vec<u16>) -> SnapshotResult<Self::Node>;
    /// `stream_offset` is where the element bytes start, for diagnostics.
    fn typed_data(
        &mut self,
        kind: TypedDataKind,
        bytes: &[u8],
        stream_offset: usize,
    ) -> SnapshotResult<Self::Node>;
    fn send_port(&mut self, port: PortId) -> SnapshotResult<Self::Node>;

    fn array_shell(&mut self, length: usize) -> SnapshotResult<Self::Shell>;
    fn array_set(&mut self, array: Self::Shell, index: usize, element: Self::Node)
        -> SnapshotResult<()>;
    fn map_shell(&mut self, entries: usize) -> SnapshotResult<Self::Shell>;
    fn map_insert(&mut self, map: Self::Shell, key: Self::Node, value: Self::Node)
        -> SnapshotResult<()>;
    fn view_shell(&mut self, kind: TypedDataKind) -> SnapshotResult<Self::Shell>;
    /// Attach a decoded backing store to a view shell. `stream_offset` is
    /// where the backing record started, for diagnostics.
    fn view_fill(
        &mut self,
        view: Self::Shell,
        kind: TypedDataKind,
        backing: Self::Node,
        offset_in_bytes: usize,
        length: usize,
        stream_offset: usize,
    ) -> SnapshotResult<()>;
}

/// Record stream driver
pub(crate) struct GraphReader<'a, B: GraphBuilder> {
    bytes: &'a [u8],
    stream: ReadStream<'a>,
    builder: B,
    table: Vec<B::Node>,
    limits: CodecLimits,
}

impl<'a, B: GraphBuilder> GraphReader<'a, B> {
    pub(crate) fn new(bytes: &'a [u8], builder: B, limits: CodecLimits) -> Self {
        Self {
            bytes,
            stream: ReadStream::new(bytes),
            builder,
            table: Vec::new(),
            limits,
        }
    }

    /// Validate the header, decode the root record and require that it
    /// spans the rest of the buffer
    pub(crate) fn read_root(mut self) -> SnapshotResult<B::Node> {
        SnapshotHeader::parse(self.bytes)?.expect_message()?;
        self.stream = ReadStream::at(self.bytes, HEADER_SIZE);
        let root = self.read_record(0)?;
        if !self.stream.is_exhausted() {
            return Err(SnapshotError::TrailingBytes {
                offset: self.stream.position(),
                remaining: self.stream.remaining(),
            });
        }
        trace!(
            bytes = self.bytes.len(),
            registered = self.table.len(),
            "decoded snapshot"
        );
        Ok(root)
    }

    fn check_depth(&self, depth: usize) -> SnapshotResult<()> {
        if depth >= self.limits.max_nesting_depth {
            return Err(SnapshotError::NestingTooDeep {
                depth: depth + 1,
                limit: self.limits.max_nesting_depth,
            });
        }
        Ok(())
    }

    fn register(&mut self, node: B::Node) -> B::Node {
        self.table.push(node);
        node
    }

    fn read_length(&mut self, context: &'static str) -> SnapshotResult<usize> {
        self.stream
            .read_length(self.limits.max_container_length, context)
    }

    fn read_kind(&mut self) -> SnapshotResult<TypedDataKind> {
        let offset = self.stream.position();
        let raw = self.stream.read_u8()?;
        TypedDataKind::try_from(raw)
            .map_err(|_| SnapshotError::typed_data(offset, format!("unknown element kind {raw}")))
    }

    fn read_record(&mut self, depth: usize) -> SnapshotResult<B::Node> {
        let offset = self.stream.position();
        let tag = self.stream.read_u8()?;
        match classify(tag) {
            TagClass::Immediate(value) => self.builder.small_integer(value),
            TagClass::BackRef(low) => self.read_back_ref(low, offset),
            TagClass::Object(kind) => self.read_object(kind, tag, offset, depth),
            TagClass::Unknown => Err(SnapshotError::bad_tag(tag, offset, "unknown object kind")),
        }
    }

    fn read_back_ref(&mut self, low: u8, offset: usize) -> SnapshotResult<B::Node> {
        let high = self.stream.read_uvarint()?;
        let index = high
            .checked_mul(1 << 7)
            .map(|shifted| shifted | u64::from(low))
            .unwrap_or(u64::MAX);
        usize::try_from(index)
            .ok()
            .and_then(|slot| self.table.get(slot).copied())
            .ok_or(SnapshotError::BackRefOutOfRange {
                index,
                table_len: self.table.len(),
                offset,
            })
    }

    fn read_object(
        &mut self,
        kind: ObjectTag,
        tag: u8,
        offset: usize,
        depth: usize,
    ) -> SnapshotResult<B::Node> {
        match kind {
            ObjectTag::Null => self.builder.null(),
            ObjectTag::True => self.builder.boolean(true),
            ObjectTag::False => self.builder.boolean(false),
            ObjectTag::Smi => {
                let value = self.stream.read_ivarint()?;
                if !Value::is_smi_range(value) {
                    return Err(SnapshotError::bad_tag(tag, offset, "smi record outside smi range"));
                }
                self.builder.small_integer(value)
            }
            ObjectTag::Mint => {
                let value = self.stream.read_ivarint()?;
                let node = self.builder.mint(value)?;
                Ok(self.register(node))
            }
            ObjectTag::Bigint => {
                let sign_offset = self.stream.position();
                let negative = match self.stream.read_u8()? {
                    0 => false,
                    1 => true,
                    _ => {
                        return Err(SnapshotError::MalformedBigint {
                            offset: sign_offset,
                            reason: "sign byte is not 0 or 1",
                        })
                    }
                };
                let count = self.read_length("bigint digits")?;
                let digits_offset = self.stream.position();
                let digits = self.stream.read_bytes(count)?;
                BigintDigits::validate_wire(negative, digits).map_err(|reason| {
                    SnapshotError::MalformedBigint {
                        offset: digits_offset,
                        reason,
                    }
                })?;
                let value = BigintDigits {
                    negative,
                    digits: digits.iter().map(|&b| char::from(b)).collect(),
                };
                let node = self.builder.bigint(value)?;
                Ok(self.register(node))
            }
            ObjectTag::Double => {
                let bits = self.stream.read_u64_le()?;
                let node = self.builder.double(f64::from_bits(bits))?;
                Ok(self.register(node))
            }
            ObjectTag::Latin1String => {
                let length = self.read_length("string")?;
                let bytes = self.stream.read_bytes(length)?;
                let node = self.builder.latin1_string(bytes)?;
                Ok(self.register(node))
            }
            ObjectTag::Utf16String => {
                let length = self.read_length("string")?;
                let position = self.stream.position();
                let byte_len = length
                    .checked_mul(2)
                    .ok_or_else(|| SnapshotError::truncated(position, usize::MAX, self.stream.remaining()))?;
                let raw = self.stream.read_bytes(byte_len)?;
                let units = raw
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                let node = self.builder.utf16_string(units)?;
                Ok(self.register(node))
            }
            ObjectTag::TypedData => {
                let element_kind = self.read_kind()?;
                let count = self.read_length("typed data")?;
                let position = self.stream.position();
                let byte_len = count.checked_mul(element_kind.element_size()).ok_or_else(|| {
                    SnapshotError::typed_data(position, format!("{count} elements overflow"))
                })?;
                let bytes = self.stream.read_bytes(byte_len)?;
                let node = self.builder.typed_data(element_kind, bytes, position)?;
                Ok(self.register(node))
            }
            ObjectTag::Array => {
                self.check_depth(depth)?;
                let length = self.read_length("array")?;
                // Every element takes at least one byte
                if length > self.stream.remaining() {
                    return Err(SnapshotError::truncated(
                        self.stream.position(),
                        length,
                        self.stream.remaining(),
                    ));
                }
                let shell = self.builder.array_shell(length)?;
                let node = self.builder.shell_node(shell);
                self.register(node);
                for index in 0..length {
                    let element = self.read_record(depth + 1)?;
                    self.builder.array_set(shell, index, element)?;
                }
                Ok(self.builder.shell_node(shell))
            }
            ObjectTag::Map => {
                self.check_depth(depth)?;
                let entries = self.read_length("map")?;
                if entries.saturating_mul(2) > self.stream.remaining() {
                    return Err(SnapshotError::truncated(
                        self.stream.position(),
                        entries.saturating_mul(2),
                        self.stream.remaining(),
                    ));
                }
                let shell = self.builder.map_shell(entries)?;
                let node = self.builder.shell_node(shell);
                self.register(node);
                for _ in 0..entries {
                    let key = self.read_record(depth + 1)?;
                    let value = self.read_record(depth + 1)?;
                    self.builder.map_insert(shell, key, value)?;
                }
                Ok(self.builder.shell_node(shell))
            }
            ObjectTag::TypedDataView => {
                self.check_depth(depth)?;
                let element_kind = self.read_kind()?;
                let offset_position = self.stream.position();
                let offset_in_bytes = usize::try_from(self.stream.read_uvarint()?).map_err(|_| {
                    SnapshotError::typed_data(offset_position, "view offset does not fit in memory")
                })?;
                let length = self.read_length("typed data view")?;
                let shell = self.builder.view_shell(element_kind)?;
                let node = self.builder.shell_node(shell);
                self.register(node);
                let backing_offset = self.stream.position();
                let backing = self.read_record(depth + 1)?;
                self.builder.view_fill(
                    shell,
                    element_kind,
                    backing,
                    offset_in_bytes,
                    length,
                    backing_offset,
                )?;
                Ok(self.builder.shell_node(shell))
            }
            ObjectTag::SendPort => {
                let port = PortId::new(self.stream.read_ivarint()?);
                let node = self.builder.send_port(port)?;
                Ok(self.register(node))
            }
        }
    }
}

/// Message snapshot reader over one received buffer
#[derive(Debug, Clone, Copy)]
pub struct SnapshotReader<'a> {
    bytes: &'a [u8],
    limits: CodecLimits,
}

impl<'a> SnapshotReader<'a> {
    /// Reader using the process-wide codec limits
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            limits: transport_config::global().limits,
        }
    }

    pub fn with_limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Materialise the snapshot as objects in `heap`.
    ///
    /// On failure, objects already allocated stay in the heap unreferenced.
    pub fn read_value(&self, heap: &mut Heap) -> SnapshotResult<Value> {
        GraphReader::new(self.bytes, HeapBuilder::new(heap), self.limits)
            .read_root()
            .inspect_err(|error| debug!(%error, "managed decode failed"))
    }

    /// Materialise the snapshot as nodes in `arena`
    pub fn read_native(&self, arena: &mut NativeArena) -> SnapshotResult<NativeRef> {
        GraphReader::new(self.bytes, ArenaBuilder::new(arena), self.limits)
            .read_root()
            .inspect_err(|error| debug!(%error, "native decode failed"))
    }
}

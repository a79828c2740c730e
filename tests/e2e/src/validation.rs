//! Data validation utilities for E2E tests

use anyhow::{anyhow, ensure, Result};
use isolate_types::{NativeArena, NativeRef, NativeTypedData, NativeValue};
use snapshot_codec::SnapshotWriter;
use transport_config::CodecLimits;

/// Encode a decoded tree again and require the exact original bytes
pub fn validate_reencode(original: &[u8], arena: &NativeArena, root: NativeRef) -> Result<()> {
    let again = SnapshotWriter::host()
        .with_limits(CodecLimits::default())
        .write_native(arena, root)?;
    ensure!(
        again.as_bytes() == original,
        "re-encoded snapshot differs: {} vs {} bytes",
        again.len(),
        original.len()
    );
    Ok(())
}

pub fn elements(arena: &NativeArena, root: NativeRef) -> Result<&[NativeRef]> {
    arena
        .array_elements(root)
        .ok_or_else(|| anyhow!("root is {:?}, expected an array", arena.get(root)))
}

pub fn typed_data(arena: &NativeArena, node: NativeRef) -> Result<NativeTypedData> {
    match arena.get(node) {
        Some(NativeValue::TypedData(data)) => Ok(*data),
        other => Err(anyhow!("expected typed data, found {:?}", other)),
    }
}

/// Require every node in `nodes` to be the same node
pub fn validate_shared(nodes: &[NativeRef]) -> Result<()> {
    if let Some((first, rest)) = nodes.split_first() {
        for node in rest {
            ensure!(node == first, "{:?} is not shared with {:?}", node, first);
        }
    }
    Ok(())
}

//! Process-wide configuration loaded from a file
//!
//! Runs in its own test binary because `transport_config::init` can only
//! succeed once per process.

use std::io::Write;

use assert_matches::assert_matches;
use isolate_types::{NativeArena, ILLEGAL_PORT};
use message_ports::{new_native_port, close_native_port, try_post_native, PortError};
use snapshot_codec::{AllocError, SnapshotError};
use transport_config::TransportConfig;

#[test]
fn test_configured_limits_apply_to_posts() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[limits]
max_message_bytes = 128
max_nesting_depth = 8

[ports]
native_port_workers = 2
thread_name_prefix = "limited"
"#
    )
    .unwrap();

    let config = TransportConfig::load(file.path()).unwrap();
    assert_eq!(config.limits.max_message_bytes, 128);
    transport_config::init(config).unwrap();
    assert!(transport_config::init(TransportConfig::default()).is_err());

    let port = new_native_port(Some("limited"), |_, _, _, _| {}, true).unwrap();

    let mut arena = NativeArena::new();
    let small = arena.string("fits");
    assert!(try_post_native(port, &arena, small).is_ok());

    let big = arena.string("x".repeat(512));
    assert_matches!(
        try_post_native(port, &arena, big),
        Err(PortError::Encode {
            source: SnapshotError::OutOfSpace {
                cause: AllocError::QuotaExceeded { limit: 128, .. },
                ..
            },
            ..
        })
    );

    let mut deep = arena.null();
    for _ in 0..10 {
        deep = arena.array(vec![deep]);
    }
    assert_matches!(
        try_post_native(port, &arena, deep),
        Err(PortError::Encode {
            source: SnapshotError::NestingTooDeep { limit: 8, .. },
            ..
        })
    );
    assert_matches!(
        try_post_native(ILLEGAL_PORT, &arena, small),
        Err(PortError::InvalidPort { .. })
    );
    assert!(close_native_port(port));
}

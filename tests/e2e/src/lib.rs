//! End-to-End Test Framework for the isolate message transport
//!
//! Drives whole messages through the stack: a managed heap is encoded,
//! posted through the global port registry, decoded on a native port and
//! checked against the original graph.

pub mod fixtures;
pub mod framework;
pub mod scenarios;
pub mod validation;

pub use fixtures::CapturePort;
pub use framework::{TestConfig, TestFramework, TestMetrics, TestResult, TestScenario};
pub use scenarios::*;

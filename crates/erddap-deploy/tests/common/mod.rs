//! Shared test utilities for erddap-deploy integration tests.
//!
//! This module provides:
//! - `DatasetsHarness` for copying the fixture tree into a temp directory
//! - `FakeMonitorClient`, an in-memory monitoring service

pub mod fake_monitor;
pub mod harness;

pub use fake_monitor::FakeMonitorClient;
pub use harness::{fixtures_dir, DatasetsHarness};

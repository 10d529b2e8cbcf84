//! Integration tests and utilities for the converge workspace
//!
//! This crate provides a simulated eventually consistent control plane and
//! a handful of resource adapters built on `converge-core`, so the retry
//! executor and the state poller can be exercised end to end.

pub mod adapter;
pub mod control_plane;
pub mod fake;

pub use adapter::{AdapterError, create_function, create_resource, delete_resource};
pub use control_plane::{ApiError, ControlPlane, Resource};
pub use fake::{FakeControlPlane, Lifecycle};

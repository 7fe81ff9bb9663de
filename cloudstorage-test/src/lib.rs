//! Test utilities for the cloudstorage client.
//!
//! This crate provides an in-process fake of the storage service and a tracing initializer for
//! tests. See the modules for all available utilities.

pub mod server;
pub mod tracing;

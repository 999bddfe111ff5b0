//! Test utilities for arena-based testing.
//!
//! This module provides an arena context for emission tests and a helper that
//! runs one function through lowering, allocation and emission into a
//! [`MemorySink`](crate::sink::MemorySink).

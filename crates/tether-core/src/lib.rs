//! # tether-core
//!
//! Low-level process primitives for the Tether launch supervisor.
//!
//! This crate provides the pieces that sit directly on top of system calls:
//! - **Error marshaling**: single-consumption engine errors.
//! - **Log sinks**: the engine-facing logging seam and its stderr sink.
//! - **Wire log relay**: the framed byte protocol for log records crossing
//!   a process boundary.
//! - **Sync pipe**: the one-shot parent/child setup handshake.
//! - **Stdio redirection**: descriptor plumbing performed inside a forked
//!   child.
//! - **Exit status**: reaping a child and normalizing its wait status.
//!
//! Functions documented as child-side run between `fork(2)` and process
//! exit. They never log through `tracing` and only issue raw writes.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod log;
pub mod relay;
pub mod stdio;
pub mod sync_pipe;
pub mod wait;

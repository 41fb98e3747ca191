//! Process launching and container lifecycle for the Tether runtime.
//!
//! The [`engine::Engine`] trait is the seam to whatever actually sets a
//! container up. Everything else here is about driving it safely: the
//! [`launch`] supervisor forks a child per run, the [`registry`] routes
//! synchronous log records, and [`runtime::Runtime`] ties both into a
//! caller-facing API.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod context;
pub mod definition;
pub mod engine;
pub mod host;
pub mod io;
pub mod launch;
pub mod list;
pub mod registry;
pub mod runtime;

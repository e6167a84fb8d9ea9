//! Primitive Integration Tests
//!
//! Atomic cells, transactional cells, agents and futures driven through the
//! `Strand` runtime.

#[path = "../common/mod.rs"]
mod common;

mod agent;
mod atomic_cell;
mod future;
mod transactional_cell;

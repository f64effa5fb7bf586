//! Deterministic, pure logic shared by the step loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod blocks;
pub mod classifier;
pub mod namespace;
pub mod outputs;
pub mod terminal_shape;
pub mod type_expr;
pub mod types;

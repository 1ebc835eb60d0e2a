//! End-to-end tests for the serial line controller.
//!
//! These tests drive the public controller API against mock devices and cover
//! the complete workflow from port acquisition through reading, writing and
//! teardown.

pub mod lifecycle_tests;
pub mod read_loop_tests;
pub mod write_tests;

//! Integration tests for the tape application.
//!
//! These tests drive the streaming layer against an in-process server:
//! - Connection lifecycle and reconnects
//! - Topic subscription frames
//! - Heartbeat replies

pub mod common;

//! Shared helpers for integration tests against a mock backend.

#![allow(dead_code)]

pub mod backend;
pub mod socket_guard;

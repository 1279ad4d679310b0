//! Shared helpers for address handling.

pub mod address_utils;

pub use address_utils::*;

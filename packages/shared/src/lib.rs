//! Shared utilities for Trackline packages.

pub mod logger;
pub mod time;

//! Data transfer objects for the live channel and the REST backend.

pub mod http;
pub mod websocket;

//! Infrastructure layer
//!
//! Concrete implementations of the domain ports: the WebSocket live channel,
//! the REST client, the query cache, local storage and notifications.

pub mod cache;
pub mod channel;
pub mod dto;
pub mod http;
pub mod notification;
pub mod storage;

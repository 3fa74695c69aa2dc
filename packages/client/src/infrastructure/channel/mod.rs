//! Live channel transport.

pub mod reconnect;
pub mod websocket;

pub use reconnect::ReconnectPolicy;
pub use websocket::WebSocketChannel;

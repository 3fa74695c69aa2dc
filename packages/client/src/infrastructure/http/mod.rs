//! REST backend access.

pub mod api_client;
pub mod session;

pub use api_client::ApiClient;
pub use session::SessionTokenProvider;

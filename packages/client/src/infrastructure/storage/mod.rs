//! Local persistence.

pub mod file;

pub use file::FilePushTokenStore;

pub mod queue;
pub mod report;
pub mod request;
pub mod server;
pub mod timing;
pub mod worker;

// Re-export for easier testing
pub use queue::BoundedQueue;
pub use server::{handle_connection, Server, ServerConfig, ShutdownHandle};

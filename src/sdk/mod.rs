pub mod client;
pub mod config;
pub mod session;

pub use client::Client;
pub use config::{new, ClientConfig};
pub use session::Session;

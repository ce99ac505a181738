//! The management API: HTTP/JSON routes and the matching client

pub mod client;
pub mod messages;
pub mod server;

pub use client::MgmtClient;
pub use messages::Envelope;
pub use server::routes;

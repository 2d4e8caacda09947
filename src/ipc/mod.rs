//! IPC module for client communication

mod protocol;
mod server;

pub use server::Server;

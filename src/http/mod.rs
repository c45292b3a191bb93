//! HTTP surface of the gateway

pub mod server;

pub use server::{shutdown_signal, HttpServer, MCP_PATH, SESSION_ID_HEADER};

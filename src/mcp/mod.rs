//! MCP (Model Context Protocol) server implementation
//!
//! Exposes search and document lookup over stdio for tool-calling agents.

mod server;
mod tools;
mod types;

pub use server::McpServer;
pub use types::{McpError, McpRequest, McpResponse};

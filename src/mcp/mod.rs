/// MCP surface: stdio server and tool handlers.
pub mod server;
pub mod tools;

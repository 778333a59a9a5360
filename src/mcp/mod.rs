//! MCP (Model Context Protocol) surface
//!
//! JSON-RPC over stdio: the tool catalogue, argument parsing into mailbox actions, and the
//! server loop that runs each agent's tool call concurrently.

pub mod server;
pub mod tools;
pub mod types;

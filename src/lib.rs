//! Gmail Agent Tools Library
//!
//! Gmail operations for many concurrent agents, each acting on its own mailbox through its own
//! delegated OAuth credential. Exposed to agents as Model Context Protocol (MCP) tools.

pub mod config;
pub mod error;
pub mod gmail;
pub mod mcp;

pub use config::Config;
pub use error::{GmailAgentError, Result};
pub use gmail::encoder::{encode_message, EncodedMessage};
pub use gmail::operation::{Action, OperationExecutor};
pub use gmail::outcome::{OperationResult, Outcome, Presentation};
pub use gmail::token_store::{CredentialRecord, TokenStore};

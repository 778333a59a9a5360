//! Gmail API module
//!
//! Per-agent credentials, message encoding, and the authenticated operations run against the
//! Gmail API on an agent's behalf.

pub mod auth;
pub mod client;
pub mod drafts;
pub mod encoder;
pub mod enrich;
pub mod labels;
pub mod messages;
pub mod operation;
pub mod outcome;
pub mod token_store;
pub mod types;
pub mod utils;

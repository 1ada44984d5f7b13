//! Message store for the chat backend
//!
//! Owns the message document contract, the provisioning of the messages
//! collection and its indexes, the repository over it, and the sweeper that
//! expires messages after the TTL window.

pub mod config;
pub mod db;
pub mod error;
pub mod expiry;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod provision;
pub mod schema;
pub mod services;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use models::{ContentType, Message, MessageTarget, NewMessage};
pub use store::{MemoryMessageStore, MessageRepository, PgMessageStore, SchemaAdmin};

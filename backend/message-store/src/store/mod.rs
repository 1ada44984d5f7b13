//! Storage seam: collection administration and message persistence
//!
//! Two engines implement both traits: [`PgMessageStore`] for PostgreSQL and
//! [`MemoryMessageStore`] for embedded use and tests. Both enforce the same
//! document contract, keep the same index catalogue and answer queries in
//! the same order.

mod memory;
mod postgres;

pub use memory::MemoryMessageStore;
pub use postgres::{ddl_statements, PgMessageStore};

use crate::error::{StoreError, StoreResult};
use crate::models::Message;
use crate::schema::{DocumentValidator, IndexKey, IndexSpec, Namespace, QueryPlan, QueryShape};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

/// Outcome of an idempotent setup step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExists,
}

impl Provisioned {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provisioned::Created => "created",
            Provisioned::AlreadyExists => "already_exists",
        }
    }
}

/// Which messages a query selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    Sender(String),
    Recipient(String),
    Group(String),
    /// Direct messages between two users, both directions
    Conversation { a: String, b: String },
    /// Messages a user sent, plus direct messages they received
    Participant(String),
}

impl MessageFilter {
    pub fn matches(&self, message: &Message) -> bool {
        let sender = message.sender_id.as_str();
        let recipient = message.recipient_id.as_deref();
        match self {
            MessageFilter::Sender(user) => sender == user,
            MessageFilter::Recipient(user) => recipient == Some(user.as_str()),
            MessageFilter::Group(group) => message.group_id.as_deref() == Some(group.as_str()),
            MessageFilter::Conversation { a, b } => {
                (sender == a && recipient == Some(b.as_str()))
                    || (sender == b && recipient == Some(a.as_str()))
            }
            MessageFilter::Participant(user) => {
                sender == user || recipient == Some(user.as_str())
            }
        }
    }

    /// Equality fields per `$or` branch, each sorted by `timestamp` desc
    pub fn shapes(&self) -> Vec<QueryShape> {
        let sort = Some(IndexKey::desc("timestamp"));
        match self {
            MessageFilter::Sender(_) => vec![QueryShape::new(&["sender_id"], sort)],
            MessageFilter::Recipient(_) => vec![QueryShape::new(&["recipient_id"], sort)],
            MessageFilter::Group(_) => vec![QueryShape::new(&["group_id"], sort)],
            MessageFilter::Conversation { .. } => vec![
                QueryShape::new(&["sender_id", "recipient_id"], sort.clone()),
                QueryShape::new(&["sender_id", "recipient_id"], sort),
            ],
            MessageFilter::Participant(_) => vec![
                QueryShape::new(&["sender_id"], sort.clone()),
                QueryShape::new(&["recipient_id"], sort),
            ],
        }
    }
}

/// Filter plus paging; newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub filter: MessageFilter,
    /// Only messages strictly older than this
    pub before: Option<DateTime<Utc>>,
    limit: usize,
    pub offset: usize,
}

impl MessageQuery {
    pub fn new(filter: MessageFilter) -> Self {
        Self {
            filter,
            before: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }

    pub fn before(mut self, cursor: DateTime<Utc>) -> Self {
        self.before = Some(cursor);
        self
    }

    /// Clamped to `1..=MAX_PAGE_SIZE`
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn page_size(&self) -> usize {
        self.limit
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.filter.matches(message) && self.before.map_or(true, |b| message.timestamp < b)
    }
}

/// Newest first; ties broken by id descending
pub fn newest_first(a: &Message, b: &Message) -> Ordering {
    b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id))
}

/// A TTL index as seen by the expiry sweeper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    pub index: String,
    pub field: String,
    pub expire_after: Duration,
}

impl TtlPolicy {
    /// Documents with `field` older than this are due for removal
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.expire_after)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[async_trait]
pub trait SchemaAdmin: Send + Sync {
    fn namespace(&self) -> &Namespace;

    /// Create the collection with `validator`; an identical existing collection is not an error
    async fn create_collection(&self, validator: &DocumentValidator) -> StoreResult<Provisioned>;

    /// Create `index`; the same key pattern with the same options is not an error
    async fn create_index(&self, index: &IndexSpec) -> StoreResult<Provisioned>;

    /// Indexes currently defined on the collection
    async fn indexes(&self) -> StoreResult<Vec<IndexSpec>>;

    async fn ttl_policies(&self) -> StoreResult<Vec<TtlPolicy>> {
        let collection = self.namespace().collection().to_string();
        Ok(self
            .indexes()
            .await?
            .into_iter()
            .filter_map(|index| {
                let expire_after = index.expire_after?;
                match index.keys.as_slice() {
                    [key] => Some(TtlPolicy {
                        index: index.name(&collection),
                        field: key.field.clone(),
                        expire_after,
                    }),
                    _ => None,
                }
            })
            .collect())
    }
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a new message; duplicate ids are rejected
    async fn insert(&self, message: &Message) -> StoreResult<()>;

    /// Validate a raw document against the collection contract, then insert it
    async fn insert_document(&self, document: Value) -> StoreResult<Message> {
        let message = decode_document(&DocumentValidator::message(), document)?;
        self.insert(&message).await?;
        Ok(message)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Message>>;

    async fn find(&self, query: &MessageQuery) -> StoreResult<Vec<Message>>;

    /// Which index serves each branch of `query`
    async fn explain(&self, query: &MessageQuery) -> StoreResult<QueryPlan>;

    async fn mark_read(&self, id: &str, user_id: &str) -> StoreResult<()>;

    async fn mark_delivered(&self, id: &str, user_id: &str) -> StoreResult<()>;

    async fn replace(&self, message: &Message) -> StoreResult<()>;

    /// Set new content on a message sent by `editor_id`, marking it edited at
    /// `at` (never earlier than its `timestamp`); receipts are left untouched
    async fn edit(
        &self,
        id: &str,
        editor_id: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Message>;

    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Delete up to `limit` messages with `timestamp < cutoff`, oldest first
    async fn purge_expired(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<u64>;
}

/// Raw document → typed message, reporting contract violations field by field
pub fn decode_document(validator: &DocumentValidator, document: Value) -> StoreResult<Message> {
    validator.validate(&document)?;
    let message: Message =
        serde_json::from_value(document).map_err(|e| StoreError::Malformed(e.to_string()))?;
    message.validate()?;
    Ok(message)
}

/// Checks every write goes through before reaching an engine
pub(crate) fn validate_for_write(
    validator: Option<&DocumentValidator>,
    message: &Message,
) -> StoreResult<()> {
    message.validate()?;
    if let Some(validator) = validator {
        validator.validate(&message.to_document())?;
    }
    Ok(())
}

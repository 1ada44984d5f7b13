use crate::error::{StoreError, StoreResult};
use crate::metrics;
use crate::models::{ContentType, Message, NewMessage};
use crate::store::{MessageFilter, MessageQuery, MessageRepository};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use validator::{Validate, ValidationError, ValidationErrors};

/// Paging for history reads; `limit` falls back to the store default
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub limit: Option<usize>,
    pub offset: usize,
    pub before: Option<DateTime<Utc>>,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    fn apply(&self, filter: MessageFilter) -> MessageQuery {
        let mut query = MessageQuery::new(filter).offset(self.offset);
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(before) = self.before {
            query = query.before(before);
        }
        query
    }
}

/// Message operations on top of a repository
pub struct MessageService<S> {
    store: Arc<S>,
}

impl<S> Clone for MessageService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

fn track<T>(operation: &str, result: StoreResult<T>) -> StoreResult<T> {
    match &result {
        Ok(_) => metrics::record_write(operation, "success"),
        Err(e) => {
            metrics::record_write(operation, "error");
            if e.is_validation() {
                metrics::record_validation_rejection(e.error_code());
            }
            warn!(operation, error = %e, "Message write failed");
        }
    }
    result
}

impl<S> MessageService<S>
where
    S: MessageRepository,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validate, stamp and persist a new message
    pub async fn send(&self, input: NewMessage) -> StoreResult<Message> {
        track("insert", self.insert_new(input).await)
    }

    async fn insert_new(&self, input: NewMessage) -> StoreResult<Message> {
        input.validate()?;
        let message = input.into_message(Utc::now());
        self.store.insert(&message).await?;
        debug!(
            message_id = %message.id,
            sender_id = %message.sender_id,
            direct = message.is_direct(),
            "Message sent"
        );
        Ok(message)
    }

    pub async fn get(&self, id: &str) -> StoreResult<Message> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Messages the user sent or directly received, newest first
    pub async fn user_messages(&self, user_id: &str, page: &Page) -> StoreResult<Vec<Message>> {
        self.store
            .find(&page.apply(MessageFilter::Participant(user_id.to_string())))
            .await
    }

    pub async fn group_messages(&self, group_id: &str, page: &Page) -> StoreResult<Vec<Message>> {
        self.store
            .find(&page.apply(MessageFilter::Group(group_id.to_string())))
            .await
    }

    /// Both directions of a direct conversation
    pub async fn conversation(
        &self,
        user_a: &str,
        user_b: &str,
        page: &Page,
    ) -> StoreResult<Vec<Message>> {
        let filter = MessageFilter::Conversation {
            a: user_a.to_string(),
            b: user_b.to_string(),
        };
        self.store.find(&page.apply(filter)).await
    }

    pub async fn mark_read(&self, message_id: &str, user_id: &str) -> StoreResult<()> {
        track("mark_read", self.store.mark_read(message_id, user_id).await)
    }

    pub async fn mark_delivered(&self, message_id: &str, user_id: &str) -> StoreResult<()> {
        track(
            "mark_delivered",
            self.store.mark_delivered(message_id, user_id).await,
        )
    }

    /// Replace the content; only the sender may edit
    pub async fn edit(
        &self,
        message_id: &str,
        editor_id: &str,
        content: String,
    ) -> StoreResult<Message> {
        track("edit", self.apply_edit(message_id, editor_id, content).await)
    }

    async fn apply_edit(
        &self,
        message_id: &str,
        editor_id: &str,
        content: String,
    ) -> StoreResult<Message> {
        let message = self.get(message_id).await?;
        if message.sender_id != editor_id {
            return Err(StoreError::NotSender {
                message_id: message_id.to_string(),
                user_id: editor_id.to_string(),
            });
        }

        if message.content_type == ContentType::Text && content.trim().is_empty() {
            let mut errors = ValidationErrors::new();
            let mut err = ValidationError::new("empty_content");
            err.message = Some("text messages must have non-empty content".into());
            errors.add("content", err);
            return Err(StoreError::Validation(errors));
        }

        self.store.edit(message_id, editor_id, &content, Utc::now()).await
    }

    pub async fn delete(&self, message_id: &str) -> StoreResult<()> {
        track("delete", self.store.delete(message_id).await)
    }
}

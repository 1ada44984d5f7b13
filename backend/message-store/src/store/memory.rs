use super::{
    newest_first, validate_for_write, MessageQuery, MessageRepository, Provisioned, SchemaAdmin,
};
use crate::error::{StoreError, StoreResult};
use crate::models::Message;
use crate::schema::{DocumentValidator, IndexSpec, Namespace, QueryPlan};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Collection {
    /// Set by `create_collection`, `create_index`, or the first write
    exists: bool,
    validator: Option<DocumentValidator>,
    indexes: Vec<IndexSpec>,
    documents: HashMap<String, Message>,
}

/// In-process message store
///
/// Enforces the registered validator on every write, keeps the index
/// catalogue for planning, and orders results like the PostgreSQL engine.
/// Clones share the same collection.
#[derive(Debug, Clone)]
pub struct MemoryMessageStore {
    namespace: Namespace,
    inner: Arc<RwLock<Collection>>,
}

impl MemoryMessageStore {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            inner: Arc::new(RwLock::new(Collection::default())),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new(Namespace::default())
    }
}

#[async_trait]
impl SchemaAdmin for MemoryMessageStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn create_collection(&self, validator: &DocumentValidator) -> StoreResult<Provisioned> {
        let mut collection = self.inner.write().await;

        if !collection.exists {
            collection.exists = true;
            collection.validator = Some(validator.clone());
            debug!(namespace = %self.namespace, "Collection created");
            return Ok(Provisioned::Created);
        }

        match &collection.validator {
            Some(existing) if existing == validator => Ok(Provisioned::AlreadyExists),
            Some(_) => Err(StoreError::IncompatibleCollection {
                namespace: self.namespace.to_string(),
                reason: "existing validator differs".to_string(),
            }),
            None => Err(StoreError::IncompatibleCollection {
                namespace: self.namespace.to_string(),
                reason: "collection exists without a validator".to_string(),
            }),
        }
    }

    async fn create_index(&self, index: &IndexSpec) -> StoreResult<Provisioned> {
        let mut collection = self.inner.write().await;
        collection.exists = true;

        let pattern = index.key_pattern();
        if let Some(existing) = collection
            .indexes
            .iter()
            .find(|i| i.key_pattern() == pattern)
        {
            if existing.expire_after == index.expire_after {
                return Ok(Provisioned::AlreadyExists);
            }
            return Err(StoreError::IndexConflict {
                name: existing.name(self.namespace.collection()),
                reason: format!("existing {existing} differs from requested {index}"),
            });
        }

        collection.indexes.push(index.clone());
        Ok(Provisioned::Created)
    }

    async fn indexes(&self) -> StoreResult<Vec<IndexSpec>> {
        Ok(self.inner.read().await.indexes.clone())
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageStore {
    async fn insert(&self, message: &Message) -> StoreResult<()> {
        let mut collection = self.inner.write().await;
        validate_for_write(collection.validator.as_ref(), message)?;

        if collection.documents.contains_key(&message.id) {
            return Err(StoreError::DuplicateId(message.id.clone()));
        }

        collection.exists = true;
        collection
            .documents
            .insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Message>> {
        Ok(self.inner.read().await.documents.get(id).cloned())
    }

    async fn find(&self, query: &MessageQuery) -> StoreResult<Vec<Message>> {
        let collection = self.inner.read().await;
        let mut matched: Vec<&Message> = collection
            .documents
            .values()
            .filter(|m| query.matches(m))
            .collect();
        matched.sort_by(|a, b| newest_first(a, b));

        Ok(matched
            .into_iter()
            .skip(query.offset)
            .take(query.page_size())
            .cloned()
            .collect())
    }

    async fn explain(&self, query: &MessageQuery) -> StoreResult<QueryPlan> {
        let collection = self.inner.read().await;
        Ok(QueryPlan::for_shapes(
            &collection.indexes,
            self.namespace.collection(),
            &query.filter.shapes(),
        ))
    }

    async fn mark_read(&self, id: &str, user_id: &str) -> StoreResult<()> {
        let mut collection = self.inner.write().await;
        let message = collection
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        message.add_reader(user_id);
        Ok(())
    }

    async fn mark_delivered(&self, id: &str, user_id: &str) -> StoreResult<()> {
        let mut collection = self.inner.write().await;
        let message = collection
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        message.add_delivery(user_id);
        Ok(())
    }

    async fn replace(&self, message: &Message) -> StoreResult<()> {
        let mut collection = self.inner.write().await;
        validate_for_write(collection.validator.as_ref(), message)?;

        match collection.documents.get_mut(&message.id) {
            Some(slot) => {
                *slot = message.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(message.id.clone())),
        }
    }

    async fn edit(
        &self,
        id: &str,
        editor_id: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Message> {
        let mut collection = self.inner.write().await;
        let Collection {
            validator,
            documents,
            ..
        } = &mut *collection;

        let stored = documents
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if stored.sender_id != editor_id {
            return Err(StoreError::NotSender {
                message_id: id.to_string(),
                user_id: editor_id.to_string(),
            });
        }

        let mut edited = stored.clone();
        edited.apply_edit(content.to_string(), at.max(edited.timestamp));
        validate_for_write(validator.as_ref(), &edited)?;
        *stored = edited.clone();
        Ok(edited)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<u64> {
        let mut collection = self.inner.write().await;

        let mut expired: Vec<(DateTime<Utc>, String)> = collection
            .documents
            .values()
            .filter(|m| m.timestamp < cutoff)
            .map(|m| (m.timestamp, m.id.clone()))
            .collect();
        expired.sort();
        expired.truncate(limit);

        for (_, id) in &expired {
            collection.documents.remove(id);
        }
        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageTarget, NewMessage};
    use crate::schema::{message_indexes, DEFAULT_MESSAGE_TTL};
    use crate::store::MessageFilter;
    use chrono::Duration;

    fn message_at(sender: &str, recipient: &str, at: DateTime<Utc>) -> Message {
        NewMessage::text(sender, MessageTarget::direct(recipient), "hi").into_message(at)
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = MemoryMessageStore::default();
        let msg = message_at("u1", "u2", Utc::now());
        store.insert(&msg).await.unwrap();
        let err = store.insert(&msg).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == msg.id));
    }

    #[tokio::test]
    async fn find_orders_newest_first_and_pages() {
        let store = MemoryMessageStore::default();
        let base = Utc::now();
        for i in 0..5 {
            store
                .insert(&message_at("u1", "u2", base + Duration::seconds(i)))
                .await
                .unwrap();
        }

        let query = MessageQuery::new(MessageFilter::Recipient("u2".into())).limit(2);
        let page = store.find(&query).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].timestamp, base + Duration::seconds(4));

        let next = store
            .find(&query.clone().before(page[1].timestamp))
            .await
            .unwrap();
        assert_eq!(next[0].timestamp, base + Duration::seconds(2));

        let skipped = store.find(&query.offset(4)).await.unwrap();
        assert_eq!(skipped.len(), 1);
    }

    #[tokio::test]
    async fn receipts_are_sets() {
        let store = MemoryMessageStore::default();
        let msg = message_at("u1", "u2", Utc::now());
        store.insert(&msg).await.unwrap();

        store.mark_read(&msg.id, "u2").await.unwrap();
        store.mark_read(&msg.id, "u2").await.unwrap();
        store.mark_delivered(&msg.id, "u1").await.unwrap();

        let stored = store.get(&msg.id).await.unwrap().unwrap();
        assert_eq!(stored.read_by, vec!["u1".to_string(), "u2".to_string()]);
        assert_eq!(stored.delivered_to, vec!["u1".to_string()]);

        assert!(matches!(
            store.mark_read("missing", "u2").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn replace_requires_existing_valid_document() {
        let store = MemoryMessageStore::default();
        store
            .create_collection(&DocumentValidator::message())
            .await
            .unwrap();
        let mut msg = message_at("u1", "u2", Utc::now());
        assert!(matches!(store.replace(&msg).await, Err(StoreError::NotFound(_))));

        store.insert(&msg).await.unwrap();
        msg.content = "changed".into();
        store.replace(&msg).await.unwrap();
        assert_eq!(store.get(&msg.id).await.unwrap().unwrap().content, "changed");

        msg.read_by.push("u1".into());
        assert!(store.replace(&msg).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn edit_keeps_receipts_and_checks_sender() {
        let store = MemoryMessageStore::default();
        let msg = message_at("u1", "u2", Utc::now());
        store.insert(&msg).await.unwrap();
        store.mark_read(&msg.id, "u2").await.unwrap();

        let edited = store
            .edit(&msg.id, "u1", "fixed", msg.timestamp - Duration::seconds(5))
            .await
            .unwrap();
        assert!(edited.is_edited);
        assert_eq!(edited.edit_timestamp, Some(msg.timestamp));
        assert_eq!(edited.read_by, vec!["u1".to_string(), "u2".to_string()]);

        assert!(matches!(
            store.edit(&msg.id, "u2", "nope", Utc::now()).await,
            Err(StoreError::NotSender { .. })
        ));
        assert!(matches!(
            store.edit("missing", "u1", "nope", Utc::now()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn index_with_different_ttl_conflicts() {
        let store = MemoryMessageStore::default();
        for index in message_indexes(DEFAULT_MESSAGE_TTL) {
            store.create_index(&index).await.unwrap();
        }
        let shorter = message_indexes(std::time::Duration::from_secs(60))
            .pop()
            .unwrap();
        assert!(matches!(
            store.create_index(&shorter).await,
            Err(StoreError::IndexConflict { .. })
        ));
    }

    #[tokio::test]
    async fn auto_created_collection_is_incompatible() {
        let store = MemoryMessageStore::default();
        store
            .insert(&message_at("u1", "u2", Utc::now()))
            .await
            .unwrap();
        assert!(matches!(
            store.create_collection(&DocumentValidator::message()).await,
            Err(StoreError::IncompatibleCollection { .. })
        ));
    }

    #[tokio::test]
    async fn purge_respects_limit_and_cutoff() {
        let store = MemoryMessageStore::default();
        let now = Utc::now();
        for days in [10, 9, 8, 1] {
            store
                .insert(&message_at("u1", "u2", now - Duration::days(days)))
                .await
                .unwrap();
        }

        let cutoff = now - Duration::days(7);
        assert_eq!(store.purge_expired(cutoff, 2).await.unwrap(), 2);
        assert_eq!(store.purge_expired(cutoff, 2).await.unwrap(), 1);
        assert_eq!(store.purge_expired(cutoff, 2).await.unwrap(), 0);
        assert_eq!(store.len().await, 1);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use message_store::models::ContentType;
use message_store::provision::provision;
use message_store::schema::{QueryPlan, DEFAULT_MESSAGE_TTL};
use message_store::services::{MessageService, Page};
use message_store::store::{MemoryMessageStore, MessageQuery};
use message_store::{Message, MessageRepository, MessageTarget, NewMessage, StoreError, StoreResult};
use std::sync::Arc;

/// Records a read receipt for `u2` right before every edit lands, as a
/// concurrent reader would
struct ReadDuringEdit {
    inner: MemoryMessageStore,
}

#[async_trait]
impl MessageRepository for ReadDuringEdit {
    async fn insert(&self, message: &Message) -> StoreResult<()> {
        self.inner.insert(message).await
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Message>> {
        self.inner.get(id).await
    }

    async fn find(&self, query: &MessageQuery) -> StoreResult<Vec<Message>> {
        self.inner.find(query).await
    }

    async fn explain(&self, query: &MessageQuery) -> StoreResult<QueryPlan> {
        self.inner.explain(query).await
    }

    async fn mark_read(&self, id: &str, user_id: &str) -> StoreResult<()> {
        self.inner.mark_read(id, user_id).await
    }

    async fn mark_delivered(&self, id: &str, user_id: &str) -> StoreResult<()> {
        self.inner.mark_delivered(id, user_id).await
    }

    async fn replace(&self, message: &Message) -> StoreResult<()> {
        self.inner.mark_read(&message.id, "u2").await?;
        self.inner.replace(message).await
    }

    async fn edit(
        &self,
        id: &str,
        editor_id: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Message> {
        self.inner.mark_read(id, "u2").await?;
        self.inner.edit(id, editor_id, content, at).await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.inner.delete(id).await
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>, limit: usize) -> StoreResult<u64> {
        self.inner.purge_expired(cutoff, limit).await
    }
}

async fn service() -> MessageService<MemoryMessageStore> {
    let store = Arc::new(MemoryMessageStore::default());
    provision(store.as_ref(), DEFAULT_MESSAGE_TTL).await.unwrap();
    MessageService::new(store)
}

#[tokio::test]
async fn send_stamps_id_and_sender_receipts() {
    let service = service().await;
    let sent = service
        .send(NewMessage::text("u1", MessageTarget::direct("u2"), "hello"))
        .await
        .unwrap();

    assert!(!sent.id.is_empty());
    assert_eq!(sent.content_type, ContentType::Text);
    assert!(sent.is_read_by("u1"));
    assert!(sent.is_delivered_to("u1"));
    assert!(!sent.is_edited);

    let fetched = service.get(&sent.id).await.unwrap();
    assert_eq!(fetched, sent);
}

#[tokio::test]
async fn send_rejects_blank_text() {
    let service = service().await;
    let err = service
        .send(NewMessage::text("u1", MessageTarget::group("g1"), "   "))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(service.store().is_empty().await);
}

#[tokio::test]
async fn replies_keep_their_parent() {
    let service = service().await;
    let parent = service
        .send(NewMessage::text("u1", MessageTarget::group("g1"), "question"))
        .await
        .unwrap();
    let reply = service
        .send(NewMessage::text("u2", MessageTarget::group("g1"), "answer").replying_to(&parent.id))
        .await
        .unwrap();

    assert!(reply.is_reply());
    assert_eq!(reply.reply_to_id.as_deref(), Some(parent.id.as_str()));
}

#[tokio::test]
async fn receipts_are_recorded_once() {
    let service = service().await;
    let sent = service
        .send(NewMessage::text("u1", MessageTarget::group("g1"), "hi"))
        .await
        .unwrap();

    service.mark_delivered(&sent.id, "u2").await.unwrap();
    service.mark_read(&sent.id, "u2").await.unwrap();
    service.mark_read(&sent.id, "u2").await.unwrap();

    let stored = service.get(&sent.id).await.unwrap();
    assert_eq!(stored.read_by, vec!["u1", "u2"]);
    assert_eq!(stored.delivered_to, vec!["u1", "u2"]);
}

#[tokio::test]
async fn receipts_on_missing_message_fail() {
    let service = service().await;
    assert!(matches!(
        service.mark_read("missing", "u1").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn only_the_sender_can_edit() {
    let service = service().await;
    let sent = service
        .send(NewMessage::text("u1", MessageTarget::direct("u2"), "helo"))
        .await
        .unwrap();

    let err = service
        .edit(&sent.id, "u2", "hijacked".into())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotSender { .. }));

    let edited = service.edit(&sent.id, "u1", "hello".into()).await.unwrap();
    assert!(edited.is_edited);
    assert_eq!(edited.content, "hello");
    assert!(edited.edit_timestamp.unwrap() >= edited.timestamp);
    assert_eq!(service.get(&sent.id).await.unwrap(), edited);
}

#[tokio::test]
async fn edit_keeps_receipts_recorded_meanwhile() {
    let inner = MemoryMessageStore::default();
    provision(&inner, DEFAULT_MESSAGE_TTL).await.unwrap();
    let service = MessageService::new(Arc::new(ReadDuringEdit {
        inner: inner.clone(),
    }));

    let sent = service
        .send(NewMessage::text("u1", MessageTarget::direct("u2"), "helo"))
        .await
        .unwrap();
    assert!(!sent.is_read_by("u2"));

    let edited = service.edit(&sent.id, "u1", "hello".into()).await.unwrap();
    assert_eq!(edited.content, "hello");
    assert!(edited.is_read_by("u2"));

    let stored = inner.get(&sent.id).await.unwrap().unwrap();
    assert!(stored.is_read_by("u2"));
    assert!(stored.is_edited);
}

#[tokio::test]
async fn edit_to_blank_text_is_rejected() {
    let service = service().await;
    let sent = service
        .send(NewMessage::text("u1", MessageTarget::direct("u2"), "keep"))
        .await
        .unwrap();

    let err = service.edit(&sent.id, "u1", "".into()).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(service.get(&sent.id).await.unwrap().content, "keep");
}

#[tokio::test]
async fn delete_removes_once() {
    let service = service().await;
    let sent = service
        .send(NewMessage::text("u1", MessageTarget::direct("u2"), "bye"))
        .await
        .unwrap();

    service.delete(&sent.id).await.unwrap();
    assert!(matches!(
        service.get(&sent.id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        service.delete(&sent.id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn history_reads_page_newest_first() {
    let service = service().await;
    let mut sent = Vec::new();
    for i in 0..5 {
        let message = service
            .send(NewMessage::text("u1", MessageTarget::direct("u2"), format!("m{i}")))
            .await
            .unwrap();
        sent.push(message);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    service
        .send(NewMessage::text("u2", MessageTarget::group("g1"), "elsewhere"))
        .await
        .unwrap();

    let first = service
        .conversation("u2", "u1", &Page::first(2))
        .await
        .unwrap();
    let contents: Vec<_> = first.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m4", "m3"]);

    let next = Page {
        limit: Some(2),
        offset: 0,
        before: first.last().map(|m| m.timestamp),
    };
    let second = service.conversation("u1", "u2", &next).await.unwrap();
    let contents: Vec<_> = second.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m2", "m1"]);

    assert_eq!(service.user_messages("u2", &Page::default()).await.unwrap().len(), 6);
    assert_eq!(service.group_messages("g1", &Page::default()).await.unwrap().len(), 1);
}

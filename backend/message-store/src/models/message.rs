use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Upper bound for identifier fields (ids, user ids, group ids)
pub const MAX_ID_LEN: u64 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    File,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [ContentType::Text, ContentType::Image, ContentType::File];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::File => "file",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownContentType(pub String);

impl fmt::Display for UnknownContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown content type {:?}, expected one of: text, image, file", self.0)
    }
}

impl std::error::Error for UnknownContentType {}

impl FromStr for ContentType {
    type Err = UnknownContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "image" => Ok(ContentType::Image),
            "file" => Ok(ContentType::File),
            other => Err(UnknownContentType(other.to_string())),
        }
    }
}

/// Who a message is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageTarget {
    Direct { recipient_id: String },
    Group { group_id: String },
}

impl MessageTarget {
    pub fn direct(recipient_id: impl Into<String>) -> Self {
        MessageTarget::Direct {
            recipient_id: recipient_id.into(),
        }
    }

    pub fn group(group_id: impl Into<String>) -> Self {
        MessageTarget::Group {
            group_id: group_id.into(),
        }
    }

    fn id(&self) -> &str {
        match self {
            MessageTarget::Direct { recipient_id } => recipient_id,
            MessageTarget::Group { group_id } => group_id,
        }
    }
}

/// A persisted chat message
///
/// Field names match the stored document keys. `recipient_id` and
/// `group_id` are kept as two optional columns for storage and indexing;
/// exactly one of them must be set, see [`Message::target`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_message_shape", skip_on_field_errors = false))]
pub struct Message {
    #[validate(length(min = 1, max = 128))]
    pub id: String,

    #[validate(length(min = 1, max = 128))]
    pub sender_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 128))]
    pub recipient_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 128))]
    pub group_id: Option<String>,

    pub content: String,

    pub content_type: ContentType,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub read_by: Vec<String>,

    #[serde(default)]
    pub delivered_to: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 128))]
    pub reply_to_id: Option<String>,

    #[serde(default)]
    pub attachments: Vec<String>,

    #[serde(default)]
    pub is_edited: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_timestamp: Option<DateTime<Utc>>,
}

fn validate_message_shape(message: &Message) -> Result<(), ValidationError> {
    match (&message.recipient_id, &message.group_id) {
        (Some(_), Some(_)) => {
            return Err(shape_error(
                "ambiguous_target",
                "a message is either direct (recipient_id) or group (group_id), not both",
            ))
        }
        (None, None) => {
            return Err(shape_error(
                "missing_target",
                "either recipient_id or group_id must be provided",
            ))
        }
        _ => {}
    }

    if message.edit_timestamp.is_some() && !message.is_edited {
        return Err(shape_error(
            "edit_timestamp_without_edit",
            "edit_timestamp may only be set when is_edited is true",
        ));
    }

    if let Some(edited) = message.edit_timestamp {
        if edited < message.timestamp {
            return Err(shape_error(
                "edit_before_send",
                "edit_timestamp precedes timestamp",
            ));
        }
    }

    if message.reply_to_id.as_deref() == Some(message.id.as_str()) {
        return Err(shape_error("self_reply", "a message cannot reply to itself"));
    }

    for (field, values) in [
        ("read_by", &message.read_by),
        ("delivered_to", &message.delivered_to),
    ] {
        if has_duplicates(values) {
            return Err(shape_error(
                "duplicate_receipt",
                match field {
                    "read_by" => "read_by must not contain duplicate user ids",
                    _ => "delivered_to must not contain duplicate user ids",
                },
            ));
        }
    }

    Ok(())
}

fn shape_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

pub(crate) fn has_duplicates(values: &[String]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().any(|v| !seen.insert(v.as_str()))
}

impl Message {
    /// Direct or group addressing; `None` only for messages that failed validation
    pub fn target(&self) -> Option<MessageTarget> {
        match (&self.recipient_id, &self.group_id) {
            (Some(r), None) => Some(MessageTarget::direct(r.clone())),
            (None, Some(g)) => Some(MessageTarget::group(g.clone())),
            _ => None,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.recipient_id.is_some() && self.group_id.is_none()
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to_id.is_some()
    }

    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.iter().any(|u| u == user_id)
    }

    pub fn is_delivered_to(&self, user_id: &str) -> bool {
        self.delivered_to.iter().any(|u| u == user_id)
    }

    /// Add-to-set on `read_by`; returns false if already present
    pub fn add_reader(&mut self, user_id: &str) -> bool {
        add_to_set(&mut self.read_by, user_id)
    }

    /// Add-to-set on `delivered_to`; returns false if already present
    pub fn add_delivery(&mut self, user_id: &str) -> bool {
        add_to_set(&mut self.delivered_to, user_id)
    }

    pub fn apply_edit(&mut self, content: String, at: DateTime<Utc>) {
        self.content = content;
        self.is_edited = true;
        self.edit_timestamp = Some(at);
    }

    pub fn to_document(&self) -> serde_json::Value {
        // Serialization of this struct cannot fail: all keys are strings
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn add_to_set(set: &mut Vec<String>, user_id: &str) -> bool {
    if set.iter().any(|u| u == user_id) {
        return false;
    }
    set.push(user_id.to_string());
    true
}

/// Input for sending a message; the store assigns `id` and `timestamp`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_new_message", skip_on_field_errors = false))]
pub struct NewMessage {
    #[validate(length(min = 1, max = 128))]
    pub sender_id: String,

    pub target: MessageTarget,

    pub content: String,

    pub content_type: ContentType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 128))]
    pub reply_to_id: Option<String>,

    #[serde(default)]
    pub attachments: Vec<String>,
}

fn validate_new_message(input: &NewMessage) -> Result<(), ValidationError> {
    let target_id = input.target.id();
    if target_id.is_empty() || target_id.len() as u64 > MAX_ID_LEN {
        return Err(shape_error(
            "invalid_target",
            "recipient_id / group_id must be 1..=128 characters",
        ));
    }

    if input.content_type == ContentType::Text && input.content.trim().is_empty() {
        return Err(shape_error(
            "empty_content",
            "text messages must have non-empty content",
        ));
    }

    if input.content_type != ContentType::Text
        && input.attachments.is_empty()
        && input.content.trim().is_empty()
    {
        return Err(shape_error(
            "empty_media",
            "image and file messages need an attachment or content reference",
        ));
    }

    if input.attachments.iter().any(|a| a.trim().is_empty()) {
        return Err(shape_error("empty_attachment", "attachments must not be blank"));
    }

    Ok(())
}

impl NewMessage {
    pub fn text(
        sender_id: impl Into<String>,
        target: MessageTarget,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            target,
            content: content.into(),
            content_type: ContentType::Text,
            reply_to_id: None,
            attachments: Vec::new(),
        }
    }

    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to_id = Some(message_id.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Materialize the message; the sender counts as having read and received it
    pub fn into_message(self, now: DateTime<Utc>) -> Message {
        let (recipient_id, group_id) = match self.target {
            MessageTarget::Direct { recipient_id } => (Some(recipient_id), None),
            MessageTarget::Group { group_id } => (None, Some(group_id)),
        };

        Message {
            id: Uuid::new_v4().to_string(),
            read_by: vec![self.sender_id.clone()],
            delivered_to: vec![self.sender_id.clone()],
            sender_id: self.sender_id,
            recipient_id,
            group_id,
            content: self.content,
            content_type: self.content_type,
            timestamp: now,
            reply_to_id: self.reply_to_id,
            attachments: self.attachments,
            is_edited: false,
            edit_timestamp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample() -> Message {
        Message {
            id: "m1".into(),
            sender_id: "u1".into(),
            recipient_id: Some("u2".into()),
            group_id: None,
            content: "hi".into(),
            content_type: ContentType::Text,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            read_by: vec![],
            delivered_to: vec![],
            reply_to_id: None,
            attachments: vec![],
            is_edited: false,
            edit_timestamp: None,
        }
    }

    #[test]
    fn content_type_round_trips_through_str() {
        for ct in ContentType::ALL {
            assert_eq!(ct.as_str().parse::<ContentType>().unwrap(), ct);
        }
        assert!("video".parse::<ContentType>().is_err());
        assert!("Text".parse::<ContentType>().is_err());
    }

    #[test]
    fn valid_direct_message_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn both_targets_rejected() {
        let mut msg = sample();
        msg.group_id = Some("g1".into());
        assert!(msg.validate().is_err());
    }

    #[test]
    fn no_target_rejected() {
        let mut msg = sample();
        msg.recipient_id = None;
        assert!(msg.validate().is_err());
    }

    #[test]
    fn edit_timestamp_requires_is_edited() {
        let mut msg = sample();
        msg.edit_timestamp = Some(msg.timestamp + Duration::minutes(1));
        assert!(msg.validate().is_err());

        msg.is_edited = true;
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn edit_cannot_precede_send() {
        let mut msg = sample();
        msg.is_edited = true;
        msg.edit_timestamp = Some(msg.timestamp - Duration::seconds(1));
        assert!(msg.validate().is_err());
    }

    #[test]
    fn empty_ids_rejected() {
        let mut msg = sample();
        msg.sender_id = String::new();
        let errors = msg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("sender_id"));
    }

    #[test]
    fn duplicate_receipts_rejected() {
        let mut msg = sample();
        msg.read_by = vec!["u2".into(), "u2".into()];
        assert!(msg.validate().is_err());
    }

    #[test]
    fn add_reader_is_set_like() {
        let mut msg = sample();
        assert!(msg.add_reader("u2"));
        assert!(!msg.add_reader("u2"));
        assert_eq!(msg.read_by, vec!["u2".to_string()]);
        assert!(msg.is_read_by("u2"));
    }

    #[test]
    fn serialized_keys_match_document_shape() {
        let doc = sample().to_document();
        assert_eq!(doc["content_type"], "text");
        assert_eq!(doc["recipient_id"], "u2");
        assert!(doc.get("group_id").is_none());
        assert!(doc.get("edit_timestamp").is_none());
        assert_eq!(doc["is_edited"], false);
    }

    #[test]
    fn deserialize_defaults_optional_fields() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "sender_id": "u1",
            "recipient_id": "u2",
            "content": "hi",
            "content_type": "text",
            "timestamp": "2024-01-01T12:00:00Z"
        }))
        .unwrap();
        assert!(msg.read_by.is_empty());
        assert!(msg.attachments.is_empty());
        assert!(!msg.is_edited);
    }

    #[test]
    fn new_message_marks_sender_as_reader() {
        let now = Utc::now();
        let msg = NewMessage::text("u1", MessageTarget::group("g1"), "hello").into_message(now);
        assert_eq!(msg.group_id.as_deref(), Some("g1"));
        assert!(msg.recipient_id.is_none());
        assert!(msg.is_read_by("u1"));
        assert!(msg.is_delivered_to("u1"));
        assert_eq!(msg.timestamp, now);
        assert!(Uuid::parse_str(&msg.id).is_ok());
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn new_text_message_requires_content() {
        let input = NewMessage::text("u1", MessageTarget::direct("u2"), "   ");
        assert!(input.validate().is_err());
    }

    #[test]
    fn new_image_message_accepts_attachment_only() {
        let mut input = NewMessage::text("u1", MessageTarget::direct("u2"), "");
        input.content_type = ContentType::Image;
        assert!(input.validate().is_err());

        let input = input.with_attachments(vec!["s3://bucket/cat.png".into()]);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn new_message_rejects_blank_target() {
        let input = NewMessage::text("u1", MessageTarget::direct(""), "hi");
        assert!(input.validate().is_err());
    }
}

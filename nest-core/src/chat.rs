//! The shared chat in `chats/812_917`.
//!
//! The whole conversation lives in one document, `{ messages: [...] }`.
//! Sending rewrites the document; marking read merges the updated list back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nest_store::{Database, DocRef, Subscription};

use crate::couple::{pair_id, Member};
use crate::error::NestError;

pub const CHATS: &str = "chats";

/// Gap after which the timeline gets a new time marker.
const MARKER_GAP_MS: i64 = 3 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAuthor {
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub user: ChatAuthor,
    /// Read receipt. Messages stored without one are neither read nor unread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

impl ChatMessage {
    pub fn new(from: Member, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            created_at,
            user: ChatAuthor {
                id: from.code().to_string(),
            },
            is_read: Some(false),
        }
    }

    pub fn is_from(&self, member: Member) -> bool {
        self.user.id == member.code()
    }

    pub fn was_read(&self) -> bool {
        self.is_read == Some(true)
    }

    /// Sent by the other member and explicitly marked unread.
    pub fn is_unread_by(&self, reader: Member) -> bool {
        !self.is_from(reader) && self.is_read == Some(false)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatDocument {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

/// One row of the rendered conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEntry {
    Marker(DateTime<Utc>),
    Message(ChatMessage),
}

/// Messages oldest first, with a time marker before the first message and
/// before every message sent more than three minutes after the previous one.
pub fn timeline(messages: &[ChatMessage]) -> Vec<TimelineEntry> {
    let mut sorted = messages.to_vec();
    sorted.sort_by_key(|m| m.created_at);

    let mut entries = Vec::with_capacity(sorted.len() + 1);
    let mut last: Option<DateTime<Utc>> = None;
    for message in sorted {
        let gap = last.map(|prev| (message.created_at - prev).num_milliseconds());
        if gap.map_or(true, |ms| ms > MARKER_GAP_MS) {
            entries.push(TimelineEntry::Marker(message.created_at));
        }
        last = Some(message.created_at);
        entries.push(TimelineEntry::Message(message));
    }
    entries
}

/// The couple's conversation.
#[derive(Clone)]
pub struct Chat {
    db: Database,
    chat_id: String,
}

impl Chat {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            chat_id: pair_id(),
        }
    }

    pub fn doc(&self) -> DocRef {
        self.db.doc(CHATS, &self.chat_id)
    }

    pub fn messages(&self) -> Result<Vec<ChatMessage>, NestError> {
        Ok(self
            .doc()
            .get_as::<ChatDocument>()?
            .map(|d| d.messages)
            .unwrap_or_default())
    }

    /// Append a message. Whitespace-only text is rejected; the text is
    /// otherwise stored as typed.
    pub fn send(&self, from: Member, text: &str) -> Result<ChatMessage, NestError> {
        if text.trim().is_empty() {
            return Err(NestError::EmptyText);
        }
        let message = ChatMessage::new(from, text, Utc::now());

        let mut messages = self.messages()?;
        messages.push(message.clone());
        self.doc().set_as(&ChatDocument { messages })?;

        log::debug!("{from} sent message {}", message.id);
        Ok(message)
    }

    pub fn unread_for(&self, reader: Member) -> Result<Vec<ChatMessage>, NestError> {
        Ok(self
            .messages()?
            .into_iter()
            .filter(|m| m.is_unread_by(reader))
            .collect())
    }

    /// Mark every partner message `reader` has not read. Writes only when
    /// something changed; returns how many messages flipped.
    pub fn mark_read(&self, reader: Member) -> Result<usize, NestError> {
        let mut messages = self.messages()?;
        let mut flipped = 0;
        for message in messages.iter_mut().filter(|m| m.is_unread_by(reader)) {
            message.is_read = Some(true);
            flipped += 1;
        }
        if flipped > 0 {
            self.doc().update_as(&ChatDocument { messages })?;
            log::debug!("{reader} read {flipped} messages");
        }
        Ok(flipped)
    }

    /// Follow the conversation as `reader`. The callback gets the full
    /// message list on every change; incoming messages are marked read as
    /// they arrive.
    pub fn subscribe<F>(&self, reader: Member, callback: F) -> Subscription
    where
        F: Fn(&[ChatMessage]) + Send + Sync + 'static,
    {
        let chat = self.clone();
        self.doc().on_snapshot(move |snap| {
            let messages: Vec<ChatMessage> = match snap.get("messages") {
                Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                    log::warn!("Undecodable chat messages: {e}");
                    Vec::new()
                }),
                None => Vec::new(),
            };
            callback(&messages);

            if messages.iter().any(|m| m.is_unread_by(reader)) {
                if let Err(e) = chat.mark_read(reader) {
                    log::error!("Failed to mark messages read for {reader}: {e}");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nest_store::MemoryStorage;
    use std::sync::{Arc, Mutex};

    fn chat() -> Chat {
        Chat::new(Database::open(Arc::new(MemoryStorage::new())))
    }

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 14, 20, minute, second).unwrap()
    }

    #[test]
    fn test_send_appends_and_rejects_blank() {
        let chat = chat();
        assert!(matches!(chat.send(Member::Code812, "   "), Err(NestError::EmptyText)));

        chat.send(Member::Code812, "在吗").unwrap();
        let sent = chat.send(Member::Code917, " 在 ").unwrap();
        assert_eq!(sent.text, " 在 ");

        let messages = chat.messages().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_from(Member::Code812));
        assert!(!messages[1].was_read());
    }

    #[test]
    fn test_send_overwrites_other_fields() {
        let chat = chat();
        let mut extra = serde_json::Map::new();
        extra.insert("pinned".into(), serde_json::json!(true));
        chat.doc().set(extra).unwrap();

        chat.send(Member::Code812, "hi").unwrap();
        let doc = chat.doc().get().unwrap().unwrap();
        assert!(doc.get("pinned").is_none());
    }

    #[test]
    fn test_mark_read_only_partner_messages() {
        let chat = chat();
        chat.send(Member::Code812, "a").unwrap();
        chat.send(Member::Code917, "b").unwrap();
        chat.send(Member::Code812, "c").unwrap();

        assert_eq!(chat.unread_for(Member::Code917).unwrap().len(), 2);
        assert_eq!(chat.mark_read(Member::Code917).unwrap(), 2);
        assert_eq!(chat.mark_read(Member::Code917).unwrap(), 0);

        let messages = chat.messages().unwrap();
        assert!(messages[0].was_read());
        assert!(!messages[1].was_read());
        assert_eq!(chat.unread_for(Member::Code812).unwrap().len(), 1);
    }

    #[test]
    fn test_subscribe_marks_incoming_read() {
        let chat = chat();
        let deliveries: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let d = deliveries.clone();
        let _sub = chat.subscribe(Member::Code917, move |messages| {
            d.lock().unwrap().push(messages.iter().filter(|m| m.was_read()).count());
        });

        chat.send(Member::Code812, "晚安").unwrap();

        // initial (empty), the send, then the read receipt written back
        assert_eq!(*deliveries.lock().unwrap(), vec![0, 0, 1]);
        assert!(chat.unread_for(Member::Code917).unwrap().is_empty());
    }

    #[test]
    fn test_subscribe_ignores_own_messages() {
        let chat = chat();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let _sub = chat.subscribe(Member::Code812, move |_| *c.lock().unwrap() += 1);

        chat.send(Member::Code812, "hello").unwrap();
        assert_eq!(*count.lock().unwrap(), 2);
        assert!(!chat.messages().unwrap()[0].was_read());
    }

    #[test]
    fn test_timeline_markers() {
        let mut messages = vec![
            ChatMessage::new(Member::Code812, "c", at(10, 0)),
            ChatMessage::new(Member::Code812, "a", at(0, 0)),
            ChatMessage::new(Member::Code917, "b", at(3, 0)),
        ];
        messages.push(ChatMessage::new(Member::Code917, "d", at(13, 1)));

        let entries = timeline(&messages);
        let shape: Vec<String> = entries
            .iter()
            .map(|e| match e {
                TimelineEntry::Marker(t) => format!("@{}", t.format("%M:%S")),
                TimelineEntry::Message(m) => m.text.clone(),
            })
            .collect();
        // exactly three minutes apart shares a marker; 3:00 → 10:00 and 10:00 → 13:01 do not
        assert_eq!(shape, vec!["@00:00", "a", "b", "@10:00", "c", "@13:01", "d"]);
        assert!(timeline(&[]).is_empty());
    }

    #[test]
    fn test_message_wire_format() {
        let message = ChatMessage::new(Member::Code917, "hi", at(0, 0));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["user"]["_id"], "917");
        assert_eq!(value["isRead"], false);
        assert_eq!(value["createdAt"], "2025-02-14T20:00:00Z");
        assert!(value["_id"].is_string());
    }
    #[test]
    fn test_missing_read_receipt_is_not_unread() {
        let chat = chat();
        let mut doc = serde_json::Map::new();
        doc.insert(
            "messages".into(),
            serde_json::json!([{
                "_id": "legacy",
                "text": "old",
                "createdAt": "2024-01-01T00:00:00Z",
                "user": {"_id": "812"}
            }]),
        );
        chat.doc().set(doc).unwrap();

        let messages = chat.messages().unwrap();
        assert_eq!(messages[0].is_read, None);
        assert!(chat.unread_for(Member::Code917).unwrap().is_empty());
        assert_eq!(chat.mark_read(Member::Code917).unwrap(), 0);
        let value = serde_json::to_value(&messages[0]).unwrap();
        assert!(value.get("isRead").is_none());
    }

    #[test]
    fn test_auto_read_leaves_observers_on_stored_state() {
        let chat = chat();
        let mut feed = chat.db.store().watch();
        let _reader = chat.subscribe(Member::Code917, |_| {});

        let last_seen = Arc::new(Mutex::new(None));
        let l = last_seen.clone();
        let _observer = chat.doc().on_snapshot(move |snap| {
            *l.lock().unwrap() = snap
                .get("messages")
                .and_then(|m| m[0].get("isRead").cloned());
        });

        chat.send(Member::Code812, "hi").unwrap();

        assert!(chat.messages().unwrap()[0].was_read());
        assert_eq!(*last_seen.lock().unwrap(), Some(serde_json::json!(true)));

        let published: Vec<Option<serde_json::Value>> = std::iter::from_fn(|| feed.try_recv().ok())
            .map(|change| {
                change
                    .data
                    .as_ref()
                    .and_then(|d| d.get("messages"))
                    .and_then(|m| m[0].get("isRead").cloned())
            })
            .collect();
        assert_eq!(
            published,
            vec![Some(serde_json::json!(false)), Some(serde_json::json!(true))]
        );
    }
}

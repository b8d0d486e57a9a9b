use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Prefix of ids generated on this side for messages the server has not confirmed.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Phòng chat, định danh bằng UUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub uuid: String,
    #[serde(rename = "name", alias = "displayName", default)]
    pub display_name: String,
}

impl Room {
    pub fn new(uuid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            display_name: display_name.into(),
        }
    }

    /// Label shown in the sidebar; rooms without a name fall back to their uuid.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.uuid
        } else {
            &self.display_name
        }
    }
}

/// The identity of the person using this client.
///
/// Every author comparison goes through the session handed to the component,
/// there is no other place the current username lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub nickname: String,
}

impl Session {
    pub fn new(username: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            nickname: nickname.into(),
        }
    }

    pub fn is_own(&self, author: &str) -> bool {
        author == self.username
    }
}

/// Where a message entered the room's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    History,
    Live,
    Optimistic,
}

/// Domain model đại diện một tin nhắn chat đã được đưa vào danh sách của phòng.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub author: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub is_own: bool,
    pub origin: MessageOrigin,
    pub client_id: Option<Uuid>,
}

impl ChatMessage {
    /// Builds a message from a server record, tagging ownership against `session`.
    pub fn from_wire(wire: WireMessage, origin: MessageOrigin, session: &Session) -> Self {
        let is_own = session.is_own(&wire.username);
        Self {
            id: wire.id.unwrap_or_else(local_id),
            author: wire.username,
            body: wire.message,
            sent_at: wire.sent_at.unwrap_or_else(Utc::now),
            is_own,
            origin,
            client_id: wire.client_id,
        }
    }

    pub fn optimistic(session: &Session, body: impl Into<String>, client_id: Uuid) -> Self {
        Self {
            id: format!("{LOCAL_ID_PREFIX}{client_id}"),
            author: session.username.clone(),
            body: body.into(),
            sent_at: Utc::now(),
            is_own: true,
            origin: MessageOrigin::Optimistic,
            client_id: Some(client_id),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.origin == MessageOrigin::Optimistic
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.sent_at.format("%H:%M:%S"),
            self.author,
            self.body
        )
    }
}

/// A message record as the server sends it, both in history pages and on the socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WireMessage {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "clientId", deserialize_with = "lenient_uuid")]
    pub client_id: Option<Uuid>,
    #[serde(
        default,
        rename = "sentAt",
        alias = "createdAt",
        deserialize_with = "lenient_timestamp"
    )]
    pub sent_at: Option<DateTime<Utc>>,
}

fn local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Text(text)) if !text.is_empty() => Some(text),
        Some(RawId::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

/// A `clientId` that is not one of ours (not a UUID) only means no optimistic
/// entry can match it; the message itself is still kept.
fn lenient_uuid<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(text)) => Uuid::parse_str(&text).ok(),
        _ => None,
    })
}

/// Accepts RFC 3339, offset-less datetimes (taken as UTC) and epoch millis.
/// Anything else becomes `None` and the arrival time is used instead.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(text)) => parse_timestamp(&text),
        Some(serde_json::Value::Number(number)) => {
            number.as_i64().and_then(DateTime::from_timestamp_millis)
        }
        _ => None,
    })
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    text.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Author shown for system notices
const SYSTEM_USER_ID: &str = "system";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessageError {
    #[error("Message {0} has no content")]
    Empty(String),

    #[error("Message {0} has more than one kind of content")]
    MixedContent(String),

    #[error("Latitude {0} is out of range (-90..=90)")]
    InvalidLatitude(f64),

    #[error("Longitude {0} is out of range (-180..=180)")]
    InvalidLongitude(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl ChatUser {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn system() -> Self {
        Self::new(SYSTEM_USER_ID, "")
    }

    /// Name for display, falling back to the id for anonymous users
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, MessageError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(MessageError::InvalidLatitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(MessageError::InvalidLongitude(longitude));
        }
        Ok(Self { latitude, longitude })
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

/// Borrowed view of a message's primary content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageContent<'a> {
    Text(&'a str),
    Image(&'a str),
    Location(GeoPoint),
    System(&'a str),
}

/// A single chat message as stored remotely and in the offline cache.
///
/// Field names follow the document layout used by the remote collection
/// (`_id`, `createdAt`, `user`), so cached snapshots and remote documents
/// share one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub user: ChatUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub system: bool,
}

impl Message {
    fn base(user: ChatUser) -> Self {
        Self {
            id: new_message_id(),
            created_at: Utc::now(),
            user,
            text: None,
            image: None,
            location: None,
            system: false,
        }
    }

    pub fn text(user: ChatUser, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::base(user)
        }
    }

    pub fn image(user: ChatUser, url: impl Into<String>) -> Self {
        Self {
            image: Some(url.into()),
            ..Self::base(user)
        }
    }

    pub fn location(user: ChatUser, point: GeoPoint) -> Self {
        Self {
            location: Some(point),
            ..Self::base(user)
        }
    }

    pub fn system(notice: impl Into<String>) -> Self {
        Self {
            text: Some(notice.into()),
            system: true,
            ..Self::base(ChatUser::system())
        }
    }

    /// Override the creation time (used when rebuilding remote documents)
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Check that a non-system message carries exactly one kind of content.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.system {
            return Ok(());
        }

        let kinds = [
            self.text.as_deref().is_some_and(|t| !t.trim().is_empty()),
            self.image.as_deref().is_some_and(|u| !u.is_empty()),
            self.location.is_some(),
        ];

        match kinds.iter().filter(|&&present| present).count() {
            0 => Err(MessageError::Empty(self.id.clone())),
            1 => Ok(()),
            _ => Err(MessageError::MixedContent(self.id.clone())),
        }
    }

    /// Primary content of the message. Invalid messages resolve by precedence
    /// text > image > location, which keeps rendering total.
    pub fn content(&self) -> MessageContent<'_> {
        if self.system {
            return MessageContent::System(self.text.as_deref().unwrap_or_default());
        }
        if let Some(text) = self.text.as_deref().filter(|t| !t.trim().is_empty()) {
            return MessageContent::Text(text);
        }
        if let Some(url) = self.image.as_deref().filter(|u| !u.is_empty()) {
            return MessageContent::Image(url);
        }
        match self.location {
            Some(point) => MessageContent::Location(point),
            None => MessageContent::Text(""),
        }
    }
}

/// Generate a message id. The remote store uses it as the document id.
pub fn new_message_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ChatUser {
        ChatUser::new("u1", "Alice")
    }

    #[test]
    fn test_single_content_messages_are_valid() {
        assert!(Message::text(alice(), "hi").validate().is_ok());
        assert!(Message::image(alice(), "https://img/1.png").validate().is_ok());
        let point = GeoPoint::new(48.85, 2.35).expect("valid point");
        assert!(Message::location(alice(), point).validate().is_ok());
        assert!(Message::system("Alice joined").validate().is_ok());
    }

    #[test]
    fn test_mixed_and_empty_content_rejected() {
        let mut msg = Message::text(alice(), "hi");
        msg.image = Some("https://img/1.png".to_string());
        assert!(matches!(msg.validate(), Err(MessageError::MixedContent(_))));

        let blank = Message::text(alice(), "   ");
        assert!(matches!(blank.validate(), Err(MessageError::Empty(_))));
    }

    #[test]
    fn test_content_view() {
        let msg = Message::image(alice(), "https://img/1.png");
        assert_eq!(msg.content(), MessageContent::Image("https://img/1.png"));

        let notice = Message::system("Connection lost");
        assert_eq!(notice.content(), MessageContent::System("Connection lost"));
        assert_eq!(notice.user.id, "system");
    }

    #[test]
    fn test_geo_point_bounds() {
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert_eq!(
            GeoPoint::new(91.0, 0.0),
            Err(MessageError::InvalidLatitude(91.0))
        );
        assert_eq!(
            GeoPoint::new(0.0, -181.0),
            Err(MessageError::InvalidLongitude(-181.0))
        );
    }

    #[test]
    fn test_serialized_field_names() {
        let msg = Message::text(alice(), "hello");
        let json = serde_json::to_value(&msg).expect("serialize");
        assert!(json.get("_id").is_some());
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["user"]["_id"], "u1");
        // Absent optional content is omitted entirely
        assert!(json.get("image").is_none());
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        assert_eq!(ChatUser::new("abc", "").display_name(), "abc");
        assert_eq!(alice().display_name(), "Alice");
    }

    #[test]
    fn test_new_message_id_is_hex() {
        let id = new_message_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

//! Conversion between chat messages and Firestore REST documents.
//!
//! Firestore encodes every field as a typed value object such as
//! `{"stringValue": "hi"}` or `{"mapValue": {"fields": {...}}}`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::models::{ChatUser, GeoPoint, Message};

pub type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    StringValue(String),
    TimestampValue(DateTime<Utc>),
    DoubleValue(f64),
    // int64 values travel as decimal strings
    IntegerValue(String),
    BooleanValue(bool),
    NullValue(()),
    MapValue(MapValue),
    // Not produced by this client, but other writers may add them
    ArrayValue(serde_json::Value),
    GeoPointValue(serde_json::Value),
    ReferenceValue(String),
    BytesValue(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: Fields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Full resource name; absent on documents we send
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    /// Document id: the last segment of the resource name
    pub fn id(&self) -> Option<&str> {
        self.name.rsplit('/').next().filter(|id| !id.is_empty())
    }
}

/// One element of a `documents:runQuery` response stream.
/// Elements without a document only carry progress information.
#[derive(Debug, Deserialize)]
pub struct RunQueryItem {
    #[serde(default)]
    pub document: Option<Document>,
}

fn string(value: &str) -> Value {
    Value::StringValue(value.to_string())
}

fn get_str<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    match fields.get(key) {
        Some(Value::StringValue(s)) => Some(s),
        _ => None,
    }
}

fn get_f64(fields: &Fields, key: &str) -> Option<f64> {
    match fields.get(key) {
        Some(Value::DoubleValue(v)) => Some(*v),
        Some(Value::IntegerValue(v)) => v.parse::<i64>().ok().map(|v| v as f64),
        _ => None,
    }
}

fn get_map<'a>(fields: &'a Fields, key: &str) -> Option<&'a Fields> {
    match fields.get(key) {
        Some(Value::MapValue(map)) => Some(&map.fields),
        _ => None,
    }
}

pub fn to_document(message: &Message) -> Document {
    let mut fields = Fields::new();
    fields.insert("_id".to_string(), string(&message.id));
    fields.insert("createdAt".to_string(), Value::TimestampValue(message.created_at));

    let mut user = Fields::new();
    user.insert("_id".to_string(), string(&message.user.id));
    user.insert("name".to_string(), string(&message.user.name));
    fields.insert("user".to_string(), Value::MapValue(MapValue { fields: user }));

    if let Some(ref text) = message.text {
        fields.insert("text".to_string(), string(text));
    }
    if let Some(ref image) = message.image {
        fields.insert("image".to_string(), string(image));
    }
    if let Some(point) = message.location {
        let mut location = Fields::new();
        location.insert("latitude".to_string(), Value::DoubleValue(point.latitude));
        location.insert("longitude".to_string(), Value::DoubleValue(point.longitude));
        fields.insert("location".to_string(), Value::MapValue(MapValue { fields: location }));
    }
    if message.system {
        fields.insert("system".to_string(), Value::BooleanValue(true));
    }

    Document {
        name: String::new(),
        fields,
    }
}

pub fn from_document(doc: &Document) -> Result<Message, ApiError> {
    let fields = &doc.fields;
    let id = doc
        .id()
        .or_else(|| get_str(fields, "_id"))
        .ok_or_else(|| ApiError::InvalidResponse("Document without id".to_string()))?
        .to_string();

    let created_at = match fields.get("createdAt") {
        Some(Value::TimestampValue(ts)) => *ts,
        _ => {
            return Err(ApiError::InvalidResponse(format!(
                "Document {} has no createdAt timestamp",
                id
            )))
        }
    };

    let system = matches!(fields.get("system"), Some(Value::BooleanValue(true)));

    let user = match get_map(fields, "user") {
        Some(user) => ChatUser::new(
            get_str(user, "_id").unwrap_or_default(),
            get_str(user, "name").unwrap_or_default(),
        ),
        None if system => ChatUser::system(),
        None => {
            return Err(ApiError::InvalidResponse(format!(
                "Document {} has no author",
                id
            )))
        }
    };

    let location = match get_map(fields, "location") {
        Some(loc) => {
            let latitude = get_f64(loc, "latitude");
            let longitude = get_f64(loc, "longitude");
            match (latitude, longitude) {
                (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon).map_err(|e| {
                    ApiError::InvalidResponse(format!("Document {}: {}", id, e))
                })?),
                _ => None,
            }
        }
        None => None,
    };

    Ok(Message {
        id,
        created_at,
        user,
        text: get_str(fields, "text").map(str::to_string),
        image: get_str(fields, "image").map(str::to_string),
        location,
        system,
    })
}

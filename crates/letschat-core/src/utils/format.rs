use chrono::{DateTime, Local, Utc};

use crate::models::{GeoPoint, Message, MessageContent};

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format a message timestamp: time only for today, date and time otherwise
pub fn format_timestamp(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let local = at.with_timezone(&Local);
    if local.date_naive() == now.with_timezone(&Local).date_naive() {
        local.format("%H:%M").to_string()
    } else {
        local.format("%b %d, %H:%M").to_string()
    }
}

/// Map link for a shared location
pub fn map_url(point: GeoPoint) -> String {
    format!(
        "https://www.openstreetmap.org/?mlat={:.5}&mlon={:.5}#map=15/{:.5}/{:.5}",
        point.latitude, point.longitude, point.latitude, point.longitude
    )
}

/// One-line preview of a message body
pub fn message_preview(message: &Message) -> String {
    match message.content() {
        MessageContent::Text(text) | MessageContent::System(text) => text.to_string(),
        MessageContent::Image(url) => format!("[image] {}", url),
        MessageContent::Location(point) => format!("[location] {}", point),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatUser;
    use chrono::Duration;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
        assert_eq!(truncate_string("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_format_timestamp_today_and_earlier() {
        let now = Utc::now();
        assert_eq!(format_timestamp(now, now).len(), 5);
        let older = format_timestamp(now - Duration::days(40), now);
        assert!(older.contains(','));
    }

    #[test]
    fn test_message_preview() {
        let user = ChatUser::new("u1", "Alice");
        let point = GeoPoint::new(1.5, -2.25).expect("valid point");
        assert_eq!(message_preview(&Message::text(user.clone(), "hi")), "hi");
        assert_eq!(
            message_preview(&Message::image(user.clone(), "https://x/a.png")),
            "[image] https://x/a.png"
        );
        assert_eq!(
            message_preview(&Message::location(user, point)),
            "[location] 1.50000, -2.25000"
        );
    }

    #[test]
    fn test_map_url() {
        let point = GeoPoint::new(52.52, 13.405).expect("valid point");
        assert_eq!(
            map_url(point),
            "https://www.openstreetmap.org/?mlat=52.52000&mlon=13.40500#map=15/52.52000/13.40500"
        );
    }
}

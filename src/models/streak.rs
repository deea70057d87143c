//! Streak record model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Learning progress for the whole installation. At most one exists.
///
/// Field names match the remote `streak_data` row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakData {
    /// Identifier assigned by the remote store once the record has been inserted there.
    #[serde(
        default,
        deserialize_with = "deserialize_remote_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    /// Last day a translation was added; serialized as `""` when never.
    #[serde(default, with = "activity_date")]
    pub last_activity_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_words_learned: u32,
    #[serde(default)]
    pub total_sentences_learned: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl StreakData {
    /// The row body sent to the remote store, without its identifier.
    pub fn remote_patch(&self) -> serde_json::Value {
        serde_json::json!({
            "current_streak": self.current_streak,
            "longest_streak": self.longest_streak,
            "last_activity_date": self
                .last_activity_date
                .map(|d| d.format(activity_date::FORMAT).to_string())
                .unwrap_or_default(),
            "total_words_learned": self.total_words_learned,
            "total_sentences_learned": self.total_sentences_learned,
        })
    }
}

/// Read a remote row identifier, which may be a string or an integer key.
pub fn remote_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn deserialize_remote_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(remote_id))
}

/// `YYYY-MM-DD` or empty string. Anything unparseable reads as "never".
mod activity_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serializer.serialize_str(&d.format(FORMAT).to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        // Remote rows may carry a full timestamp; only the date part matters.
        Ok(raw.and_then(|s| {
            let day = s.get(..10).unwrap_or(&s);
            NaiveDate::parse_from_str(day, FORMAT).ok()
        }))
    }
}

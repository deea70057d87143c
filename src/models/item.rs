//! Learning item model shared by words and sentences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lock::{self, DeleteLockStatus};
use crate::streak::LearningDelta;

/// Which collection an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    #[serde(rename = "words")]
    Word,
    #[serde(rename = "sentences")]
    Sentence,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Word, ItemKind::Sentence];

    /// Local and remote table name for this kind.
    pub fn table(&self) -> &'static str {
        match self {
            ItemKind::Word => "words",
            ItemKind::Sentence => "sentences",
        }
    }

    /// Singular noun used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Word => "Word",
            ItemKind::Sentence => "Sentence",
        }
    }
}

/// An English word or sentence with its (possibly empty) Tamil translation.
///
/// Field names match the remote table columns, so rows round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningItem {
    pub id: String,
    #[serde(rename = "english")]
    pub source_text: String,
    #[serde(rename = "tamil", default)]
    pub translated_text: String,
    pub topic: String,
    pub created_at: DateTime<Utc>,
    /// Time of the last change to `translated_text`; `None` while untranslated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LearningItem {
    /// Build a new item. A non-empty translation stamps `updated_at` too.
    pub fn new(
        source_text: String,
        translated_text: String,
        topic: String,
        now: DateTime<Utc>,
    ) -> Self {
        let updated_at = (!translated_text.is_empty()).then_some(now);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_text,
            translated_text,
            topic,
            created_at: now,
            updated_at,
        }
    }

    pub fn is_translated(&self) -> bool {
        !self.translated_text.is_empty()
    }

    /// Replace the translation, returning the learning event it causes.
    ///
    /// An identical text is a no-op. Any change moves `updated_at` to `now`,
    /// or clears it when the translation becomes empty.
    pub fn set_translation(&mut self, text: String, now: DateTime<Utc>) -> Option<LearningDelta> {
        if text == self.translated_text {
            return None;
        }

        let was_translated = self.is_translated();
        self.translated_text = text;
        self.updated_at = self.is_translated().then_some(now);

        match (was_translated, self.is_translated()) {
            (false, true) => Some(LearningDelta::Learned),
            (true, false) => Some(LearningDelta::Unlearned),
            _ => None,
        }
    }

    pub fn delete_lock(&self, now: DateTime<Utc>) -> DeleteLockStatus {
        lock::status(self.updated_at, now)
    }
}

/// An item together with its current deletion lock, as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub item: LearningItem,
    pub delete_lock: DeleteLockStatus,
}

impl ItemView {
    pub fn new(item: LearningItem, now: DateTime<Utc>) -> Self {
        let delete_lock = item.delete_lock(now);
        Self { item, delete_lock }
    }
}

/// Request body for creating a new item.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateItemRequest {
    pub english: String,
    #[serde(default)]
    pub tamil: String,
    pub topic: String,
}

/// Request body for changing an item's translation.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTranslationRequest {
    pub tamil: String,
}

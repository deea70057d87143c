//! Database repository for item CRUD and the local key-value store.
//!
//! Uses prepared statements and transactions for data integrity.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{ItemKind, LearningItem};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== ITEM OPERATIONS ====================

    /// List items of one kind, optionally restricted to a topic, in insertion order.
    pub async fn list_items(
        &self,
        kind: ItemKind,
        topic: Option<&str>,
    ) -> Result<Vec<LearningItem>, AppError> {
        let table = kind.table();
        let rows = match topic {
            Some(topic) => {
                sqlx::query(&format!(
                    "SELECT id, english, tamil, topic, created_at, updated_at FROM {table} WHERE topic = ? ORDER BY rowid"
                ))
                .bind(topic)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT id, english, tamil, topic, created_at, updated_at FROM {table} ORDER BY rowid"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(item_from_row).collect()
    }

    /// Get an item by ID.
    pub async fn get_item(
        &self,
        kind: ItemKind,
        id: &str,
    ) -> Result<Option<LearningItem>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT id, english, tamil, topic, created_at, updated_at FROM {} WHERE id = ?",
            kind.table()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(item_from_row).transpose()
    }

    /// Insert a new item.
    pub async fn insert_item(&self, kind: ItemKind, item: &LearningItem) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO {} (id, english, tamil, topic, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            kind.table()
        ))
        .bind(&item.id)
        .bind(&item.source_text)
        .bind(&item.translated_text)
        .bind(&item.topic)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist `next`'s translation if the stored row still matches `current`.
    ///
    /// Returns `false` when another writer changed the translation in between.
    pub async fn save_translation(
        &self,
        kind: ItemKind,
        current: &LearningItem,
        next: &LearningItem,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET tamil = ?, updated_at = ? WHERE id = ? AND tamil = ? AND updated_at IS ?",
            kind.table()
        ))
        .bind(&next.translated_text)
        .bind(next.updated_at.map(|t| t.to_rfc3339()))
        .bind(&current.id)
        .bind(&current.translated_text)
        .bind(current.updated_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        self.settle(kind, &current.id, result.rows_affected()).await
    }

    /// Delete an item if the stored row still matches `current`.
    ///
    /// Returns `false` when another writer changed the translation in between.
    pub async fn delete_item(&self, kind: ItemKind, current: &LearningItem) -> Result<bool, AppError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = ? AND tamil = ? AND updated_at IS ?",
            kind.table()
        ))
        .bind(&current.id)
        .bind(&current.translated_text)
        .bind(current.updated_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        self.settle(kind, &current.id, result.rows_affected()).await
    }

    /// Delete a topic, provided its rows are still exactly `current`.
    ///
    /// Runs in one transaction. Returns `false` and changes nothing when any
    /// item was edited, removed or added since `current` was read.
    pub async fn delete_topic(
        &self,
        kind: ItemKind,
        topic: &str,
        current: &[LearningItem],
    ) -> Result<bool, AppError> {
        let table = kind.table();
        let mut tx = self.pool.begin().await?;

        for item in current {
            let result = sqlx::query(&format!(
                "DELETE FROM {table} WHERE id = ? AND topic = ? AND tamil = ? AND updated_at IS ?"
            ))
            .bind(&item.id)
            .bind(topic)
            .bind(&item.translated_text)
            .bind(item.updated_at.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Ok(false);
            }
        }

        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table} WHERE topic = ?"))
            .bind(topic)
            .fetch_one(&mut *tx)
            .await?;
        let left: i64 = row.try_get("n")?;
        if left > 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Turn a conditional write's row count into found / changed / missing.
    async fn settle(&self, kind: ItemKind, id: &str, rows: u64) -> Result<bool, AppError> {
        if rows > 0 {
            return Ok(true);
        }
        match self.get_item(kind, id).await? {
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("{} {} not found", kind.label(), id))),
        }
    }

    /// Number of items of one kind.
    pub async fn count_items(&self, kind: ItemKind) -> Result<i64, AppError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", kind.table()))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Insert items that are not present yet. Returns how many were added.
    pub async fn import_items(
        &self,
        kind: ItemKind,
        items: &[LearningItem],
    ) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut added = 0;

        for item in items {
            let result = sqlx::query(&format!(
                "INSERT OR IGNORE INTO {} (id, english, tamil, topic, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
                kind.table()
            ))
            .bind(&item.id)
            .bind(&item.source_text)
            .bind(&item.translated_text)
            .bind(&item.topic)
            .bind(item.created_at.to_rfc3339())
            .bind(item.updated_at.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
            added += result.rows_affected();
        }

        tx.commit().await?;
        Ok(added)
    }

    // ==================== LOCAL KEY-VALUE STORE ====================

    /// Read a raw value from the local store.
    pub async fn get_local(&self, key: &str) -> Result<Option<String>, AppError> {
        let row = sqlx::query("SELECT value FROM local_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    /// Write a raw value to the local store, replacing any previous one.
    pub async fn set_local(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO local_store (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// Helper functions for row conversion

fn item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LearningItem, AppError> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: Option<String> = row.try_get("updated_at")?;

    Ok(LearningItem {
        id: row.try_get("id")?,
        source_text: row.try_get("english")?,
        translated_text: row.try_get("tamil")?,
        topic: row.try_get("topic")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: updated_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Database(format!("Invalid timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    async fn repo() -> (Repository, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();
        (Repository::new(pool), dir)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_item_round_trip_and_topic_filter() {
        let (repo, _dir) = repo().await;
        let hello = LearningItem::new("Hello".into(), "Vanakkam".into(), "Greetings".into(), t0());
        let one = LearningItem::new("One".into(), String::new(), "Numbers".into(), t0());

        repo.insert_item(ItemKind::Word, &hello).await.unwrap();
        repo.insert_item(ItemKind::Word, &one).await.unwrap();

        assert_eq!(repo.get_item(ItemKind::Word, &hello.id).await.unwrap(), Some(hello.clone()));
        assert_eq!(repo.get_item(ItemKind::Sentence, &hello.id).await.unwrap(), None);

        let numbers = repo.list_items(ItemKind::Word, Some("Numbers")).await.unwrap();
        assert_eq!(numbers, vec![one.clone()]);
        assert_eq!(repo.list_items(ItemKind::Word, None).await.unwrap(), vec![hello, one]);
        assert_eq!(repo.count_items(ItemKind::Word).await.unwrap(), 2);
        assert_eq!(repo.count_items(ItemKind::Sentence).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_translation_and_delete() {
        let (repo, _dir) = repo().await;
        let mut item = LearningItem::new("Two".into(), String::new(), "Numbers".into(), t0());
        repo.insert_item(ItemKind::Word, &item).await.unwrap();

        let before = item.clone();
        item.set_translation("Irandu".into(), t0() + Duration::minutes(1));
        assert!(repo.save_translation(ItemKind::Word, &before, &item).await.unwrap());
        assert_eq!(repo.get_item(ItemKind::Word, &item.id).await.unwrap(), Some(item.clone()));

        // A second writer working from the stale copy loses.
        let mut rival = before.clone();
        rival.set_translation("Rendu".into(), t0() + Duration::minutes(2));
        assert!(!repo.save_translation(ItemKind::Word, &before, &rival).await.unwrap());
        assert!(!repo.delete_item(ItemKind::Word, &before).await.unwrap());
        assert_eq!(repo.get_item(ItemKind::Word, &item.id).await.unwrap(), Some(item.clone()));

        assert!(repo.delete_item(ItemKind::Word, &item).await.unwrap());
        let err = repo.delete_item(ItemKind::Word, &item).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_topic_removes_only_that_topic() {
        let (repo, _dir) = repo().await;
        for english in ["Apple", "Mango"] {
            let item = LearningItem::new(english.into(), String::new(), "Fruits".into(), t0());
            repo.insert_item(ItemKind::Word, &item).await.unwrap();
        }
        let keep = LearningItem::new("Yes".into(), String::new(), "Fillers".into(), t0());
        repo.insert_item(ItemKind::Word, &keep).await.unwrap();

        let fruits = repo.list_items(ItemKind::Word, Some("Fruits")).await.unwrap();
        assert!(repo.delete_topic(ItemKind::Word, "Fruits", &fruits).await.unwrap());
        assert_eq!(repo.list_items(ItemKind::Word, None).await.unwrap(), vec![keep]);
    }

    #[tokio::test]
    async fn test_delete_topic_refuses_when_topic_changed() {
        let (repo, _dir) = repo().await;
        let mut apple = LearningItem::new("Apple".into(), String::new(), "Fruits".into(), t0());
        repo.insert_item(ItemKind::Word, &apple).await.unwrap();
        let seen = repo.list_items(ItemKind::Word, Some("Fruits")).await.unwrap();

        // Added after the read.
        let mango = LearningItem::new("Mango".into(), String::new(), "Fruits".into(), t0());
        repo.insert_item(ItemKind::Word, &mango).await.unwrap();
        assert!(!repo.delete_topic(ItemKind::Word, "Fruits", &seen).await.unwrap());
        assert_eq!(repo.count_items(ItemKind::Word).await.unwrap(), 2);

        // Edited after the read.
        let seen = repo.list_items(ItemKind::Word, Some("Fruits")).await.unwrap();
        let before = apple.clone();
        apple.set_translation("Aappil".into(), t0());
        repo.save_translation(ItemKind::Word, &before, &apple).await.unwrap();
        assert!(!repo.delete_topic(ItemKind::Word, "Fruits", &seen).await.unwrap());
        assert_eq!(repo.count_items(ItemKind::Word).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_import_skips_existing_ids() {
        let (repo, _dir) = repo().await;
        let a = LearningItem::new("Hello".into(), String::new(), "Greetings".into(), t0());
        let b = LearningItem::new("Please".into(), String::new(), "Greetings".into(), t0());
        repo.insert_item(ItemKind::Sentence, &a).await.unwrap();

        let added = repo.import_items(ItemKind::Sentence, &[a, b]).await.unwrap();
        assert_eq!(added, 1);
        assert_eq!(repo.count_items(ItemKind::Sentence).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_local_store_overwrites() {
        let (repo, _dir) = repo().await;
        assert_eq!(repo.get_local("streak_data").await.unwrap(), None);

        repo.set_local("streak_data", "{\"a\":1}").await.unwrap();
        repo.set_local("streak_data", "{\"a\":2}").await.unwrap();
        assert_eq!(
            repo.get_local("streak_data").await.unwrap().as_deref(),
            Some("{\"a\":2}")
        );
    }
}

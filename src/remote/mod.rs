//! Remote table store mirror.
//!
//! The remote store is a secondary copy. Local SQLite stays authoritative;
//! every remote call made through [`Mirror`] is best effort and a failure is
//! logged and dropped. The next successful write carries the latest state.
//! Item writes are queued to a background task so requests never wait on the
//! network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc;
#[cfg(test)]
use tokio::sync::oneshot;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{ItemKind, LearningItem};

/// Table-oriented persistence collaborator, keyed by row `id`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every row of a table.
    async fn fetch_all(&self, table: &str) -> Result<Vec<Value>, AppError>;

    /// The first row of a single-record table, if any.
    async fn fetch_singleton(&self, table: &str) -> Result<Option<Value>, AppError>;

    /// Insert rows and return them as stored (with generated columns).
    async fn insert(&self, table: &str, records: &[Value]) -> Result<Vec<Value>, AppError>;

    async fn update_by_id(&self, table: &str, id: &str, patch: &Value) -> Result<(), AppError>;

    async fn delete_by_id(&self, table: &str, id: &str) -> Result<(), AppError>;
}

/// Upper bound on a single remote request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// PostgREST-style HTTP table store (`{base}/rest/v1/{table}`).
pub struct RestTableStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestTableStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        Self::with_timeout(base_url, api_key, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl RemoteStore for RestTableStore {
    async fn fetch_all(&self, table: &str) -> Result<Vec<Value>, AppError> {
        let rows = self
            .request(reqwest::Method::GET, table)
            .query(&[("select", "*")])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Value>>()
            .await?;
        Ok(rows)
    }

    async fn fetch_singleton(&self, table: &str) -> Result<Option<Value>, AppError> {
        let rows = self
            .request(reqwest::Method::GET, table)
            .query(&[("select", "*"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Value>>()
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, table: &str, records: &[Value]) -> Result<Vec<Value>, AppError> {
        let rows = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=representation")
            .json(records)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Value>>()
            .await?;
        Ok(rows)
    }

    async fn update_by_id(&self, table: &str, id: &str, patch: &Value) -> Result<(), AppError> {
        self.request(reqwest::Method::PATCH, table)
            .query(&[("id", format!("eq.{}", id))])
            .json(patch)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_by_id(&self, table: &str, id: &str) -> Result<(), AppError> {
        self.request(reqwest::Method::DELETE, table)
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// A write waiting in the mirror queue.
enum RemoteWrite {
    Insert { table: String, record: Value },
    Update { table: String, id: String, patch: Value },
    Delete { table: String, id: String },
    #[cfg(test)]
    Flush(oneshot::Sender<()>),
}

/// Best-effort wrapper around an optional remote store.
#[derive(Clone, Default)]
pub struct Mirror {
    remote: Option<Arc<dyn RemoteStore>>,
    writes: Option<mpsc::UnboundedSender<RemoteWrite>>,
}

impl Mirror {
    /// Wrap `remote`. When present, a writer task is spawned on the current
    /// tokio runtime to apply queued writes in order.
    pub fn new(remote: Option<Arc<dyn RemoteStore>>) -> Self {
        let writes = remote.as_ref().map(|remote| {
            let (tx, rx) = mpsc::unbounded_channel();
            let direct = Mirror {
                remote: Some(remote.clone()),
                writes: None,
            };
            tokio::spawn(run_writes(direct, rx));
            tx
        });

        Self { remote, writes }
    }

    pub fn is_enabled(&self) -> bool {
        self.remote.is_some()
    }

    /// Queue an insert without waiting for it.
    pub fn enqueue_insert(&self, table: &str, record: Value) {
        self.enqueue(RemoteWrite::Insert {
            table: table.to_string(),
            record,
        });
    }

    /// Queue an update by id without waiting for it.
    pub fn enqueue_update(&self, table: &str, id: &str, patch: Value) {
        self.enqueue(RemoteWrite::Update {
            table: table.to_string(),
            id: id.to_string(),
            patch,
        });
    }

    /// Queue a delete by id without waiting for it.
    pub fn enqueue_delete(&self, table: &str, id: &str) {
        self.enqueue(RemoteWrite::Delete {
            table: table.to_string(),
            id: id.to_string(),
        });
    }

    fn enqueue(&self, write: RemoteWrite) {
        let Some(writes) = self.writes.as_ref() else {
            return;
        };
        if writes.send(write).is_err() {
            tracing::warn!("Remote writer has stopped; dropping write");
        }
    }

    /// Wait until every write queued so far has been attempted.
    #[cfg(test)]
    pub async fn flush(&self) {
        let Some(writes) = self.writes.as_ref() else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if writes.send(RemoteWrite::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn fetch_all(&self, table: &str) -> Option<Vec<Value>> {
        let remote = self.remote.as_ref()?;
        remote
            .fetch_all(table)
            .await
            .map_err(|e| tracing::warn!("Remote fetch of {} failed: {}", table, e))
            .ok()
    }

    pub async fn fetch_singleton(&self, table: &str) -> Option<Value> {
        let remote = self.remote.as_ref()?;
        remote
            .fetch_singleton(table)
            .await
            .map_err(|e| tracing::warn!("Remote fetch of {} failed: {}", table, e))
            .ok()
            .flatten()
    }

    pub async fn insert(&self, table: &str, record: Value) -> Option<Vec<Value>> {
        let remote = self.remote.as_ref()?;
        remote
            .insert(table, &[record])
            .await
            .map_err(|e| tracing::warn!("Remote insert into {} failed: {}", table, e))
            .ok()
    }

    pub async fn update_by_id(&self, table: &str, id: &str, patch: Value) {
        let Some(remote) = self.remote.as_ref() else {
            return;
        };
        if let Err(e) = remote.update_by_id(table, id, &patch).await {
            tracing::warn!("Remote update of {} {} failed: {}", table, id, e);
        }
    }

    pub async fn delete_by_id(&self, table: &str, id: &str) {
        let Some(remote) = self.remote.as_ref() else {
            return;
        };
        if let Err(e) = remote.delete_by_id(table, id).await {
            tracing::warn!("Remote delete of {} {} failed: {}", table, id, e);
        }
    }
}

async fn run_writes(direct: Mirror, mut rx: mpsc::UnboundedReceiver<RemoteWrite>) {
    while let Some(write) = rx.recv().await {
        match write {
            RemoteWrite::Insert { table, record } => {
                direct.insert(&table, record).await;
            }
            RemoteWrite::Update { table, id, patch } => {
                direct.update_by_id(&table, &id, patch).await;
            }
            RemoteWrite::Delete { table, id } => {
                direct.delete_by_id(&table, &id).await;
            }
            #[cfg(test)]
            RemoteWrite::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Remote writer stopped");
}

/// Fill empty local item tables from the remote copy.
///
/// Returns the number of items imported. Rows that do not parse are skipped.
pub async fn hydrate_items(repo: &Repository, mirror: &Mirror) -> Result<u64, AppError> {
    if !mirror.is_enabled() {
        return Ok(0);
    }

    let mut imported = 0;
    for kind in ItemKind::ALL {
        if repo.count_items(kind).await? > 0 {
            continue;
        }

        let Some(rows) = mirror.fetch_all(kind.table()).await else {
            continue;
        };

        let items: Vec<LearningItem> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("Skipping unreadable remote {} row: {}", kind.table(), e);
                    None
                }
            })
            .collect();

        let added = repo.import_items(kind, &items).await?;
        tracing::info!("Imported {} {} from remote store", added, kind.table());
        imported += added;
    }

    Ok(imported)
}

#[cfg(test)]
pub mod testing {
    //! In-memory remote store for tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryRemote {
        tables: Mutex<HashMap<String, Vec<Value>>>,
        failing: AtomicBool,
        stalled: AtomicBool,
        next_id: AtomicUsize,
    }

    impl MemoryRemote {
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Make every write hang forever, like a server that never answers.
        pub fn set_stalled(&self, stalled: bool) {
            self.stalled.store(stalled, Ordering::SeqCst);
        }

        pub fn rows(&self, table: &str) -> Vec<Value> {
            self.tables
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default()
        }

        pub fn seed(&self, table: &str, rows: Vec<Value>) {
            self.tables.lock().unwrap().insert(table.to_string(), rows);
        }

        fn check(&self) -> Result<(), AppError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(AppError::Remote("remote unavailable".to_string()))
            } else {
                Ok(())
            }
        }

        async fn check_write(&self) -> Result<(), AppError> {
            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.check()
        }
    }

    #[async_trait]
    impl RemoteStore for MemoryRemote {
        async fn fetch_all(&self, table: &str) -> Result<Vec<Value>, AppError> {
            self.check()?;
            Ok(self.rows(table))
        }

        async fn fetch_singleton(&self, table: &str) -> Result<Option<Value>, AppError> {
            self.check()?;
            Ok(self.rows(table).into_iter().next())
        }

        async fn insert(&self, table: &str, records: &[Value]) -> Result<Vec<Value>, AppError> {
            self.check_write().await?;
            let mut stored = Vec::new();
            for record in records {
                let mut row = record.clone();
                if row.get("id").is_none() {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                    row["id"] = Value::String(format!("remote-{}", id));
                }
                stored.push(row);
            }
            self.tables
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default()
                .extend(stored.iter().cloned());
            Ok(stored)
        }

        async fn update_by_id(&self, table: &str, id: &str, patch: &Value) -> Result<(), AppError> {
            self.check_write().await?;
            let mut tables = self.tables.lock().unwrap();
            let rows = tables.entry(table.to_string()).or_default();
            for row in rows.iter_mut().filter(|r| r["id"] == id) {
                if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
                    for (k, v) in fields {
                        target.insert(k.clone(), v.clone());
                    }
                }
            }
            Ok(())
        }

        async fn delete_by_id(&self, table: &str, id: &str) -> Result<(), AppError> {
            self.check_write().await?;
            let mut tables = self.tables.lock().unwrap();
            if let Some(rows) = tables.get_mut(table) {
                rows.retain(|r| r["id"] != id);
            }
            Ok(())
        }
    }
}

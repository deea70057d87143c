//! Progress store.
//!
//! Owns the one [`StreakData`] record. Every change is saved the same way: the
//! local copy is written first and must succeed, then subscribers are notified.
//! The remote copy is brought up to date afterwards by a background task, so
//! neither the caller nor the record lock ever waits on the network.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{mpsc, watch, Mutex};
#[cfg(test)]
use tokio::sync::oneshot;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{remote_id, ItemKind, StreakData};
use crate::remote::Mirror;
use crate::streak::{self, LearningDelta};

/// Key of the streak record in the local store.
pub const LOCAL_KEY: &str = "streak_data";

/// Remote table holding the streak record.
pub const REMOTE_TABLE: &str = "streak_data";

/// Requests handled by the remote sync task.
enum SyncRequest {
    Push,
    #[cfg(test)]
    Flush(oneshot::Sender<()>),
}

struct Shared {
    repo: Repository,
    mirror: Mirror,
    /// Serializes read-modify-write cycles.
    state: Mutex<StreakData>,
    updates: watch::Sender<StreakData>,
}

pub struct ProgressStore {
    shared: Arc<Shared>,
    sync: Option<mpsc::UnboundedSender<SyncRequest>>,
}

impl ProgressStore {
    /// Load the record (remote first, then local, then defaults) and wrap it.
    ///
    /// With a remote configured, a sync task is spawned on the current runtime.
    pub async fn open(repo: Repository, mirror: Mirror) -> Self {
        let initial = load(&repo, &mirror).await;
        let (updates, _) = watch::channel(initial.clone());
        let enabled = mirror.is_enabled();

        let shared = Arc::new(Shared {
            repo,
            mirror,
            state: Mutex::new(initial),
            updates,
        });

        let sync = enabled.then(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_sync(shared.clone(), rx));
            tx
        });

        Self { shared, sync }
    }

    /// Current record without running the staleness check.
    pub async fn snapshot(&self) -> StreakData {
        self.shared.state.lock().await.clone()
    }

    /// Receive every saved record.
    pub fn subscribe(&self) -> watch::Receiver<StreakData> {
        self.shared.updates.subscribe()
    }

    /// Expire the streak if `today` is more than a day past the last activity.
    /// Saves only when something changed.
    pub async fn refresh(&self, today: NaiveDate) -> Result<StreakData, AppError> {
        let mut state = self.shared.state.lock().await;
        let next = streak::check_and_update_streak(&state, today);
        if next == *state {
            return Ok(next);
        }

        tracing::info!(
            "Streak expired after inactivity (last activity {:?})",
            state.last_activity_date
        );
        self.save(&mut state, next).await
    }

    /// Apply one learning event and persist the result.
    pub async fn record(
        &self,
        kind: ItemKind,
        delta: LearningDelta,
        today: NaiveDate,
    ) -> Result<StreakData, AppError> {
        let mut state = self.shared.state.lock().await;
        let next = streak::apply_learning_event(&state, kind, delta, today);
        tracing::debug!(
            "Learning event {:?} for {}: streak {} -> {}",
            delta,
            kind.table(),
            state.current_streak,
            next.current_streak
        );
        self.save(&mut state, next).await
    }

    /// Make `next` the current record: write it locally, publish it, and
    /// schedule the remote copy. `state` is the locked current record.
    async fn save(
        &self,
        state: &mut StreakData,
        mut next: StreakData,
    ) -> Result<StreakData, AppError> {
        if next.id.is_none() {
            next.id = state.id.clone();
        }

        write_local(&self.shared.repo, &next).await?;
        *state = next;
        self.shared.updates.send_replace(state.clone());

        if let Some(sync) = &self.sync {
            if sync.send(SyncRequest::Push).is_err() {
                tracing::warn!("Progress sync task has stopped");
            }
        }

        Ok(state.clone())
    }

    /// Wait until every save so far has been pushed to the remote.
    #[cfg(test)]
    pub async fn flush(&self) {
        let Some(sync) = &self.sync else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if sync.send(SyncRequest::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_sync(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<SyncRequest>) {
    while let Some(request) = rx.recv().await {
        match request {
            SyncRequest::Push => push_remote(&shared).await,
            #[cfg(test)]
            SyncRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Progress sync task stopped");
}

/// Push the latest record to the remote store. A newly assigned identifier is
/// written back locally so later pushes update instead of inserting.
async fn push_remote(shared: &Shared) {
    // Copy out and release the lock before any network call.
    let record = shared.state.lock().await.clone();

    match record.id.as_deref() {
        Some(id) => {
            shared
                .mirror
                .update_by_id(REMOTE_TABLE, id, record.remote_patch())
                .await;
        }
        None => {
            let Some(rows) = shared.mirror.insert(REMOTE_TABLE, record.remote_patch()).await else {
                return;
            };
            let Some(id) = rows.first().and_then(|row| row.get("id")).and_then(remote_id) else {
                tracing::warn!("Remote store returned no id for the streak record");
                return;
            };

            let mut state = shared.state.lock().await;
            if state.id.is_none() {
                state.id = Some(id);
                if let Err(e) = write_local(&shared.repo, &state).await {
                    tracing::warn!("Could not store remote streak id locally: {}", e);
                }
                shared.updates.send_replace(state.clone());
            }
        }
    }
}

/// Resolve the starting record: remote wins, then local, then all-zero.
async fn load(repo: &Repository, mirror: &Mirror) -> StreakData {
    if let Some(row) = mirror.fetch_singleton(REMOTE_TABLE).await {
        match serde_json::from_value::<StreakData>(row) {
            Ok(data) => {
                tracing::info!("Loaded streak record from remote store");
                return data;
            }
            Err(e) => tracing::warn!("Ignoring unreadable remote streak record: {}", e),
        }
    }

    match repo.get_local(LOCAL_KEY).await {
        Ok(Some(raw)) => match serde_json::from_str::<StreakData>(&raw) {
            Ok(data) => return data,
            Err(e) => tracing::warn!("Ignoring corrupt local streak record: {}", e),
        },
        Ok(None) => tracing::info!("No streak record yet, starting fresh"),
        Err(e) => tracing::warn!("Could not read local streak record: {}", e),
    }

    StreakData::default()
}

async fn write_local(repo: &Repository, record: &StreakData) -> Result<(), AppError> {
    let raw = serde_json::to_string(record)
        .map_err(|e| AppError::Internal(format!("Failed to encode streak record: {}", e)))?;
    repo.set_local(LOCAL_KEY, &raw).await
}

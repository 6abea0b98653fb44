//! Message board entities and the storage seam the HTTP layer talks to.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A single board post as handed out by a [`MessageStore`].
///
/// Values are detached copies; mutating one never touches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i32,
    pub body: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub type Messages = Vec<Message>;

/// Fields a client supplies when posting. The store assigns everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub body: String,
    pub username: String,
}

/// Partial update. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub body: Option<String>,
}

impl MessagePatch {
    pub fn is_empty(&self) -> bool {
        self.body.is_none()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message {0} not found")]
    NotFound(i32),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("no message ids left to assign")]
    IdsExhausted,
    #[error("migration failed: {0}")]
    Migration(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// CRUD over persisted messages.
///
/// Every call is one self-contained unit of work: it either commits fully or
/// leaves the store untouched. Calls block, so async callers should run them
/// on a blocking pool.
pub trait MessageStore: Send + Sync {
    /// Persists a new message, assigning its `id` and `created_at`.
    fn create(&self, new: NewMessage) -> StoreResult<Message>;

    /// Snapshot of every stored message, oldest first.
    fn list(&self) -> StoreResult<Messages>;

    fn get(&self, id: i32) -> StoreResult<Message>;

    /// Applies `patch` to message `id` and returns the result. An empty patch
    /// returns the message as stored.
    fn update(&self, id: i32, patch: MessagePatch) -> StoreResult<Message>;

    /// Removes message `id`. Fails with [`StoreError::NotFound`] if it was
    /// already gone.
    fn delete(&self, id: i32) -> StoreResult<()>;
}

//! SQLite-backed [`MessageStore`] using Diesel over an r2d2 pool.
//!
//! The schema is embedded and migrated when the store opens, so a fresh
//! database file (or `:memory:`) is usable right away.

use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{debug, info};

use crate::message_database::{
    Message, MessagePatch, MessageStore, Messages, NewMessage, StoreError, StoreResult,
};
use crate::schema::messages;

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
type SqlitePooledConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub const IN_MEMORY_URL: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// File path, or `:memory:` for a throwaway database
    pub database_url: String,
    pub max_pool_size: u32,
    /// How long a request may wait for a free connection
    pub connection_timeout_sec: u64,
    pub busy_timeout_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database_url: String::from("messages.db"),
            max_pool_size: 10,
            connection_timeout_sec: 30,
            busy_timeout_ms: 5_000,
        }
    }
}

impl SqliteConfig {
    pub fn in_memory() -> Self {
        Self {
            database_url: String::from(IN_MEMORY_URL),
            ..Default::default()
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_url.contains(IN_MEMORY_URL)
    }
}

#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        diesel::sql_query(format!("PRAGMA busy_timeout = {};", self.busy_timeout_ms))
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;
        Ok(())
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct MessageRow {
    id: i32,
    body: String,
    username: String,
    created_at: NaiveDateTime,
    updated_at: Option<NaiveDateTime>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            body: row.body,
            username: row.username,
            created_at: row.created_at.and_utc(),
            updated_at: row.updated_at.map(|t| t.and_utc()),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
struct NewMessageRow<'a> {
    body: &'a str,
    username: &'a str,
    created_at: NaiveDateTime,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = messages)]
struct MessageChangeset<'a> {
    body: Option<&'a str>,
    updated_at: NaiveDateTime,
}

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Builds the pool and runs pending migrations.
    pub fn open(config: &SqliteConfig) -> StoreResult<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(&config.database_url);

        // every `:memory:` connection is its own database, so share exactly one
        let (max_size, idle_timeout, max_lifetime) = if config.is_in_memory() {
            (1, None, None)
        } else {
            (
                config.max_pool_size,
                Some(Duration::from_secs(600)),
                Some(Duration::from_secs(1800)),
            )
        };

        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(idle_timeout)
            .max_lifetime(max_lifetime)
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout_ms: config.busy_timeout_ms,
            }))
            .build(manager)?;

        {
            let mut conn = pool.get()?;
            Self::run_migrations(&mut conn)?;
        }

        info!(url = %config.database_url, max_size, "Opened SQLite message store");

        Ok(Self { pool })
    }

    fn run_migrations(conn: &mut SqliteConnection) -> StoreResult<()> {
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        for version in applied {
            info!(%version, "Applied migration");
        }
        Ok(())
    }

    /// Checks out a connection and runs `f` inside one transaction on it.
    fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> StoreResult<T>,
    {
        let mut pooled: SqlitePooledConnection = self.pool.get()?;
        let conn: &mut SqliteConnection = &mut pooled;
        conn.transaction(f)
    }
}

fn find_row(conn: &mut SqliteConnection, id: i32) -> StoreResult<MessageRow> {
    messages::table
        .find(id)
        .select(MessageRow::as_select())
        .first(conn)
        .optional()?
        .ok_or(StoreError::NotFound(id))
}

impl MessageStore for SqliteStore {
    fn create(&self, new: NewMessage) -> StoreResult<Message> {
        let row = self.transaction(|conn| {
            let row: MessageRow = diesel::insert_into(messages::table)
                .values(&NewMessageRow {
                    body: &new.body,
                    username: &new.username,
                    created_at: Utc::now().naive_utc(),
                })
                .returning(MessageRow::as_returning())
                .get_result(conn)?;
            Ok(row)
        })?;

        debug!(id = row.id, "Inserted message");
        Ok(row.into())
    }

    fn list(&self) -> StoreResult<Messages> {
        let rows = self.transaction(|conn| {
            let rows: Vec<MessageRow> = messages::table
                .order((messages::created_at.asc(), messages::id.asc()))
                .select(MessageRow::as_select())
                .load(conn)?;
            Ok(rows)
        })?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    fn get(&self, id: i32) -> StoreResult<Message> {
        let row = self.transaction(|conn| find_row(conn, id))?;
        Ok(row.into())
    }

    fn update(&self, id: i32, patch: MessagePatch) -> StoreResult<Message> {
        let row = self.transaction(|conn| {
            if patch.is_empty() {
                return find_row(conn, id);
            }

            diesel::update(messages::table.find(id))
                .set(&MessageChangeset {
                    body: patch.body.as_deref(),
                    updated_at: Utc::now().naive_utc(),
                })
                .returning(MessageRow::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or(StoreError::NotFound(id))
        })?;

        debug!(id, "Updated message");
        Ok(row.into())
    }

    fn delete(&self, id: i32) -> StoreResult<()> {
        self.transaction(|conn| {
            let removed = diesel::delete(messages::table.find(id)).execute(conn)?;
            if removed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })?;

        debug!(id, "Deleted message");
        Ok(())
    }
}

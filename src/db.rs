use crate::config::Config;
use crate::error::StoreError;
use crate::feed::{ChangeEvent, ChangeFeed};
use crate::model::{Bookmark, Identity, NewBookmark};
use crate::store::BookmarkStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[("001_bookmarks.sql", include_str!("migrations/001_bookmarks.sql"))];

const BOOKMARK_COLUMNS: &str = "id, user_id, title, url, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Local,
    Replica,
    Remote,
}

pub struct Database {
    db: LibsqlDatabase,
    conn: Connection,
    mode: Mode,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Pulls frames from the primary. Only replicas have anything to pull.
    pub async fn sync(&self) -> Result<()> {
        if self.mode == Mode::Replica {
            self.db
                .sync()
                .await
                .map_err(|e| anyhow::anyhow!("sync failed: {e}"))?;
        }
        Ok(())
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!(migration = name, "migration already applied, skipping");
            return Ok(());
        }

        tracing::info!(migration = name, "applying migration");
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(cfg.app.get_db());

        let (db, mode) = match (&cfg.app.turso_url, &cfg.app.turso_auth_token) {
            (Some(url), Some(token)) if cfg.app.remote_only => {
                tracing::info!(mode = "remote", "database opened against the primary only");
                let db = Builder::new_remote(url.clone(), token.clone()).build().await?;
                (db, Mode::Remote)
            }
            (Some(url), Some(token)) => {
                tracing::info!(mode = "replica", path = ?path, "database opened as embedded replica");
                let sync_interval = Duration::from_secs(cfg.app.sync_interval_seconds);
                let db = Builder::new_synced_database(&path, url.clone(), token.clone())
                    .sync_interval(sync_interval)
                    .build()
                    .await?;
                (db, Mode::Replica)
            }
            _ => {
                tracing::info!(mode = "local", path = ?path, "database opened locally");
                (Builder::new_local(&path).build().await?, Mode::Local)
            }
        };

        Self::open(db, mode).await
    }

    /// Opens a plain local database file. Used by tests and tooling.
    pub async fn open_local(path: &Path) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        Self::open(db, Mode::Local).await
    }

    async fn open(db: LibsqlDatabase, mode: Mode) -> Result<Self> {
        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database { db, conn, mode })
    }

    /// A store that only sees and touches `identity`'s rows, announcing its
    /// writes on `feed`.
    pub fn for_user(self: &Arc<Self>, identity: &Identity, feed: ChangeFeed) -> UserStore {
        UserStore {
            db: self.clone(),
            owner_id: identity.user_id.clone(),
            feed,
        }
    }
}

pub struct UserStore {
    db: Arc<Database>,
    owner_id: String,
    feed: ChangeFeed,
}

impl UserStore {
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl BookmarkStore for UserStore {
    async fn snapshot(&self) -> Result<Vec<Bookmark>, StoreError> {
        let query = format!(
            "SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE user_id = ? ORDER BY created_at DESC, rowid DESC"
        );

        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![self.owner_id.as_str()])
            .await?;

        let mut bookmarks = Vec::new();
        while let Some(row) = rows.next().await? {
            bookmarks.push(row_to_bookmark(&row)?);
        }

        Ok(bookmarks)
    }

    async fn create(&self, input: NewBookmark) -> Result<Bookmark, StoreError> {
        if input.owner_id != self.owner_id {
            return Err(StoreError::Rejected(format!(
                "cannot create a bookmark for user {}",
                input.owner_id
            )));
        }

        let query = format!(
            "INSERT INTO bookmarks (user_id, title, url) VALUES (?, ?, ?) RETURNING {BOOKMARK_COLUMNS}"
        );

        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![input.owner_id, input.title, input.url])
            .await?;

        let Some(row) = rows.next().await? else {
            return Err(StoreError::Rejected("insert returned no row".to_string()));
        };
        let bookmark = row_to_bookmark(&row)?;

        tracing::info!(id = %bookmark.id, "inserted bookmark");
        self.feed
            .publish(&self.owner_id, ChangeEvent::Insert(bookmark.clone()));
        Ok(bookmark)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let deleted = self
            .db
            .connection()
            .execute(
                "DELETE FROM bookmarks WHERE id = ? AND user_id = ?",
                libsql::params![id, self.owner_id.as_str()],
            )
            .await?;

        if deleted > 0 {
            tracing::info!(%id, "deleted bookmark");
            self.feed
                .publish(&self.owner_id, ChangeEvent::Delete { id: id.to_string() });
        }
        Ok(())
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        self.db
            .sync()
            .await
            .map_err(|e| StoreError::Unavailable(format!("{e:#}")))
    }
}

fn row_to_bookmark(row: &libsql::Row) -> Result<Bookmark, StoreError> {
    let created_at: String = row.get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| StoreError::Decode(format!("created_at {created_at:?}: {e}")))?
        .with_timezone(&Utc);

    Ok(Bookmark {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedMessage;

    async fn open(dir: &tempfile::TempDir) -> Arc<Database> {
        Arc::new(Database::open_local(&dir.path().join("test.db")).await.unwrap())
    }

    fn input(title: &str, url: &str, owner: &str) -> NewBookmark {
        NewBookmark::validate(title, url, owner).unwrap()
    }

    #[tokio::test]
    async fn create_then_snapshot_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir).await;
        let store = db.for_user(&Identity::new("u1", ""), ChangeFeed::new(8));

        let first = store.create(input("One", "https://one.example", "u1")).await.unwrap();
        let second = store.create(input("Two", "https://two.example", "u1")).await.unwrap();

        assert_eq!(first.id.len(), 32);
        assert_ne!(first.id, second.id);

        let snapshot = store.snapshot().await.unwrap();
        let ids: Vec<&str> = snapshot.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    }

    #[tokio::test]
    async fn rows_are_scoped_to_owner() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir).await;
        let feed = ChangeFeed::new(8);
        let alice = db.for_user(&Identity::new("alice", ""), feed.clone());
        let bob = db.for_user(&Identity::new("bob", ""), feed.clone());

        let mine = alice.create(input("Mine", "https://a.example", "alice")).await.unwrap();

        assert!(bob.snapshot().await.unwrap().is_empty());
        bob.delete(&mine.id).await.unwrap();
        assert_eq!(alice.snapshot().await.unwrap(), vec![mine]);

        let foreign = bob.create(input("Sneaky", "https://b.example", "alice")).await;
        assert!(matches!(foreign, Err(StoreError::Rejected(_))));
    }

    #[tokio::test]
    async fn writes_are_announced() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir).await;
        let feed = ChangeFeed::new(8);
        let mut sub = feed.subscribe("u1");
        let store = db.for_user(&Identity::new("u1", ""), feed.clone());

        let created = store.create(input("One", "https://one.example", "u1")).await.unwrap();
        store.delete(&created.id).await.unwrap();
        store.delete(&created.id).await.unwrap();

        assert_eq!(
            sub.recv().await,
            Some(FeedMessage::Change(ChangeEvent::Insert(created.clone())))
        );
        assert_eq!(
            sub.recv().await,
            Some(FeedMessage::Change(ChangeEvent::Delete { id: created.id.clone() }))
        );
        assert!(store.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn schema_rejects_bad_urls() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir).await;
        let store = db.for_user(&Identity::new("u1", ""), ChangeFeed::new(8));

        let bad = NewBookmark {
            title: "Bad".to_string(),
            url: "ftp://x.example".to_string(),
            owner_id: "u1".to_string(),
        };

        assert!(store.create(bad).await.is_err());
    }

    #[tokio::test]
    async fn migrations_run_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        drop(Database::open_local(&path).await.unwrap());

        let db = Database::open_local(&path).await.unwrap();
        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM _migrations", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();

        assert_eq!(count, 2);
        assert_eq!(db.mode(), Mode::Local);
    }
}

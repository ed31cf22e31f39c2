use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use anyhow::anyhow;
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    domain::track::{Track, TrackAttrs, TrackId},
    storage::{
        TrackStore,
        error::StoreError,
        schema::{self, columns::*, tables::*},
    },
};

/// Tracks stored in a SQLite table.
///
/// The connection is shared by all request threads behind a mutex;
/// every operation is a single statement, so no explicit transactions
/// are needed.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens the database file at `path` and initializes the schema
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        debug!("opening track database at {}", path.to_string_lossy());
        let db = Connection::open(path)?;
        db.busy_timeout(busy_timeout)?;
        Self::from_existing_conn(db)
    }

    pub fn from_existing_conn(db: Connection) -> Result<Self, StoreError> {
        schema::init(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn db(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|e| {
            StoreError::Internal(anyhow!("could not access track database under lock: {e}"))
        })
    }
}

impl TrackStore for SqliteStore {
    fn create(&self, attrs: TrackAttrs) -> Result<Track, StoreError> {
        let id = self.db()?.query_row(
            &format!("INSERT INTO {TRACKS} ({TITLE}) VALUES (?1) RETURNING {ID}"),
            params![attrs.title],
            |row| row.get(0),
        )?;
        Ok(Track::new(TrackId(id), attrs))
    }

    fn get(&self, id: TrackId) -> Result<Track, StoreError> {
        self.db()?
            .query_row(
                &format!("SELECT {ID}, {TITLE} FROM {TRACKS} WHERE {ID} = ?1"),
                params![id.0],
                |row| {
                    Ok(Track {
                        id: TrackId(row.get(0)?),
                        title: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::TrackNotFound(id))
    }

    fn list(&self) -> Result<Vec<Track>, StoreError> {
        let db = self.db()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {ID}, {TITLE} FROM {TRACKS} ORDER BY {ID}"
        ))?;

        let tracks = stmt
            .query_map([], |row| {
                Ok(Track {
                    id: TrackId(row.get(0)?),
                    title: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn delete(&self, id: TrackId) -> Result<(), StoreError> {
        let deleted = self.db()?.execute(
            &format!("DELETE FROM {TRACKS} WHERE {ID} = ?1"),
            params![id.0],
        )?;

        if deleted == 0 {
            return Err(StoreError::TrackNotFound(id));
        }
        Ok(())
    }
}

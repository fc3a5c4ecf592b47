use super::models::Track;
use super::schema::{CATALOG_VERSIONED_SCHEMAS, TRACK_TABLE_V_0};
use super::trait_def::TrackCatalog;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

fn track_from_row(row: &Row) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        title: row.get(1)?,
        artist_name: row.get(2)?,
        album_name: row.get(3)?,
        cover_url: row.get(4)?,
        duration_ms: row.get::<_, i64>(5)?.max(0) as u64,
    })
}

const TRACK_COLUMNS: &str = "id, title, artist_name, album_name, cover_url, duration_ms";

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), CATALOG_VERSIONED_SCHEMAS)
            .context("Failed to open catalog database")?;

        let track_count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", TRACK_TABLE_V_0.name),
                [],
                |r| r.get(0),
            )
            .unwrap_or(0);
        info!("Opened track catalog with {} tracks", track_count);

        Ok(SqliteCatalogStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Catalog connection mutex poisoned"))
    }
}

impl TrackCatalog for SqliteCatalogStore {
    fn get_tracks_by_ids(&self, ids: &[String]) -> Result<Vec<Track>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let conn = self.lock_conn()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE id IN ({})",
            TRACK_COLUMNS, TRACK_TABLE_V_0.name, placeholders
        ))?;
        let tracks = stmt
            .query_map(params_from_iter(ids.iter()), track_from_row)?
            .collect::<Result<Vec<Track>, _>>()?;
        debug!(
            "get_tracks_by_ids() requested {} found {}",
            ids.len(),
            tracks.len()
        );
        Ok(tracks)
    }

    fn get_track(&self, id: &str) -> Result<Option<Track>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE id = ?1",
            TRACK_COLUMNS, TRACK_TABLE_V_0.name
        ))?;
        let mut rows = stmt.query_map(params![id], track_from_row)?;
        Ok(rows.next().transpose()?)
    }

    fn upsert_track(&self, track: &Track) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    artist_name = excluded.artist_name,
                    album_name = excluded.album_name,
                    cover_url = excluded.cover_url,
                    duration_ms = excluded.duration_ms",
                TRACK_TABLE_V_0.name, TRACK_COLUMNS
            ),
            params![
                track.id,
                track.title,
                track.artist_name,
                track.album_name,
                track.cover_url,
                track.duration_ms as i64
            ],
        )
        .with_context(|| format!("Failed to upsert track {}", track.id))?;
        Ok(())
    }

    fn get_tracks_count(&self) -> usize {
        let conn = match self.lock_conn() {
            Ok(conn) => conn,
            Err(_) => return 0,
        };
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", TRACK_TABLE_V_0.name),
            [],
            |r| r.get::<_, i64>(0),
        )
        .map(|c| c as usize)
        .unwrap_or(0)
    }
}

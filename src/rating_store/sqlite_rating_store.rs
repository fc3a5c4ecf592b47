use super::models::{ComparisonEvent, PoolEntry, Rating, RatingUpdate, RecordOutcome, Replay};
use super::schema::{COMPARISON_TABLE_V_0, RANKING_VERSIONED_SCHEMAS, VAULT_TRACK_TABLE_V_0};
use super::trait_def::{ComparisonLog, RatingStore};
use crate::sqlite_persistence::{
    open_versioned_db, system_time_from_column_result, system_time_to_column, DEFAULT_TIMESTAMP,
};
use anyhow::{anyhow, Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct SqliteRatingStore {
    conn: Arc<Mutex<Connection>>,
}

/// Busy/locked database errors are worth a second attempt, anything else isn't.
pub(crate) fn is_transient_storage_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    })
}

fn pool_entry_from_row(row: &Row) -> rusqlite::Result<PoolEntry> {
    Ok(PoolEntry {
        track_id: row.get(0)?,
        rating: row.get(1)?,
        games: row.get(2)?,
    })
}

fn comparison_from_row(row: &Row) -> rusqlite::Result<ComparisonEvent> {
    Ok(ComparisonEvent {
        user_id: row.get(0)?,
        winner_id: row.get(1)?,
        loser_id: row.get(2)?,
        decided_at: system_time_from_column_result(row.get(3)?),
    })
}

fn read_rating(conn: &Connection, user_id: usize, track_id: &str) -> Result<Option<Rating>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT rating, games FROM {} WHERE user_id = ?1 AND track_id = ?2",
        VAULT_TRACK_TABLE_V_0.name
    ))?;
    let mut rows = stmt.query_map(params![user_id, track_id], |row| {
        Ok(Rating {
            rating: row.get(0)?,
            games: row.get(1)?,
        })
    })?;
    Ok(rows.next().transpose()?)
}

fn write_rating(conn: &Connection, user_id: usize, track_id: &str, rating: &Rating) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE {} SET rating = ?1, games = ?2, updated = {} WHERE user_id = ?3 AND track_id = ?4",
            VAULT_TRACK_TABLE_V_0.name, DEFAULT_TIMESTAMP
        ),
        params![rating.rating, rating.games, user_id, track_id],
    )
    .with_context(|| format!("Failed to write rating of {}", track_id))?;
    Ok(())
}

fn insert_comparison(conn: &Connection, event: &ComparisonEvent) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} (user_id, winner_id, loser_id, decided_at) VALUES (?1, ?2, ?3, ?4)",
            COMPARISON_TABLE_V_0.name
        ),
        params![
            event.user_id,
            event.winner_id,
            event.loser_id,
            system_time_to_column(event.decided_at)
        ],
    )?;
    Ok(())
}

fn read_rankings(conn: &Connection, user_id: usize) -> Result<Vec<PoolEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT track_id, rating, games FROM {} WHERE user_id = ?1
         ORDER BY rating DESC, games DESC, track_id ASC",
        VAULT_TRACK_TABLE_V_0.name
    ))?;
    let entries = stmt
        .query_map(params![user_id], pool_entry_from_row)?
        .collect::<Result<Vec<PoolEntry>, _>>()?;
    Ok(entries)
}

fn read_comparisons_chronological(
    conn: &Connection,
    user_id: usize,
) -> Result<Vec<ComparisonEvent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT user_id, winner_id, loser_id, decided_at FROM {}
         WHERE user_id = ?1 ORDER BY decided_at ASC, id ASC",
        COMPARISON_TABLE_V_0.name
    ))?;
    let events = stmt
        .query_map(params![user_id], comparison_from_row)?
        .collect::<Result<Vec<ComparisonEvent>, _>>()?;
    Ok(events)
}

impl SqliteRatingStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), RANKING_VERSIONED_SCHEMAS)
            .context("Failed to open ranking database")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let vault_rows: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", VAULT_TRACK_TABLE_V_0.name),
                [],
                |r| r.get(0),
            )
            .unwrap_or(0);
        info!("Opened ranking db with {} vault rows", vault_rows);

        Ok(SqliteRatingStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `op` holding the connection lock, trying once more if the first
    /// attempt hit a busy or locked database.
    fn with_transient_retry<T>(
        &self,
        op_name: &str,
        op: impl Fn(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("Ranking connection mutex poisoned"))?;
        match op(&mut *conn) {
            Err(err) if is_transient_storage_error(&err) => {
                warn!("{} hit a transient storage error, retrying: {}", op_name, err);
                std::thread::sleep(TRANSIENT_RETRY_DELAY);
                op(&mut *conn)
            }
            other => other,
        }
    }
}

impl RatingStore for SqliteRatingStore {
    fn list_ratings(
        &self,
        user_id: usize,
        exclude_ids: &[String],
        limit: usize,
    ) -> Result<Vec<PoolEntry>> {
        self.with_transient_retry("list_ratings", |conn| {
            let mut sql = format!(
                "SELECT track_id, rating, games FROM {} WHERE user_id = ?",
                VAULT_TRACK_TABLE_V_0.name
            );
            let mut values = vec![Value::Integer(user_id as i64)];
            if !exclude_ids.is_empty() {
                sql.push_str(&format!(
                    " AND track_id NOT IN ({})",
                    vec!["?"; exclude_ids.len()].join(", ")
                ));
                values.extend(exclude_ids.iter().map(|id| Value::Text(id.clone())));
            }
            sql.push_str(" ORDER BY games ASC, updated ASC, track_id ASC LIMIT ?");
            values.push(Value::Integer(limit as i64));

            let mut stmt = conn.prepare(&sql)?;
            let entries = stmt
                .query_map(params_from_iter(values.iter()), pool_entry_from_row)?
                .collect::<Result<Vec<PoolEntry>, _>>()?;
            debug!(
                "list_ratings({user_id}) excluded {} returned {}",
                exclude_ids.len(),
                entries.len()
            );
            Ok(entries)
        })
    }

    fn get_rating(&self, user_id: usize, track_id: &str) -> Result<Option<Rating>> {
        self.with_transient_retry("get_rating", |conn| read_rating(conn, user_id, track_id))
    }

    fn record_comparison(
        &self,
        user_id: usize,
        winner_id: &str,
        loser_id: &str,
        decided_at: SystemTime,
        update: &dyn Fn(&Rating, &Rating) -> RatingUpdate,
    ) -> Result<RecordOutcome> {
        self.with_transient_retry("record_comparison", |conn| {
            // Take the write lock up front, another connection can't slip a
            // vote in between our read and our write.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let winner = match read_rating(&tx, user_id, winner_id)? {
                Some(rating) => rating,
                None => return Ok(RecordOutcome::MissingTrack(winner_id.to_string())),
            };
            let loser = match read_rating(&tx, user_id, loser_id)? {
                Some(rating) => rating,
                None => return Ok(RecordOutcome::MissingTrack(loser_id.to_string())),
            };

            let updated = update(&winner, &loser);
            write_rating(&tx, user_id, winner_id, &updated.winner)?;
            write_rating(&tx, user_id, loser_id, &updated.loser)?;
            insert_comparison(
                &tx,
                &ComparisonEvent {
                    user_id,
                    winner_id: winner_id.to_string(),
                    loser_id: loser_id.to_string(),
                    decided_at,
                },
            )?;
            tx.commit()?;
            Ok(RecordOutcome::Recorded(updated))
        })
    }

    fn add_to_pool(&self, user_id: usize, track_id: &str, initial_rating: f64) -> Result<bool> {
        self.with_transient_retry("add_to_pool", |conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO {} (user_id, track_id, rating, games) VALUES (?1, ?2, ?3, 0)
                     ON CONFLICT(user_id, track_id) DO NOTHING",
                    VAULT_TRACK_TABLE_V_0.name
                ),
                params![user_id, track_id, initial_rating],
            )?;
            Ok(inserted > 0)
        })
    }

    fn remove_from_pool(&self, user_id: usize, track_id: &str) -> Result<bool> {
        self.with_transient_retry("remove_from_pool", |conn| {
            let removed = conn.execute(
                &format!(
                    "DELETE FROM {} WHERE user_id = ?1 AND track_id = ?2",
                    VAULT_TRACK_TABLE_V_0.name
                ),
                params![user_id, track_id],
            )?;
            Ok(removed > 0)
        })
    }

    fn list_rankings(&self, user_id: usize) -> Result<Vec<PoolEntry>> {
        self.with_transient_retry("list_rankings", |conn| read_rankings(conn, user_id))
    }

    fn recompute_ratings(
        &self,
        user_id: usize,
        replay: &dyn Fn(&[PoolEntry], &[ComparisonEvent]) -> Replay,
    ) -> Result<Replay> {
        self.with_transient_retry("recompute_ratings", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let vault = read_rankings(&tx, user_id)?;
            let events = read_comparisons_chronological(&tx, user_id)?;

            let result = replay(&vault, &events);
            for entry in &result.ratings {
                write_rating(&tx, user_id, &entry.track_id, &entry.as_rating())?;
            }
            tx.commit()?;
            debug!(
                "Replayed {} of {} comparisons over {} vault rows of user {}",
                result.replayed,
                events.len(),
                vault.len(),
                user_id
            );
            Ok(result)
        })
    }

    fn reset_user(&self, user_id: usize) -> Result<usize> {
        self.with_transient_retry("reset_user", |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                &format!(
                    "DELETE FROM {} WHERE user_id = ?1",
                    VAULT_TRACK_TABLE_V_0.name
                ),
                params![user_id],
            )?;
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE user_id = ?1",
                    COMPARISON_TABLE_V_0.name
                ),
                params![user_id],
            )?;
            tx.commit()?;
            info!("Reset ranking data of user {}: {} vault rows", user_id, removed);
            Ok(removed)
        })
    }
}

impl ComparisonLog for SqliteRatingStore {
    fn get_comparisons(&self, user_id: usize, limit: Option<usize>) -> Result<Vec<ComparisonEvent>> {
        self.with_transient_retry("get_comparisons", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT user_id, winner_id, loser_id, decided_at FROM {}
                 WHERE user_id = ?1 ORDER BY decided_at DESC, id DESC LIMIT ?2",
                COMPARISON_TABLE_V_0.name
            ))?;
            // A negative limit means no limit in sqlite
            let limit = limit.map(|l| l as i64).unwrap_or(-1);
            let events = stmt
                .query_map(params![user_id, limit], comparison_from_row)?
                .collect::<Result<Vec<ComparisonEvent>, _>>()?;
            Ok(events)
        })
    }

    fn get_comparisons_chronological(&self, user_id: usize) -> Result<Vec<ComparisonEvent>> {
        self.with_transient_retry("get_comparisons_chronological", |conn| {
            read_comparisons_chronological(conn, user_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;
    use tempfile::TempDir;

    fn create_tmp_store() -> (SqliteRatingStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteRatingStore::new(temp_dir.path().join("ranking.db")).unwrap();
        (store, temp_dir)
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn winner_takes_ten(winner: &Rating, loser: &Rating) -> RatingUpdate {
        RatingUpdate {
            winner: Rating {
                rating: winner.rating + 10.0,
                games: winner.games + 1,
            },
            loser: Rating {
                rating: loser.rating - 10.0,
                games: loser.games + 1,
            },
        }
    }

    #[test]
    fn adds_to_pool_only_once() {
        let (store, _temp_dir) = create_tmp_store();
        assert!(store.add_to_pool(1, "t1", 1500.0).unwrap());
        assert!(store.add_to_pool(1, "t2", 1500.0).unwrap());
        store
            .record_comparison(1, "t1", "t2", at(10), &winner_takes_ten)
            .unwrap();
        let rating = store.get_rating(1, "t1").unwrap().unwrap();

        assert!(!store.add_to_pool(1, "t1", 1500.0).unwrap());
        assert_eq!(store.get_rating(1, "t1").unwrap().unwrap(), rating);

        // Vaults are per user
        assert!(store.add_to_pool(2, "t1", 1500.0).unwrap());
        assert_eq!(
            store.get_rating(2, "t1").unwrap(),
            Some(Rating::initial(1500.0))
        );
    }

    #[test]
    fn records_comparison_atomically() {
        let (store, _temp_dir) = create_tmp_store();
        store.add_to_pool(1, "a", 1500.0).unwrap();
        store.add_to_pool(1, "b", 1500.0).unwrap();

        let outcome = store
            .record_comparison(1, "a", "b", at(100), &winner_takes_ten)
            .unwrap();
        let RecordOutcome::Recorded(update) = outcome else {
            panic!("Expected the comparison to be recorded");
        };
        assert_eq!(update.winner, Rating { rating: 1510.0, games: 1 });
        assert_eq!(store.get_rating(1, "a").unwrap().unwrap(), update.winner);
        assert_eq!(store.get_rating(1, "b").unwrap().unwrap(), update.loser);

        let log = store.get_comparisons(1, None).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].winner_id, "a");
        assert_eq!(log[0].loser_id, "b");
        assert_eq!(log[0].decided_at, at(100));
    }

    #[test]
    fn missing_track_leaves_everything_untouched() {
        let (store, _temp_dir) = create_tmp_store();
        store.add_to_pool(1, "a", 1500.0).unwrap();

        let outcome = store
            .record_comparison(1, "a", "ghost", at(100), &winner_takes_ten)
            .unwrap();
        match outcome {
            RecordOutcome::MissingTrack(id) => assert_eq!(id, "ghost"),
            RecordOutcome::Recorded(_) => panic!("Should not record against a missing track"),
        }
        assert_eq!(
            store.get_rating(1, "a").unwrap(),
            Some(Rating::initial(1500.0))
        );
        assert!(store.get_comparisons(1, None).unwrap().is_empty());
    }

    #[test]
    fn list_ratings_excludes_and_limits() {
        let (store, _temp_dir) = create_tmp_store();
        for id in ["a", "b", "c", "d"] {
            store.add_to_pool(1, id, 1500.0).unwrap();
        }
        store.add_to_pool(2, "other-user", 1500.0).unwrap();
        store
            .record_comparison(1, "a", "b", at(1), &winner_takes_ten)
            .unwrap();

        let all = store.list_ratings(1, &[], 10).unwrap();
        let ids: Vec<&str> = all.iter().map(|e| e.track_id.as_str()).collect();
        // Fewest games first
        assert_eq!(ids, vec!["c", "d", "a", "b"]);

        let filtered = store
            .list_ratings(1, &["c".to_string(), "a".to_string()], 10)
            .unwrap();
        let ids: Vec<&str> = filtered.iter().map(|e| e.track_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b"]);

        assert_eq!(store.list_ratings(1, &[], 2).unwrap().len(), 2);
        assert!(store.list_ratings(3, &[], 10).unwrap().is_empty());
    }

    #[test]
    fn rankings_are_sorted_by_rating() {
        let (store, _temp_dir) = create_tmp_store();
        for id in ["a", "b", "c"] {
            store.add_to_pool(1, id, 1500.0).unwrap();
        }
        store
            .record_comparison(1, "c", "a", at(1), &winner_takes_ten)
            .unwrap();

        let rankings = store.list_rankings(1).unwrap();
        let ids: Vec<&str> = rankings.iter().map(|e| e.track_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn comparisons_come_back_in_both_orders() {
        let (store, _temp_dir) = create_tmp_store();
        store.add_to_pool(1, "a", 1500.0).unwrap();
        store.add_to_pool(1, "b", 1500.0).unwrap();
        store
            .record_comparison(1, "a", "b", at(10), &winner_takes_ten)
            .unwrap();
        store
            .record_comparison(1, "b", "a", at(20), &winner_takes_ten)
            .unwrap();
        store
            .record_comparison(1, "a", "b", at(20), &winner_takes_ten)
            .unwrap();

        let newest = store.get_comparisons(1, Some(2)).unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].winner_id, "a");
        assert_eq!(newest[0].decided_at, at(20));
        assert_eq!(newest[1].winner_id, "b");

        let replay = store.get_comparisons_chronological(1).unwrap();
        let winners: Vec<&str> = replay.iter().map(|e| e.winner_id.as_str()).collect();
        assert_eq!(winners, vec!["a", "b", "a"]);
    }

    #[test]
    fn removing_a_track_keeps_the_log() {
        let (store, _temp_dir) = create_tmp_store();
        store.add_to_pool(1, "a", 1500.0).unwrap();
        store.add_to_pool(1, "b", 1500.0).unwrap();
        store
            .record_comparison(1, "a", "b", at(10), &winner_takes_ten)
            .unwrap();

        assert!(store.remove_from_pool(1, "a").unwrap());
        assert!(!store.remove_from_pool(1, "a").unwrap());
        assert_eq!(store.get_rating(1, "a").unwrap(), None);
        assert_eq!(store.get_comparisons(1, None).unwrap().len(), 1);
    }

    #[test]
    fn recompute_writes_what_the_replay_returns() {
        let (store, _temp_dir) = create_tmp_store();
        store.add_to_pool(1, "a", 1500.0).unwrap();
        store.add_to_pool(1, "b", 1500.0).unwrap();
        store
            .record_comparison(1, "a", "b", at(10), &winner_takes_ten)
            .unwrap();
        store
            .record_comparison(1, "b", "a", at(20), &winner_takes_ten)
            .unwrap();

        let result = store
            .recompute_ratings(1, &|vault, events| {
                assert_eq!(vault.len(), 2);
                let winners: Vec<&str> = events.iter().map(|e| e.winner_id.as_str()).collect();
                assert_eq!(winners, vec!["a", "b"]);
                Replay {
                    ratings: vec![PoolEntry::new("a", 1600.0, 4), PoolEntry::new("b", 1400.0, 4)],
                    replayed: events.len(),
                }
            })
            .unwrap();
        assert_eq!(result.replayed, 2);
        assert_eq!(
            store.get_rating(1, "a").unwrap(),
            Some(Rating {
                rating: 1600.0,
                games: 4
            })
        );
        // The log itself is never rewritten
        assert_eq!(store.get_comparisons(1, None).unwrap().len(), 2);
    }

    #[test]
    fn resets_only_the_given_user() {
        let (store, _temp_dir) = create_tmp_store();
        store.add_to_pool(1, "a", 1500.0).unwrap();
        store.add_to_pool(1, "b", 1500.0).unwrap();
        store.add_to_pool(2, "a", 1500.0).unwrap();

        store
            .record_comparison(1, "a", "b", at(10), &winner_takes_ten)
            .unwrap();
        assert_eq!(store.reset_user(1).unwrap(), 2);
        assert!(store.list_rankings(1).unwrap().is_empty());
        assert!(store.get_comparisons(1, None).unwrap().is_empty());
        assert_eq!(store.list_rankings(2).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_votes_all_land() {
        const VOTERS: u32 = 8;
        let (store, _temp_dir) = create_tmp_store();
        store.add_to_pool(1, "a", 1500.0).unwrap();
        store.add_to_pool(1, "b", 1500.0).unwrap();

        let handles: Vec<_> = (0..VOTERS)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let (winner, loser) = if i % 2 == 0 { ("a", "b") } else { ("b", "a") };
                    store
                        .record_comparison(1, winner, loser, at(100 + i as u64), &winner_takes_ten)
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let a = store.get_rating(1, "a").unwrap().unwrap();
        let b = store.get_rating(1, "b").unwrap().unwrap();
        assert_eq!(a.games, VOTERS);
        assert_eq!(b.games, VOTERS);
        assert!((a.rating + b.rating - 3000.0).abs() < 1e-9);
        assert_eq!(
            store.get_comparisons(1, None).unwrap().len(),
            VOTERS as usize
        );
    }

    #[test]
    fn detects_transient_errors() {
        let busy = anyhow::Error::from(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ))
        .context("while recording");
        assert!(is_transient_storage_error(&busy));

        let constraint = anyhow::Error::from(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        ));
        assert!(!is_transient_storage_error(&constraint));
        assert!(!is_transient_storage_error(&anyhow!("something else")));
    }
}

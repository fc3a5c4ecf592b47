use super::auth::{
    AuthToken, AuthTokenValue, UserAuthCredentials, UsernamePasswordCredentials, VaultHasher,
};
use super::user_store::{UserAuthCredentialsStore, UserAuthTokenStore, UserStore};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    open_versioned_db, system_time_from_column_result, Column, ForeignKey, ForeignKeyOnChange,
    SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, Row};
use std::{
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, info};

/// V 0
const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_user_handle", "handle")],
};
const AUTH_TOKEN_TABLE_V_0: Table = Table {
    name: "auth_token",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("value", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    unique_constraints: &[],
    indices: &[("idx_auth_token_value", "value")],
};
const USER_PASSWORD_CREDENTIALS_V_0: Table = Table {
    name: "user_password_credentials",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            is_unique = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("salt", &SqlType::Text, non_null = true),
        sqlite_column!("hash", &SqlType::Text, non_null = true),
        sqlite_column!("hasher", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_tried", &SqlType::Integer),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    unique_constraints: &[],
    indices: &[],
};

pub const USER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        USER_TABLE_V_0,
        AUTH_TOKEN_TABLE_V_0,
        USER_PASSWORD_CREDENTIALS_V_0,
    ],
    migration: None,
}];

#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

fn auth_token_from_row(row: &Row) -> rusqlite::Result<AuthToken> {
    Ok(AuthToken {
        user_id: row.get(0)?,
        value: AuthTokenValue(row.get(1)?),
        created: system_time_from_column_result(row.get(2)?),
        last_used: row
            .get::<usize, Option<i64>>(3)?
            .map(system_time_from_column_result),
    })
}

impl SqliteUserStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = open_versioned_db(db_path.as_ref(), USER_VERSIONED_SCHEMAS)
            .context("Failed to open user database")?;
        let users: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", USER_TABLE_V_0.name),
                [],
                |r| r.get(0),
            )
            .unwrap_or(0);
        info!("Opened user db with {} users", users);

        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("User connection mutex poisoned"))
    }
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, user_handle: &str) -> Result<usize> {
        let conn = self.lock_conn()?;
        conn.execute(
            &format!("INSERT INTO {} (handle) VALUES (?1)", USER_TABLE_V_0.name),
            params![user_handle],
        )
        .with_context(|| format!("Failed to create user {}", user_handle))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_user_handle(&self, user_id: usize) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT handle FROM {} WHERE id = ?1",
            USER_TABLE_V_0.name
        ))?;
        let mut rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        Ok(rows.next().transpose()?)
    }

    fn get_all_user_handles(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT handle FROM {} ORDER BY id",
            USER_TABLE_V_0.name
        ))?;
        let handles = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(handles)
    }

    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id FROM {} WHERE handle = ?1",
            USER_TABLE_V_0.name
        ))?;
        let mut rows = stmt.query_map(params![user_handle], |row| row.get(0))?;
        Ok(rows.next().transpose()?)
    }
}

impl UserAuthTokenStore for SqliteUserStore {
    fn get_user_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT user_id, value, created, last_used FROM {} WHERE value = ?1",
            AUTH_TOKEN_TABLE_V_0.name
        ))?;
        let mut rows = stmt.query_map(params![value.0], auth_token_from_row)?;
        Ok(rows.next().transpose()?)
    }

    fn delete_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let existing = match self.get_user_auth_token(token)? {
            Some(existing) => existing,
            None => return Ok(None),
        };
        let conn = self.lock_conn()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE value = ?1", AUTH_TOKEN_TABLE_V_0.name),
            params![token.0],
        )?;
        debug!("Deleted auth token of user {}", existing.user_id);
        Ok(Some(existing))
    }

    fn update_user_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "UPDATE {} SET last_used = {} WHERE value = ?1",
                AUTH_TOKEN_TABLE_V_0.name, DEFAULT_TIMESTAMP
            ),
            params![token.0],
        )?;
        Ok(())
    }

    fn add_user_auth_token(&self, token: AuthToken) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (value, user_id) VALUES (?1, ?2)",
                AUTH_TOKEN_TABLE_V_0.name
            ),
            params![token.value.0, token.user_id],
        )?;
        Ok(())
    }

    fn get_all_user_auth_tokens(&self, user_handle: &str) -> Result<Vec<AuthToken>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT user_id, value, created, last_used FROM {} WHERE user_id = (SELECT id FROM {} WHERE handle = ?1)",
            AUTH_TOKEN_TABLE_V_0.name, USER_TABLE_V_0.name
        ))?;
        let tokens = stmt
            .query_map(params![user_handle], auth_token_from_row)?
            .collect::<Result<Vec<AuthToken>, _>>()?;
        Ok(tokens)
    }
}

impl UserAuthCredentialsStore for SqliteUserStore {
    fn get_user_auth_credentials(&self, user_handle: &str) -> Result<Option<UserAuthCredentials>> {
        let user_id = match self.get_user_id(user_handle)? {
            Some(id) => id,
            None => return Ok(None),
        };
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT user_id, salt, hash, hasher, created, last_tried, last_used FROM {} WHERE user_id = ?1",
            USER_PASSWORD_CREDENTIALS_V_0.name
        ))?;
        let mut rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<usize, usize>(0)?,
                row.get::<usize, String>(1)?,
                row.get::<usize, String>(2)?,
                row.get::<usize, String>(3)?,
                row.get::<usize, Option<i64>>(4)?,
                row.get::<usize, Option<i64>>(5)?,
                row.get::<usize, Option<i64>>(6)?,
            ))
        })?;

        let username_password = match rows.next().transpose()? {
            Some((user_id, salt, hash, hasher, created, last_tried, last_used)) => {
                Some(UsernamePasswordCredentials {
                    user_id,
                    salt,
                    hash,
                    hasher: VaultHasher::from_str(&hasher)?,
                    created: system_time_from_column_result(created.unwrap_or(0)),
                    last_tried: last_tried.map(system_time_from_column_result),
                    last_used: last_used.map(system_time_from_column_result),
                })
            }
            None => None,
        };

        Ok(Some(UserAuthCredentials {
            user_id,
            username_password,
        }))
    }

    fn update_user_auth_credentials(&self, credentials: UserAuthCredentials) -> Result<()> {
        let conn = self.lock_conn()?;
        let user_id = credentials.user_id;
        match credentials.username_password.as_ref() {
            Some(password_credentials) => {
                conn.execute(
                    &format!(
                        "INSERT INTO {} (user_id, salt, hash, hasher) VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(user_id) DO UPDATE SET
                            salt = excluded.salt,
                            hash = excluded.hash,
                            hasher = excluded.hasher",
                        USER_PASSWORD_CREDENTIALS_V_0.name
                    ),
                    params![
                        user_id,
                        password_credentials.salt,
                        password_credentials.hash,
                        password_credentials.hasher.to_string(),
                    ],
                )?;
            }
            None => {
                conn.execute(
                    &format!(
                        "DELETE FROM {} WHERE user_id = ?1",
                        USER_PASSWORD_CREDENTIALS_V_0.name
                    ),
                    params![user_id],
                )?;
            }
        };
        Ok(())
    }
}

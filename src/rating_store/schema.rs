use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

/// V 0
pub(super) const VAULT_TRACK_TABLE_V_0: Table = Table {
    name: "vault_track",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!("track_id", &SqlType::Text, non_null = true),
        sqlite_column!("rating", &SqlType::Real, non_null = true),
        sqlite_column!(
            "games",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "added",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_vault_track_user_id", "user_id")],
    unique_constraints: &[&["user_id", "track_id"]],
};

pub(super) const COMPARISON_TABLE_V_0: Table = Table {
    name: "comparison",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!("winner_id", &SqlType::Text, non_null = true),
        sqlite_column!("loser_id", &SqlType::Text, non_null = true),
        sqlite_column!("decided_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_comparison_user_id", "user_id")],
    unique_constraints: &[],
};

pub const RANKING_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[VAULT_TRACK_TABLE_V_0, COMPARISON_TABLE_V_0],
    migration: None,
}];

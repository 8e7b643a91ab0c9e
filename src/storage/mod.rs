//! Persistence layer.
//!
//! SQLite-backed `TokenStore`: one row per token in `tokens`, removed
//! tokens in `honeypots` / `removed_tokens`, and an append-only
//! `scan_history` log. Report blobs are stored as JSON text; the fields
//! the lifecycle rules read (status, honeypot flag, liquidity, age, ladder)
//! are real columns.
//!
//! Timestamps are fixed-width RFC 3339 text so that lexical order is
//! chronological.

pub mod schema;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::types::{
    LiquidityLadder, Removal, RemovedToken, ScannerError, TokenRecord, TokenStatus, LADDER_SLOTS,
};
use schema::{column_list, ladder_column, placeholders};

pub type StoreResult<T> = std::result::Result<T, ScannerError>;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// One classification pass as logged in `scan_history`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub address: String,
    pub scanned_at: DateTime<Utc>,
    pub total_scans: i64,
    pub liquidity: Option<f64>,
    pub is_honeypot: bool,
    pub failed: bool,
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn from_record(record: &TokenRecord, scanned_at: DateTime<Utc>, failed: bool) -> Self {
        Self {
            address: record.address.clone(),
            scanned_at,
            total_scans: record.total_scans,
            liquidity: record.current_liquidity(),
            is_honeypot: record.is_honeypot(),
            failed,
            error: if failed { record.last_error.clone() } else { None },
        }
    }
}

/// Aggregate counts for the summary endpoint and shutdown log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub active: i64,
    pub honeypots: i64,
    pub removed: i64,
    pub avg_scans: f64,
}

#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, Copy)]
enum MoveFault {
    AfterInsert,
}

/// Handle to the token database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    /// Open (creating if needed) the on-disk database and apply the schema.
    pub async fn open(config: &StorageConfig) -> StoreResult<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ScannerError::Store(format!("failed to create database directory: {e}"))
                })?;
                info!(path = ?parent, "Created database directory");
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(
            path = ?config.database_path,
            max_connections = config.max_connections,
            "Token store opened"
        );
        Ok(store)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // One connection that never recycles, or the database vanishes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the schema. Idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in schema::statements() {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        debug!("Schema applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // -- Active table ----------------------------------------------------

    /// Replace the row for `record.address` with `record`.
    pub async fn upsert(&self, record: &TokenRecord) -> StoreResult<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO tokens ({}) VALUES ({})",
            column_list(),
            placeholders(0)
        );
        bind_record(sqlx::query(&sql), record)?
            .execute(&self.pool)
            .await?;
        debug!(address = %record.address, total_scans = record.total_scans, "Record upserted");
        Ok(())
    }

    pub async fn get(&self, address: &str) -> StoreResult<Option<TokenRecord>> {
        let sql = format!("SELECT {} FROM tokens WHERE address = ?", column_list());
        let row = sqlx::query(&sql)
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    /// All active tokens, least recently scanned first.
    pub async fn list_active(&self) -> StoreResult<Vec<TokenRecord>> {
        let sql = format!(
            "SELECT {} FROM tokens ORDER BY last_scan_at ASC, address ASC",
            column_list()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(decode_records(&rows))
    }

    /// Active tokens still under the rescan cap, least recently scanned first.
    pub async fn list_rescan_candidates(&self, max_scans: i64) -> StoreResult<Vec<TokenRecord>> {
        let sql = format!(
            "SELECT {} FROM tokens WHERE total_scans < ? ORDER BY last_scan_at ASC, address ASC",
            column_list()
        );
        let rows = sqlx::query(&sql)
            .bind(max_scans)
            .fetch_all(&self.pool)
            .await?;
        Ok(decode_records(&rows))
    }

    pub async fn count_active(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // -- Removal ---------------------------------------------------------

    /// Atomically move a token from `tokens` into the removal table for
    /// `removal`. Returns `false` if the token was not active.
    pub async fn move_to_removed(
        &self,
        address: &str,
        removal: Removal,
        reason: &str,
    ) -> StoreResult<bool> {
        self.move_inner(address, removal, reason, None).await
    }

    async fn move_inner(
        &self,
        address: &str,
        removal: Removal,
        reason: &str,
        fault: Option<MoveFault>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let select = format!("SELECT {} FROM tokens WHERE address = ?", column_list());
        let Some(row) = sqlx::query(&select)
            .bind(address)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            warn!(address, table = removal.table(), "Removal requested for inactive token");
            return Ok(false);
        };

        let mut record = record_from_row(&row)?;
        record.status = removal.status();

        let insert = format!(
            "INSERT OR REPLACE INTO {} ({}, removal_timestamp, removal_reason) VALUES ({})",
            removal.table(),
            column_list(),
            placeholders(2)
        );
        bind_record(sqlx::query(&insert), &record)?
            .bind(timestamp(Utc::now()))
            .bind(reason)
            .execute(&mut *tx)
            .await?;

        if let Some(MoveFault::AfterInsert) = fault {
            // Dropping `tx` rolls the insert back.
            return Err(ScannerError::Store("simulated crash after insert".into()));
        }

        sqlx::query("DELETE FROM tokens WHERE address = ?")
            .bind(address)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(address, table = removal.table(), status = %removal.status(), reason, "Token moved to removal table");
        Ok(true)
    }

    /// Removal row for `address`, from whichever table holds it.
    pub async fn get_removed(&self, address: &str) -> StoreResult<Option<RemovedToken>> {
        for table in ["honeypots", "removed_tokens"] {
            let sql = format!(
                "SELECT {}, removal_timestamp, removal_reason FROM {table} WHERE address = ?",
                column_list()
            );
            if let Some(row) = sqlx::query(&sql)
                .bind(address)
                .fetch_optional(&self.pool)
                .await?
            {
                return removed_from_row(&row).map(Some);
            }
        }
        Ok(None)
    }

    pub async fn is_removed(&self, address: &str) -> StoreResult<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM honeypots WHERE address = ?)
                  + (SELECT COUNT(*) FROM removed_tokens WHERE address = ?)",
        )
        .bind(address)
        .bind(address)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Removals of one kind at or after `since`, oldest first.
    pub async fn list_removed_since(
        &self,
        removal: Removal,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<RemovedToken>> {
        let sql = format!(
            "SELECT {}, removal_timestamp, removal_reason FROM {} \
             WHERE status = ? AND removal_timestamp >= ? ORDER BY removal_timestamp ASC",
            column_list(),
            removal.table()
        );
        let rows = sqlx::query(&sql)
            .bind(removal.status().as_str())
            .bind(timestamp(since))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(removed_from_row).collect()
    }

    // -- History ---------------------------------------------------------

    pub async fn record_history(&self, entry: &HistoryEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO scan_history
                (address, scanned_at, total_scans, liquidity, is_honeypot, failed, error)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.address)
        .bind(timestamp(entry.scanned_at))
        .bind(entry.total_scans)
        .bind(entry.liquidity)
        .bind(entry.is_honeypot)
        .bind(entry.failed)
        .bind(&entry.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every logged pass for `address`, in pass order.
    pub async fn history(&self, address: &str) -> StoreResult<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            "SELECT address, scanned_at, total_scans, liquidity, is_honeypot, failed, error
             FROM scan_history WHERE address = ? ORDER BY id ASC",
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<HistoryEntry> {
                Ok(HistoryEntry {
                    address: row.try_get("address")?,
                    scanned_at: parse_timestamp(&row.try_get::<String, _>("scanned_at")?)?,
                    total_scans: row.try_get("total_scans")?,
                    liquidity: row.try_get("liquidity")?,
                    is_honeypot: row.try_get("is_honeypot")?,
                    failed: row.try_get("failed")?,
                    error: row.try_get("error")?,
                })
            })
            .collect()
    }

    pub async fn stats(&self) -> StoreResult<StoreStats> {
        let (active, avg_scans): (i64, Option<f64>) =
            sqlx::query_as("SELECT COUNT(*), AVG(total_scans) FROM tokens")
                .fetch_one(&self.pool)
                .await?;
        let (honeypots,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM honeypots")
            .fetch_one(&self.pool)
            .await?;
        let (removed,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM removed_tokens")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            active,
            honeypots,
            removed,
            avg_scans: avg_scans.unwrap_or(0.0),
        })
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ScannerError::Store(format!("bad timestamp {s:?}: {e}")))
}

fn to_json<T: Serialize>(value: &Option<T>) -> StoreResult<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ScannerError::Store(format!("failed to encode report: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: Option<String>) -> StoreResult<Option<T>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| ScannerError::Store(format!("failed to decode report: {e}")))
}

/// Bind every record column, in `column_list()` order.
fn bind_record<'q>(query: SqliteQuery<'q>, record: &TokenRecord) -> StoreResult<SqliteQuery<'q>> {
    let honeypot = to_json(&record.honeypot)?;
    let security = to_json(&record.security)?;

    let mut query = query
        .bind(record.address.clone())
        .bind(record.pair_address.clone())
        .bind(record.name.clone())
        .bind(record.symbol.clone())
        .bind(record.decimals)
        .bind(record.total_supply.clone())
        .bind(timestamp(record.first_scan_at))
        .bind(timestamp(record.last_scan_at))
        .bind(record.age_hours)
        .bind(record.total_scans)
        .bind(record.honeypot_failures)
        .bind(record.last_error.clone())
        .bind(record.status.as_str())
        .bind(record.is_honeypot())
        .bind(record.current_liquidity())
        .bind(honeypot)
        .bind(security);

    for slot in record.liquidity.slots() {
        query = query.bind(*slot);
    }
    Ok(query)
}

/// Decode a listing, skipping rows that no longer decode. One bad row must
/// not stall sweeps over every other token.
fn decode_records(rows: &[SqliteRow]) -> Vec<TokenRecord> {
    rows.iter()
        .filter_map(|row| match record_from_row(row) {
            Ok(record) => Some(record),
            Err(e) => {
                let address: String = row.try_get("address").unwrap_or_default();
                error!(address = %address, error = %e, "Skipping undecodable token row");
                None
            }
        })
        .collect()
}

fn record_from_row(row: &SqliteRow) -> StoreResult<TokenRecord> {
    let status: String = row.try_get("status")?;
    let status = TokenStatus::from_str(&status)
        .map_err(|e| ScannerError::Store(e.to_string()))?;

    let mut slots = [None; LADDER_SLOTS];
    for (index, slot) in slots.iter_mut().enumerate() {
        *slot = row.try_get(ladder_column(index).as_str())?;
    }

    Ok(TokenRecord {
        address: row.try_get("address")?,
        pair_address: row.try_get("pair_address")?,
        name: row.try_get("name")?,
        symbol: row.try_get("symbol")?,
        decimals: row.try_get("decimals")?,
        total_supply: row.try_get("total_supply")?,
        first_scan_at: parse_timestamp(&row.try_get::<String, _>("first_scan_at")?)?,
        last_scan_at: parse_timestamp(&row.try_get::<String, _>("last_scan_at")?)?,
        age_hours: row.try_get("age_hours")?,
        total_scans: row.try_get("total_scans")?,
        honeypot_failures: row.try_get("honeypot_failures")?,
        last_error: row.try_get("last_error")?,
        status,
        honeypot: from_json(row.try_get("honeypot_report")?)?,
        security: from_json(row.try_get("security_report")?)?,
        liquidity: LiquidityLadder::from_slots(slots),
    })
}

fn removed_from_row(row: &SqliteRow) -> StoreResult<RemovedToken> {
    Ok(RemovedToken {
        record: record_from_row(row)?,
        removal_timestamp: parse_timestamp(&row.try_get::<String, _>("removal_timestamp")?)?,
        removal_reason: row.try_get("removal_reason")?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

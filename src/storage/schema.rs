//! Table definitions.
//!
//! The active table and both removal tables share one column layout; the
//! removal tables add `removal_timestamp` and `removal_reason`. Column
//! lists are generated here so that DDL, inserts and selects agree.

use crate::types::{LiquidityLadder, LADDER_SLOTS};

/// Record columns in bind order, excluding the ladder.
pub const RECORD_COLUMNS: &[(&str, &str)] = &[
    ("address", "TEXT PRIMARY KEY"),
    ("pair_address", "TEXT NOT NULL"),
    ("name", "TEXT"),
    ("symbol", "TEXT"),
    ("decimals", "INTEGER"),
    ("total_supply", "TEXT"),
    ("first_scan_at", "TEXT NOT NULL"),
    ("last_scan_at", "TEXT NOT NULL"),
    ("age_hours", "REAL"),
    ("total_scans", "INTEGER NOT NULL DEFAULT 0"),
    ("honeypot_failures", "INTEGER NOT NULL DEFAULT 0"),
    ("last_error", "TEXT"),
    ("status", "TEXT NOT NULL"),
    ("is_honeypot", "INTEGER NOT NULL DEFAULT 0"),
    ("pair_liquidity", "REAL"),
    ("honeypot_report", "TEXT"),
    ("security_report", "TEXT"),
];

/// Column holding ladder slot `index` (`liq10` … `liq200`).
pub fn ladder_column(index: usize) -> String {
    format!("liq{}", LiquidityLadder::milestone(index))
}

/// Comma-separated record columns including the ladder.
pub fn column_list() -> String {
    RECORD_COLUMNS
        .iter()
        .map(|(name, _)| name.to_string())
        .chain((0..LADDER_SLOTS).map(ladder_column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `?, ?, …` matching `column_list()` plus `extra` trailing slots.
pub fn placeholders(extra: usize) -> String {
    vec!["?"; RECORD_COLUMNS.len() + LADDER_SLOTS + extra].join(", ")
}

fn record_ddl() -> String {
    RECORD_COLUMNS
        .iter()
        .map(|(name, ty)| format!("{name} {ty}"))
        .chain((0..LADDER_SLOTS).map(|i| format!("{} REAL", ladder_column(i))))
        .collect::<Vec<_>>()
        .join(",\n    ")
}

/// Every statement needed to bring an empty database to the current
/// schema. Idempotent.
pub fn statements() -> Vec<String> {
    let columns = record_ddl();
    vec![
        format!("CREATE TABLE IF NOT EXISTS tokens (\n    {columns}\n)"),
        format!(
            "CREATE TABLE IF NOT EXISTS honeypots (\n    {columns},\n    \
             removal_timestamp TEXT NOT NULL,\n    removal_reason TEXT NOT NULL\n)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS removed_tokens (\n    {columns},\n    \
             removal_timestamp TEXT NOT NULL,\n    removal_reason TEXT NOT NULL\n)"
        ),
        "CREATE TABLE IF NOT EXISTS scan_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address TEXT NOT NULL,
            scanned_at TEXT NOT NULL,
            total_scans INTEGER NOT NULL,
            liquidity REAL,
            is_honeypot INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            error TEXT
        )"
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_tokens_last_scan ON tokens(last_scan_at)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_honeypots_removed_at ON honeypots(removal_timestamp)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_removed_tokens_removed_at ON removed_tokens(removal_timestamp)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_scan_history_address ON scan_history(address)".to_string(),
    ]
}

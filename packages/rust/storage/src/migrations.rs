//! SQL migration definitions for the LotScout database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: lots",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Extracted vehicle lots
CREATE TABLE IF NOT EXISTS lots (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    source_link TEXT NOT NULL,
    model_year  INTEGER NOT NULL,
    vin         TEXT NOT NULL,
    buy_now     INTEGER,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_lots_vin ON lots(vin);
CREATE INDEX IF NOT EXISTS idx_lots_buy_now ON lots(buy_now);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}

//! libSQL persistence gateway for extracted lots.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the
//! authoritative lot set between runs. The pipeline controller is the sole
//! writer; replace-persistence is `clear_lots` followed by `insert_lots`
//! and is **not** atomic across the pair — a crash between the two leaves
//! the store empty. That gap is accepted and documented, not masked.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, Value, params};
use tracing::warn;
use url::Url;

use lotscout_shared::{Lot, LotScoutError, Result};

/// Rows per bulk INSERT statement, to keep parameter counts bounded.
const INSERT_CHUNK_ROWS: usize = 500;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LotScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LotScoutError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LotScoutError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    LotScoutError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Lot operations
    // -----------------------------------------------------------------------

    /// Bulk-insert lots with a multi-row VALUES statement per chunk.
    pub async fn insert_lots(&self, lots: &[Lot]) -> Result<()> {
        if lots.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();

        for chunk in lots.chunks(INSERT_CHUNK_ROWS) {
            let placeholders = vec!["(?, ?, ?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO lots (source_link, model_year, vin, buy_now, created_at) VALUES {placeholders}"
            );

            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 5);
            for lot in chunk {
                values.push(Value::Text(lot.source_link.to_string()));
                values.push(Value::Integer(i64::from(lot.model_year)));
                values.push(Value::Text(lot.vin.clone()));
                values.push(match lot.buy_now {
                    Some(flag) => Value::Integer(i64::from(flag)),
                    None => Value::Null,
                });
                values.push(Value::Text(now.clone()));
            }

            self.conn
                .execute(&sql, libsql::params_from_iter(values))
                .await
                .map_err(|e| LotScoutError::Storage(e.to_string()))?;
        }

        Ok(())
    }

    /// Delete every stored lot.
    pub async fn clear_lots(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM lots", params![])
            .await
            .map_err(|e| LotScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Load every stored lot. Rows that fail to decode (e.g. an invalid
    /// stored link) are skipped with a warning rather than failing the load.
    pub async fn load_lots(&self) -> Result<Vec<Lot>> {
        let mut rows = self
            .conn
            .query(
                "SELECT source_link, model_year, vin, buy_now FROM lots",
                params![],
            )
            .await
            .map_err(|e| LotScoutError::Storage(e.to_string()))?;

        let mut lots = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match decode_lot_row(&row) {
                Ok(lot) => lots.push(lot),
                Err(e) => warn!(error = %e, "skipping undecodable lot row"),
            }
        }
        Ok(lots)
    }

    /// Count stored lots.
    pub async fn count_lots(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM lots", params![])
            .await
            .map_err(|e| LotScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<u64>(0)
                .map_err(|e| LotScoutError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(LotScoutError::Storage(e.to_string())),
        }
    }
}

/// Decode one `lots` row into a [`Lot`].
fn decode_lot_row(row: &libsql::Row) -> Result<Lot> {
    let link: String = row
        .get(0)
        .map_err(|e| LotScoutError::Storage(e.to_string()))?;
    let source_link =
        Url::parse(&link).map_err(|e| LotScoutError::parse(format!("stored link {link}: {e}")))?;

    let model_year: i64 = row
        .get(1)
        .map_err(|e| LotScoutError::Storage(e.to_string()))?;
    let model_year = u16::try_from(model_year)
        .map_err(|_| LotScoutError::parse(format!("stored model year {model_year} out of range")))?;

    let vin: String = row
        .get(2)
        .map_err(|e| LotScoutError::Storage(e.to_string()))?;

    let buy_now = match row
        .get_value(3)
        .map_err(|e| LotScoutError::Storage(e.to_string()))?
    {
        Value::Integer(i) => Some(i != 0),
        Value::Null => None,
        other => {
            return Err(LotScoutError::parse(format!(
                "unexpected buy_now column value: {other:?}"
            )));
        }
    };

    Ok(Lot {
        source_link,
        model_year,
        vin,
        buy_now,
    })
}

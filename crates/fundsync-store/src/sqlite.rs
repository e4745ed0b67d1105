//! SQLite-based store implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

use fundsync_core::{
    CashFlowStatement, FundamentalSnapshot, FundamentalStore, IngestError, PeriodKind, Result,
    StoredPeriod, Symbol,
};

/// SQLite-backed store for canonical records.
///
/// One table per record family (`fundamental_data`, `cash_flow`), each keyed
/// by the composite natural key `(symbol, period_kind, fiscal_date, source)`
/// with conflict-on-key upserts. Records are stored as key columns plus a
/// JSON document, so schema evolution stays in the record types.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation
    /// fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| IngestError::Store(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| IngestError::Store(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS fundamental_data (
                symbol TEXT NOT NULL,
                period_kind TEXT NOT NULL,
                fiscal_date TEXT NOT NULL,
                source TEXT NOT NULL,
                sector TEXT,
                data_json TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (symbol, period_kind, fiscal_date, source)
            )",
            [],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_fundamental_source_updated
             ON fundamental_data(source, updated_at)",
            [],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cash_flow (
                symbol TEXT NOT NULL,
                period_kind TEXT NOT NULL,
                fiscal_date TEXT NOT NULL,
                source TEXT NOT NULL,
                data_json TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (symbol, period_kind, fiscal_date, source)
            )",
            [],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cash_flow_symbol_source
             ON cash_flow(symbol, period_kind, source)",
            [],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        // Collaborator table: the pipeline only ever reads it.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS watchlist (
                symbol TEXT PRIMARY KEY,
                added_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| IngestError::Store(e.to_string()))?;

        debug!("SQLite store schema initialized");
        Ok(())
    }

    /// Seed the watchlist collaborator table.
    ///
    /// The ingestion pipeline itself never writes the watchlist; this exists
    /// for operational tooling and tests.
    pub fn seed_watchlist(&self, symbols: &[&str]) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))?;
        let added_at = Utc::now().to_rfc3339();
        let mut inserted = 0usize;
        for symbol in symbols {
            inserted += conn
                .execute(
                    "INSERT OR IGNORE INTO watchlist (symbol, added_at) VALUES (?1, ?2)",
                    params![symbol, added_at],
                )
                .map_err(|e| IngestError::Store(e.to_string()))?;
        }
        Ok(inserted)
    }
}

#[async_trait]
impl FundamentalStore for SqliteStore {
    #[instrument(skip(self, records), fields(count = records.len(), source = %source))]
    async fn upsert_fundamentals(
        &self,
        records: &[FundamentalSnapshot],
        source: &str,
    ) -> Result<usize> {
        let updated_at = Utc::now().to_rfc3339();

        let conn = self
            .conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut written = 0usize;
        for record in records {
            let data_json = serde_json::to_string(record)
                .map_err(|e| IngestError::Parse(e.to_string()))?;

            tx.execute(
                "INSERT INTO fundamental_data
                 (symbol, period_kind, fiscal_date, source, sector, data_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (symbol, period_kind, fiscal_date, source) DO UPDATE SET
                     sector = excluded.sector,
                     data_json = excluded.data_json,
                     updated_at = excluded.updated_at",
                params![
                    record.symbol.as_str(),
                    record.period_kind.as_str(),
                    record.fiscal_date.to_string(),
                    source,
                    record.sector,
                    data_json,
                    updated_at
                ],
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;
            written += 1;
        }

        tx.commit().map_err(|e| IngestError::Store(e.to_string()))?;
        debug!("Upserted {} fundamentals rows", written);
        Ok(written)
    }

    #[instrument(skip(self, records), fields(count = records.len(), source = %source))]
    async fn upsert_cash_flows(
        &self,
        records: &[CashFlowStatement],
        source: &str,
    ) -> Result<usize> {
        let updated_at = Utc::now().to_rfc3339();

        let conn = self
            .conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut written = 0usize;
        for record in records {
            let data_json = serde_json::to_string(record)
                .map_err(|e| IngestError::Parse(e.to_string()))?;

            tx.execute(
                "INSERT INTO cash_flow
                 (symbol, period_kind, fiscal_date, source, data_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (symbol, period_kind, fiscal_date, source) DO UPDATE SET
                     data_json = excluded.data_json,
                     updated_at = excluded.updated_at",
                params![
                    record.symbol.as_str(),
                    record.period_kind.as_str(),
                    record.fiscal_date.to_string(),
                    source,
                    data_json,
                    updated_at
                ],
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;
            written += 1;
        }

        tx.commit().map_err(|e| IngestError::Store(e.to_string()))?;
        debug!("Upserted {} cash-flow rows", written);
        Ok(written)
    }

    #[instrument(skip(self), fields(source = %source))]
    async fn fresh_symbols(&self, source: &str, since: DateTime<Utc>) -> Result<Vec<Symbol>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT symbol FROM fundamental_data
                 WHERE source = ?1 AND updated_at >= ?2",
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let rows = stmt
            .query_map(params![source, since.to_rfc3339()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(Symbol::new(
                row.map_err(|e| IngestError::Store(e.to_string()))?,
            ));
        }
        Ok(symbols)
    }

    #[instrument(skip(self), fields(source = %source))]
    async fn fresh_statement_symbols(
        &self,
        source: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Symbol>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT symbol FROM cash_flow
                 WHERE source = ?1 AND updated_at >= ?2",
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let rows = stmt
            .query_map(params![source, since.to_rfc3339()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(Symbol::new(
                row.map_err(|e| IngestError::Store(e.to_string()))?,
            ));
        }
        Ok(symbols)
    }

    #[instrument(skip(self), fields(symbol = %symbol, source = %source))]
    async fn stored_periods(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        source: &str,
    ) -> Result<Vec<StoredPeriod>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT fiscal_date, updated_at FROM cash_flow
                 WHERE symbol = ?1 AND period_kind = ?2 AND source = ?3
                 ORDER BY fiscal_date DESC",
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let rows = stmt
            .query_map(
                params![symbol.as_str(), period.as_str(), source],
                |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                },
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut periods = Vec::new();
        for row in rows {
            let (date_str, updated_str) = row.map_err(|e| IngestError::Store(e.to_string()))?;
            let fiscal_date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                .map_err(|e| IngestError::Parse(e.to_string()))?;
            let updated_at = DateTime::parse_from_rfc3339(&updated_str)
                .map_err(|e| IngestError::Parse(e.to_string()))?
                .with_timezone(&Utc);
            periods.push(StoredPeriod {
                fiscal_date,
                updated_at,
            });
        }
        Ok(periods)
    }

    #[instrument(skip(self), fields(symbol = %symbol, source = %source))]
    async fn get_fundamental(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        fiscal_date: NaiveDate,
        source: &str,
    ) -> Result<Option<FundamentalSnapshot>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let result = conn
            .query_row(
                "SELECT data_json FROM fundamental_data
                 WHERE symbol = ?1 AND period_kind = ?2 AND fiscal_date = ?3 AND source = ?4",
                params![
                    symbol.as_str(),
                    period.as_str(),
                    fiscal_date.to_string(),
                    source
                ],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        match result {
            Some(json) => {
                let record = serde_json::from_str(&json)
                    .map_err(|e| IngestError::Parse(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn count_fundamentals(&self, symbol: &Symbol) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM fundamental_data WHERE symbol = ?1",
                params![symbol.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;

        Ok(count as usize)
    }

    #[instrument(skip(self), fields(symbol = %symbol, source = %source))]
    async fn get_cash_flows(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        source: &str,
    ) -> Result<Vec<CashFlowStatement>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT data_json FROM cash_flow
                 WHERE symbol = ?1 AND period_kind = ?2 AND source = ?3
                 ORDER BY fiscal_date DESC",
            )
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let rows = stmt
            .query_map(params![symbol.as_str(), period.as_str(), source], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut statements = Vec::new();
        for row in rows {
            let json = row.map_err(|e| IngestError::Store(e.to_string()))?;
            statements.push(
                serde_json::from_str(&json).map_err(|e| IngestError::Parse(e.to_string()))?,
            );
        }
        Ok(statements)
    }

    async fn universe_page(&self, offset: u32, limit: u32) -> Result<Vec<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut stmt = conn
            .prepare("SELECT symbol FROM watchlist ORDER BY symbol LIMIT ?1 OFFSET ?2")
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit, offset], |row| row.get::<_, String>(0))
            .map_err(|e| IngestError::Store(e.to_string()))?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row.map_err(|e| IngestError::Store(e.to_string()))?);
        }
        Ok(symbols)
    }
}

//! SQLite storage layer.
//!
//! One connection behind a mutex, WAL journal, foreign keys on. The schema
//! is created by versioned migrations tracked in `schema_version`; every
//! migration is idempotent so reopening an existing file is a no-op.

use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info};

use crate::error::AppError;

/// Shared database handle.
pub struct DbState {
    pub conn: Mutex<Connection>,
}

impl DbState {
    /// Lock the connection. A poisoned lock is recovered: the connection
    /// itself is still usable after a panicking request.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 4;

/// Open (or create) the database file at `db_path` and migrate it.
pub fn init(db_path: &Path) -> Result<DbState, AppError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    info!("Opening database at {}", db_path.display());
    let conn = open_and_configure(db_path)?;
    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
    })
}

/// Fully migrated in-memory database. Used by tests and dry runs.
pub fn init_in_memory() -> Result<DbState, AppError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
    })
}

fn open_and_configure(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

/// Run `f` inside `BEGIN IMMEDIATE` / `COMMIT`, rolling back on error.
///
/// The write lock is taken up front so a read-then-insert sequence inside
/// `f` cannot interleave with another writer.
pub fn with_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, AppError>,
) -> Result<T, AppError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = f(conn).and_then(|value| {
        conn.execute_batch("COMMIT")?;
        Ok(value)
    });
    if result.is_err() && !conn.is_autocommit() {
        let _ = conn.execute_batch("ROLLBACK");
    }
    result
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
pub fn run_migrations(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        apply(conn, 1, "finance", MIGRATION_V1)?;
    }
    if current < 2 {
        apply(conn, 2, "bonus and agents", MIGRATION_V2)?;
    }
    if current < 3 {
        apply(conn, 3, "registration and students", MIGRATION_V3)?;
    }
    if current < 4 {
        apply(conn, 4, "office and student procedure", MIGRATION_V4)?;
    }

    Ok(())
}

fn apply(conn: &Connection, version: i32, label: &str, sql: &str) -> Result<(), AppError> {
    conn.execute_batch(sql).map_err(|e| {
        error!("Migration v{version} failed: {e}");
        AppError::Storage(e)
    })?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    info!("Applied migration v{version} ({label})");
    Ok(())
}

/// Whether `table` has a column called `column`.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, AppError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Migrations
// ---------------------------------------------------------------------------

const MIGRATION_V1: &str = "
    CREATE TABLE IF NOT EXISTS abeer (
        id TEXT PRIMARY KEY,
        month TEXT DEFAULT '',
        income_malaysia REAL DEFAULT 0,
        total_income REAL DEFAULT 0,
        malaysia_office REAL DEFAULT 0,
        salaries REAL DEFAULT 0,
        sub_agent REAL DEFAULT 0,
        social_media REAL DEFAULT 0,
        total_outcome REAL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS data (
        id TEXT PRIMARY KEY,
        month TEXT DEFAULT '',
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        program TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS commission (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        university TEXT DEFAULT '',
        ref TEXT DEFAULT '',
        month TEXT DEFAULT '',
        other_income REAL DEFAULT 0,
        received_date TEXT DEFAULT '',
        currency TEXT DEFAULT '',
        amount REAL DEFAULT 0,
        invoice_date TEXT DEFAULT '',
        notes TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS invoice (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        uni TEXT DEFAULT '',
        type TEXT DEFAULT '',
        date TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS sent_invoice (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        uni TEXT DEFAULT '',
        type TEXT DEFAULT '',
        date TEXT DEFAULT '',
        dr_hani_account TEXT DEFAULT '',
        currency TEXT DEFAULT '',
        amount REAL DEFAULT 0,
        apply_uni TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS ucsi (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        uni TEXT DEFAULT '',
        type TEXT DEFAULT '',
        date TEXT DEFAULT '',
        dr_hani_account TEXT DEFAULT '',
        currency TEXT DEFAULT '',
        amount REAL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS ucsi_invoice (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        uni TEXT DEFAULT '',
        type TEXT DEFAULT '',
        date TEXT DEFAULT '',
        currency TEXT DEFAULT '',
        amount REAL DEFAULT 0,
        received_date TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS income_outcome (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        date TEXT DEFAULT '',
        income REAL DEFAULT 0,
        office REAL DEFAULT 0,
        salaries REAL DEFAULT 0,
        subagent REAL DEFAULT 0,
        socialmedia REAL DEFAULT 0,
        outcome REAL DEFAULT 0,
        country TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS adv_bill (
        id TEXT PRIMARY KEY,
        amount REAL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS subagent (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        subagent_name TEXT DEFAULT '',
        date TEXT DEFAULT '',
        ref TEXT DEFAULT '',
        referral_commission_on TEXT DEFAULT '',
        amount REAL DEFAULT 0,
        month TEXT DEFAULT ''
    );

    CREATE INDEX IF NOT EXISTS idx_income_outcome_country ON income_outcome(country);
";

const MIGRATION_V2: &str = "
    CREATE TABLE IF NOT EXISTS bonus (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        passport_number TEXT DEFAULT '',
        nationality TEXT DEFAULT '',
        visa TEXT DEFAULT '',
        counselor TEXT DEFAULT '',
        program TEXT DEFAULT '',
        intake TEXT DEFAULT '',
        tuition_fees_payment TEXT DEFAULT '',
        enrollment TEXT DEFAULT '',
        commission TEXT DEFAULT '',
        usd REAL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS bonus_claimed (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        passport_number TEXT DEFAULT '',
        nationality TEXT DEFAULT '',
        visa TEXT DEFAULT '',
        counselor TEXT DEFAULT '',
        program TEXT DEFAULT '',
        intake TEXT DEFAULT '',
        tuition_fees_payment TEXT DEFAULT '',
        enrollment TEXT DEFAULT '',
        commission TEXT DEFAULT '',
        rm REAL DEFAULT 0,
        usd REAL DEFAULT 0,
        claimed_date TEXT DEFAULT '',
        claimed_by TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS bonus_not_claimed (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        passport_number TEXT DEFAULT '',
        nationality TEXT DEFAULT '',
        visa TEXT DEFAULT '',
        counselor TEXT DEFAULT '',
        program TEXT DEFAULT '',
        intake TEXT DEFAULT '',
        tuition_fees_payment TEXT DEFAULT '',
        enrollment TEXT DEFAULT '',
        commission TEXT DEFAULT '',
        rm REAL DEFAULT 0,
        usd REAL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS agent (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        created_at TEXT DEFAULT (datetime('now')),
        updated_at TEXT DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS agent_bonus (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL REFERENCES agent(id) ON DELETE CASCADE,
        student_name TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        program TEXT DEFAULT '',
        month TEXT DEFAULT '',
        enrollment TEXT DEFAULT '',
        enrollment_bonus REAL DEFAULT 0,
        visa_bonus REAL DEFAULT 0,
        commission_from_uni TEXT DEFAULT '',
        created_at TEXT DEFAULT (datetime('now')),
        updated_at TEXT DEFAULT (datetime('now'))
    );

    CREATE INDEX IF NOT EXISTS idx_agent_bonus_agent ON agent_bonus(agent_id);
";

const MIGRATION_V3: &str = "
    CREATE TABLE IF NOT EXISTS registration (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        passport_number TEXT DEFAULT '',
        nationality TEXT DEFAULT '',
        visa TEXT DEFAULT '',
        val_approval TEXT DEFAULT '',
        counselor TEXT DEFAULT '',
        program TEXT DEFAULT '',
        submission_month TEXT DEFAULT '',
        paid_month TEXT DEFAULT '',
        arrival_date TEXT DEFAULT '',
        sheet_type TEXT DEFAULT 'Val Approved'
    );

    CREATE TABLE IF NOT EXISTS registration_val_approved (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        passport_number TEXT DEFAULT '',
        nationality TEXT DEFAULT '',
        visa TEXT DEFAULT '',
        val_approval TEXT DEFAULT '',
        counselor TEXT DEFAULT '',
        program TEXT DEFAULT '',
        submission_month TEXT DEFAULT '',
        paid_month TEXT DEFAULT '',
        arrival_date TEXT DEFAULT '',
        note TEXT DEFAULT '',
        sheet_type TEXT DEFAULT 'Val Approved'
    );

    CREATE TABLE IF NOT EXISTS registration_enrollment (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        passport_number TEXT DEFAULT '',
        nationality TEXT DEFAULT '',
        visa TEXT DEFAULT '',
        counselor TEXT DEFAULT '',
        program TEXT DEFAULT '',
        intake TEXT DEFAULT '',
        submission_month TEXT DEFAULT '',
        paid_month TEXT DEFAULT '',
        sheet_type TEXT DEFAULT 'Enrollment'
    );

    CREATE TABLE IF NOT EXISTS registration_visa_process (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        passport_number TEXT DEFAULT '',
        nationality TEXT DEFAULT '',
        visa TEXT DEFAULT '',
        counselor TEXT DEFAULT '',
        program TEXT DEFAULT '',
        submission_month TEXT DEFAULT '',
        paid_month TEXT DEFAULT '',
        note TEXT DEFAULT '',
        sheet_type TEXT DEFAULT 'Visa Process'
    );

    CREATE TABLE IF NOT EXISTS registration_not_submitted (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        passport_number TEXT DEFAULT '',
        nationality TEXT DEFAULT '',
        visa TEXT DEFAULT '',
        counselor TEXT DEFAULT '',
        program TEXT DEFAULT '',
        month TEXT DEFAULT '',
        payment TEXT DEFAULT '',
        sheet_type TEXT DEFAULT 'Not Submitted'
    );

    CREATE TABLE IF NOT EXISTS registration_cancelled (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        passport_number TEXT DEFAULT '',
        nationality TEXT DEFAULT '',
        visa TEXT DEFAULT '',
        counselor TEXT DEFAULT '',
        program TEXT DEFAULT '',
        month TEXT DEFAULT '',
        payment TEXT DEFAULT '',
        sheet_type TEXT DEFAULT 'Cancelled'
    );

    CREATE TABLE IF NOT EXISTS student (
        id TEXT PRIMARY KEY,
        passport_number TEXT NOT NULL UNIQUE,
        name TEXT DEFAULT '',
        nationality TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        program TEXT DEFAULT '',
        counselor TEXT DEFAULT '',
        created_at TEXT DEFAULT (datetime('now')),
        updated_at TEXT DEFAULT (datetime('now'))
    );

    CREATE INDEX IF NOT EXISTS idx_reg_val_approved_passport
        ON registration_val_approved(passport_number);
    CREATE INDEX IF NOT EXISTS idx_reg_enrollment_passport
        ON registration_enrollment(passport_number);
    CREATE INDEX IF NOT EXISTS idx_reg_visa_process_passport
        ON registration_visa_process(passport_number);
    CREATE INDEX IF NOT EXISTS idx_reg_not_submitted_passport
        ON registration_not_submitted(passport_number);
    CREATE INDEX IF NOT EXISTS idx_reg_cancelled_passport
        ON registration_cancelled(passport_number);
";

const MIGRATION_V4: &str = "
    CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        date TEXT DEFAULT '',
        uni TEXT DEFAULT '',
        currency TEXT DEFAULT '',
        income REAL DEFAULT 0,
        expenses REAL DEFAULT 0,
        country TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS salaries (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        amount REAL DEFAULT 0,
        date TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS services (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        date TEXT DEFAULT '',
        amount REAL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS trip_travel_bonus (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        amount REAL DEFAULT 0,
        date TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS employee_visa (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        employee_name TEXT DEFAULT '',
        amount REAL DEFAULT 0,
        date TEXT DEFAULT '',
        ref TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS money_transfer (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        amount REAL DEFAULT 0,
        date TEXT DEFAULT '',
        ref TEXT DEFAULT ''
    );

    -- Office expenses share one shape.
    CREATE TABLE IF NOT EXISTS rent (
        id TEXT PRIMARY KEY, amount REAL DEFAULT 0, date TEXT DEFAULT '', ref TEXT DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS lawyer_tax_contract (
        id TEXT PRIMARY KEY, amount REAL DEFAULT 0, date TEXT DEFAULT '', ref TEXT DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS bills (
        id TEXT PRIMARY KEY, amount REAL DEFAULT 0, date TEXT DEFAULT '', ref TEXT DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS maintenance (
        id TEXT PRIMARY KEY, amount REAL DEFAULT 0, date TEXT DEFAULT '', ref TEXT DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS medical_expenses (
        id TEXT PRIMARY KEY, amount REAL DEFAULT 0, date TEXT DEFAULT '', ref TEXT DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS general_expenses (
        id TEXT PRIMARY KEY, amount REAL DEFAULT 0, date TEXT DEFAULT '', ref TEXT DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS social_media (
        id TEXT PRIMARY KEY, amount REAL DEFAULT 0, date TEXT DEFAULT '', ref TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS student_hotel (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        date TEXT DEFAULT '',
        amount REAL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS student_flight_ticket (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        name TEXT DEFAULT '',
        date TEXT DEFAULT '',
        amount REAL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS authentication_papers (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        amount REAL DEFAULT 0,
        ref TEXT DEFAULT '',
        date TEXT DEFAULT '',
        ref1 TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS student_visa (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        amount REAL DEFAULT 0,
        date TEXT DEFAULT '',
        ref TEXT DEFAULT '',
        uni TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS application_fees (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        amount REAL DEFAULT 0,
        date TEXT DEFAULT '',
        ref TEXT DEFAULT '',
        uni TEXT DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS airline_tickets (
        id TEXT PRIMARY KEY,
        no INTEGER DEFAULT 0,
        amount REAL DEFAULT 0,
        date TEXT DEFAULT '',
        ref TEXT DEFAULT ''
    );
";

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ENTITIES;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .expect("pragma setup");
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_create_every_registered_table() {
        let conn = test_db();
        run_migrations(&conn).expect("run_migrations should succeed");

        let tables = table_names(&conn);
        for entity in ENTITIES {
            assert!(
                tables.iter().any(|t| t == entity.table),
                "missing table {}",
                entity.table
            );
        }
    }

    #[test]
    fn test_registered_columns_exist_in_schema() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        for entity in ENTITIES {
            assert!(column_exists(&conn, entity.table, "id").expect("table_info"));
            for column in entity.columns {
                assert!(
                    column_exists(&conn, entity.table, column.name).expect("table_info"),
                    "{}.{} missing from schema",
                    entity.table,
                    column.name
                );
            }
            for system in entity.system_columns() {
                assert!(
                    column_exists(&conn, entity.table, system).expect("table_info"),
                    "{}.{system} missing from schema",
                    entity.table
                );
            }
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run should succeed");

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .expect("read schema version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let state = init_in_memory().expect("init");
        let conn = state.lock();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .expect("pragma");
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_wal_mode_on_file_db() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = init(&dir.path().join("nested").join("ledger.db")).expect("init file db");
        let mode: String = state
            .lock()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("read journal_mode");
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_reopening_file_keeps_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.db");
        {
            let state = init(&path).expect("first open");
            state
                .lock()
                .execute("INSERT INTO rent (id, amount) VALUES ('r1', 900)", [])
                .expect("insert");
        }
        let state = init(&path).expect("second open");
        let amount: f64 = state
            .lock()
            .query_row("SELECT amount FROM rent WHERE id = 'r1'", [], |row| row.get(0))
            .expect("row survives reopen");
        assert_eq!(amount, 900.0);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        let result: Result<(), AppError> = with_transaction(&conn, |conn| {
            conn.execute("INSERT INTO rent (id, amount) VALUES ('r1', 1)", [])?;
            Err(AppError::Validation("abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM rent", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0);
        assert!(conn.is_autocommit(), "transaction must be closed");
    }

    #[test]
    fn test_agent_bonus_requires_agent() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        let err = conn
            .execute(
                "INSERT INTO agent_bonus (id, agent_id) VALUES ('b1', 'missing')",
                [],
            )
            .expect_err("dangling agent id must fail");
        assert!(matches!(AppError::from(err), AppError::Conflict(_)));
    }
}

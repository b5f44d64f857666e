//! Local SQLite database layer for Trucklog.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, settings
//! helpers, and the shared [`DbState`] used by the HTTP handlers and the
//! command line. Derived money columns are generated by SQLite itself and
//! trip revenue is kept current by triggers, so no caller ever writes them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{ffi, params, Connection};
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};

pub const DB_FILE_NAME: &str = "trucklog.db";

/// Shared database handle.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
pub const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Tables reported by diagnostics, in dependency order.
pub const DATA_TABLES: &[&str] = &[
    "users",
    "trucks",
    "drivers",
    "routes",
    "trips",
    "gc_notes",
    "payments",
    "expenses",
    "local_settings",
];

/// Current instant in the stored timestamp form.
pub fn now_ts() -> String {
    crate::format::stored_ts(Utc::now())
}

impl DbState {
    pub fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database lock poisoned".into()))
    }

    /// Run `f` with the locked connection on the blocking thread pool.
    pub async fn call<F, T>(self: &Arc<Self>, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock()?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::Internal(format!("database task failed: {e}")))?
    }
}

/// Initialize the database at `{data_dir}/trucklog.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> AppResult<DbState> {
    fs::create_dir_all(data_dir)?;

    let db_path = data_dir.join(DB_FILE_NAME);
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> AppResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

pub fn schema_version(conn: &Connection) -> AppResult<i32> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
pub fn run_migrations(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );",
    )?;

    let current = schema_version(conn)?;

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn apply(conn: &Connection, version: i32, what: &str, sql: &str) -> AppResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql).map_err(|e| {
        error!("Migration v{version} failed: {e}");
        AppError::from(e)
    })?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![version],
    )?;
    tx.commit()?;
    info!("Applied migration v{version} ({what})");
    Ok(())
}

/// Migration v1: settings, master data and transactional tables.
fn migrate_v1(conn: &Connection) -> AppResult<()> {
    apply(
        conn,
        1,
        "core tables",
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            UNIQUE(setting_category, setting_key)
        );

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            full_name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'clerk' CHECK (role IN ('admin', 'clerk')),
            phone_number TEXT,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS trucks (
            id TEXT PRIMARY KEY,
            lorry_number TEXT NOT NULL UNIQUE,
            model TEXT,
            capacity_kg REAL CHECK (capacity_kg IS NULL OR capacity_kg > 0),
            registration_date TEXT,
            insurance_expiry TEXT,
            fitness_expiry TEXT,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'maintenance', 'inactive')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS drivers (
            id TEXT PRIMARY KEY,
            driver_name TEXT NOT NULL,
            license_number TEXT NOT NULL UNIQUE,
            phone_number TEXT NOT NULL,
            address TEXT,
            license_expiry TEXT,
            date_of_birth TEXT,
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS routes (
            id TEXT PRIMARY KEY,
            from_location TEXT NOT NULL,
            to_location TEXT NOT NULL,
            distance_km REAL NOT NULL CHECK (distance_km > 0),
            estimated_hours REAL CHECK (estimated_hours IS NULL OR estimated_hours > 0),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS trips (
            id TEXT PRIMARY KEY,
            trip_id TEXT NOT NULL UNIQUE,
            truck_id TEXT NOT NULL REFERENCES trucks(id) ON DELETE RESTRICT,
            driver_id TEXT NOT NULL REFERENCES drivers(id) ON DELETE RESTRICT,
            route_id TEXT NOT NULL REFERENCES routes(id) ON DELETE RESTRICT,
            from_location TEXT NOT NULL,
            to_location TEXT NOT NULL,
            starting_time TEXT NOT NULL,
            ending_time TEXT,
            total_distance_km REAL NOT NULL DEFAULT 0 CHECK (total_distance_km >= 0),
            diesel_liters REAL NOT NULL DEFAULT 0 CHECK (diesel_liters >= 0),
            diesel_cost REAL NOT NULL DEFAULT 0 CHECK (diesel_cost >= 0),
            toll_charges REAL NOT NULL DEFAULT 0 CHECK (toll_charges >= 0),
            other_expenses REAL NOT NULL DEFAULT 0 CHECK (other_expenses >= 0),
            driver_allowance REAL NOT NULL DEFAULT 0 CHECK (driver_allowance >= 0),
            total_trip_expense REAL GENERATED ALWAYS AS
                (diesel_cost + toll_charges + other_expenses + driver_allowance) STORED,
            total_revenue REAL NOT NULL DEFAULT 0,
            trip_profit_loss REAL GENERATED ALWAYS AS
                (total_revenue - (diesel_cost + toll_charges + other_expenses + driver_allowance)) STORED,
            trip_status TEXT NOT NULL DEFAULT 'running'
                CHECK (trip_status IN ('running', 'completed')),
            notes TEXT,
            created_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gc_notes (
            id TEXT PRIMARY KEY,
            gc_number TEXT NOT NULL UNIQUE,
            trip_id TEXT NOT NULL REFERENCES trips(id) ON DELETE RESTRICT,
            date_time TEXT NOT NULL,
            consignor_name TEXT NOT NULL,
            consignor_address TEXT NOT NULL,
            consignor_phone TEXT NOT NULL,
            consignor_gstin TEXT,
            consignee_name TEXT NOT NULL,
            consignee_address TEXT NOT NULL,
            consignee_phone TEXT NOT NULL,
            consignee_gstin TEXT,
            number_of_articles INTEGER NOT NULL CHECK (number_of_articles >= 1),
            description_of_goods TEXT NOT NULL,
            weight_kg REAL NOT NULL CHECK (weight_kg > 0),
            freight_rate REAL NOT NULL DEFAULT 0 CHECK (freight_rate >= 0),
            freight_amount REAL NOT NULL DEFAULT 0 CHECK (freight_amount >= 0),
            hc_charge REAL NOT NULL DEFAULT 0 CHECK (hc_charge >= 0),
            sc_charge REAL NOT NULL DEFAULT 0 CHECK (sc_charge >= 0),
            total_amount REAL GENERATED ALWAYS AS
                (freight_amount + hc_charge + sc_charge) STORED,
            payment_mode TEXT NOT NULL
                CHECK (payment_mode IN ('cash', 'upi', 'account', 'topay')),
            payment_status TEXT NOT NULL
                CHECK (payment_status IN ('paid', 'pending', 'topay')),
            delivery_option TEXT NOT NULL DEFAULT 'office'
                CHECK (delivery_option IN ('office', 'door_delivery')),
            delivery_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (delivery_status IN ('pending', 'in_transit', 'delivered')),
            delivered_at TEXT,
            delivered_by TEXT,
            delivery_proof_image TEXT,
            qr_code_data TEXT,
            remarks TEXT,
            created_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            gc_note_id TEXT NOT NULL REFERENCES gc_notes(id) ON DELETE CASCADE,
            payment_date TEXT NOT NULL,
            amount REAL NOT NULL CHECK (amount > 0),
            payment_method TEXT NOT NULL
                CHECK (payment_method IN ('cash', 'upi', 'bank_transfer', 'cheque')),
            reference_number TEXT,
            remarks TEXT,
            received_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            trip_id TEXT REFERENCES trips(id) ON DELETE SET NULL,
            expense_type TEXT NOT NULL
                CHECK (expense_type IN ('diesel', 'toll', 'maintenance', 'driver_allowance', 'other')),
            amount REAL NOT NULL CHECK (amount > 0),
            expense_date TEXT NOT NULL,
            description TEXT,
            receipt_image TEXT,
            created_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL
        );
        ",
    )
}

/// Migration v2: keep `trips.total_revenue` equal to the sum of its GC notes.
fn migrate_v2(conn: &Connection) -> AppResult<()> {
    apply(
        conn,
        2,
        "trip revenue triggers",
        "
        CREATE TRIGGER IF NOT EXISTS trg_gc_notes_revenue_insert
        AFTER INSERT ON gc_notes
        BEGIN
            UPDATE trips SET total_revenue =
                (SELECT COALESCE(SUM(total_amount), 0) FROM gc_notes WHERE trip_id = NEW.trip_id)
            WHERE id = NEW.trip_id;
        END;

        CREATE TRIGGER IF NOT EXISTS trg_gc_notes_revenue_update
        AFTER UPDATE OF trip_id, freight_amount, hc_charge, sc_charge ON gc_notes
        BEGIN
            UPDATE trips SET total_revenue =
                (SELECT COALESCE(SUM(total_amount), 0) FROM gc_notes WHERE trip_id = OLD.trip_id)
            WHERE id = OLD.trip_id;
            UPDATE trips SET total_revenue =
                (SELECT COALESCE(SUM(total_amount), 0) FROM gc_notes WHERE trip_id = NEW.trip_id)
            WHERE id = NEW.trip_id;
        END;

        CREATE TRIGGER IF NOT EXISTS trg_gc_notes_revenue_delete
        AFTER DELETE ON gc_notes
        BEGIN
            UPDATE trips SET total_revenue =
                (SELECT COALESCE(SUM(total_amount), 0) FROM gc_notes WHERE trip_id = OLD.trip_id)
            WHERE id = OLD.trip_id;
        END;
        ",
    )
}

/// Migration v3: indexes for list filters and dashboard windows.
fn migrate_v3(conn: &Connection) -> AppResult<()> {
    apply(
        conn,
        3,
        "indexes",
        "
        CREATE INDEX IF NOT EXISTS idx_local_settings_cat_key ON local_settings(setting_category, setting_key);
        CREATE INDEX IF NOT EXISTS idx_trucks_status ON trucks(status);
        CREATE INDEX IF NOT EXISTS idx_drivers_status ON drivers(status);
        CREATE INDEX IF NOT EXISTS idx_trips_created_at ON trips(created_at);
        CREATE INDEX IF NOT EXISTS idx_trips_status ON trips(trip_status);
        CREATE INDEX IF NOT EXISTS idx_trips_truck ON trips(truck_id);
        CREATE INDEX IF NOT EXISTS idx_trips_driver ON trips(driver_id);
        CREATE INDEX IF NOT EXISTS idx_trips_route ON trips(route_id);
        CREATE INDEX IF NOT EXISTS idx_gc_notes_created_at ON gc_notes(created_at);
        CREATE INDEX IF NOT EXISTS idx_gc_notes_trip ON gc_notes(trip_id);
        CREATE INDEX IF NOT EXISTS idx_gc_notes_payment_status ON gc_notes(payment_status);
        CREATE INDEX IF NOT EXISTS idx_gc_notes_delivery_status ON gc_notes(delivery_status);
        CREATE INDEX IF NOT EXISTS idx_payments_gc_note ON payments(gc_note_id);
        CREATE INDEX IF NOT EXISTS idx_expenses_trip ON expenses(trip_id);
        CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(expense_date);
        ",
    )
}

/// Attempts made to find an unused generated record code.
const CODE_ATTEMPTS: u32 = 5;

pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Insert a row keyed by a generated code, generating a fresh code when the
/// previous one collides with an existing row.
pub fn insert_with_unique_code<F>(generate: fn() -> String, mut insert: F) -> AppResult<String>
where
    F: FnMut(&str) -> rusqlite::Result<usize>,
{
    for attempt in 1..=CODE_ATTEMPTS {
        let code = generate();
        match insert(&code) {
            Ok(_) => return Ok(code),
            Err(e) if is_unique_violation(&e) => {
                warn!(attempt, code = %code, "generated code already in use, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::Conflict(
        "could not allocate a unique record code".into(),
    ))
}

/// Row count of each data table, for diagnostics.
pub fn table_counts(conn: &Connection) -> AppResult<Vec<(String, i64)>> {
    DATA_TABLES
        .iter()
        .map(|table| {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
            Ok((table.to_string(), n))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> AppResult<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value, now_ts()],
    )?;
    Ok(())
}

/// All key/value pairs of one category, ordered by key.
pub fn get_settings_in_category(
    conn: &Connection,
    category: &str,
) -> AppResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT setting_key, setting_value FROM local_settings
         WHERE setting_category = ?1 ORDER BY setting_key",
    )?;
    let rows = stmt
        .query_map(params![category], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Get all settings grouped by category as JSON.
pub fn get_all_settings(conn: &Connection) -> AppResult<serde_json::Value> {
    let mut stmt = conn.prepare(
        "SELECT setting_category, setting_key, setting_value FROM local_settings ORDER BY setting_category, setting_key",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut result = serde_json::Map::new();
    for row in rows {
        let (cat, key, val) = row?;
        let category = result.entry(cat).or_insert_with(|| serde_json::json!({}));
        if let serde_json::Value::Object(ref mut map) = category {
            map.insert(key, serde_json::Value::String(val));
        }
    }
    Ok(serde_json::Value::Object(result))
}

/// Delete all settings in a category.
pub fn delete_all_settings(conn: &Connection, category: &str) -> AppResult<()> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1",
        params![category],
    )?;
    Ok(())
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

/// Fresh migrated in-memory database with foreign keys enforced.
#[cfg(test)]
pub fn test_state() -> DbState {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .expect("pragma setup");
    run_migrations_for_test(&conn);
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

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

    /// Minimal master data plus one trip; returns the trip row id.
    fn seed_trip(conn: &Connection, id: &str, code: &str) -> String {
        let now = now_ts();
        conn.execute_batch(&format!(
            "INSERT OR IGNORE INTO trucks (id, lorry_number, status, created_at, updated_at)
                VALUES ('tk', 'KA01AB1234', 'active', '{now}', '{now}');
             INSERT OR IGNORE INTO drivers (id, driver_name, license_number, phone_number, status, created_at, updated_at)
                VALUES ('dr', 'Ravi', 'DL-1', '999', 'active', '{now}', '{now}');
             INSERT OR IGNORE INTO routes (id, from_location, to_location, distance_km, created_at, updated_at)
                VALUES ('rt', 'Chennai', 'Bengaluru', 350, '{now}', '{now}');
             INSERT INTO trips (id, trip_id, truck_id, driver_id, route_id, from_location, to_location,
                starting_time, diesel_cost, toll_charges, other_expenses, driver_allowance, created_at, updated_at)
                VALUES ('{id}', '{code}', 'tk', 'dr', 'rt', 'Chennai', 'Bengaluru', '{now}',
                        1000, 200, 50, 300, '{now}', '{now}');"
        ))
        .expect("seed trip");
        id.to_string()
    }

    fn insert_note(conn: &Connection, id: &str, trip: &str, freight: f64, hc: f64, sc: f64) {
        let now = now_ts();
        conn.execute(
            "INSERT INTO gc_notes (id, gc_number, trip_id, date_time, consignor_name, consignor_address,
                consignor_phone, consignee_name, consignee_address, consignee_phone, number_of_articles,
                description_of_goods, weight_kg, freight_rate, freight_amount, hc_charge, sc_charge,
                payment_mode, payment_status, created_at, updated_at)
             VALUES (?1, ?1, ?2, ?3, 'A', 'addr', '1', 'B', 'addr', '2', 1, 'boxes', 10, 1, ?4, ?5, ?6,
                'cash', 'pending', ?3, ?3)",
            params![id, trip, now, freight, hc, sc],
        )
        .expect("insert note");
    }

    fn trip_money(conn: &Connection, id: &str) -> (f64, f64, f64) {
        conn.query_row(
            "SELECT total_trip_expense, total_revenue, trip_profit_loss FROM trips WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("trip money")
    }

    // ------------------------------------------------------------------
    // Migration tests
    // ------------------------------------------------------------------

    #[test]
    fn test_migrations_v1_to_latest() {
        let conn = test_db();
        run_migrations(&conn).expect("run_migrations should succeed");

        let tables = table_names(&conn);
        for expected in DATA_TABLES.iter().chain(["schema_version"].iter()) {
            assert!(
                tables.contains(&expected.to_string()),
                "missing {expected}"
            );
        }
        assert_eq!(schema_version(&conn).expect("version"), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run");
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .expect("count");
        assert_eq!(rows, i64::from(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_init_creates_file_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = init(&dir.path().join("nested")).expect("init");
        assert!(state.db_path.exists());
        assert!(state.db_path.ends_with(DB_FILE_NAME));
    }

    // ------------------------------------------------------------------
    // Derived columns
    // ------------------------------------------------------------------

    #[test]
    fn test_generated_totals_and_revenue_triggers() {
        let conn = test_db();
        run_migrations(&conn).expect("migrate");
        let trip = seed_trip(&conn, "t1", "TRIP-1");

        assert_eq!(trip_money(&conn, &trip), (1550.0, 0.0, -1550.0));

        insert_note(&conn, "g1", &trip, 1000.0, 50.0, 25.0);
        insert_note(&conn, "g2", &trip, 500.0, 0.0, 0.0);
        let total: f64 = conn
            .query_row("SELECT total_amount FROM gc_notes WHERE id = 'g1'", [], |r| {
                r.get(0)
            })
            .expect("total");
        assert_eq!(total, 1075.0);
        assert_eq!(trip_money(&conn, &trip), (1550.0, 1575.0, 25.0));

        conn.execute("UPDATE gc_notes SET freight_amount = 2000 WHERE id = 'g2'", [])
            .expect("update");
        assert_eq!(trip_money(&conn, &trip).1, 3075.0);

        conn.execute("DELETE FROM gc_notes WHERE id = 'g1'", [])
            .expect("delete");
        assert_eq!(trip_money(&conn, &trip).1, 2000.0);

        conn.execute("UPDATE trips SET diesel_cost = 0 WHERE id = 't1'", [])
            .expect("expense update");
        assert_eq!(trip_money(&conn, &trip), (550.0, 2000.0, 1450.0));
    }

    #[test]
    fn test_reassigning_note_moves_revenue() {
        let conn = test_db();
        run_migrations(&conn).expect("migrate");
        let a = seed_trip(&conn, "ta", "TRIP-A");
        let b = seed_trip(&conn, "tb", "TRIP-B");
        insert_note(&conn, "g1", &a, 800.0, 0.0, 0.0);

        conn.execute("UPDATE gc_notes SET trip_id = 'tb' WHERE id = 'g1'", [])
            .expect("reassign");
        assert_eq!(trip_money(&conn, &a).1, 0.0);
        assert_eq!(trip_money(&conn, &b).1, 800.0);
    }

    #[test]
    fn test_trip_with_notes_cannot_be_deleted() {
        let conn = test_db();
        run_migrations(&conn).expect("migrate");
        let trip = seed_trip(&conn, "t1", "TRIP-1");
        insert_note(&conn, "g1", &trip, 100.0, 0.0, 0.0);

        let err: AppError = conn
            .execute("DELETE FROM trips WHERE id = 't1'", [])
            .expect_err("restricted")
            .into();
        assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");
    }

    #[test]
    fn test_check_constraint_rejects_bad_enum() {
        let conn = test_db();
        run_migrations(&conn).expect("migrate");
        let now = now_ts();
        let err = conn
            .execute(
                "INSERT INTO trucks (id, lorry_number, status, created_at, updated_at)
                 VALUES ('x', 'TN01', 'scrapped', ?1, ?1)",
                params![now],
            )
            .expect_err("check");
        assert!(matches!(AppError::from(err), AppError::Conflict(_)));
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    #[test]
    fn test_settings_upsert_and_category_delete() {
        let conn = test_db();
        run_migrations(&conn).expect("migrate");

        set_setting(&conn, "company", "name", "Sri Balaji Transport").expect("set");
        set_setting(&conn, "company", "name", "Balaji Roadlines").expect("upsert");
        set_setting(&conn, "company", "phone", "044-123").expect("set phone");
        assert_eq!(
            get_setting(&conn, "company", "name").as_deref(),
            Some("Balaji Roadlines")
        );
        assert_eq!(
            get_settings_in_category(&conn, "company").expect("list").len(),
            2
        );
        let all = get_all_settings(&conn).expect("all");
        assert_eq!(all["company"]["phone"], "044-123");

        delete_all_settings(&conn, "company").expect("delete");
        assert!(get_setting(&conn, "company", "name").is_none());
    }

    #[test]
    fn test_unique_code_retries_on_collision() {
        let conn = test_db();
        conn.execute_batch("CREATE TABLE codes (code TEXT UNIQUE); INSERT INTO codes VALUES ('TAKEN');")
            .expect("setup");
        let mut calls = 0;
        let code = insert_with_unique_code(crate::format::generate_gc_number, |code| {
            calls += 1;
            let code = if calls == 1 { "TAKEN" } else { code };
            conn.execute("INSERT INTO codes VALUES (?1)", params![code])
        })
        .expect("second attempt succeeds");
        assert_eq!(calls, 2);
        assert!(code.starts_with("GC-"));
    }

    #[test]
    fn test_now_ts_is_sortable_utc() {
        let ts = now_ts();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2026-10-19T08:00:00.000Z".len());
    }

    #[tokio::test]
    async fn test_call_runs_on_blocking_pool() {
        let db = Arc::new(test_state());
        let version = db.call(|conn| schema_version(conn)).await.expect("call");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }
}

//! Master data: trucks, drivers and routes.
//!
//! Lists are newest first. Deletes are refused while a trip still points at
//! the record; the store enforces the same rule with `ON DELETE RESTRICT`.

use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::input;
use crate::models::{Driver, DriverStatus, Route, Truck, TruckStatus};

fn trips_referencing(conn: &Connection, column: &str, id: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) FROM trips WHERE {column} = ?1"),
        params![id],
        |row| row.get(0),
    )?)
}

fn refuse_if_referenced(conn: &Connection, what: &str, column: &str, id: &str) -> AppResult<()> {
    let n = trips_referencing(conn, column, id)?;
    if n > 0 {
        return Err(AppError::Conflict(format!(
            "{what} is used by {n} trip(s) and cannot be deleted"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trucks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NewTruck {
    pub lorry_number: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub capacity_kg: Option<f64>,
    #[serde(default)]
    pub registration_date: Option<String>,
    #[serde(default)]
    pub insurance_expiry: Option<String>,
    #[serde(default)]
    pub fitness_expiry: Option<String>,
    #[serde(default)]
    pub status: Option<TruckStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TruckUpdate {
    pub lorry_number: Option<String>,
    pub model: Option<String>,
    pub capacity_kg: Option<f64>,
    pub registration_date: Option<String>,
    pub insurance_expiry: Option<String>,
    pub fitness_expiry: Option<String>,
    pub status: Option<TruckStatus>,
}

fn lorry_number(raw: &str) -> AppResult<String> {
    Ok(input::required(raw, "lorry_number")?.to_uppercase())
}

pub fn create_truck(conn: &Connection, input: NewTruck) -> AppResult<Truck> {
    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    conn.execute(
        "INSERT INTO trucks (id, lorry_number, model, capacity_kg, registration_date,
            insurance_expiry, fitness_expiry, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            id,
            lorry_number(&input.lorry_number)?,
            input::optional_text(input.model),
            input::optional_positive(input.capacity_kg, "capacity_kg")?,
            input::optional_date(input.registration_date, "registration_date")?,
            input::optional_date(input.insurance_expiry, "insurance_expiry")?,
            input::optional_date(input.fitness_expiry, "fitness_expiry")?,
            input.status.unwrap_or(TruckStatus::Active),
            now
        ],
    )?;
    info!(truck_id = %id, "truck created");
    get_truck(conn, &id)
}

pub fn get_truck(conn: &Connection, id: &str) -> AppResult<Truck> {
    conn.query_row("SELECT * FROM trucks WHERE id = ?1", params![id], Truck::from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("truck", id))
}

pub fn list_trucks(conn: &Connection, status: Option<TruckStatus>) -> AppResult<Vec<Truck>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM trucks WHERE (?1 IS NULL OR status = ?1)
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map(params![status], Truck::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_truck(conn: &Connection, id: &str, update: TruckUpdate) -> AppResult<Truck> {
    let mut truck = get_truck(conn, id)?;
    if let Some(v) = update.lorry_number {
        truck.lorry_number = lorry_number(&v)?;
    }
    if update.model.is_some() {
        truck.model = input::optional_text(update.model);
    }
    if update.capacity_kg.is_some() {
        truck.capacity_kg = input::optional_positive(update.capacity_kg, "capacity_kg")?;
    }
    if update.registration_date.is_some() {
        truck.registration_date = input::optional_date(update.registration_date, "registration_date")?;
    }
    if update.insurance_expiry.is_some() {
        truck.insurance_expiry = input::optional_date(update.insurance_expiry, "insurance_expiry")?;
    }
    if update.fitness_expiry.is_some() {
        truck.fitness_expiry = input::optional_date(update.fitness_expiry, "fitness_expiry")?;
    }
    if let Some(status) = update.status {
        truck.status = status;
    }
    conn.execute(
        "UPDATE trucks SET lorry_number = ?1, model = ?2, capacity_kg = ?3, registration_date = ?4,
            insurance_expiry = ?5, fitness_expiry = ?6, status = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            truck.lorry_number,
            truck.model,
            truck.capacity_kg,
            truck.registration_date,
            truck.insurance_expiry,
            truck.fitness_expiry,
            truck.status,
            db::now_ts(),
            id
        ],
    )?;
    get_truck(conn, id)
}

pub fn delete_truck(conn: &Connection, id: &str) -> AppResult<()> {
    get_truck(conn, id)?;
    refuse_if_referenced(conn, "truck", "truck_id", id)?;
    conn.execute("DELETE FROM trucks WHERE id = ?1", params![id])?;
    info!(truck_id = %id, "truck deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Drivers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NewDriver {
    pub driver_name: String,
    pub license_number: String,
    pub phone_number: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub license_expiry: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub status: Option<DriverStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverUpdate {
    pub driver_name: Option<String>,
    pub license_number: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub license_expiry: Option<String>,
    pub date_of_birth: Option<String>,
    pub status: Option<DriverStatus>,
}

pub fn create_driver(conn: &Connection, input: NewDriver) -> AppResult<Driver> {
    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    conn.execute(
        "INSERT INTO drivers (id, driver_name, license_number, phone_number, address,
            license_expiry, date_of_birth, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            id,
            input::required(&input.driver_name, "driver_name")?,
            input::required(&input.license_number, "license_number")?.to_uppercase(),
            input::required(&input.phone_number, "phone_number")?,
            input::optional_text(input.address),
            input::optional_date(input.license_expiry, "license_expiry")?,
            input::optional_date(input.date_of_birth, "date_of_birth")?,
            input.status.unwrap_or(DriverStatus::Active),
            now
        ],
    )?;
    info!(driver_id = %id, "driver created");
    get_driver(conn, &id)
}

pub fn get_driver(conn: &Connection, id: &str) -> AppResult<Driver> {
    conn.query_row("SELECT * FROM drivers WHERE id = ?1", params![id], Driver::from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("driver", id))
}

pub fn list_drivers(conn: &Connection, status: Option<DriverStatus>) -> AppResult<Vec<Driver>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM drivers WHERE (?1 IS NULL OR status = ?1)
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map(params![status], Driver::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_driver(conn: &Connection, id: &str, update: DriverUpdate) -> AppResult<Driver> {
    let mut driver = get_driver(conn, id)?;
    if let Some(v) = update.driver_name {
        driver.driver_name = input::required(&v, "driver_name")?;
    }
    if let Some(v) = update.license_number {
        driver.license_number = input::required(&v, "license_number")?.to_uppercase();
    }
    if let Some(v) = update.phone_number {
        driver.phone_number = input::required(&v, "phone_number")?;
    }
    if update.address.is_some() {
        driver.address = input::optional_text(update.address);
    }
    if update.license_expiry.is_some() {
        driver.license_expiry = input::optional_date(update.license_expiry, "license_expiry")?;
    }
    if update.date_of_birth.is_some() {
        driver.date_of_birth = input::optional_date(update.date_of_birth, "date_of_birth")?;
    }
    if let Some(status) = update.status {
        driver.status = status;
    }
    conn.execute(
        "UPDATE drivers SET driver_name = ?1, license_number = ?2, phone_number = ?3, address = ?4,
            license_expiry = ?5, date_of_birth = ?6, status = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            driver.driver_name,
            driver.license_number,
            driver.phone_number,
            driver.address,
            driver.license_expiry,
            driver.date_of_birth,
            driver.status,
            db::now_ts(),
            id
        ],
    )?;
    get_driver(conn, id)
}

pub fn delete_driver(conn: &Connection, id: &str) -> AppResult<()> {
    get_driver(conn, id)?;
    refuse_if_referenced(conn, "driver", "driver_id", id)?;
    conn.execute("DELETE FROM drivers WHERE id = ?1", params![id])?;
    info!(driver_id = %id, "driver deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoute {
    pub from_location: String,
    pub to_location: String,
    pub distance_km: f64,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteUpdate {
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub distance_km: Option<f64>,
    pub estimated_hours: Option<f64>,
}

pub fn create_route(conn: &Connection, input: NewRoute) -> AppResult<Route> {
    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    conn.execute(
        "INSERT INTO routes (id, from_location, to_location, distance_km, estimated_hours,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id,
            input::required(&input.from_location, "from_location")?,
            input::required(&input.to_location, "to_location")?,
            input::positive(input.distance_km, "distance_km")?,
            input::optional_positive(input.estimated_hours, "estimated_hours")?,
            now
        ],
    )?;
    info!(route_id = %id, "route created");
    get_route(conn, &id)
}

pub fn get_route(conn: &Connection, id: &str) -> AppResult<Route> {
    conn.query_row("SELECT * FROM routes WHERE id = ?1", params![id], Route::from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("route", id))
}

pub fn list_routes(conn: &Connection) -> AppResult<Vec<Route>> {
    let mut stmt = conn.prepare("SELECT * FROM routes ORDER BY created_at DESC, rowid DESC")?;
    let rows = stmt
        .query_map([], Route::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_route(conn: &Connection, id: &str, update: RouteUpdate) -> AppResult<Route> {
    let mut route = get_route(conn, id)?;
    if let Some(v) = update.from_location {
        route.from_location = input::required(&v, "from_location")?;
    }
    if let Some(v) = update.to_location {
        route.to_location = input::required(&v, "to_location")?;
    }
    if let Some(v) = update.distance_km {
        route.distance_km = input::positive(v, "distance_km")?;
    }
    if update.estimated_hours.is_some() {
        route.estimated_hours = input::optional_positive(update.estimated_hours, "estimated_hours")?;
    }
    conn.execute(
        "UPDATE routes SET from_location = ?1, to_location = ?2, distance_km = ?3,
            estimated_hours = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            route.from_location,
            route.to_location,
            route.distance_km,
            route.estimated_hours,
            db::now_ts(),
            id
        ],
    )?;
    get_route(conn, id)
}

pub fn delete_route(conn: &Connection, id: &str) -> AppResult<()> {
    get_route(conn, id)?;
    refuse_if_referenced(conn, "route", "route_id", id)?;
    conn.execute("DELETE FROM routes WHERE id = ?1", params![id])?;
    info!(route_id = %id, "route deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Document expiry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExpiringDocument {
    /// `truck` or `driver`.
    pub kind: &'static str,
    pub entity_id: String,
    /// Lorry number or driver name.
    pub label: String,
    /// `insurance`, `fitness` or `license`.
    pub document: &'static str,
    pub expires_on: String,
    /// Negative once already expired.
    pub days_left: i64,
}

/// Truck insurance/fitness and driver licences expiring within
/// `within_days` of today, including ones already past.
pub fn expiring_documents(conn: &Connection, within_days: i64) -> AppResult<Vec<ExpiringDocument>> {
    expiring_documents_on(conn, Local::now().date_naive(), within_days)
}

pub(crate) fn expiring_documents_on(
    conn: &Connection,
    today: NaiveDate,
    within_days: i64,
) -> AppResult<Vec<ExpiringDocument>> {
    if within_days < 0 {
        return Err(AppError::validation("days must be zero or more"));
    }
    let cutoff = (today + chrono::Duration::days(within_days))
        .format("%Y-%m-%d")
        .to_string();

    let mut stmt = conn.prepare(
        "SELECT 'truck', id, lorry_number, 'insurance', insurance_expiry FROM trucks
            WHERE insurance_expiry IS NOT NULL AND insurance_expiry <= ?1
         UNION ALL
         SELECT 'truck', id, lorry_number, 'fitness', fitness_expiry FROM trucks
            WHERE fitness_expiry IS NOT NULL AND fitness_expiry <= ?1
         UNION ALL
         SELECT 'driver', id, driver_name, 'license', license_expiry FROM drivers
            WHERE license_expiry IS NOT NULL AND license_expiry <= ?1
         ORDER BY 5, 3",
    )?;
    let rows = stmt
        .query_map(params![cutoff], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (kind, entity_id, label, document, expires_on) in rows {
        let Ok(date) = NaiveDate::parse_from_str(&expires_on, "%Y-%m-%d") else {
            continue;
        };
        out.push(ExpiringDocument {
            kind: if kind == "truck" { "truck" } else { "driver" },
            entity_id,
            label,
            document: match document.as_str() {
                "insurance" => "insurance",
                "fitness" => "fitness",
                _ => "license",
            },
            expires_on,
            days_left: (date - today).num_days(),
        });
    }
    Ok(out)
}

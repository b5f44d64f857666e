//! Trip lifecycle: create, list, expense edits, completion.
//!
//! Expense and revenue totals are columns computed by the store; this module
//! only writes the individual expense fields.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::format;
use crate::input;
use crate::master;
use crate::models::{DriverStatus, TripStatus, TripView, TruckStatus};

pub(crate) const TRIP_VIEW_SELECT: &str = "SELECT t.*, tk.lorry_number, d.driver_name
     FROM trips t
     JOIN trucks tk ON tk.id = t.truck_id
     JOIN drivers d ON d.id = t.driver_id";

#[derive(Debug, Clone, Deserialize)]
pub struct NewTrip {
    pub truck_id: String,
    pub driver_id: String,
    pub route_id: String,
    #[serde(default)]
    pub from_location: Option<String>,
    #[serde(default)]
    pub to_location: Option<String>,
    pub starting_time: String,
    #[serde(default)]
    pub total_distance_km: Option<f64>,
    #[serde(default)]
    pub diesel_liters: Option<f64>,
    #[serde(default)]
    pub diesel_cost: Option<f64>,
    #[serde(default)]
    pub toll_charges: Option<f64>,
    #[serde(default)]
    pub other_expenses: Option<f64>,
    #[serde(default)]
    pub driver_allowance: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripExpenseUpdate {
    pub diesel_liters: Option<f64>,
    pub diesel_cost: Option<f64>,
    pub toll_charges: Option<f64>,
    pub other_expenses: Option<f64>,
    pub driver_allowance: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripFilter {
    pub status: Option<TripStatus>,
    pub truck_id: Option<String>,
    pub driver_id: Option<String>,
    pub limit: Option<u32>,
}

fn money(value: Option<f64>, field: &str) -> AppResult<f64> {
    input::non_negative(value.unwrap_or(0.0), field)
}

/// Start a trip. The truck and driver must be active; route endpoints and
/// distance are taken from the route unless given.
pub fn create_trip(conn: &Connection, input: NewTrip, created_by: Option<&str>) -> AppResult<TripView> {
    let truck = master::get_truck(conn, &input.truck_id)?;
    if truck.status != TruckStatus::Active {
        return Err(AppError::validation(format!(
            "truck {} is {}, only active trucks can start a trip",
            truck.lorry_number, truck.status
        )));
    }
    let driver = master::get_driver(conn, &input.driver_id)?;
    if driver.status != DriverStatus::Active {
        return Err(AppError::validation(format!(
            "driver {} is inactive",
            driver.driver_name
        )));
    }
    let route = master::get_route(conn, &input.route_id)?;

    let from_location = input::optional_text(input.from_location).unwrap_or(route.from_location);
    let to_location = input::optional_text(input.to_location).unwrap_or(route.to_location);
    let distance = input::non_negative(
        input.total_distance_km.unwrap_or(route.distance_km),
        "total_distance_km",
    )?;
    let starting_time = format::parse_timestamp(&input::required(&input.starting_time, "starting_time")?)?;
    let diesel_liters = money(input.diesel_liters, "diesel_liters")?;
    let diesel_cost = money(input.diesel_cost, "diesel_cost")?;
    let toll_charges = money(input.toll_charges, "toll_charges")?;
    let other_expenses = money(input.other_expenses, "other_expenses")?;
    let driver_allowance = money(input.driver_allowance, "driver_allowance")?;
    let notes = input::optional_text(input.notes);

    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    let code = db::insert_with_unique_code(format::generate_trip_id, |code| {
        conn.execute(
            "INSERT INTO trips (id, trip_id, truck_id, driver_id, route_id, from_location, to_location,
                starting_time, total_distance_km, diesel_liters, diesel_cost, toll_charges,
                other_expenses, driver_allowance, trip_status, notes, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)",
            params![
                id,
                code,
                truck.id,
                driver.id,
                route.id,
                from_location,
                to_location,
                starting_time,
                distance,
                diesel_liters,
                diesel_cost,
                toll_charges,
                other_expenses,
                driver_allowance,
                TripStatus::Running,
                notes,
                created_by,
                now
            ],
        )
    })?;

    info!(trip_id = %code, truck = %truck.lorry_number, driver = %driver.driver_name, "trip started");
    get_trip(conn, &id)
}

/// Fetch by row id or by `TRIP-…` code.
pub fn get_trip(conn: &Connection, id: &str) -> AppResult<TripView> {
    conn.query_row(
        &format!("{TRIP_VIEW_SELECT} WHERE t.id = ?1 OR t.trip_id = ?1"),
        params![id],
        TripView::from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("trip", id))
}

pub fn list_trips(conn: &Connection, filter: &TripFilter) -> AppResult<Vec<TripView>> {
    let limit = filter.limit.map(i64::from).unwrap_or(-1);
    let mut stmt = conn.prepare(&format!(
        "{TRIP_VIEW_SELECT}
         WHERE (?1 IS NULL OR t.trip_status = ?1)
           AND (?2 IS NULL OR t.truck_id = ?2)
           AND (?3 IS NULL OR t.driver_id = ?3)
         ORDER BY t.created_at DESC, t.rowid DESC
         LIMIT ?4"
    ))?;
    let rows = stmt
        .query_map(
            params![filter.status, filter.truck_id, filter.driver_id, limit],
            TripView::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Trips a new GC note can be attached to.
pub fn running_trips(conn: &Connection) -> AppResult<Vec<TripView>> {
    list_trips(
        conn,
        &TripFilter {
            status: Some(TripStatus::Running),
            ..Default::default()
        },
    )
}

pub fn update_trip_expenses(conn: &Connection, id: &str, update: TripExpenseUpdate) -> AppResult<TripView> {
    let mut trip = get_trip(conn, id)?.trip;
    if let Some(v) = update.diesel_liters {
        trip.diesel_liters = input::non_negative(v, "diesel_liters")?;
    }
    if let Some(v) = update.diesel_cost {
        trip.diesel_cost = input::non_negative(v, "diesel_cost")?;
    }
    if let Some(v) = update.toll_charges {
        trip.toll_charges = input::non_negative(v, "toll_charges")?;
    }
    if let Some(v) = update.other_expenses {
        trip.other_expenses = input::non_negative(v, "other_expenses")?;
    }
    if let Some(v) = update.driver_allowance {
        trip.driver_allowance = input::non_negative(v, "driver_allowance")?;
    }
    if update.notes.is_some() {
        trip.notes = input::optional_text(update.notes);
    }
    conn.execute(
        "UPDATE trips SET diesel_liters = ?1, diesel_cost = ?2, toll_charges = ?3,
            other_expenses = ?4, driver_allowance = ?5, notes = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            trip.diesel_liters,
            trip.diesel_cost,
            trip.toll_charges,
            trip.other_expenses,
            trip.driver_allowance,
            trip.notes,
            db::now_ts(),
            trip.id
        ],
    )?;
    get_trip(conn, &trip.id)
}

/// Close a running trip, stamping its ending time.
pub fn complete_trip(conn: &Connection, id: &str) -> AppResult<TripView> {
    let trip = get_trip(conn, id)?.trip;
    if trip.trip_status != TripStatus::Running {
        return Err(AppError::Conflict(format!(
            "trip {} is already completed",
            trip.trip_id
        )));
    }
    let now = db::now_ts();
    conn.execute(
        "UPDATE trips SET trip_status = ?1, ending_time = ?2, updated_at = ?2 WHERE id = ?3",
        params![TripStatus::Completed, now, trip.id],
    )?;
    info!(trip_id = %trip.trip_id, "trip completed");
    get_trip(conn, &trip.id)
}

pub fn delete_trip(conn: &Connection, id: &str) -> AppResult<()> {
    let trip = get_trip(conn, id)?.trip;
    let notes: i64 = conn.query_row(
        "SELECT COUNT(*) FROM gc_notes WHERE trip_id = ?1",
        params![trip.id],
        |row| row.get(0),
    )?;
    if notes > 0 {
        return Err(AppError::Conflict(format!(
            "trip {} has {notes} GC note(s) and cannot be deleted",
            trip.trip_id
        )));
    }
    conn.execute("DELETE FROM trips WHERE id = ?1", params![trip.id])?;
    info!(trip_id = %trip.trip_id, "trip deleted");
    Ok(())
}

//! Report assembly and printable documents.
//!
//! Each report kind queries the store and produces a format-neutral
//! [`Report`]; [`export_report`] renders it. GC notes and trip sheets are
//! laid out directly on a PDF page.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Local, NaiveDate};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dashboard::{self, Period};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::export::pdf::{self, Align, Font, PdfBuilder, Table, BLACK, GREY, MARGIN_MM};
use crate::export::{
    self, Cell, ExportFormat, ExportedFile, Report, Section, BLUE_PALETTE, GREEN_PALETTE,
    RED_PALETTE,
};
use crate::format;
use crate::gc_notes::{self, GC_VIEW_SELECT};
use crate::master;
use crate::models::{GcNoteView, TripView};
use crate::trips::{self, TripFilter};

const TRIP_SUMMARY_LIMIT: u32 = 50;
const MAX_RANGE_DAYS: u64 = 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    DailyRevenue,
    TripSummary,
    TopayOutstanding,
    DriverPerformance,
    TruckUtilization,
    MonthlySummary,
    Revenue,
    GcNotes,
    Trips,
}

impl ReportKind {
    pub const ALL: [ReportKind; 9] = [
        ReportKind::DailyRevenue,
        ReportKind::TripSummary,
        ReportKind::TopayOutstanding,
        ReportKind::DriverPerformance,
        ReportKind::TruckUtilization,
        ReportKind::MonthlySummary,
        ReportKind::Revenue,
        ReportKind::GcNotes,
        ReportKind::Trips,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::DailyRevenue => "daily-revenue",
            ReportKind::TripSummary => "trip-summary",
            ReportKind::TopayOutstanding => "topay-outstanding",
            ReportKind::DriverPerformance => "driver-performance",
            ReportKind::TruckUtilization => "truck-utilization",
            ReportKind::MonthlySummary => "monthly-summary",
            ReportKind::Revenue => "revenue",
            ReportKind::GcNotes => "gc-notes",
            ReportKind::Trips => "trips",
        }
    }
}

impl FromStr for ReportKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        ReportKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| AppError::validation(format!("unknown report '{s}'")))
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional inclusive date range (`YYYY-MM-DD`). Used by the revenue report
/// and the GC note / trip exports.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportOptions {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

struct Range {
    from: NaiveDate,
    to: NaiveDate,
}

impl Range {
    fn start(&self) -> String {
        dashboard::local_midnight(self.from, &Local)
    }

    /// Exclusive upper bound: midnight after `to`.
    fn end(&self) -> String {
        dashboard::local_midnight(self.to + Days::new(1), &Local)
    }
}

fn parse_range(opts: &ReportOptions, today: NaiveDate) -> AppResult<Option<Range>> {
    let from = opts.from.as_deref().map(format::parse_date).transpose()?;
    let to = opts.to.as_deref().map(format::parse_date).transpose()?;
    let (from, to) = match (from, to) {
        (None, None) => return Ok(None),
        (Some(f), None) => (f, today.max(f)),
        (None, Some(t)) => (t.with_day(1).unwrap_or(t), t),
        (Some(f), Some(t)) => (f, t),
    };
    if from > to {
        return Err(AppError::validation("from must not be after to"));
    }
    if (to - from).num_days() as u64 >= MAX_RANGE_DAYS {
        return Err(AppError::validation(format!(
            "date range is limited to {MAX_RANGE_DAYS} days"
        )));
    }
    Ok(Some(Range { from, to }))
}

fn month_to_date(today: NaiveDate) -> Range {
    Range {
        from: today.with_day(1).unwrap_or(today),
        to: today,
    }
}

fn ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn generated_line() -> String {
    format!("Generated: {}", format::format_datetime(&db::now_ts()))
}

fn upper(s: impl fmt::Display) -> String {
    s.to_string().to_uppercase()
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn gc_notes_where(conn: &Connection, clause: &str, p: impl rusqlite::Params) -> AppResult<Vec<GcNoteView>> {
    let mut stmt = conn.prepare(&format!(
        "{GC_VIEW_SELECT} WHERE {clause} ORDER BY g.created_at DESC, g.rowid DESC"
    ))?;
    let rows = stmt
        .query_map(p, GcNoteView::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn trips_where(conn: &Connection, clause: &str, p: impl rusqlite::Params) -> AppResult<Vec<TripView>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE {clause} ORDER BY t.created_at DESC, t.rowid DESC",
        trips::TRIP_VIEW_SELECT
    ))?;
    let rows = stmt
        .query_map(p, TripView::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

struct Totals {
    trips: i64,
    expenses: f64,
    revenue: f64,
}

/// Trips, expenses and revenue per driver name or lorry number, by name.
fn totals_by(conn: &Connection, name_column: &str) -> AppResult<Vec<(String, Totals)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {name_column}, COUNT(*), COALESCE(SUM(t.total_trip_expense), 0),
                COALESCE(SUM(t.total_revenue), 0)
         FROM trips t
         JOIN trucks tk ON tk.id = t.truck_id
         JOIN drivers d ON d.id = t.driver_id
         GROUP BY {name_column}
         ORDER BY {name_column}"
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                Totals {
                    trips: row.get(1)?,
                    expenses: row.get(2)?,
                    revenue: row.get(3)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn sum_between(conn: &Connection, sql: &str, start: &str, end: &str) -> AppResult<f64> {
    let v: f64 = conn.query_row(sql, params![start, end], |row| row.get(0))?;
    Ok(v)
}

fn count_between(conn: &Connection, sql: &str, start: &str, end: &str) -> AppResult<i64> {
    Ok(conn.query_row(sql, params![start, end], |row| row.get(0))?)
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

pub fn build_report(
    conn: &Connection,
    kind: ReportKind,
    fmt: ExportFormat,
    opts: &ReportOptions,
) -> AppResult<Report> {
    let today = Local::now().date_naive();
    let period = Period::current();
    let range = parse_range(opts, today)?;
    match kind {
        ReportKind::DailyRevenue => daily_revenue(conn, &period, today),
        ReportKind::TripSummary => trip_summary(conn, fmt, today),
        ReportKind::TopayOutstanding => topay_outstanding(conn, today),
        ReportKind::DriverPerformance | ReportKind::TruckUtilization => {
            performance(conn, kind, today)
        }
        ReportKind::MonthlySummary => monthly_summary(conn, &period, today),
        ReportKind::Revenue => revenue(conn, range.unwrap_or_else(|| month_to_date(today))),
        ReportKind::GcNotes => gc_notes_export(conn, range, today),
        ReportKind::Trips => trips_export(conn, range, today),
    }
}

pub fn export_report(
    conn: &Connection,
    kind: ReportKind,
    fmt: ExportFormat,
    opts: &ReportOptions,
) -> AppResult<ExportedFile> {
    let report = build_report(conn, kind, fmt, opts)?;
    let file = export::render(&report, fmt)?;
    info!(report = %kind, format = %fmt, file = %file.file_name, "report exported");
    Ok(file)
}

fn daily_revenue(conn: &Connection, period: &Period, today: NaiveDate) -> AppResult<Report> {
    let notes = gc_notes_where(conn, "g.created_at >= ?1", params![period.today_start])?;
    let expenses: f64 = trips_where(conn, "t.created_at >= ?1", params![period.today_start])?
        .iter()
        .map(|t| t.trip.total_trip_expense)
        .sum();
    let revenue: f64 = notes.iter().map(|n| n.note.total_amount).sum();

    let rows = notes
        .iter()
        .map(|n| {
            vec![
                Cell::text(&n.note.gc_number),
                Cell::text(&n.lorry_number),
                Cell::text(&n.note.consignee_name),
                Cell::Money(n.note.total_amount),
                Cell::text(upper(n.note.payment_status)),
            ]
        })
        .collect();

    Ok(
        Report::new("Daily Revenue Report", "Daily Revenue", format!("daily-revenue-{}", ymd(today)))
            .line(format!("Date: {}", today.format("%d/%m/%Y")))
            .section(Section::Summary {
                heading: "Summary".into(),
                rows: vec![
                    ("Total Revenue".into(), Cell::Money(format::round2(revenue))),
                    ("Total Expenses".into(), Cell::Money(format::round2(expenses))),
                    ("Net Profit".into(), Cell::Money(format::round2(revenue - expenses))),
                ],
            })
            .section(Section::Table {
                heading: None,
                headers: strings(&["GC Number", "Truck", "Consignee", "Amount", "Status"]),
                rows,
                footer: None,
            })
            .widths(&[20.0, 15.0, 25.0, 15.0, 12.0]),
    )
}

fn trip_summary(conn: &Connection, fmt: ExportFormat, today: NaiveDate) -> AppResult<Report> {
    let trips = trips::list_trips(
        conn,
        &TripFilter {
            limit: Some(TRIP_SUMMARY_LIMIT),
            ..Default::default()
        },
    )?;
    let split_route = fmt == ExportFormat::Excel;

    let headers = if split_route {
        strings(&["Trip ID", "Truck", "Driver", "From", "To", "Expenses", "Status"])
    } else {
        strings(&["Trip ID", "Truck", "Driver", "Route", "Expenses", "Status"])
    };
    let rows = trips
        .iter()
        .map(|t| {
            let mut row = vec![
                Cell::text(&t.trip.trip_id),
                Cell::text(&t.lorry_number),
                Cell::text(&t.driver_name),
            ];
            if split_route {
                row.push(Cell::text(&t.trip.from_location));
                row.push(Cell::text(&t.trip.to_location));
            } else {
                row.push(Cell::text(format!("{} to {}", t.trip.from_location, t.trip.to_location)));
            }
            row.push(Cell::Money(t.trip.total_trip_expense));
            row.push(Cell::text(upper(t.trip.trip_status)));
            row
        })
        .collect();

    Ok(
        Report::new("Trip Summary Report", "Trip Summary", format!("trip-summary-{}", ymd(today)))
            .line(generated_line())
            .section(Section::Table {
                heading: None,
                headers,
                rows,
                footer: None,
            })
            .widths(&[22.0, 15.0, 20.0, 15.0, 15.0, 14.0, 12.0]),
    )
}

fn topay_outstanding(conn: &Connection, today: NaiveDate) -> AppResult<Report> {
    let notes = gc_notes_where(conn, "g.payment_status = 'topay'", [])?;
    let total: f64 = notes.iter().map(|n| n.note.total_amount).sum();
    let rows = notes
        .iter()
        .map(|n| {
            vec![
                Cell::text(&n.note.gc_number),
                Cell::text(&n.note.consignee_name),
                Cell::text(&n.note.consignee_phone),
                Cell::Money(n.note.total_amount),
                Cell::text(format::format_short_date(&n.note.created_at)),
            ]
        })
        .collect();

    Ok(Report::new(
        "Outstanding ToPay Report",
        "ToPay Outstanding",
        format!("topay-outstanding-{}", ymd(today)),
    )
    .line(generated_line())
    .line(format!("Total Outstanding: {}", format::format_rupees(total)))
    .section(Section::Table {
        heading: None,
        headers: strings(&["GC Number", "Consignee", "Phone", "Amount", "Date"]),
        rows,
        footer: Some(vec![
            Cell::text("Total"),
            Cell::text(""),
            Cell::text(""),
            Cell::Money(format::round2(total)),
            Cell::text(""),
        ]),
    })
    .widths(&[20.0, 25.0, 15.0, 15.0, 12.0]))
}

fn performance(conn: &Connection, kind: ReportKind, today: NaiveDate) -> AppResult<Report> {
    let (title, sheet, first, column) = if kind == ReportKind::DriverPerformance {
        ("Driver Performance Report", "Driver Performance", "Driver", "d.driver_name")
    } else {
        ("Truck Utilization Report", "Truck Utilization", "Truck", "tk.lorry_number")
    };
    let rows = totals_by(conn, column)?
        .into_iter()
        .map(|(name, t)| {
            vec![
                Cell::Text(name),
                Cell::Int(t.trips),
                Cell::Money(format::round2(t.expenses)),
                Cell::Money(format::round2(t.revenue)),
                Cell::Money(format::round2(t.revenue - t.expenses)),
            ]
        })
        .collect();

    Ok(
        Report::new(title, sheet, format!("{}-{}", kind.as_str(), ymd(today)))
            .line(generated_line())
            .section(Section::Table {
                heading: None,
                headers: strings(&[first, "Trips", "Expenses", "Revenue", "Net Profit"]),
                rows,
                footer: None,
            })
            .widths(&[22.0, 10.0, 15.0, 15.0, 15.0]),
    )
}

fn monthly_summary(conn: &Connection, period: &Period, today: NaiveDate) -> AppResult<Report> {
    let since = params![period.month_start];
    let sum = |sql: &str| -> AppResult<f64> {
        let v: f64 = conn.query_row(sql, since, |row| row.get(0))?;
        Ok(format::round2(v))
    };
    let count = |sql: &str| -> AppResult<i64> { Ok(conn.query_row(sql, since, |row| row.get(0))?) };

    let revenue = sum("SELECT COALESCE(SUM(total_amount), 0) FROM gc_notes WHERE created_at >= ?1")?;
    let expenses = sum("SELECT COALESCE(SUM(total_trip_expense), 0) FROM trips WHERE created_at >= ?1")?;
    let paid = sum(
        "SELECT COALESCE(SUM(total_amount), 0) FROM gc_notes
         WHERE created_at >= ?1 AND payment_status = 'paid'",
    )?;
    let topay = sum(
        "SELECT COALESCE(SUM(total_amount), 0) FROM gc_notes
         WHERE created_at >= ?1 AND payment_status = 'topay'",
    )?;
    let trips = count("SELECT COUNT(*) FROM trips WHERE created_at >= ?1")?;
    let notes = count("SELECT COUNT(*) FROM gc_notes WHERE created_at >= ?1")?;
    let running = count("SELECT COUNT(*) FROM trips WHERE created_at >= ?1 AND trip_status = 'running'")?;
    let completed =
        count("SELECT COUNT(*) FROM trips WHERE created_at >= ?1 AND trip_status = 'completed'")?;

    let month_first = today.with_day(1).unwrap_or(today);
    Ok(Report::new(
        "Monthly Summary Report",
        "Monthly Summary",
        format!("monthly-summary-{}", ymd(month_first)),
    )
    .line(format!("Month: {}", format::format_month(month_first)))
    .section(Section::Summary {
        heading: "Financial Summary".into(),
        rows: vec![
            ("Total Revenue".into(), Cell::Money(revenue)),
            ("Total Expenses".into(), Cell::Money(expenses)),
            ("Net Profit".into(), Cell::Money(format::round2(revenue - expenses))),
            ("Paid Amount".into(), Cell::Money(paid)),
            ("Outstanding ToPay".into(), Cell::Money(topay)),
        ],
    })
    .section(Section::Summary {
        heading: "Operations Summary".into(),
        rows: vec![
            ("Total Trips".into(), Cell::Int(trips)),
            ("Total GC Notes".into(), Cell::Int(notes)),
            ("Running Trips".into(), Cell::Int(running)),
            ("Completed Trips".into(), Cell::Int(completed)),
        ],
    })
    .widths(&[22.0, 15.0]))
}

/// One row per calendar day with a TOTAL footer.
fn revenue(conn: &Connection, range: Range) -> AppResult<Report> {
    let mut rows = Vec::new();
    let (mut trips_total, mut notes_total) = (0i64, 0i64);
    let (mut revenue_total, mut expenses_total) = (0.0f64, 0.0f64);

    for day in range.from.iter_days().take_while(|d| *d <= range.to) {
        let start = dashboard::local_midnight(day, &Local);
        let end = dashboard::local_midnight(day + Days::new(1), &Local);
        let trips = count_between(
            conn,
            "SELECT COUNT(*) FROM trips WHERE created_at >= ?1 AND created_at < ?2",
            &start,
            &end,
        )?;
        let notes = count_between(
            conn,
            "SELECT COUNT(*) FROM gc_notes WHERE created_at >= ?1 AND created_at < ?2",
            &start,
            &end,
        )?;
        let revenue = sum_between(
            conn,
            "SELECT COALESCE(SUM(total_amount), 0) FROM gc_notes
             WHERE created_at >= ?1 AND created_at < ?2",
            &start,
            &end,
        )?;
        let expenses = sum_between(
            conn,
            "SELECT COALESCE(SUM(total_trip_expense), 0) FROM trips
             WHERE created_at >= ?1 AND created_at < ?2",
            &start,
            &end,
        )?;
        trips_total += trips;
        notes_total += notes;
        revenue_total += revenue;
        expenses_total += expenses;
        rows.push(vec![
            Cell::text(day.format("%d/%m/%Y").to_string()),
            Cell::Int(trips),
            Cell::Int(notes),
            Cell::Money(format::round2(revenue)),
            Cell::Money(format::round2(expenses)),
            Cell::Money(format::round2(revenue - expenses)),
        ]);
    }

    Ok(Report::new(
        "Revenue Report",
        "Revenue Report",
        format!("revenue-report-{}-to-{}", ymd(range.from), ymd(range.to)),
    )
    .line(format!(
        "Period: {} to {}",
        range.from.format("%d/%m/%Y"),
        range.to.format("%d/%m/%Y")
    ))
    .section(Section::Table {
        heading: None,
        headers: strings(&["Date", "Trips", "GC Notes", "Revenue", "Expenses", "Profit/Loss"]),
        rows,
        footer: Some(vec![
            Cell::text("TOTAL"),
            Cell::Int(trips_total),
            Cell::Int(notes_total),
            Cell::Money(format::round2(revenue_total)),
            Cell::Money(format::round2(expenses_total)),
            Cell::Money(format::round2(revenue_total - expenses_total)),
        ]),
    })
    .widths(&[15.0, 10.0, 12.0, 15.0, 15.0, 15.0]))
}

fn range_clause(alias: &str, range: &Option<Range>) -> (String, Vec<String>) {
    match range {
        Some(r) => (
            format!("{alias}.created_at >= ?1 AND {alias}.created_at < ?2"),
            vec![r.start(), r.end()],
        ),
        None => ("1 = 1".to_string(), Vec::new()),
    }
}

fn gc_notes_export(conn: &Connection, range: Option<Range>, today: NaiveDate) -> AppResult<Report> {
    let (clause, args) = range_clause("g", &range);
    let notes = gc_notes_where(conn, &clause, rusqlite::params_from_iter(args))?;
    let rows = notes
        .iter()
        .map(|n| {
            vec![
                Cell::text(&n.note.gc_number),
                Cell::text(format::format_datetime(&n.note.date_time)),
                Cell::text(&n.note.consignor_name),
                Cell::text(&n.note.consignee_name),
                Cell::text(&n.note.description_of_goods),
                Cell::Number(n.note.weight_kg),
                Cell::Money(n.note.total_amount),
                Cell::text(upper(n.note.payment_mode)),
                Cell::text(upper(n.note.payment_status)),
                Cell::text(upper(n.note.delivery_status)),
            ]
        })
        .collect();

    Ok(Report::new("GC Notes", "GC Notes", format!("gc-notes-{}", ymd(today)))
        .line(generated_line())
        .section(Section::Table {
            heading: None,
            headers: strings(&[
                "GC Number",
                "Date & Time",
                "Consignor",
                "Consignee",
                "Description",
                "Weight (kg)",
                "Amount",
                "Payment Mode",
                "Payment Status",
                "Delivery Status",
            ]),
            rows,
            footer: None,
        })
        .widths(&[20.0, 18.0, 25.0, 25.0, 30.0, 12.0, 12.0, 12.0, 15.0, 15.0]))
}

fn trips_export(conn: &Connection, range: Option<Range>, today: NaiveDate) -> AppResult<Report> {
    let (clause, args) = range_clause("t", &range);
    let trips = trips_where(conn, &clause, rusqlite::params_from_iter(args))?;
    let rows = trips
        .iter()
        .map(|t| {
            vec![
                Cell::text(&t.trip.trip_id),
                Cell::text(&t.lorry_number),
                Cell::text(&t.driver_name),
                Cell::text(&t.trip.from_location),
                Cell::text(&t.trip.to_location),
                Cell::text(format::format_datetime(&t.trip.starting_time)),
                Cell::text(
                    t.trip
                        .ending_time
                        .as_deref()
                        .map(format::format_datetime)
                        .unwrap_or_else(|| "In Progress".to_string()),
                ),
                Cell::Number(t.trip.total_distance_km),
                Cell::Money(t.trip.total_trip_expense),
                Cell::Money(t.trip.total_revenue),
                Cell::Money(t.trip.trip_profit_loss),
                Cell::text(upper(t.trip.trip_status)),
            ]
        })
        .collect();

    Ok(Report::new("Trips", "Trips", format!("trips-{}", ymd(today)))
        .line(generated_line())
        .section(Section::Table {
            heading: None,
            headers: strings(&[
                "Trip ID",
                "Lorry Number",
                "Driver",
                "From",
                "To",
                "Start Time",
                "End Time",
                "Distance (km)",
                "Expenses",
                "Revenue",
                "Profit/Loss",
                "Status",
            ]),
            rows,
            footer: None,
        })
        .widths(&[20.0, 15.0, 20.0, 15.0, 15.0, 18.0, 18.0, 12.0, 12.0, 12.0, 12.0, 12.0]))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Company profile
// ---------------------------------------------------------------------------

const COMPANY_CATEGORY: &str = "company";

/// Letterhead printed on GC notes and trip sheets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
}

impl Default for CompanyProfile {
    fn default() -> Self {
        Self {
            name: "Your Company Name".into(),
            address: "Address, City, State - PIN".into(),
            phone: "+91-XXXXXXXXXX".into(),
            email: "info@company.com".into(),
        }
    }
}

pub fn company_profile(conn: &Connection) -> AppResult<CompanyProfile> {
    let mut profile = CompanyProfile::default();
    for (key, value) in db::get_settings_in_category(conn, COMPANY_CATEGORY)? {
        match key.as_str() {
            "name" => profile.name = value,
            "address" => profile.address = value,
            "phone" => profile.phone = value,
            "email" => profile.email = value,
            _ => {}
        }
    }
    Ok(profile)
}

pub fn save_company_profile(conn: &Connection, profile: CompanyProfile) -> AppResult<CompanyProfile> {
    let name = crate::input::required(&profile.name, "name")?;
    let tx = conn.unchecked_transaction()?;
    db::set_setting(&tx, COMPANY_CATEGORY, "name", &name)?;
    db::set_setting(&tx, COMPANY_CATEGORY, "address", profile.address.trim())?;
    db::set_setting(&tx, COMPANY_CATEGORY, "phone", profile.phone.trim())?;
    db::set_setting(&tx, COMPANY_CATEGORY, "email", profile.email.trim())?;
    tx.commit()?;
    info!(company = %name, "company profile updated");
    company_profile(conn)
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

fn three_column_table(
    headers: [&str; 3],
    rows: Vec<[String; 3]>,
    footer: Option<[String; 3]>,
    palette: (pdf::Rgb, pdf::Rgb),
) -> Table {
    Table {
        headers: strings(&headers),
        rows: rows.into_iter().map(Vec::from).collect(),
        footer: footer.map(Vec::from),
        align: vec![Align::Left, Align::Left, Align::Right],
        head_color: palette.0,
        foot_color: palette.1,
    }
}

fn footer_note(doc: &mut PdfBuilder, lines: &[&str]) {
    doc.font(Font::Italic, 8.0).color(GREY);
    for (i, line) in lines.iter().enumerate() {
        doc.text_centered(280.0 + 5.0 * i as f32, line);
    }
    doc.color(BLACK);
}

fn pdf_file(stem: String, bytes: Vec<u8>) -> ExportedFile {
    ExportedFile {
        file_name: format!("{stem}.pdf"),
        content_type: ExportFormat::Pdf.content_type(),
        bytes,
    }
}

/// Printable consignment note: letterhead, parties, goods and freight
/// tables, payment and delivery terms.
pub fn gc_note_document(conn: &Connection, id: &str) -> AppResult<ExportedFile> {
    let view = gc_notes::get_gc_note(conn, id)?;
    let company = company_profile(conn)?;
    let n = &view.note;

    let mut doc = PdfBuilder::new();
    doc.font(Font::Bold, 20.0).text_centered(20.0, "GOODS CONSIGNMENT NOTE");
    doc.font(Font::Regular, 10.0)
        .text_centered(28.0, &company.name)
        .text_centered(33.0, &company.address)
        .text_centered(38.0, &format!("Phone: {} | Email: {}", company.phone, company.email));

    doc.font(Font::Bold, 11.0)
        .text(MARGIN_MM, 50.0, &format!("GC Number: {}", n.gc_number))
        .text(130.0, 50.0, &format!("Date: {}", format::format_datetime(&n.date_time)));
    let qr_data = n.qr_code_data.as_deref().unwrap_or(&n.gc_number);
    if let Err(e) = doc.color(BLACK).qr_code(175.0, 55.0, 25.0, qr_data) {
        warn!(gc_number = %n.gc_number, error = %e, "QR code generation failed");
    }

    let parties = [
        ("CONSIGNOR (Sender)", 60.0, &n.consignor_name, &n.consignor_address, &n.consignor_phone, &n.consignor_gstin),
        ("CONSIGNEE (Receiver)", 98.0, &n.consignee_name, &n.consignee_address, &n.consignee_phone, &n.consignee_gstin),
    ];
    for (heading, y, name, address, phone, gstin) in parties {
        doc.font(Font::Bold, 12.0).text(MARGIN_MM, y, heading);
        doc.font(Font::Regular, 10.0)
            .text(MARGIN_MM, y + 8.0, &format!("Name: {name}"))
            .text(MARGIN_MM, y + 14.0, &format!("Address: {address}"))
            .text(MARGIN_MM, y + 20.0, &format!("Phone: {phone}"));
        if let Some(g) = gstin {
            doc.text(MARGIN_MM, y + 26.0, &format!("GSTIN: {g}"));
        }
    }

    let goods = three_column_table(
        ["Description", "Articles", "Weight (kg)"],
        vec![[
            n.description_of_goods.clone(),
            n.number_of_articles.to_string(),
            format!("{:.2}", n.weight_kg),
        ]],
        None,
        BLUE_PALETTE,
    );
    let y = doc.table(135.0, &goods);

    let freight = three_column_table(
        ["Particulars", "Rate", "Amount"],
        vec![
            [
                "Freight Charges".into(),
                format!("{}/kg", format::format_rupees(n.freight_rate)),
                format::format_rupees(n.freight_amount),
            ],
            ["H.C. Charges".into(), String::new(), format::format_rupees(n.hc_charge)],
            ["S.C. Charges".into(), String::new(), format::format_rupees(n.sc_charge)],
        ],
        Some([String::new(), "Total Amount".into(), format::format_rupees(n.total_amount)]),
        BLUE_PALETTE,
    );
    let y = doc.table(y + 10.0, &freight) + 10.0;

    doc.font(Font::Bold, 10.0)
        .text(MARGIN_MM, y, &format!("Payment Mode: {}", upper(n.payment_mode)))
        .text(MARGIN_MM, y + 6.0, &format!("Delivery: {}", n.delivery_option.label()));
    if let Some(remarks) = &n.remarks {
        doc.text(MARGIN_MM, y + 12.0, "Remarks:");
        doc.font(Font::Regular, 10.0).text(MARGIN_MM, y + 18.0, remarks);
    }

    footer_note(
        &mut doc,
        &[
            "Terms & Conditions: Goods are at owner's risk. Company not liable for loss/damage.",
            "This is a computer-generated document.",
        ],
    );

    info!(gc_number = %n.gc_number, "GC note document generated");
    Ok(pdf_file(format!("GC-Note-{}", n.gc_number), doc.build()))
}

/// Trip sheet: vehicle and driver, route, expenses, attached GC notes and the
/// resulting profit or loss.
pub fn trip_sheet(conn: &Connection, id: &str) -> AppResult<ExportedFile> {
    let view = trips::get_trip(conn, id)?;
    let driver = master::get_driver(conn, &view.trip.driver_id)?;
    let company = company_profile(conn)?;
    let notes = gc_notes_where(conn, "g.trip_id = ?1", params![view.trip.id])?;
    let t = &view.trip;

    let mut doc = PdfBuilder::new();
    doc.font(Font::Bold, 20.0).text_centered(20.0, "TRIP SHEET");
    doc.font(Font::Regular, 10.0).text_centered(28.0, &company.name);

    doc.font(Font::Bold, 12.0)
        .text(MARGIN_MM, 45.0, &format!("Trip ID: {}", t.trip_id))
        .text(150.0, 45.0, &format!("Status: {}", upper(t.trip_status)));

    doc.font(Font::Bold, 11.0).text(MARGIN_MM, 55.0, "VEHICLE & DRIVER DETAILS");
    doc.font(Font::Regular, 10.0)
        .text(MARGIN_MM, 63.0, &format!("Lorry Number: {}", view.lorry_number))
        .text(MARGIN_MM, 69.0, &format!("Driver Name: {}", driver.driver_name))
        .text(MARGIN_MM, 75.0, &format!("License Number: {}", driver.license_number))
        .text(MARGIN_MM, 81.0, &format!("Phone: {}", driver.phone_number));

    doc.font(Font::Bold, 11.0).text(MARGIN_MM, 93.0, "ROUTE DETAILS");
    doc.font(Font::Regular, 10.0)
        .text(MARGIN_MM, 101.0, &format!("From: {}", t.from_location))
        .text(MARGIN_MM, 107.0, &format!("To: {}", t.to_location))
        .text(MARGIN_MM, 113.0, &format!("Distance: {} km", t.total_distance_km))
        .text(MARGIN_MM, 119.0, &format!("Starting Time: {}", format::format_datetime(&t.starting_time)));
    if let Some(end) = &t.ending_time {
        doc.text(MARGIN_MM, 125.0, &format!("Ending Time: {}", format::format_datetime(end)));
    }

    let expenses = three_column_table(
        ["Expense Type", "Details", "Amount"],
        vec![
            ["Diesel".into(), format!("{} liters", t.diesel_liters), format::format_rupees(t.diesel_cost)],
            ["Toll Charges".into(), String::new(), format::format_rupees(t.toll_charges)],
            ["Other Expenses".into(), String::new(), format::format_rupees(t.other_expenses)],
            ["Driver Allowance".into(), String::new(), format::format_rupees(t.driver_allowance)],
        ],
        Some([String::new(), "Total Expenses".into(), format::format_rupees(t.total_trip_expense)]),
        RED_PALETTE,
    );
    let mut y = doc.table(135.0, &expenses);

    if !notes.is_empty() {
        let gc_table = three_column_table(
            ["GC Number", "Consignee", "Amount"],
            notes
                .iter()
                .map(|n| {
                    [
                        n.note.gc_number.clone(),
                        n.note.consignee_name.clone(),
                        format::format_rupees(n.note.total_amount),
                    ]
                })
                .collect(),
            Some([String::new(), "Total Revenue".into(), format::format_rupees(t.total_revenue)]),
            GREEN_PALETTE,
        );
        y = doc.table(y + 10.0, &gc_table);
    }

    let (label, color) = if t.trip_profit_loss >= 0.0 {
        ("Profit", GREEN_PALETTE.0)
    } else {
        ("Loss", RED_PALETTE.0)
    };
    if y + 10.0 > pdf::PAGE_BREAK_MM {
        doc.new_page();
        y = MARGIN_MM;
    }
    doc.font(Font::Bold, 12.0).color(color).text(
        MARGIN_MM,
        y + 10.0,
        &format!("Trip {label}: {}", format::format_rupees(t.trip_profit_loss.abs())),
    );
    doc.color(BLACK);

    footer_note(&mut doc, &["This is a system-generated trip sheet."]);

    info!(trip_id = %t.trip_id, "trip sheet generated");
    Ok(pdf_file(format!("Trip-Sheet-{}", t.trip_id), doc.build()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc_notes::tests::new_note;
    use crate::models::{PaymentMode, PaymentStatus};
    use crate::trips::tests::seeded_trip;

    fn pdf_text(file: &ExportedFile) -> String {
        String::from_utf8_lossy(&file.bytes).into_owned()
    }

    fn table_rows(report: &Report) -> (&Vec<String>, &Vec<Vec<Cell>>, &Option<Vec<Cell>>) {
        report
            .sections
            .iter()
            .find_map(|s| match s {
                Section::Table {
                    headers, rows, footer, ..
                } => Some((headers, rows, footer)),
                _ => None,
            })
            .expect("table section")
    }

    fn seeded(conn: &Connection) -> TripView {
        let trip = seeded_trip(conn);
        let cash = gc_notes::create_gc_note(conn, new_note(&trip.trip.id, PaymentMode::Cash), None)
            .expect("cash");
        gc_notes::update_payment_status(conn, &cash.note.id, PaymentStatus::Paid).expect("paid");
        gc_notes::create_gc_note(conn, new_note(&trip.trip.id, PaymentMode::Topay), None).expect("topay");
        trips::get_trip(conn, &trip.trip.id).expect("reload")
    }

    #[test]
    fn kinds_parse_from_path_segments() {
        assert_eq!("daily-revenue".parse::<ReportKind>().expect("kind"), ReportKind::DailyRevenue);
        assert_eq!("gc_notes".parse::<ReportKind>().expect("kind"), ReportKind::GcNotes);
        for kind in ReportKind::ALL {
            assert_eq!(kind.as_str().parse::<ReportKind>().expect("round"), kind);
        }
        assert!("profit".parse::<ReportKind>().is_err());
    }

    #[test]
    fn daily_revenue_totals_today() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        seeded(&conn);

        let report = build_report(&conn, ReportKind::DailyRevenue, ExportFormat::Pdf, &ReportOptions::default())
            .expect("report");
        match &report.sections[0] {
            Section::Summary { rows, .. } => {
                assert_eq!(rows[0].1, Cell::Money(7800.0));
                assert_eq!(rows[1].1, Cell::Money(13050.0));
                assert_eq!(rows[2].1, Cell::Money(-5250.0));
            }
            other => panic!("unexpected section {other:?}"),
        }
        let (headers, rows, _) = table_rows(&report);
        assert_eq!(headers.len(), 5);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], Cell::text("TN38BY4455"));
    }

    #[test]
    fn trip_summary_splits_route_for_spreadsheets() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        seeded(&conn);

        let pdf_report = build_report(&conn, ReportKind::TripSummary, ExportFormat::Pdf, &ReportOptions::default())
            .expect("pdf");
        let (headers, rows, _) = table_rows(&pdf_report);
        assert_eq!(headers[3], "Route");
        assert_eq!(rows[0][3], Cell::text("Coimbatore to Chennai"));

        let xlsx_report = build_report(&conn, ReportKind::TripSummary, ExportFormat::Excel, &ReportOptions::default())
            .expect("excel");
        let (headers, rows, _) = table_rows(&xlsx_report);
        assert_eq!(headers.len(), 7);
        assert_eq!(rows[0][4], Cell::text("Chennai"));
    }

    #[test]
    fn topay_and_performance_reports() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        seeded(&conn);

        let topay = build_report(&conn, ReportKind::TopayOutstanding, ExportFormat::Pdf, &ReportOptions::default())
            .expect("topay");
        assert!(topay.header_lines.iter().any(|l| l == "Total Outstanding: Rs. 3900.00"));
        let (_, rows, footer) = table_rows(&topay);
        assert_eq!(rows.len(), 1);
        assert_eq!(footer.as_ref().expect("footer")[3], Cell::Money(3900.0));

        let drivers = build_report(&conn, ReportKind::DriverPerformance, ExportFormat::Excel, &ReportOptions::default())
            .expect("drivers");
        let (headers, rows, _) = table_rows(&drivers);
        assert_eq!(headers[0], "Driver");
        assert_eq!(
            rows[0],
            vec![
                Cell::text("Selvam"),
                Cell::Int(1),
                Cell::Money(13050.0),
                Cell::Money(7800.0),
                Cell::Money(-5250.0),
            ]
        );

        let trucks = build_report(&conn, ReportKind::TruckUtilization, ExportFormat::Pdf, &ReportOptions::default())
            .expect("trucks");
        let (headers, rows, _) = table_rows(&trucks);
        assert_eq!(headers[0], "Truck");
        assert_eq!(rows[0][0], Cell::text("TN38BY4455"));
    }

    #[test]
    fn monthly_summary_counts() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        seeded(&conn);

        let report = build_report(&conn, ReportKind::MonthlySummary, ExportFormat::Excel, &ReportOptions::default())
            .expect("monthly");
        assert!(report.file_stem.starts_with("monthly-summary-"));
        assert!(report.file_stem.ends_with("-01"));
        let Section::Summary { rows: money, .. } = &report.sections[0] else {
            panic!("financial summary first");
        };
        assert_eq!(money[0].1, Cell::Money(7800.0));
        assert_eq!(money[3].1, Cell::Money(3900.0));
        assert_eq!(money[4].1, Cell::Money(3900.0));
        let Section::Summary { rows: ops, .. } = &report.sections[1] else {
            panic!("operations summary second");
        };
        assert_eq!(ops[0].1, Cell::Int(1));
        assert_eq!(ops[1].1, Cell::Int(2));
        assert_eq!(ops[2].1, Cell::Int(1));
        assert_eq!(ops[3].1, Cell::Int(0));
    }

    #[test]
    fn revenue_report_has_a_row_per_day_and_total() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        seeded(&conn);
        let today = Local::now().date_naive();
        let from = today - Days::new(2);
        let opts = ReportOptions {
            from: Some(ymd(from)),
            to: Some(ymd(today)),
        };

        let report = build_report(&conn, ReportKind::Revenue, ExportFormat::Excel, &opts).expect("revenue");
        let (_, rows, footer) = table_rows(&report);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][1], Cell::Int(0));
        assert_eq!(rows[2][2], Cell::Int(2));
        let footer = footer.as_ref().expect("total row");
        assert_eq!(footer[0], Cell::text("TOTAL"));
        assert_eq!(footer[3], Cell::Money(7800.0));
        assert_eq!(footer[5], Cell::Money(-5250.0));

        let backwards = ReportOptions {
            from: Some(ymd(today)),
            to: Some(ymd(from)),
        };
        assert!(build_report(&conn, ReportKind::Revenue, ExportFormat::Pdf, &backwards).is_err());
    }

    #[test]
    fn exports_cover_all_columns() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        seeded(&conn);

        let notes = build_report(&conn, ReportKind::GcNotes, ExportFormat::Excel, &ReportOptions::default())
            .expect("gc");
        let (headers, rows, _) = table_rows(&notes);
        assert_eq!(headers.len(), 10);
        assert_eq!(rows.len(), 2);
        assert_eq!(notes.column_widths.len(), 10);

        let trips = build_report(&conn, ReportKind::Trips, ExportFormat::Excel, &ReportOptions::default())
            .expect("trips");
        let (headers, rows, _) = table_rows(&trips);
        assert_eq!(headers.len(), 12);
        assert_eq!(rows[0][6], Cell::text("In Progress"));
        assert_eq!(rows[0][9], Cell::Money(7800.0));

        let file = export_report(&conn, ReportKind::Trips, ExportFormat::Excel, &ReportOptions::default())
            .expect("file");
        assert!(file.file_name.starts_with("trips-"));
        assert!(file.file_name.ends_with(".xlsx"));
    }

    #[test]
    fn gc_note_document_prints_letterhead_and_totals() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        let trip = seeded_trip(&conn);
        let note = gc_notes::create_gc_note(&conn, new_note(&trip.trip.id, PaymentMode::Topay), None)
            .expect("note");
        save_company_profile(
            &conn,
            CompanyProfile {
                name: "Kongu Roadways".into(),
                address: "Gandhipuram, Coimbatore".into(),
                phone: "0422-4000000".into(),
                email: "office@konguroadways.in".into(),
            },
        )
        .expect("profile");

        let file = gc_note_document(&conn, &note.note.gc_number).expect("document");
        assert_eq!(file.file_name, format!("GC-Note-{}.pdf", note.note.gc_number));
        let text = pdf_text(&file);
        assert!(text.contains("(GOODS CONSIGNMENT NOTE) Tj"));
        assert!(text.contains("(Kongu Roadways) Tj"));
        assert!(text.contains("(Rs. 3900.00) Tj"));
        assert!(text.contains("(Payment Mode: TOPAY) Tj"));
        assert!(text.contains("(Delivery: Office Pickup) Tj"));
        assert!(text.contains("(GSTIN: 33AAACL1234F1Z5) Tj"));

        // QR block: the finder pattern fills the whole first module column.
        let qr_column = text
            .lines()
            .filter(|l| l.starts_with("0.000 0.000 0.000 rg 496.06 ") && l.ends_with(" re f"))
            .count();
        assert!(qr_column >= 7, "found {qr_column} QR modules in the first column");
    }

    #[test]
    fn trip_sheet_shows_expenses_and_loss() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        let trip = seeded(&conn);

        let file = trip_sheet(&conn, &trip.trip.trip_id).expect("sheet");
        let text = pdf_text(&file);
        assert!(text.contains("(TRIP SHEET) Tj"));
        assert!(text.contains("(Your Company Name) Tj"));
        assert!(text.contains("(Driver Name: Selvam) Tj"));
        assert!(text.contains("(Rs. 13050.00) Tj"));
        assert!(text.contains("(Total Revenue) Tj"));
        assert!(text.contains("(Trip Loss: Rs. 5250.00) Tj"));
    }

    #[test]
    fn company_profile_defaults_and_validation() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        assert_eq!(company_profile(&conn).expect("default"), CompanyProfile::default());
        let err = save_company_profile(
            &conn,
            CompanyProfile {
                name: "  ".into(),
                ..CompanyProfile::default()
            },
        )
        .expect_err("blank");
        assert!(matches!(err, AppError::Validation(_)));
    }
}

//! Aggregate statistics for the home screen.

use chrono::{Datelike, Local, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection, Params};
use serde::Serialize;

use crate::error::AppResult;
use crate::format;

/// Start of the local day and of the local month, in stored UTC form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub today_start: String,
    pub month_start: String,
}

impl Period {
    pub fn current() -> Self {
        Self::on(Local::now().date_naive(), &Local)
    }

    pub fn on<Tz: TimeZone>(today: NaiveDate, tz: &Tz) -> Self {
        let month_first = today.with_day(1).unwrap_or(today);
        Self {
            today_start: local_midnight(today, tz),
            month_start: local_midnight(month_first, tz),
        }
    }
}

pub(crate) fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> String {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    // A DST gap at midnight has no local instant; fall back to UTC midnight.
    let utc = tz
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc());
    format::stored_ts(utc)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub trips_today: i64,
    pub gc_notes_today: i64,
    pub revenue_today: f64,
    pub revenue_month: f64,
    pub expenses_month: f64,
    pub pending_deliveries: i64,
    pub topay_amount: f64,
    pub running_trips: i64,
    pub net_profit: f64,
}

fn count<P: Params>(conn: &Connection, sql: &str, p: P) -> AppResult<i64> {
    Ok(conn.query_row(sql, p, |row| row.get(0))?)
}

fn sum<P: Params>(conn: &Connection, sql: &str, p: P) -> AppResult<f64> {
    let value: f64 = conn.query_row(sql, p, |row| row.get(0))?;
    Ok(format::round2(value))
}

const PAID_REVENUE_SINCE: &str = "SELECT COALESCE(SUM(total_amount), 0) FROM gc_notes
     WHERE payment_status = 'paid' AND created_at >= ?1";

pub fn dashboard_stats(conn: &Connection, period: &Period) -> AppResult<DashboardStats> {
    let today = params![period.today_start];
    let month = params![period.month_start];

    let revenue_month = sum(conn, PAID_REVENUE_SINCE, month)?;
    let expenses_month = sum(
        conn,
        "SELECT COALESCE(SUM(total_trip_expense), 0) FROM trips WHERE created_at >= ?1",
        month,
    )?;

    Ok(DashboardStats {
        trips_today: count(conn, "SELECT COUNT(*) FROM trips WHERE created_at >= ?1", today)?,
        gc_notes_today: count(conn, "SELECT COUNT(*) FROM gc_notes WHERE created_at >= ?1", today)?,
        revenue_today: sum(conn, PAID_REVENUE_SINCE, today)?,
        revenue_month,
        expenses_month,
        pending_deliveries: count(
            conn,
            "SELECT COUNT(*) FROM gc_notes WHERE delivery_status = 'pending'",
            [],
        )?,
        topay_amount: sum(
            conn,
            "SELECT COALESCE(SUM(total_amount), 0) FROM gc_notes
             WHERE payment_status = 'topay'",
            [],
        )?,
        running_trips: count(
            conn,
            "SELECT COUNT(*) FROM trips WHERE trip_status = 'running'",
            [],
        )?,
        net_profit: format::round2(revenue_month - expenses_month),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::gc_notes::{self, tests::new_note};
    use crate::models::{PaymentMode, PaymentStatus};
    use crate::trips::tests::seeded_trip;
    use chrono::FixedOffset;

    #[test]
    fn period_uses_local_midnight() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).expect("offset");
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).expect("date");
        let period = Period::on(date, &ist);
        assert_eq!(period.today_start, "2026-10-18T18:30:00.000Z");
        assert_eq!(period.month_start, "2026-09-30T18:30:00.000Z");
    }

    #[test]
    fn empty_store_yields_zeroes() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        let stats = dashboard_stats(&conn, &Period::current()).expect("stats");
        assert_eq!(stats, DashboardStats::default());
    }

    #[test]
    fn stats_follow_records() {
        let state = db::test_state();
        let conn = state.conn.lock().expect("db lock");
        let trip = seeded_trip(&conn);
        let paid = gc_notes::create_gc_note(&conn, new_note(&trip.trip.id, PaymentMode::Cash), None)
            .expect("cash note");
        gc_notes::update_payment_status(&conn, &paid.note.id, PaymentStatus::Paid).expect("paid");
        gc_notes::create_gc_note(&conn, new_note(&trip.trip.id, PaymentMode::Topay), None)
            .expect("topay note");

        let stats = dashboard_stats(&conn, &Period::current()).expect("stats");
        assert_eq!(stats.trips_today, 1);
        assert_eq!(stats.gc_notes_today, 2);
        assert_eq!(stats.revenue_today, 3900.0);
        assert_eq!(stats.revenue_month, 3900.0);
        assert_eq!(stats.expenses_month, 13050.0);
        assert_eq!(stats.pending_deliveries, 2);
        assert_eq!(stats.topay_amount, 3900.0);
        assert_eq!(stats.running_trips, 1);
        assert_eq!(stats.net_profit, -9150.0);

        let later = Period {
            today_start: "2999-01-01T00:00:00.000Z".into(),
            month_start: "2999-01-01T00:00:00.000Z".into(),
        };
        let stats = dashboard_stats(&conn, &later).expect("later");
        assert_eq!((stats.trips_today, stats.revenue_month), (0, 0.0));
        assert_eq!(stats.running_trips, 1);
    }
}

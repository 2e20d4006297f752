use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Date as DieselDate, Text};

use rtap_shared::errors::{AppError, AppResult};

use crate::models::{upsert_daily_metric, MetricName, NewDailyMetric};
use crate::services::publisher::EtlPublisher;
use crate::AppState;

/// Event type whose distinct users make up the DAU metric.
const LOGIN_EVENT: &str = "login";

/// Read/write surface the recomputation engine runs against.
///
/// `PgConnection` is the production implementation; tests substitute an
/// in-memory store so cycle logic runs without a database or a timer.
pub trait AnalyticsStore {
    /// Total row count of `events_raw`.
    fn count_events_raw(&mut self) -> AppResult<i64>;

    /// Calendar date according to the store's clock, not the host's.
    fn current_date(&mut self) -> AppResult<NaiveDate>;

    /// The day before `current_date`, also from the store's clock.
    fn previous_date(&mut self) -> AppResult<NaiveDate>;

    /// Events whose `occurred_at` falls on `date` (store-side day truncation).
    fn events_total_on(&mut self, date: NaiveDate) -> AppResult<i64>;

    /// Distinct non-null, non-empty `user_id`s with a login event on `date`.
    fn login_dau_on(&mut self, date: NaiveDate) -> AppResult<i64>;

    /// Insert or overwrite one `metrics_daily` row.
    fn upsert_metric(&mut self, date: NaiveDate, name: MetricName, value: i64) -> AppResult<()>;
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    cnt: i64,
}

#[derive(QueryableByName)]
struct DateRow {
    #[diesel(sql_type = DieselDate)]
    day: NaiveDate,
}

impl AnalyticsStore for PgConnection {
    fn count_events_raw(&mut self) -> AppResult<i64> {
        let row = diesel::sql_query("SELECT COUNT(*) AS cnt FROM events_raw")
            .get_result::<CountRow>(self)
            .map_err(AppError::Query)?;
        Ok(row.cnt)
    }

    fn current_date(&mut self) -> AppResult<NaiveDate> {
        let row = diesel::sql_query("SELECT CURRENT_DATE AS day")
            .get_result::<DateRow>(self)
            .map_err(AppError::Query)?;
        Ok(row.day)
    }

    fn previous_date(&mut self) -> AppResult<NaiveDate> {
        let row = diesel::sql_query("SELECT (CURRENT_DATE - INTERVAL '1 day')::date AS day")
            .get_result::<DateRow>(self)
            .map_err(AppError::Query)?;
        Ok(row.day)
    }

    fn events_total_on(&mut self, date: NaiveDate) -> AppResult<i64> {
        let row = diesel::sql_query(
            "SELECT COUNT(*) AS cnt FROM events_raw WHERE occurred_at::date = $1",
        )
        .bind::<DieselDate, _>(date)
        .get_result::<CountRow>(self)
        .map_err(AppError::Query)?;
        Ok(row.cnt)
    }

    fn login_dau_on(&mut self, date: NaiveDate) -> AppResult<i64> {
        let row = diesel::sql_query(
            "SELECT COUNT(DISTINCT user_id) AS cnt \
             FROM events_raw \
             WHERE occurred_at::date = $1 \
             AND event_type = $2 \
             AND user_id IS NOT NULL AND user_id <> ''",
        )
        .bind::<DieselDate, _>(date)
        .bind::<Text, _>(LOGIN_EVENT)
        .get_result::<CountRow>(self)
        .map_err(AppError::Query)?;
        Ok(row.cnt)
    }

    fn upsert_metric(&mut self, date: NaiveDate, name: MetricName, value: i64) -> AppResult<()> {
        let metric = NewDailyMetric {
            metric_date: date,
            metric_name: name.as_str().to_string(),
            metric_value: value,
        };
        upsert_daily_metric(self, &metric).map_err(AppError::Write)
    }
}

/// Recompute EVENTS_TOTAL and DAU for one calendar date and upsert both.
///
/// Idempotent: the scheduler re-runs this for today and yesterday every
/// cycle to absorb late-arriving events, and each run overwrites the
/// previous values for the same (date, name) key.
pub fn recompute_for_date<S>(store: &mut S, date: NaiveDate) -> AppResult<()>
where
    S: AnalyticsStore + ?Sized,
{
    let events_total = store.events_total_on(date)?;
    let dau = store.login_dau_on(date)?;

    store.upsert_metric(date, MetricName::EventsTotal, events_total)?;
    store.upsert_metric(date, MetricName::Dau, dau)?;

    tracing::debug!(date = %date, events_total, dau, "daily metrics recomputed");
    Ok(())
}

/// Outcome of one successful cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub events_raw: i64,
    pub today: NaiveDate,
    pub yesterday: NaiveDate,
}

/// One read-aggregate-write-publish pass over the store.
///
/// The raw-count gauge is published as soon as the count is read, so a
/// failure later in the cycle leaves it at the last observed value while
/// the health gauge flips to 0. Writes commit per statement: a failure on
/// yesterday after today succeeded leaves today's rows in place, and the
/// next successful cycle recomputes both.
pub fn run_cycle<S>(store: &mut S, publisher: &EtlPublisher) -> AppResult<CycleReport>
where
    S: AnalyticsStore + ?Sized,
{
    let events_raw = store.count_events_raw()?;
    publisher.set_events_raw_count(events_raw);

    let today = store.current_date()?;
    let yesterday = store.previous_date()?;

    recompute_for_date(store, today)?;
    recompute_for_date(store, yesterday)?;

    Ok(CycleReport {
        events_raw,
        today,
        yesterday,
    })
}

/// Run one cycle on a fresh connection, released on every exit path.
pub fn etl_cycle(database_url: &str, publisher: &EtlPublisher) -> AppResult<CycleReport> {
    let mut conn = PgConnection::establish(database_url)?;
    run_cycle(&mut conn, publisher)
}

/// Spawn the ETL scheduler: one cycle per tick, strictly sequential, never
/// exits. A failed cycle only flips the health gauge and logs; the retry
/// unit is the whole cycle, retried on the next tick.
pub fn spawn_etl_task(state: Arc<AppState>) {
    tokio::spawn(async move {
        let database_url = state.config.database_url();
        let publisher = EtlPublisher::new();
        let mut interval =
            tokio::time::interval(Duration::from_secs(state.config.etl_interval_secs));

        tracing::info!(
            interval_secs = state.config.etl_interval_secs,
            "ETL loop starting"
        );

        loop {
            interval.tick().await;

            match etl_cycle(&database_url, &publisher) {
                Ok(report) => {
                    publisher.publish_cycle_outcome(true);
                    tracing::info!(
                        events_raw = report.events_raw,
                        today = %report.today,
                        yesterday = %report.yesterday,
                        "ETL cycle ok"
                    );
                }
                Err(e) => {
                    publisher.publish_cycle_outcome(false);
                    tracing::error!(
                        error = %e,
                        code = e.error_code().code(),
                        "ETL cycle failed"
                    );
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::NaiveDateTime;

    struct TestEvent {
        occurred_at: NaiveDateTime,
        event_type: String,
        user_id: Option<String>,
    }

    /// In-memory stand-in for the Postgres store with the same day-window
    /// and DAU semantics as the SQL implementation.
    struct MemoryStore {
        today: NaiveDate,
        events: Vec<TestEvent>,
        metrics: BTreeMap<(NaiveDate, MetricName), i64>,
        fail_writes_on: Option<NaiveDate>,
    }

    impl MemoryStore {
        fn new(today: NaiveDate) -> Self {
            Self {
                today,
                events: Vec::new(),
                metrics: BTreeMap::new(),
                fail_writes_on: None,
            }
        }

        fn metric(&self, date: NaiveDate, name: MetricName) -> Option<i64> {
            self.metrics.get(&(date, name)).copied()
        }
    }

    impl AnalyticsStore for MemoryStore {
        fn count_events_raw(&mut self) -> AppResult<i64> {
            Ok(self.events.len() as i64)
        }

        fn current_date(&mut self) -> AppResult<NaiveDate> {
            Ok(self.today)
        }

        fn previous_date(&mut self) -> AppResult<NaiveDate> {
            Ok(self.today.pred_opt().unwrap())
        }

        fn events_total_on(&mut self, date: NaiveDate) -> AppResult<i64> {
            let total = self
                .events
                .iter()
                .filter(|e| e.occurred_at.date() == date)
                .count();
            Ok(total as i64)
        }

        fn login_dau_on(&mut self, date: NaiveDate) -> AppResult<i64> {
            let users: BTreeSet<&str> = self
                .events
                .iter()
                .filter(|e| e.occurred_at.date() == date && e.event_type == LOGIN_EVENT)
                .filter_map(|e| e.user_id.as_deref())
                .filter(|u| !u.is_empty())
                .collect();
            Ok(users.len() as i64)
        }

        fn upsert_metric(
            &mut self,
            date: NaiveDate,
            name: MetricName,
            value: i64,
        ) -> AppResult<()> {
            if self.fail_writes_on == Some(date) {
                return Err(AppError::Write(diesel::result::Error::NotFound));
            }
            self.metrics.insert((date, name), value);
            Ok(())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(
        day: NaiveDate,
        (h, min, s): (u32, u32, u32),
        event_type: &str,
        user_id: Option<&str>,
    ) -> TestEvent {
        TestEvent {
            occurred_at: day.and_hms_opt(h, min, s).unwrap(),
            event_type: event_type.to_string(),
            user_id: user_id.map(str::to_string),
        }
    }

    #[test]
    fn dau_counts_distinct_users_and_ignores_blank_ids() {
        let d = date(2025, 6, 10);
        let mut store = MemoryStore::new(d);
        store.events = vec![
            event(d, (9, 0, 0), "login", Some("a")),
            event(d, (10, 0, 0), "login", Some("a")),
            event(d, (11, 0, 0), "login", Some("")),
            event(d, (12, 0, 0), "login", None),
            event(d, (13, 0, 0), "click", Some("b")),
        ];

        recompute_for_date(&mut store, d).unwrap();

        assert_eq!(store.metric(d, MetricName::EventsTotal), Some(5));
        assert_eq!(store.metric(d, MetricName::Dau), Some(1));
    }

    #[test]
    fn recompute_is_idempotent_over_unchanged_data() {
        let d = date(2025, 6, 10);
        let mut store = MemoryStore::new(d);
        store.events = vec![
            event(d, (8, 30, 0), "login", Some("a")),
            event(d, (9, 15, 0), "click", Some("a")),
        ];

        recompute_for_date(&mut store, d).unwrap();
        let first = store.metrics.clone();

        recompute_for_date(&mut store, d).unwrap();

        assert_eq!(store.metrics, first);
        assert_eq!(store.metrics.len(), 2);
    }

    #[test]
    fn second_write_overwrites_instead_of_duplicating() {
        let d = date(2025, 6, 10);
        let mut store = MemoryStore::new(d);
        store.events = vec![event(d, (8, 0, 0), "login", Some("a"))];

        recompute_for_date(&mut store, d).unwrap();
        assert_eq!(store.metric(d, MetricName::EventsTotal), Some(1));

        // A late-arriving event lands after the day already closed.
        store.events.push(event(d, (23, 0, 0), "login", Some("b")));
        recompute_for_date(&mut store, d).unwrap();

        assert_eq!(store.metric(d, MetricName::EventsTotal), Some(2));
        assert_eq!(store.metric(d, MetricName::Dau), Some(2));
        assert_eq!(store.metrics.len(), 2);
    }

    #[test]
    fn midnight_boundary_attributes_each_event_to_one_date() {
        let d = date(2025, 6, 10);
        let next = date(2025, 6, 11);
        let mut store = MemoryStore::new(next);
        store.events = vec![
            event(d, (23, 59, 59), "login", Some("a")),
            event(next, (0, 0, 1), "login", Some("a")),
        ];

        recompute_for_date(&mut store, d).unwrap();
        recompute_for_date(&mut store, next).unwrap();

        assert_eq!(store.metric(d, MetricName::EventsTotal), Some(1));
        assert_eq!(store.metric(next, MetricName::EventsTotal), Some(1));
    }

    #[test]
    fn run_cycle_covers_today_and_yesterday_and_reports_raw_count() {
        let today = date(2025, 6, 10);
        let yesterday = date(2025, 6, 9);
        let mut store = MemoryStore::new(today);
        store.events = vec![
            event(yesterday, (22, 0, 0), "login", Some("a")),
            event(today, (1, 0, 0), "login", Some("a")),
            event(today, (2, 0, 0), "login", Some("b")),
        ];

        let publisher = EtlPublisher::new();
        let report = run_cycle(&mut store, &publisher).unwrap();

        assert_eq!(report.events_raw, 3);
        assert_eq!(report.today, today);
        assert_eq!(report.yesterday, yesterday);
        assert_eq!(store.metric(today, MetricName::EventsTotal), Some(2));
        assert_eq!(store.metric(today, MetricName::Dau), Some(2));
        assert_eq!(store.metric(yesterday, MetricName::EventsTotal), Some(1));
        assert_eq!(store.metric(yesterday, MetricName::Dau), Some(1));
    }

    #[test]
    fn failed_yesterday_write_leaves_today_committed() {
        let today = date(2025, 6, 10);
        let yesterday = date(2025, 6, 9);
        let mut store = MemoryStore::new(today);
        store.events = vec![
            event(yesterday, (12, 0, 0), "login", Some("a")),
            event(today, (12, 0, 0), "login", Some("b")),
        ];
        store.fail_writes_on = Some(yesterday);

        let publisher = EtlPublisher::new();
        let err = run_cycle(&mut store, &publisher).unwrap_err();

        assert_eq!(
            err.error_code(),
            rtap_shared::errors::ErrorCode::WriteFailed
        );
        assert_eq!(store.metric(today, MetricName::EventsTotal), Some(1));
        assert_eq!(store.metric(today, MetricName::Dau), Some(1));
        assert_eq!(store.metric(yesterday, MetricName::EventsTotal), None);
    }
}

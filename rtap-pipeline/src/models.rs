use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{events_raw, metrics_daily};

// --- Raw events ---

/// One row of `events_raw`. Produced upstream; this service only reads it.
#[derive(Debug, Queryable, Identifiable, Serialize)]
#[diesel(table_name = events_raw)]
pub struct RawEvent {
    pub id: i64,
    pub event_type: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

// --- Daily metrics ---

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Serialize, Deserialize)]
#[diesel(table_name = metrics_daily)]
pub struct DailyMetric {
    pub metric_date: NaiveDate,
    pub metric_name: String,
    pub metric_value: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = metrics_daily)]
pub struct NewDailyMetric {
    pub metric_date: NaiveDate,
    pub metric_name: String,
    pub metric_value: i64,
}

/// The daily metrics derived from `events_raw`.
///
/// The wire names are part of the persisted `metrics_daily` contract that
/// other systems read from; they must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricName {
    EventsTotal,
    Dau,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventsTotal => "EVENTS_TOTAL",
            Self::Dau => "DAU",
        }
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upsert a daily metric using ON CONFLICT (metric_date, metric_name)
/// DO UPDATE SET metric_value = EXCLUDED.metric_value
pub fn upsert_daily_metric(
    conn: &mut diesel::pg::PgConnection,
    metric: &NewDailyMetric,
) -> Result<(), diesel::result::Error> {
    diesel::sql_query(
        "INSERT INTO metrics_daily (metric_date, metric_name, metric_value) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (metric_date, metric_name) DO UPDATE SET metric_value = EXCLUDED.metric_value"
    )
    .bind::<diesel::sql_types::Date, _>(metric.metric_date)
    .bind::<diesel::sql_types::VarChar, _>(&metric.metric_name)
    .bind::<diesel::sql_types::BigInt, _>(metric.metric_value)
    .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_match_persisted_contract() {
        assert_eq!(MetricName::EventsTotal.as_str(), "EVENTS_TOTAL");
        assert_eq!(MetricName::Dau.as_str(), "DAU");
        assert_eq!(MetricName::Dau.to_string(), "DAU");
    }
}

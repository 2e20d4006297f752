use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Single writer for the scrape-facing ETL gauges.
///
/// Owned by the scheduler task and passed by reference to the cycle logic;
/// nothing else writes these series.
pub struct EtlPublisher;

impl EtlPublisher {
    pub fn new() -> Self {
        describe_gauge!("rtap_events_raw_count", "Count of rows in events_raw");
        describe_gauge!("rtap_etl_last_run_ok", "1 if last ETL cycle succeeded, else 0");
        describe_counter!(
            "rtap_etl_cycles_total",
            "ETL cycles executed, labelled by outcome"
        );
        Self
    }

    /// Last observed total row count of `events_raw`.
    pub fn set_events_raw_count(&self, count: i64) {
        gauge!("rtap_events_raw_count").set(count as f64);
    }

    /// Health signal for the cycle that just finished: 1 on success, 0 on
    /// failure. Also counts the cycle by outcome.
    pub fn publish_cycle_outcome(&self, ok: bool) {
        gauge!("rtap_etl_last_run_ok").set(if ok { 1.0 } else { 0.0 });
        let outcome = if ok { "ok" } else { "error" };
        counter!("rtap_etl_cycles_total", "outcome" => outcome).increment(1);
    }
}

impl Default for EtlPublisher {
    fn default() -> Self {
        Self::new()
    }
}

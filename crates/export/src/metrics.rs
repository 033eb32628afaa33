use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;


lazy_static::lazy_static! {
    pub static ref PROGRESS: Gauge<f64, AtomicU64> = Default::default();
    pub static ref INGESTED_ROWS: Gauge = Default::default();
    pub static ref LAST_BLOCK: Gauge = Default::default();
}


pub fn register_metrics(registry: &mut Registry) {
    registry.register(
        "ledger_export_rows_per_second",
        "Current row ingestion speed",
        PROGRESS.clone()
    );
    registry.register(
        "ledger_export_ingested_rows",
        "Rows ingested into the current table",
        INGESTED_ROWS.clone()
    );
    registry.register(
        "ledger_export_last_block",
        "Last block height of the export range",
        LAST_BLOCK.clone()
    );
}

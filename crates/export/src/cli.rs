use crate::writer;
use clap::Parser;
use ledger_primitives::BlockNumber;
use std::path::PathBuf;


#[derive(Parser, Debug)]
#[command(version, about = "Export a parsed ledger dump to a Cassandra cluster", long_about = None)]
pub struct Cli {
    /// Path to the parsed ledger dump (NDJSON, one block per line)
    #[arg(short, long, value_name = "PATH")]
    pub src: PathBuf,

    /// Cassandra node to contact (repeat for multiple nodes)
    #[arg(short, long = "db", value_name = "NODE", default_value = "localhost:9042")]
    pub db: Vec<String>,

    /// Target keyspace
    #[arg(short, long, value_name = "KEYSPACE")]
    pub keyspace: String,

    /// First block height to export
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub start_index: BlockNumber,

    /// Export only blocks with height smaller than this value
    /// (default: everything up to the last parsed block)
    #[arg(long, value_name = "N")]
    pub end_index: Option<BlockNumber>,

    /// Number of ingestion workers
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub workers: usize,

    /// Number of chunks to split the block/tx range into (default WORKERS)
    #[arg(long, value_name = "N")]
    pub chunks: Option<usize>,

    /// Ingest only into the block table
    #[arg(long)]
    pub blocks: bool,

    /// Ingest only into the block_transactions table
    #[arg(long)]
    pub block_tx: bool,

    /// Ingest only into the transaction table
    #[arg(long)]
    pub tx: bool,

    /// Ingest only into the summary_statistics table
    #[arg(long)]
    pub statistics: bool,

    /// Continue from the highest block already present in the destination
    #[arg(long = "continue")]
    pub continue_ingest: bool,

    /// Write rows as independent concurrent statements instead of
    /// unlogged batches
    #[arg(long)]
    pub concurrent: bool,

    /// Maximum number of in-flight single-row writes in concurrent mode
    #[arg(long, value_name = "N", default_value_t = writer::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Whether the logs should be structured in JSON format
    #[arg(long)]
    pub json_log: bool,

    /// Port to use for built-in prometheus metrics server
    #[arg(long)]
    pub prom_port: Option<u16>
}

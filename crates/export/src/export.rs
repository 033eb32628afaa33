use crate::chain::{Chain, ChainReader};
use crate::cli::Cli;
use crate::metrics;
use crate::pool::{run_pool, PoolOptions};
use crate::recovery::RetryPolicy;
use crate::server;
use crate::store::CqlStore;
use crate::tables::{
    project_block, project_block_txs, project_transaction, BlockTable, BlockTxTable, SummaryRow,
    Table, TransactionTable
};
use crate::writer::WriteStrategy;
use anyhow::{ensure, Context};
use ledger_primitives::BlockNumber;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;


#[derive(Clone, Copy, Debug)]
struct TableSelection {
    blocks: bool,
    block_tx: bool,
    tx: bool,
    statistics: bool
}


impl TableSelection {
    fn from_args(args: &Cli) -> TableSelection {
        let any = args.blocks || args.block_tx || args.tx || args.statistics;
        TableSelection {
            blocks: !any || args.blocks,
            block_tx: !any || args.block_tx,
            tx: !any || args.tx,
            statistics: !any || args.statistics
        }
    }
}


/// Start height for re-ingestion given the destination watermark.
///
/// A watermark pointing beyond the source's last parsed block means the
/// destination and the source disagree; that is a fatal inconsistency and
/// must abort before any worker is dispatched.
fn resume_start(
    watermark: Option<BlockNumber>,
    block_count: u64,
    configured_start: BlockNumber
) -> anyhow::Result<BlockNumber> {
    match watermark {
        None => Ok(configured_start),
        Some(watermark) => {
            let next = watermark + 1;
            ensure!(
                next <= block_count,
                "destination watermark {} exceeds the last parsed block {}",
                watermark,
                block_count - 1
            );
            Ok(next.max(configured_start))
        }
    }
}


pub async fn run(args: &Cli) -> anyhow::Result<()> {
    ensure!(args.workers > 0, "--workers must be positive");
    let num_chunks = args.chunks.unwrap_or(args.workers);
    ensure!(
        num_chunks >= args.workers,
        "--chunks must not be smaller than --workers"
    );

    let chain = Arc::new(Chain::open(&args.src)?);
    {
        let last = chain
            .last_block()
            .context("the ledger dump contains no blocks")?;
        info!(
            "last parsed block: {} (timestamp {})",
            last.height, last.timestamp
        );
    }

    ensure!(
        args.start_index < chain.block_count(),
        "--start-index must be smaller than {}",
        chain.block_count()
    );
    let end = args.end_index.unwrap_or(chain.block_count());
    ensure!(
        args.start_index < end && end <= chain.block_count(),
        "--end-index must be in ({}, {}]",
        args.start_index,
        chain.block_count()
    );

    if let Some(port) = args.prom_port {
        let mut registry = Registry::default();
        metrics::register_metrics(&mut registry);
        tokio::spawn(async move {
            if let Err(err) = server::run_server(registry, port).await {
                tracing::error!(error = ?err, "metrics server terminated");
            }
        });
    }

    let store = CqlStore::connect(&args.db, &args.keyspace).await?;

    // The watermark is read exactly once, before any worker starts.
    let start = if args.continue_ingest {
        let start = resume_start(
            store.block_watermark().await?,
            chain.block_count(),
            args.start_index
        )?;
        if start > args.start_index {
            info!("continuing from block {}", start);
        }
        start
    } else {
        args.start_index
    };
    if start >= end {
        info!("nothing to do");
        return Ok(())
    }

    let block_range = start..end;
    let tx_range = chain.tx_index_range(block_range.clone())?;
    metrics::LAST_BLOCK.set(end as i64 - 1);

    let strategy = if args.concurrent {
        WriteStrategy::Concurrent {
            limit: args.concurrency
        }
    } else {
        WriteStrategy::Grouped
    };
    let opts = |batch_size| PoolOptions {
        num_workers: args.workers,
        num_chunks,
        batch_size,
        strategy,
        retry: RetryPolicy::default()
    };

    let selection = TableSelection::from_args(args);

    if selection.tx {
        info!(
            "transactions ({} txs, index {}..{})",
            tx_range.end - tx_range.start,
            tx_range.start,
            tx_range.end
        );
        let started = Instant::now();
        let table = store.table::<TransactionTable>().await?;
        let source = chain.clone();
        run_pool(
            "transactions",
            tx_range.clone(),
            opts(TransactionTable::BATCH_SIZE),
            Arc::new(table),
            move |index| source.tx(index).and_then(project_transaction),
            Arc::new(AtomicU64::new(0))
        )
        .await?;
        info!("transactions done in {:?}", started.elapsed());
    }

    if selection.block_tx {
        info!(
            "block transactions ({} blocks, height {}..{})",
            block_range.end - block_range.start,
            block_range.start,
            block_range.end
        );
        let started = Instant::now();
        let table = store.table::<BlockTxTable>().await?;
        let source = chain.clone();
        run_pool(
            "block transactions",
            block_range.clone(),
            opts(BlockTxTable::BATCH_SIZE),
            Arc::new(table),
            move |height| source.block(height).and_then(project_block_txs),
            Arc::new(AtomicU64::new(0))
        )
        .await?;
        info!("block transactions done in {:?}", started.elapsed());
    }

    if selection.blocks {
        info!(
            "blocks ({} blocks, height {}..{})",
            block_range.end - block_range.start,
            block_range.start,
            block_range.end
        );
        let started = Instant::now();
        let table = store.table::<BlockTable>().await?;
        let source = chain.clone();
        run_pool(
            "blocks",
            block_range.clone(),
            opts(BlockTable::BATCH_SIZE),
            Arc::new(table),
            move |height| source.block(height).and_then(project_block),
            Arc::new(AtomicU64::new(0))
        )
        .await?;
        info!("blocks done in {:?}", started.elapsed());
    }

    if selection.statistics {
        let last = chain.block(end - 1)?;
        let last_tx = last
            .transactions
            .last()
            .context("block without transactions")?;
        store
            .write_summary(SummaryRow {
                id: args.keyspace.clone(),
                timestamp: i32::try_from(last.timestamp)?,
                no_blocks: i64::try_from(last.height + 1)?,
                no_txs: i64::try_from(last_tx.index + 1)?
            })
            .await?;
        info!(
            "summary statistics: {} blocks, {} txs as of block {}",
            last.height + 1,
            last_tx.index + 1,
            last.height
        );
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::resume_start;

    #[test]
    fn fresh_destination_starts_at_configured_index() {
        assert_eq!(resume_start(None, 10, 0).unwrap(), 0);
        assert_eq!(resume_start(None, 10, 3).unwrap(), 3);
    }

    #[test]
    fn resume_starts_right_after_the_watermark() {
        assert_eq!(resume_start(Some(4), 10, 0).unwrap(), 5);
    }

    #[test]
    fn configured_start_beyond_watermark_wins() {
        assert_eq!(resume_start(Some(4), 10, 8).unwrap(), 8);
    }

    #[test]
    fn fully_ingested_source_resumes_past_the_end() {
        // start == block_count, the caller then reports "nothing to do"
        assert_eq!(resume_start(Some(9), 10, 0).unwrap(), 10);
    }

    #[test]
    fn watermark_beyond_the_source_is_fatal() {
        assert!(resume_start(Some(10), 10, 0).is_err());
        assert!(resume_start(Some(25), 10, 0).is_err());
    }
}

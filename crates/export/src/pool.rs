use crate::metrics;
use crate::progress::SpeedMeter;
use crate::recovery::RetryPolicy;
use crate::sink::ChunkSink;
use crate::store::RowStore;
use crate::writer::WriteStrategy;
use anyhow::Context;
use ledger_primitives::range::partition;
use parking_lot::Mutex;
use scylla::serialize::row::SerializeRow;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info};


const REPORT_INTERVAL: Duration = Duration::from_secs(5);


#[derive(Clone, Copy, Debug)]
pub struct PoolOptions {
    pub num_workers: usize,
    pub num_chunks: usize,
    pub batch_size: usize,
    pub strategy: WriteStrategy,
    pub retry: RetryPolicy
}


/// Ingests `range` into one table: partitions it into `num_chunks`
/// chunks served by `num_workers` workers, each independently running
/// fetch -> project -> batch -> write -> recover over its chunk.
///
/// Blocks until every chunk is done. The first worker failure aborts
/// the whole pool.
pub async fn run_pool<R, S, F>(
    label: &'static str,
    range: Range<u64>,
    opts: PoolOptions,
    store: Arc<S>,
    fetch: F,
    counter: Arc<AtomicU64>
) -> anyhow::Result<()>
where
    R: SerializeRow + Send + Sync + 'static,
    S: RowStore<R> + 'static,
    F: Fn(u64) -> anyhow::Result<R> + Clone + Send + Sync + 'static
{
    let chunks = partition(range.clone(), opts.num_chunks)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("cannot split {:?} into {} chunks", range, opts.num_chunks))?;
    let queue = Arc::new(Mutex::new(VecDeque::from(chunks)));

    let mut workers = JoinSet::new();
    for worker in 0..opts.num_workers {
        let queue = queue.clone();
        let sink = ChunkSink::new(
            store.clone(),
            fetch.clone(),
            opts.batch_size,
            opts.strategy,
            opts.retry,
            counter.clone()
        );
        workers.spawn(async move {
            loop {
                let chunk = match queue.lock().pop_front() {
                    Some(chunk) => chunk,
                    None => break
                };
                debug!(worker, "ingesting chunk {}..{}", chunk.start, chunk.end);
                sink.ingest(chunk).await?;
            }
            Ok::<(), anyhow::Error>(())
        });
    }

    let reporter = tokio::spawn(report_progress(label, counter.clone()));

    let result = join_workers(&mut workers).await;
    reporter.abort();

    info!(
        "{}: {} rows written",
        label,
        counter.load(Ordering::Relaxed)
    );
    result
}


async fn join_workers(workers: &mut JoinSet<anyhow::Result<()>>) -> anyhow::Result<()> {
    while let Some(joined) = workers.join_next().await {
        joined.context("worker panicked")??;
    }
    Ok(())
}


async fn report_progress(label: &'static str, counter: Arc<AtomicU64>) {
    let mut meter = SpeedMeter::new(Duration::from_secs(60));
    let mut interval = tokio::time::interval(REPORT_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        let total = counter.load(Ordering::Relaxed);
        meter.observe(total);
        let speed = meter.speed();
        metrics::INGESTED_ROWS.set(total as i64);
        metrics::PROGRESS.set(speed);
        info!("{}: {} rows, {} rows/sec", label, total, speed.round());
    }
}

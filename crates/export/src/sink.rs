use crate::recovery::RetryPolicy;
use crate::store::RowStore;
use crate::writer::{execute_batch, WriteStrategy};
use scylla::serialize::row::SerializeRow;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;


/// Per-worker ingestion context: fetches records of one chunk by index,
/// accumulates them into size-bounded batches, writes each batch and
/// hands failures to the retry policy.
///
/// The shared counter is bumped by the size of each completed batch only
/// after recovery, so every record is counted exactly once.
pub struct ChunkSink<R, S, F> {
    store: Arc<S>,
    fetch: F,
    batch_size: usize,
    strategy: WriteStrategy,
    retry: RetryPolicy,
    counter: Arc<AtomicU64>,
    phantom_rows: std::marker::PhantomData<fn(R)>
}


impl<R, S, F> ChunkSink<R, S, F>
where
    R: SerializeRow + Send + Sync,
    S: RowStore<R>,
    F: Fn(u64) -> anyhow::Result<R>
{
    pub fn new(
        store: Arc<S>,
        fetch: F,
        batch_size: usize,
        strategy: WriteStrategy,
        retry: RetryPolicy,
        counter: Arc<AtomicU64>
    ) -> Self {
        assert!(batch_size > 0);
        ChunkSink {
            store,
            fetch,
            batch_size,
            strategy,
            retry,
            counter,
            phantom_rows: std::marker::PhantomData
        }
    }

    pub async fn ingest(&self, chunk: Range<u64>) -> anyhow::Result<()> {
        let mut batch = Vec::with_capacity(self.batch_size);
        for index in chunk {
            batch.push((self.fetch)(index)?);
            if batch.len() == self.batch_size {
                self.flush(&mut batch).await?;
            }
        }
        if !batch.is_empty() {
            self.flush(&mut batch).await?;
        }
        Ok(())
    }

    async fn flush(&self, batch: &mut Vec<R>) -> anyhow::Result<()> {
        let failed = execute_batch(&*self.store, batch, self.strategy).await;
        if !failed.is_empty() {
            self.retry.recover(&*self.store, batch, &failed).await?;
        }
        self.counter.fetch_add(batch.len() as u64, Ordering::Relaxed);
        batch.clear();
        Ok(())
    }
}

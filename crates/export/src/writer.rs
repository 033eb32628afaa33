use crate::store::RowStore;
use scylla::serialize::row::SerializeRow;
use tracing::warn;


pub const DEFAULT_CONCURRENCY: usize = 100;


#[derive(Clone, Copy, Debug)]
pub enum WriteStrategy {
    /// One multi-row unlogged batch per network round trip. A failure
    /// fails the whole batch with no per-row signal.
    Grouped,
    /// Independent single-row statements with a bounded number in flight.
    /// Failures are reported per row.
    Concurrent { limit: usize }
}


/// Writes one batch of rows and returns the indexes of the rows
/// that did not make it.
pub async fn execute_batch<R, S>(store: &S, rows: &[R], strategy: WriteStrategy) -> Vec<usize>
where
    R: SerializeRow + Send + Sync,
    S: RowStore<R> + ?Sized
{
    match strategy {
        WriteStrategy::Grouped => match store.write_batch(rows).await {
            Ok(()) => Vec::new(),
            Err(err) => {
                warn!(
                    error = ?err,
                    rows = rows.len(),
                    "batch write failed, falling back to single-row writes"
                );
                (0..rows.len()).collect()
            }
        },
        WriteStrategy::Concurrent { limit } => {
            let results = store.write_concurrent(rows, limit).await;
            debug_assert_eq!(results.len(), rows.len());
            results
                .iter()
                .enumerate()
                .filter_map(|(i, result)| match result {
                    Ok(()) => None,
                    Err(err) => {
                        warn!(error = ?err, row = i, "row write failed");
                        Some(i)
                    }
                })
                .collect()
        }
    }
}

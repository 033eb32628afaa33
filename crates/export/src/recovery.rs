use crate::store::RowStore;
use scylla::serialize::row::SerializeRow;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;
use tracing::warn;


const RETRY_SCHEDULE: [u64; 6] = [0, 100, 200, 500, 1000, 2000];

const DEFAULT_MAX_ATTEMPTS: usize = 10;


/// A row that kept failing after the retry budget was spent.
/// Escalated to the orchestrator, which aborts the run.
#[derive(Debug)]
pub struct FatalWriteError {
    pub attempts: usize,
    pub source: anyhow::Error
}


impl Display for FatalWriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row write still failing after {} attempts: {:#}",
            self.attempts, self.source
        )
    }
}


impl Error for FatalWriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}


/// Single-row fallback for batches that failed partially or entirely.
///
/// Each failed row is retried in isolation with capped backoff. Transient
/// errors are absorbed here; a row exhausting its attempts turns into a
/// `FatalWriteError` instead of looping forever.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    max_attempts: usize,
    schedule: &'static [u64]
}


impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            schedule: &RETRY_SCHEDULE
        }
    }
}


impl RetryPolicy {
    pub fn new(max_attempts: usize, schedule: &'static [u64]) -> RetryPolicy {
        assert!(max_attempts > 0);
        assert!(!schedule.is_empty());
        RetryPolicy {
            max_attempts,
            schedule
        }
    }

    pub async fn recover<R, S>(
        &self,
        store: &S,
        rows: &[R],
        failed: &[usize]
    ) -> Result<(), FatalWriteError>
    where
        R: SerializeRow + Send + Sync,
        S: RowStore<R> + ?Sized
    {
        for &i in failed {
            self.write_with_retry(store, &rows[i]).await?;
        }
        Ok(())
    }

    async fn write_with_retry<R, S>(&self, store: &S, row: &R) -> Result<(), FatalWriteError>
    where
        R: SerializeRow + Send + Sync,
        S: RowStore<R> + ?Sized
    {
        let mut attempt = 0;
        loop {
            match store.write_one(row).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(FatalWriteError {
                            attempts: attempt,
                            source: err
                        });
                    }
                    let pause = self.schedule[std::cmp::min(attempt - 1, self.schedule.len() - 1)];
                    warn!(
                        error = ?err,
                        "single-row write failed, will retry in {} ms",
                        pause
                    );
                    tokio::time::sleep(Duration::from_millis(pause)).await;
                }
            }
        }
    }
}

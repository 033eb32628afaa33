use crate::tables::{SummaryRow, Table};
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use ledger_primitives::BlockNumber;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::serialize::row::SerializeRow;
use scylla::statement::batch::{Batch, BatchType};
use scylla::statement::prepared::PreparedStatement;
use scylla::statement::Consistency;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;


const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const SUMMARY_INSERT: &str = "INSERT INTO summary_statistics \
    (id, timestamp, no_blocks, no_txs) VALUES (?, ?, ?, ?)";


/// Write access to one destination table.
///
/// `write_batch` is atomic from the caller's perspective: a failure means
/// no per-row information is available. `write_concurrent` reports per-row
/// results, positionally aligned with the input.
#[async_trait]
pub trait RowStore<R>: Send + Sync
where
    R: SerializeRow + Send + Sync
{
    async fn write_batch(&self, rows: &[R]) -> anyhow::Result<()>;

    async fn write_concurrent(&self, rows: &[R], limit: usize) -> Vec<anyhow::Result<()>>;

    async fn write_one(&self, row: &R) -> anyhow::Result<()>;
}


pub struct CqlTable<R> {
    session: Arc<Session>,
    insert: PreparedStatement,
    phantom_rows: PhantomData<fn(R)>
}


#[async_trait]
impl<R> RowStore<R> for CqlTable<R>
where
    R: SerializeRow + Clone + Send + Sync
{
    async fn write_batch(&self, rows: &[R]) -> anyhow::Result<()> {
        let mut batch = Batch::new(BatchType::Unlogged);
        for _ in rows {
            batch.append_statement(self.insert.clone());
        }
        batch.set_consistency(Consistency::LocalOne);
        self.session.batch(&batch, rows.to_vec()).await?;
        Ok(())
    }

    async fn write_concurrent(&self, rows: &[R], limit: usize) -> Vec<anyhow::Result<()>> {
        let writes: Vec<_> = rows
            .iter()
            .map(|row| self.session.execute_unpaged(&self.insert, row))
            .collect();
        drive_buffered(writes, limit).await
    }

    async fn write_one(&self, row: &R) -> anyhow::Result<()> {
        self.session.execute_unpaged(&self.insert, row).await?;
        Ok(())
    }
}


/// Drives up to `limit` of the given write futures at a time. Results
/// come back positionally aligned with the input, regardless of the
/// order the writes complete in.
async fn drive_buffered<T, E, F>(writes: Vec<F>, limit: usize) -> Vec<anyhow::Result<()>>
where
    F: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error>
{
    futures::stream::iter(writes)
        .buffered(limit.max(1))
        .map(|result| result.map(|_| ()).map_err(Into::into))
        .collect()
        .await
}


/// Session-level access to the destination cluster.
pub struct CqlStore {
    session: Arc<Session>
}


impl CqlStore {
    pub async fn connect(nodes: &[String], keyspace: &str) -> anyhow::Result<CqlStore> {
        let session = SessionBuilder::new()
            .known_nodes(nodes)
            .connection_timeout(REQUEST_TIMEOUT)
            .build()
            .await
            .with_context(|| format!("cannot connect to {:?}", nodes))?;
        session
            .use_keyspace(keyspace, false)
            .await
            .with_context(|| format!("cannot use keyspace {}", keyspace))?;
        Ok(CqlStore {
            session: Arc::new(session)
        })
    }

    pub async fn table<T: Table>(&self) -> anyhow::Result<CqlTable<T::Row>> {
        let mut insert = self
            .session
            .prepare(T::INSERT)
            .await
            .with_context(|| format!("cannot prepare insert for table {}", T::NAME))?;
        insert.set_consistency(Consistency::LocalOne);
        insert.set_request_timeout(Some(REQUEST_TIMEOUT));
        Ok(CqlTable {
            session: self.session.clone(),
            insert,
            phantom_rows: PhantomData
        })
    }

    /// The highest block height already present in the destination,
    /// or `None` for a fresh keyspace.
    pub async fn block_watermark(&self) -> anyhow::Result<Option<BlockNumber>> {
        let result = self
            .session
            .query_unpaged("SELECT max(height) FROM block", ())
            .await
            .context("watermark query failed")?
            .into_rows_result()?;
        let (max,): (Option<i32>,) = result.single_row()?;
        Ok(max.map(|height| height as BlockNumber))
    }

    pub async fn write_summary(&self, row: SummaryRow) -> anyhow::Result<()> {
        self.session
            .query_unpaged(SUMMARY_INSERT, row)
            .await
            .context("summary statistics write failed")?;
        Ok(())
    }
}

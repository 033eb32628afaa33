use anyhow::anyhow;
use async_trait::async_trait;
use ledger_export::chain::{Block, Chain, ChainReader, Transaction, TxEndpoint};
use ledger_export::pool::{run_pool, PoolOptions};
use ledger_export::recovery::RetryPolicy;
use ledger_export::store::RowStore;
use ledger_export::tables::{project_block, BlockRow};
use ledger_export::writer::WriteStrategy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;


fn sample_chain(num_blocks: u64) -> Arc<Chain> {
    let mut blocks = Vec::new();
    for height in 0..num_blocks {
        blocks.push(Block {
            height,
            hash: format!("{:064x}", height + 0xb10c),
            timestamp: 1_230_940_800 + height as i64 * 600,
            transactions: vec![Transaction {
                index: height,
                hash: format!("{:064x}", height),
                height,
                timestamp: 1_230_940_800 + height as i64 * 600,
                is_coinbase: true,
                total_input: 0,
                total_output: 5_000_000_000,
                inputs: vec![],
                outputs: vec![TxEndpoint {
                    address_type: ledger_export::chain::AddressType::Pubkeyhash,
                    addresses: vec![format!("addr{}", height)],
                    value: 5_000_000_000
                }]
            }]
        });
    }
    Arc::new(Chain::from_blocks(blocks).unwrap())
}


/// In-memory destination keyed by block height: a re-written row
/// overwrites its previous version, like the real store.
#[derive(Default)]
struct MemStore {
    rows: Mutex<HashMap<i32, BlockRow>>,
    batch_writes: AtomicUsize,
    single_writes: AtomicUsize,
    // fail the first N write_batch calls
    failing_batches: AtomicUsize,
    // per-row write_one failures before success
    single_failures: AtomicUsize,
    // fail rows at odd positions on the first write_concurrent call
    fail_odd_rows_once: Mutex<bool>
}


impl MemStore {
    fn insert(&self, row: &BlockRow) {
        self.rows.lock().insert(row.height, row.clone());
    }

    fn heights(&self) -> Vec<i32> {
        let mut heights: Vec<i32> = self.rows.lock().keys().copied().collect();
        heights.sort();
        heights
    }
}


#[async_trait]
impl RowStore<BlockRow> for MemStore {
    async fn write_batch(&self, rows: &[BlockRow]) -> anyhow::Result<()> {
        self.batch_writes.fetch_add(1, Ordering::SeqCst);
        if self.failing_batches.load(Ordering::SeqCst) > 0 {
            self.failing_batches.fetch_sub(1, Ordering::SeqCst);
            return Err(anyhow!("batch too large"))
        }
        for row in rows {
            self.insert(row);
        }
        Ok(())
    }

    async fn write_concurrent(&self, rows: &[BlockRow], _limit: usize) -> Vec<anyhow::Result<()>> {
        let fail_odd = std::mem::take(&mut *self.fail_odd_rows_once.lock());
        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                if fail_odd && i % 2 == 1 {
                    Err(anyhow!("write timeout"))
                } else {
                    self.insert(row);
                    Ok(())
                }
            })
            .collect()
    }

    async fn write_one(&self, row: &BlockRow) -> anyhow::Result<()> {
        self.single_writes.fetch_add(1, Ordering::SeqCst);
        if self.single_failures.load(Ordering::SeqCst) > 0 {
            self.single_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(anyhow!("node unavailable"))
        }
        self.insert(row);
        Ok(())
    }
}


fn block_fetch(chain: Arc<Chain>) -> impl Fn(u64) -> anyhow::Result<BlockRow> + Clone + Send + Sync {
    move |height| chain.block(height).and_then(project_block)
}


fn pool_options(workers: usize, chunks: usize, batch_size: usize) -> PoolOptions {
    PoolOptions {
        num_workers: workers,
        num_chunks: chunks,
        batch_size,
        strategy: WriteStrategy::Grouped,
        retry: RetryPolicy::new(5, &[0])
    }
}


#[tokio::test]
async fn ten_blocks_three_workers() {
    let chain = sample_chain(10);
    let store = Arc::new(MemStore::default());
    let counter = Arc::new(AtomicU64::new(0));

    run_pool(
        "blocks",
        0..10,
        pool_options(3, 3, 4),
        store.clone(),
        block_fetch(chain),
        counter.clone()
    )
    .await
    .unwrap();

    assert_eq!(store.heights(), (0..10).collect::<Vec<i32>>());
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}


#[tokio::test]
async fn reingestion_is_idempotent() {
    let chain = sample_chain(10);
    let store = Arc::new(MemStore::default());

    for _ in 0..2 {
        run_pool(
            "blocks",
            0..10,
            pool_options(2, 2, 3),
            store.clone(),
            block_fetch(chain.clone()),
            Arc::new(AtomicU64::new(0))
        )
        .await
        .unwrap();
    }

    let rows = store.rows.lock().clone();
    assert_eq!(rows.len(), 10);
    for (height, row) in rows {
        assert_eq!(row, project_block(chain.block(height as u64).unwrap()).unwrap());
    }
}


#[tokio::test]
async fn failed_batch_is_recovered_row_by_row() {
    let chain = sample_chain(8);
    let store = Arc::new(MemStore::default());
    store.failing_batches.store(1, Ordering::SeqCst);
    let counter = Arc::new(AtomicU64::new(0));

    run_pool(
        "blocks",
        0..8,
        pool_options(1, 1, 8),
        store.clone(),
        block_fetch(chain),
        counter.clone()
    )
    .await
    .unwrap();

    // every row of the failed batch went through the single-row fallback
    assert_eq!(store.single_writes.load(Ordering::SeqCst), 8);
    assert_eq!(store.heights(), (0..8).collect::<Vec<i32>>());
    // no row is double-counted or lost
    assert_eq!(counter.load(Ordering::SeqCst), 8);
}


#[tokio::test]
async fn transient_single_row_failures_are_retried() {
    let chain = sample_chain(4);
    let store = Arc::new(MemStore::default());
    store.failing_batches.store(1, Ordering::SeqCst);
    store.single_failures.store(2, Ordering::SeqCst);
    let counter = Arc::new(AtomicU64::new(0));

    run_pool(
        "blocks",
        0..4,
        pool_options(1, 1, 4),
        store.clone(),
        block_fetch(chain),
        counter.clone()
    )
    .await
    .unwrap();

    assert_eq!(store.heights(), (0..4).collect::<Vec<i32>>());
    assert_eq!(counter.load(Ordering::SeqCst), 4);
    // 2 failed attempts plus 4 eventual successes
    assert_eq!(store.single_writes.load(Ordering::SeqCst), 6);
}


#[tokio::test]
async fn exhausted_retries_abort_the_pool() {
    let chain = sample_chain(4);
    let store = Arc::new(MemStore::default());
    store.failing_batches.store(1, Ordering::SeqCst);
    store.single_failures.store(usize::MAX, Ordering::SeqCst);

    let result = run_pool(
        "blocks",
        0..4,
        pool_options(1, 1, 4),
        store.clone(),
        block_fetch(chain),
        Arc::new(AtomicU64::new(0))
    )
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("attempts"), "unexpected error: {err:#}");
}


#[tokio::test]
async fn concurrent_strategy_recovers_exactly_the_failed_rows() {
    let chain = sample_chain(6);
    let store = Arc::new(MemStore::default());
    *store.fail_odd_rows_once.lock() = true;
    let counter = Arc::new(AtomicU64::new(0));

    let mut opts = pool_options(1, 1, 6);
    opts.strategy = WriteStrategy::Concurrent { limit: 2 };

    run_pool(
        "blocks",
        0..6,
        opts,
        store.clone(),
        block_fetch(chain),
        counter.clone()
    )
    .await
    .unwrap();

    assert_eq!(store.heights(), (0..6).collect::<Vec<i32>>());
    assert_eq!(counter.load(Ordering::SeqCst), 6);
    // only the three odd rows went through the single-row fallback
    assert_eq!(store.single_writes.load(Ordering::SeqCst), 3);
}

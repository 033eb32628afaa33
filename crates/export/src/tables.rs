use crate::chain::{AddressType, Block, Transaction, TxEndpoint};
use anyhow::{ensure, Context};
use scylla::serialize::row::SerializeRow as SerializeRowTrait;
use scylla::{SerializeRow, SerializeValue};


/// A destination table, bound at compile time to its row shape,
/// insert statement and batch size.
pub trait Table: Send + Sync + 'static {
    type Row: SerializeRowTrait + Clone + Send + Sync + 'static;

    const NAME: &'static str;
    const INSERT: &'static str;
    const BATCH_SIZE: usize;
}


pub struct TransactionTable;

impl Table for TransactionTable {
    type Row = TransactionRow;

    const NAME: &'static str = "transaction";
    const INSERT: &'static str = "INSERT INTO transaction \
        (tx_prefix, tx_hash, tx_index, height, timestamp, coinbase, \
         total_input, total_output, inputs, outputs) \
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
    const BATCH_SIZE: usize = 500;
}


pub struct BlockTable;

impl Table for BlockTable {
    type Row = BlockRow;

    const NAME: &'static str = "block";
    const INSERT: &'static str = "INSERT INTO block \
        (height, block_hash, timestamp, no_transactions) \
        VALUES (?, ?, ?, ?)";
    const BATCH_SIZE: usize = 1000;
}


pub struct BlockTxTable;

impl Table for BlockTxTable {
    type Row = BlockTxRow;

    const NAME: &'static str = "block_transactions";
    const INSERT: &'static str = "INSERT INTO block_transactions \
        (height, txs) VALUES (?, ?)";
    const BATCH_SIZE: usize = 25;
}


#[derive(SerializeRow, Clone, Debug, PartialEq)]
pub struct TransactionRow {
    pub tx_prefix: String,
    pub tx_hash: Vec<u8>,
    pub tx_index: i64,
    pub height: i32,
    pub timestamp: i32,
    pub coinbase: bool,
    pub total_input: i64,
    pub total_output: i64,
    pub inputs: Vec<TxEndpointRow>,
    pub outputs: Vec<TxEndpointRow>
}


#[derive(SerializeValue, Clone, Debug, PartialEq)]
pub struct TxEndpointRow {
    pub address: Option<Vec<String>>,
    pub value: i64,
    pub address_type: i16
}


#[derive(SerializeRow, Clone, Debug, PartialEq)]
pub struct BlockRow {
    pub height: i32,
    pub block_hash: Vec<u8>,
    pub timestamp: i32,
    pub no_transactions: i32
}


#[derive(SerializeRow, Clone, Debug, PartialEq)]
pub struct BlockTxRow {
    pub height: i32,
    pub txs: Vec<TxSummaryRow>
}


#[derive(SerializeValue, Clone, Debug, PartialEq)]
pub struct TxSummaryRow {
    pub tx_hash: Vec<u8>,
    pub no_inputs: i32,
    pub no_outputs: i32,
    pub total_input: i64,
    pub total_output: i64
}


#[derive(SerializeRow, Clone, Debug, PartialEq)]
pub struct SummaryRow {
    pub id: String,
    pub timestamp: i32,
    pub no_blocks: i64,
    pub no_txs: i64
}


pub const PREFIX_LEN: usize = 5;


pub fn project_transaction(tx: &Transaction) -> anyhow::Result<TransactionRow> {
    let tx_hash = hex_to_bytes(&tx.hash)
        .with_context(|| format!("tx {} has a malformed hash", tx.index))?;
    Ok(TransactionRow {
        tx_prefix: tx.hash.chars().take(PREFIX_LEN).collect(),
        tx_hash,
        tx_index: i64::try_from(tx.index)?,
        height: i32::try_from(tx.height)?,
        timestamp: i32::try_from(tx.timestamp)?,
        coinbase: tx.is_coinbase,
        total_input: tx.total_input,
        total_output: tx.total_output,
        inputs: project_endpoints(&tx.inputs)?,
        outputs: project_endpoints(&tx.outputs)?
    })
}


pub fn project_block(block: &Block) -> anyhow::Result<BlockRow> {
    Ok(BlockRow {
        height: i32::try_from(block.height)?,
        block_hash: hex_to_bytes(&block.hash)
            .with_context(|| format!("block {} has a malformed hash", block.height))?,
        timestamp: i32::try_from(block.timestamp)?,
        no_transactions: i32::try_from(block.transactions.len())?
    })
}


pub fn project_block_txs(block: &Block) -> anyhow::Result<BlockTxRow> {
    let txs = block
        .transactions
        .iter()
        .map(|tx| {
            Ok(TxSummaryRow {
                tx_hash: hex_to_bytes(&tx.hash)?,
                no_inputs: i32::try_from(tx.inputs.len())?,
                no_outputs: i32::try_from(tx.outputs.len())?,
                total_input: tx.total_input,
                total_output: tx.total_output
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(BlockTxRow {
        height: i32::try_from(block.height)?,
        txs
    })
}


pub fn project_endpoint(endpoint: &TxEndpoint) -> anyhow::Result<TxEndpointRow> {
    Ok(TxEndpointRow {
        address: resolve_addresses(endpoint)?,
        value: endpoint.value,
        address_type: endpoint.address_type.code()
    })
}


fn project_endpoints(endpoints: &[TxEndpoint]) -> anyhow::Result<Vec<TxEndpointRow>> {
    endpoints.iter().map(project_endpoint).collect()
}


/// The four-case address resolution: a multisig endpoint keeps all
/// constituent addresses, endpoints without a resolvable address map to
/// an explicit null (never an empty list), everything else to a
/// single-element list.
fn resolve_addresses(endpoint: &TxEndpoint) -> anyhow::Result<Option<Vec<String>>> {
    match endpoint.address_type {
        AddressType::Multisig => Ok(Some(endpoint.addresses.clone())),
        AddressType::Nonstandard | AddressType::Nulldata | AddressType::WitnessUnknown => Ok(None),
        _ => {
            let address = endpoint
                .addresses
                .first()
                .with_context(|| format!("{:?} endpoint without an address", endpoint.address_type))?;
            Ok(Some(vec![address.clone()]))
        }
    }
}


pub fn hex_to_bytes(hex: &str) -> anyhow::Result<Vec<u8>> {
    ensure!(hex.is_ascii(), "non-ascii character in hex string");
    ensure!(hex.len() % 2 == 0, "odd-length hex string");
    hex.as_bytes()
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            let digits = std::str::from_utf8(pair)?;
            u8::from_str_radix(digits, 16)
                .with_context(|| format!("invalid hex digit at offset {}", i * 2))
        })
        .collect()
}

use anyhow::{bail, ensure, Context};
use ledger_primitives::{BlockNumber, TxNumber};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;


/// Output script types of the source ledger, mapped to the stable
/// small-integer codes used as discriminators in the destination.
///
/// An address type string outside this set fails deserialization and
/// aborts the run before any write.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    Nonstandard,
    Pubkey,
    Pubkeyhash,
    MultisigPubkey,
    Scripthash,
    Multisig,
    Nulldata,
    WitnessPubkeyhash,
    WitnessScripthash,
    WitnessUnknown
}


impl AddressType {
    pub fn code(self) -> i16 {
        match self {
            AddressType::Nonstandard => 1,
            AddressType::Pubkey => 2,
            AddressType::Pubkeyhash => 3,
            AddressType::MultisigPubkey => 4,
            AddressType::Scripthash => 5,
            AddressType::Multisig => 6,
            AddressType::Nulldata => 7,
            AddressType::WitnessPubkeyhash => 8,
            AddressType::WitnessScripthash => 9,
            AddressType::WitnessUnknown => 10
        }
    }
}


#[derive(Deserialize, Clone, Debug)]
pub struct TxEndpoint {
    pub address_type: AddressType,
    #[serde(default)]
    pub addresses: Vec<String>,
    pub value: i64
}


#[derive(Deserialize, Clone, Debug)]
pub struct Transaction {
    pub index: TxNumber,
    pub hash: String,
    pub height: BlockNumber,
    pub timestamp: i64,
    pub is_coinbase: bool,
    pub total_input: i64,
    pub total_output: i64,
    pub inputs: Vec<TxEndpoint>,
    pub outputs: Vec<TxEndpoint>
}


#[derive(Deserialize, Clone, Debug)]
pub struct Block {
    pub height: BlockNumber,
    pub hash: String,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>
}


/// Read-only random access into the parsed ledger.
pub trait ChainReader: Send + Sync {
    fn block_count(&self) -> u64;

    fn tx_count(&self) -> u64;

    fn block(&self, height: BlockNumber) -> anyhow::Result<&Block>;

    fn tx(&self, index: TxNumber) -> anyhow::Result<&Transaction>;
}


/// In-memory view over a parsed ledger dump (NDJSON, one block per line).
///
/// Blocks are height-ordered starting at 0 and transactions carry a global,
/// monotonic index, which gives O(log n) random access by tx index via
/// the per-block first-index offsets.
pub struct Chain {
    blocks: Vec<Block>,
    tx_offsets: Vec<TxNumber>,
    tx_count: u64
}


impl Chain {
    pub fn open(path: &Path) -> anyhow::Result<Chain> {
        let file = File::open(path)
            .with_context(|| format!("cannot open ledger dump at {}", path.display()))?;
        let mut blocks = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue
            }
            let block: Block = serde_json::from_str(&line)
                .with_context(|| format!("malformed block record at line {}", line_no + 1))?;
            blocks.push(block);
        }
        Self::from_blocks(blocks)
    }

    pub fn from_blocks(blocks: Vec<Block>) -> anyhow::Result<Chain> {
        let mut tx_offsets = Vec::with_capacity(blocks.len());
        let mut next_tx = 0;
        for (i, block) in blocks.iter().enumerate() {
            ensure!(
                block.height == i as u64,
                "expected block height {}, got {}",
                i,
                block.height
            );
            ensure!(
                !block.transactions.is_empty(),
                "block {} has no transactions",
                block.height
            );
            tx_offsets.push(next_tx);
            for tx in block.transactions.iter() {
                ensure!(
                    tx.index == next_tx,
                    "expected tx index {} in block {}, got {}",
                    next_tx,
                    block.height,
                    tx.index
                );
                next_tx += 1;
            }
        }
        Ok(Chain {
            blocks,
            tx_offsets,
            tx_count: next_tx
        })
    }

    pub fn last_height(&self) -> Option<BlockNumber> {
        self.blocks.last().map(|b| b.height)
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Global tx index range covered by the given block range.
    pub fn tx_index_range(&self, blocks: Range<BlockNumber>) -> anyhow::Result<Range<TxNumber>> {
        ensure!(blocks.end > blocks.start, "empty block range");
        ensure!(
            blocks.end <= self.block_count(),
            "block range {}..{} is beyond the last parsed block",
            blocks.start,
            blocks.end
        );
        let first = self.tx_offsets[blocks.start as usize];
        let last_block = &self.blocks[blocks.end as usize - 1];
        let end = last_block.transactions.last().unwrap().index + 1;
        Ok(first..end)
    }
}


impl ChainReader for Chain {
    fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn tx_count(&self) -> u64 {
        self.tx_count
    }

    fn block(&self, height: BlockNumber) -> anyhow::Result<&Block> {
        match self.blocks.get(height as usize) {
            Some(block) => Ok(block),
            None => bail!("block {} is beyond the last parsed block", height)
        }
    }

    fn tx(&self, index: TxNumber) -> anyhow::Result<&Transaction> {
        if index >= self.tx_count {
            bail!("tx {} is beyond the last parsed transaction", index)
        }
        let block_pos = self.tx_offsets.partition_point(|&first| first <= index) - 1;
        let block = &self.blocks[block_pos];
        let offset = (index - self.tx_offsets[block_pos]) as usize;
        Ok(&block.transactions[offset])
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn block_json(height: u64, first_tx: u64, num_txs: u64) -> String {
        let txs: Vec<String> = (first_tx..first_tx + num_txs)
            .map(|i| {
                format!(
                    r#"{{"index":{},"hash":"{:064x}","height":{},"timestamp":1230940800,"is_coinbase":{},"total_input":0,"total_output":5000000000,"inputs":[],"outputs":[{{"address_type":"pubkeyhash","addresses":["addr{}"],"value":5000000000}}]}}"#,
                    i, i, height, i == first_tx, i
                )
            })
            .collect();
        format!(
            r#"{{"height":{},"hash":"{:064x}","timestamp":1230940800,"transactions":[{}]}}"#,
            height,
            height + 0xb10c,
            txs.join(",")
        )
    }

    fn sample_chain() -> Chain {
        let mut blocks = Vec::new();
        let mut next_tx = 0;
        for height in 0..5u64 {
            let num_txs = height + 1;
            blocks.push(serde_json::from_str(&block_json(height, next_tx, num_txs)).unwrap());
            next_tx += num_txs;
        }
        Chain::from_blocks(blocks).unwrap()
    }

    #[test]
    fn open_reads_ndjson_dump() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", block_json(0, 0, 1)).unwrap();
        writeln!(file, "{}", block_json(1, 1, 2)).unwrap();
        file.flush().unwrap();

        let chain = Chain::open(file.path()).unwrap();
        assert_eq!(chain.block_count(), 2);
        assert_eq!(chain.tx_count(), 3);
        assert_eq!(chain.last_height(), Some(1));
    }

    #[test]
    fn random_access_by_tx_index() {
        let chain = sample_chain();
        assert_eq!(chain.tx_count(), 15);
        for index in 0..15u64 {
            let tx = chain.tx(index).unwrap();
            assert_eq!(tx.index, index);
        }
        assert_eq!(chain.tx(4).unwrap().height, 2);
        assert!(chain.tx(15).is_err());
    }

    #[test]
    fn tx_index_range_of_block_range() {
        let chain = sample_chain();
        assert_eq!(chain.tx_index_range(0..5).unwrap(), 0..15);
        assert_eq!(chain.tx_index_range(1..3).unwrap(), 1..6);
        assert!(chain.tx_index_range(3..3).is_err());
        assert!(chain.tx_index_range(0..6).is_err());
    }

    #[test]
    fn unknown_address_type_is_rejected() {
        let line = block_json(0, 0, 1).replace("pubkeyhash", "taproot_v2");
        assert!(serde_json::from_str::<Block>(&line).is_err());
    }

    #[test]
    fn non_contiguous_heights_are_rejected() {
        let b0: Block = serde_json::from_str(&block_json(0, 0, 1)).unwrap();
        let b2: Block = serde_json::from_str(&block_json(2, 1, 1)).unwrap();
        assert!(Chain::from_blocks(vec![b0, b2]).is_err());
    }
}

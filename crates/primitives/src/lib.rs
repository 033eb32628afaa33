pub mod range;


pub type BlockNumber = u64;

pub type TxNumber = u64;

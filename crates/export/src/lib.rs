pub mod chain;
pub mod cli;
pub mod export;
pub mod metrics;
pub mod pool;
pub mod progress;
pub mod recovery;
pub mod server;
pub mod sink;
pub mod store;
pub mod tables;
pub mod writer;

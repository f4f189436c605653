pub mod config;
pub mod error;
pub mod migration;
pub mod storage;
pub mod store_writer;

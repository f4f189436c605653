pub mod breaks;
pub mod matcher;
pub mod models;
pub mod schedule;

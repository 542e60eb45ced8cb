//! Application services: catalog reads, write coordination and the ports they depend on.

pub mod catalog;
pub mod error;
pub mod monsters;
pub mod query;
pub mod repos;
pub mod storage;

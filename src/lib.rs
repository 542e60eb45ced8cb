//! Monster catalog service: a relational store, an image blob store and a TTL cache
//! kept consistent by a single write coordinator.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

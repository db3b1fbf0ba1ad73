// src/ingest/providers/mod.rs
pub mod catalog;
pub mod feeds;
pub mod trending;

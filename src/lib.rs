// src/lib.rs

//! Site Prober Library
//!
//! Periodically probes websites, classifies their bodies with per-site
//! regexes, and carries the outcomes over a message bus into durable
//! storage.

pub mod bus;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;

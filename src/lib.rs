//! Mosaico: a modular content engine.
//!
//! Requests are dispatched through a set of self-contained modules whose
//! relative ordering is expressed as declared dependencies. Each module
//! renders fragments into named blocks; the dispatch loop composes the final
//! page from those blocks, with a TTL cache store underneath for expensive
//! renders.

pub mod blocks;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod infra;
pub mod modules;
pub mod ports;
pub mod registry;
pub mod util;

//! Per-instrument relational storage for historical price bars, and the
//! pipeline that fills it.
//!
//! - [`schema_manager`]: creates the registry and per-(instrument, interval) tables on demand
//! - [`writer`]: registry, metadata and bar upserts for one fetch
//! - [`pipeline`]: runs (symbol, interval) units concurrently with per-unit failure isolation
//! - [`config`], [`symbols`], [`csv_import`], [`logging`]: the CLI's supporting pieces

pub mod config;
pub mod csv_import;
pub mod db;
pub mod ident;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod schema;
pub mod schema_manager;
pub mod symbols;
pub mod writer;

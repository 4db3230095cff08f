//! Library crate for lan-print-bridge exposing reusable modules.
pub mod commands;
pub mod config;
pub mod counters;
pub mod driver;
pub mod engine;
pub mod lock;
pub mod mqtt;
pub mod netdetect;
pub mod oid;
pub mod probe;
pub mod scanner;
pub mod server;
pub mod session;
pub mod snmp;
pub mod store;
pub mod telemetry;
pub mod traits;
pub mod types;
pub mod update;
pub mod watchdog;

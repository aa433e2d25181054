pub mod config;
pub mod contactgraph;
pub mod db;
pub mod errors;
pub mod redact;
pub mod resolution;
pub mod rpc;
pub mod types;
pub mod validation;

pub mod config_cmd;
pub mod ingest;
pub mod serve;
pub mod tools;

pub mod appliance;
pub mod config;
pub mod coverage;
pub mod error;
pub mod fetcher;
pub mod geocode;
pub mod inventory;
pub mod orchestrator;
pub mod parser;
pub mod series;

pub mod analysis;
pub mod bucket;
pub mod config;
pub mod logging;
pub mod portfolio;
pub mod shocks;
pub mod simulation;
pub mod types;

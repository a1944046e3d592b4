pub mod blackout;
pub mod cache;
pub mod config;
pub mod feed;
pub mod fetch;
pub mod nudge;
pub mod observability;
pub mod persist;
pub mod policy;
pub mod runner;
pub mod signal;

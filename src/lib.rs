pub mod agent;
pub mod backend;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod error;
pub mod geo;
pub mod locomotion;
pub mod mailbox;
pub mod messages;
pub mod metrics;
/// Robot session orchestrator: channel, backend and control tick.
pub mod session;
pub mod ticker;

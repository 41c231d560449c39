//! Launcher of the Locust load-testing harness: finds and loads a locustfile,
//! discovers its scenarios and brings up a standalone, master or slave run.

#[cfg(feature = "web")]
pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod launcher;
pub mod locustfile;
pub mod runners;
pub mod stats;
pub mod telemetry;

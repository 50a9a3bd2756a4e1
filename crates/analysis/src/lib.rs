//! Cluster analysis service: HTTP API and configuration

pub mod api;
pub mod config;

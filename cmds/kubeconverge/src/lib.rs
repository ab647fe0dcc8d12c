pub mod commands;
pub mod config;
pub mod k8s;
pub mod project;
pub mod source;
pub mod telemetry;

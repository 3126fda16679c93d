//! Process surface of the exporter: command-line flags and the HTTP app.

pub mod app;
pub mod flags;

//! CLI library components for the Schedule of Activities pipeline.

pub mod config;
pub mod logging;
pub mod output;
pub mod pipeline;

//! Discord rendering of controller output: embeds and message components.

pub mod components;
pub mod embeds;

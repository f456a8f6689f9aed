//! Report generation.
//!
//! Renders a [`GuardReport`](crate::models::GuardReport) as Markdown or JSON.

pub mod generator;

pub use generator::{generate_json_report, generate_markdown_report};

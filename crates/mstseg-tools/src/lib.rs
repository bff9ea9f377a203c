//! # mstseg-tools
//!
//! External tool plumbing for the mstseg pipeline.
//!
//! This crate provides functionality for:
//! - Detecting external tools on `PATH`
//! - Expanding `{var}` placeholders in configured command templates
//! - Running commands with captured output
//! - Fanning out independent jobs across a bounded worker pool
//! - A process-scoped scratch area for ephemeral artifacts
//!
//! ## Example
//!
//! ```no_run
//! use mstseg_common::UnitId;
//! use mstseg_tools::{Dispatcher, TemplateContext, ToolSpec};
//!
//! let spec = ToolSpec::new("echo", &["{subject}", "{session}"]);
//! let units = vec![UnitId::from_filename("20180605_RR215.iso")?];
//!
//! let report = Dispatcher::default().run_all(units, |unit| {
//!     spec.render(&TemplateContext::new().with_unit(unit)).execute()
//! });
//! report.log_summary("Example");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod command;
pub mod dispatch;
mod error;
pub mod scratch;
pub mod template;
pub mod tools;

// Re-exports
pub use command::{ToolCommand, ToolOutput, ToolSpec};
pub use dispatch::{available_workers, DispatchReport, Dispatcher, JobOutcome};
pub use error::{Error, Result};
pub use scratch::Scratch;
pub use template::TemplateContext;
pub use tools::{check_tool, check_tools, get_tool_path, require_tool, ToolInfo};

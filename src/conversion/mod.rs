//! Conversion configuration.
//!
//! The conversion tool matches acquisitions against a JSON config. One master template
//! is kept in the project tree and bound to each session before the tool runs on it.

mod template;

pub use template::{ConversionTemplate, TemplateError};

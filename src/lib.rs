//! mstseg - MS tissue and lesion segmentation pipeline
//!
//! This library crate exposes the stage runners and the coordinator for integration
//! testing. External tools do the imaging work; this crate derives unit identifiers,
//! fans units out across a bounded worker pool, binds the conversion template per
//! unit, prunes the cohort and sequences the stages.

pub mod audit;
pub mod cohort_filter;
pub mod config;
pub mod conversion;
pub mod logging;
pub mod pipeline;
pub mod stages;

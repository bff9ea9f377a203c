//! Stage sequencing.
//!
//! Stages run strictly one after another: a stage's fan-out drains before the next
//! stage starts. Mandatory stages abort the run on error; Quality Control and Lesion
//! Cluster Statistics only warn.

mod coordinator;

pub use coordinator::{Pipeline, RunSummary};

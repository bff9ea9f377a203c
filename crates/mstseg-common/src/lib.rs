//! mstseg-common: shared identifiers, cohort types, and output layout.
//!
//! - **Identifiers**: [`UnitId`] derived from raw media filenames
//! - **Cohort**: index-aligned subject/session lists passed between stages
//! - **Layout**: the per-unit file naming contract between stages
//! - **Error Handling**: common error type and result alias
//!
//! # Examples
//!
//! ```
//! use mstseg_common::{Cohort, UnitId};
//!
//! let unit = UnitId::from_filename("20180605_RR215.iso")?;
//! let cohort: Cohort = std::iter::once(unit).collect();
//! let bids = cohort.to_bids();
//! assert_eq!(bids.subjects()[0].as_str(), "sub-RR215");
//! # Ok::<(), mstseg_common::Error>(())
//! ```

pub mod cohort;
pub mod error;
pub mod ids;
pub mod layout;

pub use cohort::Cohort;
pub use error::{Error, Result};
pub use ids::{SessionId, SubjectId, UnitId};
pub use layout::{BidsLayout, DerivativeLayout, Modality};

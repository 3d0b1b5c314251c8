//! # NERDA Core
//!
//! Data types shared by the NERDA fine-tuning workspace: labeled sentence
//! datasets, the tag encoder that maps labels to class ids, BIO entity
//! helpers and the common error type.
//!
//! ## Quick Start
//!
//! ```rust
//! use nerda_core::{Dataset, TagEncoder};
//!
//! let dataset = Dataset::new(
//!     vec![vec!["Jens".into(), "bor".into(), "i".into(), "Aarhus".into()]],
//!     vec![vec!["B-PER".into(), "O".into(), "O".into(), "B-LOC".into()]],
//! )
//! .unwrap();
//!
//! let encoder = TagEncoder::fit_tags(dataset.tags());
//! assert_eq!(encoder.n_tags(), 3);
//! assert_eq!(encoder.encode("O").unwrap(), 2);
//! ```
pub mod bio;
pub mod dataset;
pub mod error;
pub mod tag_encoder;

// Re-export primary API
pub use bio::{BioLabel, Entity, extract_entities};
pub use dataset::Dataset;
pub use error::{NerdaError, Result};
pub use tag_encoder::TagEncoder;

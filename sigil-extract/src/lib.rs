//! # sigil-extract
//!
//! Maps raw model text to typed field values.
//!
//! The model is asked to answer with `Title: value` sections, one per
//! output field, in signature order. This crate locates those sections,
//! coerces each segment to the field's declared type and reports either the
//! values or a [`ValidationError`] naming the offending field.
//!
//! - [`extract_values`]: one-shot extraction over a full response
//! - [`StreamExtractor`]: incremental extraction over streamed deltas, with
//!   the same results regardless of chunking
//! - [`coerce`]: per-type conversion rules
//! - [`datetime`] and [`markdown`]: parsing helpers
//!
//! ## Feature Flags
//!
//! - `tracing-integration`: Enable tracing instrumentation
//!
//! ## Example
//!
//! ```rust
//! use sigil_extract::{extract_values, StreamExtractor};
//! use sigil_signature::Signature;
//!
//! let sig = Signature::parse("question -> answer, confidence:number").unwrap();
//! let text = "Answer: Paris\nConfidence: 0.9";
//!
//! let values = extract_values(sig.output_fields(), text).unwrap();
//! assert_eq!(values["answer"], "Paris");
//!
//! let mut stream = StreamExtractor::new(sig.output_fields().to_vec());
//! for chunk in ["Answer: Pa", "ris\nConfi", "dence: 0.9"] {
//!     stream.push(chunk).unwrap();
//! }
//! stream.finish().unwrap();
//! assert_eq!(stream.values(), &values);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod coerce;
pub mod datetime;
pub mod engine;
pub mod error;
pub mod markdown;
pub mod stream;

pub use coerce::{coerce_segment, coerce_text, is_empty_value};
pub use engine::{extract_values, extract_values_lenient};
pub use error::{ExtractResult, ValidationError};
pub use stream::{ExtractionState, StreamExtractor, Values};

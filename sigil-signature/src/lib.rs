//! # sigil-signature
//!
//! Compiler for the signature DSL that describes one model interaction as
//! typed inputs and outputs.
//!
//! ```text
//! "optional description" input1:type, input2?:type[] -> output!:type "desc", label:class "a | b"
//! ```
//!
//! A compiled [`Signature`] is an immutable snapshot with a canonical
//! rendering (its `Display` output) and a SHA-256 content hash. Mutators such
//! as [`Signature::add_output_field`] return a new validated snapshot.
//!
//! ## Example
//!
//! ```rust
//! use sigil_signature::{FieldKind, Signature};
//!
//! let sig = Signature::parse(
//!     r#""Answer questions" question:string -> answer:string, confidence?:number"#,
//! ).unwrap();
//!
//! assert_eq!(sig.description(), Some("Answer questions"));
//! assert_eq!(sig.output_fields()[1].kind(), FieldKind::Number);
//! assert_eq!(sig.output_fields()[1].title, "Confidence");
//!
//! // Rendering is canonical and parses back to the same structure.
//! let again = Signature::parse(&sig.to_string()).unwrap();
//! assert_eq!(sig.hash(), again.hash());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod error;
pub mod field;
pub mod parser;
pub mod signature;
pub mod validate;

pub use error::{SignatureError, SignatureResult};
pub use field::{to_title, Field, FieldKind, FieldType};
pub use parser::{parse_signature, ParsedSignature};
pub use signature::{Signature, SignatureDescriptor};
pub use validate::{is_valid_name, ValidationMode};

//! Error types for latent-align.
//!
//! - [`AlignError`]: top-level error returned by every pipeline operation
//! - Sub-error types: [`VectorError`], [`CodecError`], [`RegistryError`],
//!   [`ConfigError`]
//!
//! Every failure is a typed result surfaced to the caller. Nothing in the
//! pipeline falls back to an unvalidated or un-aligned vector.
//!
//! # Examples
//!
//! ```rust
//! use latent_align_core::error::{AlignError, VectorError};
//!
//! let err: AlignError = VectorError::Empty.into();
//! assert_eq!(err.kind(), "invalid_vector");
//! assert!(err.is_recoverable());
//! ```

mod conversions;
mod sub_errors;
mod unified;


pub use sub_errors::{CodecError, ConfigError, RegistryError, VectorError};
pub use unified::{AlignError, Result};

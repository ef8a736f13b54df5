//! `interpolate_core` resolves placeholders such as `${name}` inside strings
//! and structured configuration documents. A placeholder can refer to nested
//! values (`${server.host}`), to values that contain further placeholders, or
//! hold a small expression that is evaluated safely (`${= ${age} >= 18 =}`).
//!
//! ## Processing Pipeline
//!
//! ```text
//! document + values + options
//!   → Options resolution (explicit options, values, document, environment, defaults)
//!   → Pattern builder (placeholder matchers for the effective delimiters, cached)
//!   → Escape shielding (`"${*name}"` is kept as literal `"${name}"`)
//!   → Resolver (follows placeholder chains into a per-call cache)
//!   → Expression evaluator (`${= ... =}` bodies)
//!   → Substitution (expressions first, then plain placeholders)
//! ```
//!
//! ## Modules
//!
//! - [`Options`] and [`PartialOptions`] describe delimiters and behaviour.
//!   [`resolve_options`] runs the provider chain for a single call.
//! - [`Patterns`] holds the compiled matchers for one set of delimiters.
//! - [`ValueSet`] is what placeholders resolve against.
//! - [`Resolver`] and [`flatten_and_resolve`] follow chains of placeholders.
//! - [`Expression`] parses and evaluates expression bodies.
//! - [`Interpolator`] ties everything together.
//!
//! ## Quick Start
//!
//! ```rust
//! use interpolate_core::Interpolator;
//! use serde_json::json;
//!
//! let interpolator = Interpolator::new();
//! let document = json!({
//! 	"host": "example.com",
//! 	"url": "https://${host}/api",
//! 	"adult": "${= ${age} >= 18 =}",
//! });
//! let values = json!({ "age": 21 });
//!
//! let expanded = interpolator.expand(&document, Some(&values), None)?;
//! assert_eq!(expanded["url"], "https://example.com/api");
//! assert_eq!(expanded["adult"], "true");
//! # Ok::<(), interpolate_core::InterpolateError>(())
//! ```

pub use document::*;
pub use error::*;
pub use expression::*;
pub use interpolate::*;
pub use options::*;
pub use patterns::*;
pub use resolver::*;

mod document;
#[allow(unused_assignments)]
mod error;
mod expression;
mod interpolate;
mod options;
mod patterns;
mod resolver;

#[cfg(test)]
mod __fixtures;

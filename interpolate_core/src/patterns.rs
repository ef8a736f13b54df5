use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use regex::Captures;
use regex::Regex;

use crate::InterpolateResult;
use crate::Options;

/// Comparison operators accepted between expression operands, longest first
/// so that `===` is never read as `==` followed by `=`.
pub const COMPARISON_OPERATORS: [&str; 8] = ["===", "!==", "==", "!=", "<=", ">=", "<", ">"];

/// Characters allowed in an expression operand besides nested placeholders,
/// quoted literals and the sub-key pointer.
const OPERAND_CLASS: &str = r"[\w\s+\-*/%().]";

/// A single-quoted literal. Any character may appear inside the quotes.
const QUOTED_LITERAL: &str = r"'(?:[^'\\]|\\.)*'";

/// Turn a delimiter token into a pattern fragment that matches it literally.
/// Surrounding whitespace is ignored and an empty token yields an empty
/// fragment.
pub fn escape_delimiter(token: &str) -> String {
	regex::escape(token.trim())
}

/// The compiled matchers derived from one set of delimiters.
///
/// [`Regex`] keeps no scan position between calls, so every `is_match`,
/// `find_iter` or `replace_all` starts from the beginning of its input no
/// matter how often a cached set is reused.
#[derive(Debug, Clone)]
pub struct Patterns {
	/// A plain placeholder, e.g. `${ sub.key }`. The `path` group holds the
	/// untrimmed path.
	pub parameter: Regex,
	/// An expression placeholder, e.g. `${= ${age} >= 18 =}`. The `body`
	/// group holds the expression.
	pub function: Regex,
	/// Anything between the expression delimiters on one line, whether or
	/// not the body is well formed. Used to report bodies that `function`
	/// rejects.
	pub function_envelope: Regex,
	/// A quoted, escaped placeholder inside serialized text, e.g.
	/// `"${*name}"`. The `body` group holds everything between the escape
	/// specifier and the suffix.
	pub escape: Regex,
	/// A whole leaf value in escape form (without quotes), e.g. `${*name}`.
	pub escaped_leaf: Regex,
	/// A string-specifier placeholder, e.g. `${'name}`. `None` when the
	/// string specifier is empty.
	pub string: Option<Regex>,
	/// Tokens that reference values inside an expression body: quoted
	/// literals (left alone), placeholders and bare identifiers.
	pub reference: Regex,
}

impl Patterns {
	/// Build every matcher for `options`. Building is deterministic: the same
	/// options always produce the same patterns.
	pub fn build(options: &Options) -> InterpolateResult<Self> {
		let prefix = escape_delimiter(&options.prefix);
		let suffix = escape_delimiter(&options.suffix);
		let pointer = escape_delimiter(&options.sub_key_pointer);
		let func = escape_delimiter(&options.func_specifier);
		let escape = escape_delimiter(&options.escape_specifier);
		let string = escape_delimiter(&options.string_specifier);

		let path = format!(r"\s*\w+(?:{pointer}\w+)*\s*");
		let parameter = format!("{prefix}(?P<path>{path}){suffix}");
		let nested = format!("{prefix}{path}{suffix}");
		let operand = format!("(?:{nested}|{QUOTED_LITERAL}|{pointer}|{OPERAND_CLASS})+");
		let comparison = COMPARISON_OPERATORS
			.iter()
			.map(|operator| regex::escape(operator))
			.collect::<Vec<_>>()
			.join("|");
		let body = format!(r"\s*{operand}(?:\s*(?:{comparison})\s*{operand})*\s*");
		let escaped_body = format!("(?:{func})?{body}(?:{func})?");

		Ok(Self {
			parameter: Regex::new(&parameter)?,
			function: Regex::new(&format!("{prefix}{func}(?P<body>{body}){func}{suffix}"))?,
			function_envelope: Regex::new(&format!("{prefix}{func}(?P<body>.*?){func}{suffix}"))?,
			escape: Regex::new(&format!(
				r#""{prefix}{escape}(?P<body>{escaped_body}){suffix}""#
			))?,
			escaped_leaf: Regex::new(&format!(
				"^{prefix}{escape}(?P<body>{escaped_body}){suffix}$"
			))?,
			string: if string.is_empty() {
				None
			} else {
				Some(Regex::new(&format!(
					"{prefix}{string}(?P<path>{path}){suffix}"
				))?)
			},
			reference: Regex::new(&format!(
				r"(?P<quoted>{QUOTED_LITERAL})|{parameter}|(?P<ident>\b[A-Za-z_]\w*(?:{pointer}\w+)*)"
			))?,
		})
	}

	/// Whether `text` holds anything that needs resolving, including
	/// malformed expressions that must be reported.
	pub fn has_placeholders(&self, text: &str) -> bool {
		self.parameter.is_match(text)
			|| self.function.is_match(text)
			|| self.function_envelope.is_match(text)
	}

	/// The distinct paths referenced by `text`, in order of first appearance.
	/// This covers plain placeholders anywhere in the text and bare
	/// identifiers inside expression bodies.
	pub fn references(&self, text: &str) -> Vec<String> {
		let mut seen = HashSet::new();
		let mut paths = Vec::new();
		let mut push = |path: &str| {
			if seen.insert(path.to_string()) {
				paths.push(path.to_string());
			}
		};

		for captures in self.parameter.captures_iter(text) {
			push(captured_path(&captures));
		}

		for captures in self.function.captures_iter(text) {
			let body = captures.name("body").map_or("", |body| body.as_str());
			for reference in self.reference.captures_iter(body) {
				if let Some(ident) = reference.name("ident") {
					if !is_keyword(ident.as_str()) {
						push(ident.as_str());
					}
				}
			}
		}

		paths
	}
}

/// The trimmed `path` group of a parameter or string match.
pub(crate) fn captured_path<'t>(captures: &Captures<'t>) -> &'t str {
	captures.name("path").map_or("", |path| path.as_str().trim())
}

/// Literal words of the expression grammar that are never looked up.
pub(crate) fn is_keyword(ident: &str) -> bool {
	matches!(ident, "true" | "false")
}

/// Delimiter fields of [`Options`] that determine a [`Patterns`] set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternKey {
	prefix: String,
	suffix: String,
	sub_key_pointer: String,
	func_specifier: String,
	escape_specifier: String,
	string_specifier: String,
}

impl From<&Options> for PatternKey {
	fn from(options: &Options) -> Self {
		Self {
			prefix: options.prefix.clone(),
			suffix: options.suffix.clone(),
			sub_key_pointer: options.sub_key_pointer.clone(),
			func_specifier: options.func_specifier.clone(),
			escape_specifier: options.escape_specifier.clone(),
			string_specifier: options.string_specifier.clone(),
		}
	}
}

/// Compiled pattern sets shared between calls, keyed by delimiters. A set is
/// compiled the first time its delimiters are seen and reused afterwards.
#[derive(Debug, Default)]
pub struct PatternCache {
	entries: Mutex<HashMap<PatternKey, Arc<Patterns>>>,
}

impl PatternCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// The patterns for `options`, compiling them on first use.
	pub fn get(&self, options: &Options) -> InterpolateResult<Arc<Patterns>> {
		let key = PatternKey::from(options);
		let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

		if let Some(patterns) = entries.get(&key) {
			return Ok(Arc::clone(patterns));
		}

		let patterns = Arc::new(Patterns::build(options)?);
		entries.insert(key, Arc::clone(&patterns));

		Ok(patterns)
	}

	/// Number of distinct compiled pattern sets.
	pub fn len(&self) -> usize {
		self.entries
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

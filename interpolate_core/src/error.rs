use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum InterpolateError {
	#[error("bad request: {0}")]
	#[diagnostic(
		code(interpolate::bad_request),
		help("pass a value set when expanding a template that contains placeholders")
	)]
	BadRequest(String),

	#[error("failed to evaluate expression `{expression}`: {reason}")]
	#[diagnostic(
		code(interpolate::expression),
		help(
			"expressions support numbers, booleans, quoted strings, references, `+ - * / %`, \
			 parentheses and `== === != !== < > <= >=`"
		)
	)]
	Expression { expression: String, reason: String },

	#[error("cyclic reference detected while resolving `{path}`: {chain}")]
	#[diagnostic(
		code(interpolate::cyclic_reference),
		help("break the cycle so that no placeholder refers back to itself")
	)]
	CyclicReference { path: String, chain: String },

	#[error("reference chain for `{path}` is deeper than the limit of {limit}")]
	#[diagnostic(
		code(interpolate::depth_exceeded),
		help("raise `maxDepth` or flatten the chain of nested placeholders")
	)]
	DepthExceeded { path: String, limit: usize },

	#[error("invalid value for option `{key}`: `{value}`")]
	#[diagnostic(code(interpolate::invalid_option))]
	InvalidOption { key: String, value: String },

	#[error("failed to build placeholder matcher: {0}")]
	#[diagnostic(
		code(interpolate::pattern),
		help("check that the prefix, suffix and specifiers are distinct non-empty tokens")
	)]
	Pattern(#[from] regex::Error),

	#[error(transparent)]
	#[diagnostic(code(interpolate::json))]
	Json(#[from] serde_json::Error),
}

impl InterpolateError {
	pub(crate) fn expression(expression: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::Expression {
			expression: expression.into(),
			reason: reason.into(),
		}
	}
}

pub type InterpolateResult<T> = Result<T, InterpolateError>;

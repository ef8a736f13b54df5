use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::Environment;
use crate::InterpolateError;
use crate::InterpolateResult;
use crate::Options;
use crate::PartialOptions;
use crate::PatternCache;
use crate::Patterns;
use crate::ProcessEnvironment;
use crate::ResolutionCache;
use crate::ValueSet;
use crate::flatten_and_resolve;
use crate::resolve_options;
use crate::resolver::TextEncoding;
use crate::resolver::substitute_functions;
use crate::resolver::substitute_parameters;
use crate::resolver::wrap_string_specifiers;

/// Everything one `expand` call needs, computed once when the call starts
/// and passed explicitly to every step. Nothing in here is shared with other
/// calls.
#[derive(Debug, Clone)]
pub struct Context {
	pub options: Options,
	pub patterns: Arc<Patterns>,
	/// `true` when the caller-supplied values overrode options for this call.
	pub transient: bool,
}

impl Context {
	/// A context with freshly compiled patterns.
	pub fn new(options: Options) -> InterpolateResult<Self> {
		let patterns = Arc::new(Patterns::build(&options)?);

		Ok(Self {
			options,
			patterns,
			transient: false,
		})
	}
}

/// The interpolation engine.
///
/// An interpolator owns base options and a cache of compiled patterns. Each
/// call to [`Interpolator::expand`] snapshots the base options, layers the
/// call's own configuration on top and works only on that snapshot, so calls
/// from different threads never observe each other's overrides.
#[derive(Debug, Default)]
pub struct Interpolator {
	defaults: RwLock<Options>,
	patterns: PatternCache,
}

impl Interpolator {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_options(options: Options) -> Self {
		Self {
			defaults: RwLock::new(options),
			patterns: PatternCache::new(),
		}
	}

	/// A copy of the current base options.
	pub fn options(&self) -> Options {
		self.defaults
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	/// Install `partial` as part of the base options for all later calls.
	pub fn configure(&self, partial: &PartialOptions) -> InterpolateResult<()> {
		let mut defaults = self.defaults.write().unwrap_or_else(PoisonError::into_inner);
		*defaults = defaults.merged(partial)?;

		Ok(())
	}

	/// Toggle verbose resolution traces for later calls.
	pub fn set_debug(&self, debug: bool) {
		self.defaults
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.debug = debug;
	}

	/// Restore the built-in options, discarding anything installed with
	/// [`Interpolator::configure`] or [`Interpolator::set_debug`].
	pub fn reset_options(&self) {
		*self.defaults.write().unwrap_or_else(PoisonError::into_inner) = Options::default();
	}

	/// Number of distinct pattern sets compiled so far.
	pub fn compiled_patterns(&self) -> usize {
		self.patterns.len()
	}

	/// Build the context of one call.
	pub fn context(
		&self,
		document: &Value,
		values: Option<&Value>,
		options: Option<&PartialOptions>,
		environment: &dyn Environment,
	) -> InterpolateResult<Context> {
		let defaults = self.options();
		let resolved = resolve_options(
			options,
			values.and_then(Value::as_object),
			document.as_object(),
			environment,
			&defaults,
		)?;
		let patterns = self.patterns.get(&resolved.options)?;

		if resolved.options.debug && resolved.transient {
			tracing::debug!("option overrides from values apply to this call only");
		}

		Ok(Context {
			options: resolved.options,
			patterns,
			transient: resolved.transient,
		})
	}

	/// Resolve every placeholder in `document`.
	///
	/// - A string is treated as a template and rendered against `values`,
	///   which must be present when the template has placeholders.
	/// - An object or array is rendered against its own entries merged with
	///   `values` (which win on top-level collisions).
	/// - Anything else is returned unchanged.
	pub fn expand(
		&self,
		document: &Value,
		values: Option<&Value>,
		options: Option<&PartialOptions>,
	) -> InterpolateResult<Value> {
		self.expand_with_environment(document, values, options, &ProcessEnvironment)
	}

	/// [`Interpolator::expand`] reading `INTERPOLATE_OPTION_*` variables from
	/// `environment` instead of the process environment.
	pub fn expand_with_environment(
		&self,
		document: &Value,
		values: Option<&Value>,
		options: Option<&PartialOptions>,
		environment: &dyn Environment,
	) -> InterpolateResult<Value> {
		let overrides = checked_values(values)?;

		match document {
			Value::String(template) => {
				let context = self.context(document, overrides, options, environment)?;
				render_template(template, overrides, &context).map(Value::String)
			}
			Value::Object(_) | Value::Array(_) => {
				let context = self.context(document, overrides, options, environment)?;
				render_structured(document, overrides, &context)
			}
			other => {
				tracing::warn!(
					kind = value_kind(other),
					"interpolation is not implemented for this value, returning it unchanged"
				);
				Ok(other.clone())
			}
		}
	}

	/// Render a string template.
	pub fn expand_str(
		&self,
		template: &str,
		values: Option<&Value>,
		options: Option<&PartialOptions>,
	) -> InterpolateResult<String> {
		let document = Value::String(template.to_string());

		match self.expand(&document, values, options)? {
			Value::String(rendered) => Ok(rendered),
			other => Ok(other.to_string()),
		}
	}

	/// Round-trip any serializable document through [`Interpolator::expand`].
	pub fn expand_serde<T>(
		&self,
		document: &T,
		values: Option<&Value>,
		options: Option<&PartialOptions>,
	) -> InterpolateResult<T>
	where
		T: Serialize + DeserializeOwned,
	{
		let document = serde_json::to_value(document)?;
		let expanded = self.expand(&document, values, options)?;

		Ok(serde_json::from_value(expanded)?)
	}
}

fn checked_values(values: Option<&Value>) -> InterpolateResult<Option<&Value>> {
	match values {
		None | Some(Value::Null) => Ok(None),
		Some(Value::Object(_) | Value::Array(_)) => Ok(values),
		Some(other) => {
			Err(InterpolateError::BadRequest(format!(
				"`values` must be an object or an array, got {}",
				value_kind(other)
			)))
		}
	}
}

fn value_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

fn render_template(
	template: &str,
	values: Option<&Value>,
	context: &Context,
) -> InterpolateResult<String> {
	if context.options.debug {
		tracing::debug!(input = template, "expanding template");
	}

	let shielded = Shielded::new(template, values, context)?;
	let text = wrap_string_specifiers(&shielded.text, context, TextEncoding::Raw)?;

	if !context.patterns.has_placeholders(&text) {
		return Ok(shielded.restore(text));
	}

	if values.is_none() {
		let message = "please provide `values` to expand a template with placeholders";
		if context.options.debug {
			tracing::debug!(input = template, "{message}");
		}
		return Err(InterpolateError::BadRequest(message.to_string()));
	}

	let values = ValueSet::merge(None, values);
	let rendered = render(&text, &values, context, TextEncoding::Raw)?;

	Ok(shielded.restore(rendered))
}

fn render_structured(
	document: &Value,
	values: Option<&Value>,
	context: &Context,
) -> InterpolateResult<Value> {
	let serialized = serde_json::to_string(document)?;
	let shielded = Shielded::new(&serialized, values, context)?;
	let text = wrap_string_specifiers(&shielded.text, context, TextEncoding::Json)?;

	if !context.patterns.has_placeholders(&text) && shielded.escaped.is_empty() {
		return Ok(document.clone());
	}

	let values = ValueSet::merge(Some(document), values);
	let rendered = render(&text, &values, context, TextEncoding::Json)?;

	Ok(serde_json::from_str(&shielded.restore(rendered))?)
}

/// Resolve every path referenced by `text`, then substitute expressions and
/// plain placeholders, in that order.
fn render(
	text: &str,
	values: &ValueSet,
	context: &Context,
	encoding: TextEncoding,
) -> InterpolateResult<String> {
	let paths = context.patterns.references(text);

	if context.options.debug {
		tracing::debug!(paths = ?paths, "found placeholders");
		tracing::trace!(text, "before interpolation");
	}

	let cache = flatten_and_resolve(context, values, &paths, ResolutionCache::new())?;
	let evaluated = substitute_functions(text, context, &cache, encoding)?;
	let rendered = substitute_parameters(&evaluated, context, &cache, encoding)?;

	if context.options.debug {
		tracing::trace!(text = %rendered, "after interpolation");
	}

	Ok(rendered)
}

/// A text whose escaped placeholders have been swapped for opaque stand-ins,
/// so that no later pass can resolve them.
///
/// A stand-in is `{marker}{index}{marker}`, where `marker` is a private-use
/// character that occurs neither in the text nor in the values, so the only
/// occurrences of it after rendering are the stand-ins themselves.
struct Shielded {
	text: String,
	marker: char,
	/// The literal each stand-in is restored to, by index.
	escaped: Vec<String>,
}

impl Shielded {
	fn new(text: &str, values: Option<&Value>, context: &Context) -> InterpolateResult<Self> {
		let options = &context.options;
		let values = values.map(serde_json::to_string).transpose()?.unwrap_or_default();
		let Some(marker) = ('\u{E000}'..='\u{F8FF}')
			.find(|marker| !text.contains(*marker) && !values.contains(*marker))
		else {
			return Err(InterpolateError::BadRequest(
				"the input uses every private-use character, escaped placeholders cannot be shielded"
					.to_string(),
			));
		};

		let mut escaped = Vec::new();
		let text = context
			.patterns
			.escape
			.replace_all(text, |captures: &regex::Captures<'_>| {
				escaped.push(format!(
					"\"{}{}{}\"",
					options.prefix, &captures["body"], options.suffix
				));
				format!("{marker}{}{marker}", escaped.len() - 1)
			})
			.into_owned();

		Ok(Self {
			text,
			marker,
			escaped,
		})
	}

	fn restore(&self, mut text: String) -> String {
		let marker = self.marker;

		for (index, literal) in self.escaped.iter().enumerate() {
			text = text.replace(&format!("{marker}{index}{marker}"), literal);
		}

		text
	}
}

static INTERPOLATOR: LazyLock<Interpolator> = LazyLock::new(Interpolator::new);

/// The process-wide interpolator used by the free functions of this crate.
pub fn interpolator() -> &'static Interpolator {
	&INTERPOLATOR
}

/// Expand `document` with the process-wide interpolator.
///
/// ```rust
/// use interpolate_core::expand;
/// use serde_json::json;
///
/// let values = json!({ "name": "David", "age": 18 });
/// let result = expand(&json!("Hi, my name is '${name}'. I'm ${age}"), Some(&values), None)?;
/// assert_eq!(result, json!("Hi, my name is 'David'. I'm 18"));
/// # Ok::<(), interpolate_core::InterpolateError>(())
/// ```
pub fn expand(
	document: &Value,
	values: Option<&Value>,
	options: Option<&PartialOptions>,
) -> InterpolateResult<Value> {
	INTERPOLATOR.expand(document, values, options)
}

/// Render a string template with the process-wide interpolator.
pub fn expand_str(
	template: &str,
	values: Option<&Value>,
	options: Option<&PartialOptions>,
) -> InterpolateResult<String> {
	INTERPOLATOR.expand_str(template, values, options)
}

/// Toggle verbose traces on the process-wide interpolator.
pub fn set_debug(debug: bool) {
	INTERPOLATOR.set_debug(debug);
}

/// Install base options on the process-wide interpolator.
pub fn configure(partial: &PartialOptions) -> InterpolateResult<()> {
	INTERPOLATOR.configure(partial)
}

/// Restore the built-in options of the process-wide interpolator.
pub fn reset_options() {
	INTERPOLATOR.reset_options();
}

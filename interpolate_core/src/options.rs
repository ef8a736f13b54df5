use std::collections::HashMap;
use std::fmt::Display;
use std::hash::BuildHasher;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::InterpolateError;
use crate::InterpolateResult;

/// Prefix of the environment-style keys that configure a single call, e.g.
/// `INTERPOLATE_OPTION_PREFIX`.
pub const OPTION_ENV_PREFIX: &str = "INTERPOLATE_OPTION_";

/// Default ceiling for nested reference chains. `0` disables the ceiling.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Effective configuration of one `expand` call.
///
/// Delimiter tokens are stored trimmed. Values of this type are never
/// mutated while a call is in flight; every call works on its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
	/// Opening delimiter of a placeholder. Defaults to `${`.
	pub prefix: String,
	/// Closing delimiter of a placeholder. Defaults to `}`. May be empty, in
	/// which case a placeholder ends after its path.
	pub suffix: String,
	/// Separator between the segments of a nested path. Defaults to `.`.
	pub sub_key_pointer: String,
	/// Marks a placeholder as an expression: `${= age >= 18 =}`.
	pub func_specifier: String,
	/// Marks a quoted placeholder as literal text: `"${*name}"`.
	pub escape_specifier: String,
	/// Wraps the resolved value in this token: `${'name}` becomes `'David'`.
	/// An empty specifier disables the feature.
	pub string_specifier: String,
	/// Keep unresolvable placeholders verbatim instead of blanking them.
	pub keep_missing: bool,
	/// Maximum depth of nested reference chains, `0` for no limit.
	pub max_depth: usize,
	/// Emit verbose resolution traces.
	pub debug: bool,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			prefix: "${".to_string(),
			suffix: "}".to_string(),
			sub_key_pointer: ".".to_string(),
			func_specifier: "=".to_string(),
			escape_specifier: "*".to_string(),
			string_specifier: "'".to_string(),
			keep_missing: false,
			max_depth: DEFAULT_MAX_DEPTH,
			debug: false,
		}
	}
}

impl Options {
	/// Layer `partial` over these options without consulting any other
	/// provider.
	pub fn merged(&self, partial: &PartialOptions) -> InterpolateResult<Options> {
		let empty: HashMap<String, String> = HashMap::new();
		resolve_options(Some(partial), None, None, &empty, self).map(|resolved| resolved.options)
	}

	/// Re-synthesize the placeholder text for `path`.
	pub fn placeholder(&self, path: &str) -> String {
		format!("{}{path}{}", self.prefix, self.suffix)
	}
}

/// A partial set of options where every field is optional. Deserializes from
/// camelCase keys, e.g. `{"prefix": "{{", "subKeyPointer": "::"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialOptions {
	pub prefix: Option<String>,
	pub suffix: Option<String>,
	pub sub_key_pointer: Option<String>,
	pub func_specifier: Option<String>,
	pub escape_specifier: Option<String>,
	pub string_specifier: Option<String>,
	pub keep_missing: Option<bool>,
	pub max_depth: Option<usize>,
	pub debug: Option<bool>,
}

impl PartialOptions {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = Some(prefix.into());
		self
	}

	#[must_use]
	pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
		self.suffix = Some(suffix.into());
		self
	}

	#[must_use]
	pub fn sub_key_pointer(mut self, pointer: impl Into<String>) -> Self {
		self.sub_key_pointer = Some(pointer.into());
		self
	}

	#[must_use]
	pub fn keep_missing(mut self, keep_missing: bool) -> Self {
		self.keep_missing = Some(keep_missing);
		self
	}

	#[must_use]
	pub fn max_depth(mut self, max_depth: usize) -> Self {
		self.max_depth = Some(max_depth);
		self
	}

	#[must_use]
	pub fn debug(mut self, debug: bool) -> Self {
		self.debug = Some(debug);
		self
	}

	fn get(&self, key: OptionKey) -> Option<Value> {
		match key {
			OptionKey::Prefix => self.prefix.clone().map(Value::String),
			OptionKey::Suffix => self.suffix.clone().map(Value::String),
			OptionKey::SubKeyPointer => self.sub_key_pointer.clone().map(Value::String),
			OptionKey::FuncSpecifier => self.func_specifier.clone().map(Value::String),
			OptionKey::EscapeSpecifier => self.escape_specifier.clone().map(Value::String),
			OptionKey::StringSpecifier => self.string_specifier.clone().map(Value::String),
			OptionKey::KeepMissing => self.keep_missing.map(Value::Bool),
			OptionKey::MaxDepth => self.max_depth.map(Value::from),
			OptionKey::Debug => self.debug.map(Value::Bool),
		}
	}
}

/// Every recognized option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum OptionKey {
	Prefix,
	Suffix,
	SubKeyPointer,
	FuncSpecifier,
	EscapeSpecifier,
	StringSpecifier,
	KeepMissing,
	MaxDepth,
	Debug,
}

impl OptionKey {
	pub const ALL: [OptionKey; 9] = [
		OptionKey::Prefix,
		OptionKey::Suffix,
		OptionKey::SubKeyPointer,
		OptionKey::FuncSpecifier,
		OptionKey::EscapeSpecifier,
		OptionKey::StringSpecifier,
		OptionKey::KeepMissing,
		OptionKey::MaxDepth,
		OptionKey::Debug,
	];

	/// The camelCase name used in [`PartialOptions`] documents.
	pub fn name(self) -> &'static str {
		match self {
			OptionKey::Prefix => "prefix",
			OptionKey::Suffix => "suffix",
			OptionKey::SubKeyPointer => "subKeyPointer",
			OptionKey::FuncSpecifier => "funcSpecifier",
			OptionKey::EscapeSpecifier => "escapeSpecifier",
			OptionKey::StringSpecifier => "stringSpecifier",
			OptionKey::KeepMissing => "keepMissing",
			OptionKey::MaxDepth => "maxDepth",
			OptionKey::Debug => "debug",
		}
	}

	/// The environment-style key, e.g. `INTERPOLATE_OPTION_SUBKEYPOINTER`.
	pub fn env_name(self) -> String {
		format!("{OPTION_ENV_PREFIX}{}", self.name().to_ascii_uppercase())
	}
}

impl Display for OptionKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

/// The providers consulted for each option, highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionProvider {
	/// The options argument of the call.
	Explicit,
	/// `INTERPOLATE_OPTION_*` keys in the caller-supplied value set.
	Values,
	/// `INTERPOLATE_OPTION_*` keys among the top-level leaves of the document.
	Document,
	/// `INTERPOLATE_OPTION_*` process environment variables.
	Environment,
	/// The interpolator's base options.
	Defaults,
}

/// Read access to environment variables.
pub trait Environment {
	fn var(&self, key: &str) -> Option<String>;
}

/// The environment of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
	fn var(&self, key: &str) -> Option<String> {
		std::env::var(key).ok()
	}
}

impl<S: BuildHasher> Environment for HashMap<String, String, S> {
	fn var(&self, key: &str) -> Option<String> {
		self.get(key).cloned()
	}
}

/// One layer of the provider chain.
trait OptionSource {
	fn provider(&self) -> OptionProvider;
	fn get(&self, key: OptionKey) -> Option<Value>;
}

struct ExplicitSource<'a>(&'a PartialOptions);

impl OptionSource for ExplicitSource<'_> {
	fn provider(&self) -> OptionProvider {
		OptionProvider::Explicit
	}

	fn get(&self, key: OptionKey) -> Option<Value> {
		self.0.get(key)
	}
}

struct LeafSource<'a> {
	provider: OptionProvider,
	leaves: &'a Map<String, Value>,
}

impl OptionSource for LeafSource<'_> {
	fn provider(&self) -> OptionProvider {
		self.provider
	}

	fn get(&self, key: OptionKey) -> Option<Value> {
		self.leaves
			.get(&key.env_name())
			.filter(|value| !value.is_null())
			.cloned()
	}
}

struct EnvironmentSource<'a>(&'a dyn Environment);

impl OptionSource for EnvironmentSource<'_> {
	fn provider(&self) -> OptionProvider {
		OptionProvider::Environment
	}

	fn get(&self, key: OptionKey) -> Option<Value> {
		self.0.var(&key.env_name()).map(Value::String)
	}
}

struct DefaultsSource<'a>(&'a Options);

impl OptionSource for DefaultsSource<'_> {
	fn provider(&self) -> OptionProvider {
		OptionProvider::Defaults
	}

	fn get(&self, key: OptionKey) -> Option<Value> {
		let options = self.0;
		let value = match key {
			OptionKey::Prefix => Value::String(options.prefix.clone()),
			OptionKey::Suffix => Value::String(options.suffix.clone()),
			OptionKey::SubKeyPointer => Value::String(options.sub_key_pointer.clone()),
			OptionKey::FuncSpecifier => Value::String(options.func_specifier.clone()),
			OptionKey::EscapeSpecifier => Value::String(options.escape_specifier.clone()),
			OptionKey::StringSpecifier => Value::String(options.string_specifier.clone()),
			OptionKey::KeepMissing => Value::Bool(options.keep_missing),
			OptionKey::MaxDepth => Value::from(options.max_depth),
			OptionKey::Debug => Value::Bool(options.debug),
		};

		Some(value)
	}
}

/// The outcome of running the provider chain for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
	/// The effective options.
	pub options: Options,
	/// Which provider supplied each option.
	pub sources: HashMap<OptionKey, OptionProvider>,
	/// `true` when the caller-supplied values carried option keys. Such
	/// overrides apply to this call only.
	pub transient: bool,
}

impl ResolvedOptions {
	/// The provider that supplied `key`.
	pub fn source_of(&self, key: OptionKey) -> OptionProvider {
		self.sources
			.get(&key)
			.copied()
			.unwrap_or(OptionProvider::Defaults)
	}
}

/// Compute the effective options of a call.
///
/// For each key the first provider that defines it wins, in the order
/// explicit options, caller values, document leaves, environment, defaults.
/// A provider that sets `prefix` but not `suffix` implies an empty suffix.
pub fn resolve_options(
	explicit: Option<&PartialOptions>,
	values: Option<&Map<String, Value>>,
	document: Option<&Map<String, Value>>,
	environment: &dyn Environment,
	defaults: &Options,
) -> InterpolateResult<ResolvedOptions> {
	let mut chain: Vec<Box<dyn OptionSource + '_>> = Vec::with_capacity(5);

	if let Some(explicit) = explicit {
		chain.push(Box::new(ExplicitSource(explicit)));
	}

	if let Some(leaves) = values {
		chain.push(Box::new(LeafSource {
			provider: OptionProvider::Values,
			leaves,
		}));
	}

	if let Some(leaves) = document {
		chain.push(Box::new(LeafSource {
			provider: OptionProvider::Document,
			leaves,
		}));
	}

	chain.push(Box::new(EnvironmentSource(environment)));
	chain.push(Box::new(DefaultsSource(defaults)));

	let mut sources = HashMap::new();
	let lookup = |key: OptionKey| -> (Value, OptionProvider) {
		for source in &chain {
			if let Some(value) = source.get(key) {
				return (value, source.provider());
			}

			if key == OptionKey::Suffix && source.get(OptionKey::Prefix).is_some() {
				return (Value::String(String::new()), source.provider());
			}
		}

		(Value::Null, OptionProvider::Defaults)
	};

	let mut take = |key: OptionKey| {
		let (value, provider) = lookup(key);
		sources.insert(key, provider);
		(key, value)
	};

	let options = Options {
		prefix: required_token(take(OptionKey::Prefix))?,
		suffix: token(take(OptionKey::Suffix))?,
		sub_key_pointer: required_token(take(OptionKey::SubKeyPointer))?,
		func_specifier: required_token(take(OptionKey::FuncSpecifier))?,
		escape_specifier: required_token(take(OptionKey::EscapeSpecifier))?,
		string_specifier: token(take(OptionKey::StringSpecifier))?,
		keep_missing: flag(take(OptionKey::KeepMissing))?,
		max_depth: depth(take(OptionKey::MaxDepth))?,
		debug: flag(take(OptionKey::Debug))?,
	};

	let transient = values.is_some_and(|leaves| {
		leaves
			.keys()
			.any(|key| key.starts_with(OPTION_ENV_PREFIX))
	});

	Ok(ResolvedOptions {
		options,
		sources,
		transient,
	})
}

fn invalid(key: OptionKey, value: &Value) -> InterpolateError {
	InterpolateError::InvalidOption {
		key: key.name().to_string(),
		value: match value {
			Value::String(text) => text.clone(),
			other => other.to_string(),
		},
	}
}

fn token((key, value): (OptionKey, Value)) -> InterpolateResult<String> {
	match &value {
		Value::String(text) => Ok(text.trim().to_string()),
		Value::Number(number) => Ok(number.to_string()),
		_ => Err(invalid(key, &value)),
	}
}

fn required_token(entry: (OptionKey, Value)) -> InterpolateResult<String> {
	let (key, value) = (entry.0, entry.1.clone());
	let token = token(entry)?;

	if token.is_empty() {
		return Err(invalid(key, &value));
	}

	Ok(token)
}

fn flag((key, value): (OptionKey, Value)) -> InterpolateResult<bool> {
	match &value {
		Value::Bool(flag) => Ok(*flag),
		Value::String(text) => {
			match text.trim().to_ascii_lowercase().as_str() {
				"true" | "1" | "yes" | "on" => Ok(true),
				"false" | "0" | "no" | "off" | "" => Ok(false),
				_ => Err(invalid(key, &value)),
			}
		}
		Value::Number(number) => {
			match number.as_u64() {
				Some(0) => Ok(false),
				Some(1) => Ok(true),
				_ => Err(invalid(key, &value)),
			}
		}
		_ => Err(invalid(key, &value)),
	}
}

fn depth((key, value): (OptionKey, Value)) -> InterpolateResult<usize> {
	let parsed = match &value {
		Value::Number(number) => number.as_u64().and_then(|depth| usize::try_from(depth).ok()),
		Value::String(text) => text.trim().parse::<usize>().ok(),
		_ => None,
	};

	parsed.ok_or_else(|| invalid(key, &value))
}

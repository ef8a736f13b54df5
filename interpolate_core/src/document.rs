use derive_more::Deref;
use derive_more::DerefMut;
use float_cmp::approx_eq;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

use crate::Options;

/// The values placeholders resolve against: a document's top-level entries
/// with caller overrides layered on top.
#[derive(Debug, Clone, Default, PartialEq, Deref, DerefMut)]
pub struct ValueSet(Map<String, Value>);

/// The result of looking a path up in a [`ValueSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
	/// A string, number or boolean leaf, rendered as text.
	Found(String),
	/// The path does not lead to a scalar. Holds the text that stands in for
	/// the placeholder: empty, or the placeholder itself when missing values
	/// are kept.
	Missing(String),
}

impl ValueSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// The top-level entries of `document`. Arrays are keyed by index and any
	/// other value contributes nothing.
	pub fn from_document(document: &Value) -> Self {
		match document {
			Value::Object(map) => Self(map.clone()),
			Value::Array(items) => {
				Self(
					items
						.iter()
						.enumerate()
						.map(|(index, item)| (index.to_string(), item.clone()))
						.collect(),
				)
			}
			_ => Self::default(),
		}
	}

	/// Shallow merge of `document` and `overrides`. On a top-level key
	/// collision the override wins.
	pub fn merge(document: Option<&Value>, overrides: Option<&Value>) -> Self {
		let mut values = document.map(Self::from_document).unwrap_or_default();

		if let Some(overrides) = overrides {
			for (key, value) in Self::from_document(overrides).0 {
				values.0.insert(key, value);
			}
		}

		values
	}

	/// Walk `path`, split on the sub-key pointer, down to a scalar leaf. A key
	/// that literally equals the whole path takes precedence. Numeric
	/// segments index into arrays.
	pub fn traverse(&self, path: &str, options: &Options) -> Lookup {
		if let Some(text) = self.0.get(path).and_then(render_scalar) {
			return Lookup::Found(text);
		}

		let mut segments = path.split(options.sub_key_pointer.as_str());
		let mut current = segments.next().and_then(|first| self.0.get(first));

		for segment in segments {
			current = current.and_then(|parent| child(parent, segment));
		}

		match current.and_then(render_scalar) {
			Some(text) => Lookup::Found(text),
			None if options.keep_missing => Lookup::Missing(options.placeholder(path)),
			None => Lookup::Missing(String::new()),
		}
	}
}

impl From<Map<String, Value>> for ValueSet {
	fn from(map: Map<String, Value>) -> Self {
		Self(map)
	}
}

fn child<'v>(parent: &'v Value, segment: &str) -> Option<&'v Value> {
	match parent {
		Value::Object(map) => map.get(segment),
		Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
		_ => None,
	}
}

/// Render a string, number or boolean as substitution text. Other values
/// have no text form.
pub fn render_scalar(value: &Value) -> Option<String> {
	match value {
		Value::String(text) => Some(text.clone()),
		Value::Number(number) => Some(render_number(number)),
		Value::Bool(flag) => Some(flag.to_string()),
		_ => None,
	}
}

pub fn render_number(number: &Number) -> String {
	if let Some(integer) = number.as_i64() {
		return integer.to_string();
	}

	if let Some(integer) = number.as_u64() {
		return integer.to_string();
	}

	number.as_f64().map_or_else(|| number.to_string(), render_float)
}

/// Render a float the way configuration authors expect: whole numbers drop
/// their fractional part (`18`, not `18.0`).
pub fn render_float(value: f64) -> String {
	if value.is_nan() {
		return "NaN".to_string();
	}

	if value.is_infinite() {
		return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
	}

	if approx_eq!(f64, value.fract(), 0.0, ulps = 2) && value.abs() < 1e15 {
		return format!("{}", value as i64);
	}

	format!("{value}")
}

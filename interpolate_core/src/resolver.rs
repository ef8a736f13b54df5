use std::collections::HashMap;

use derive_more::Deref;
use derive_more::DerefMut;
use regex::Captures;
use regex::Regex;

use crate::Context;
use crate::Expression;
use crate::InterpolateError;
use crate::InterpolateResult;
use crate::Lookup;
use crate::ValueSet;
use crate::patterns::captured_path;

/// Resolved text of every placeholder path seen during one call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, DerefMut)]
pub struct ResolutionCache(HashMap<String, String>);

impl ResolutionCache {
	pub fn new() -> Self {
		Self::default()
	}
}

/// How substituted text is written into the text being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextEncoding {
	/// Inserted as is.
	Raw,
	/// Escaped as the content of a JSON string.
	Json,
}

impl TextEncoding {
	pub(crate) fn encode(self, text: &str) -> InterpolateResult<String> {
		match self {
			Self::Raw => Ok(text.to_string()),
			Self::Json => {
				let quoted = serde_json::to_string(text)?;
				Ok(quoted[1..quoted.len() - 1].to_string())
			}
		}
	}
}

/// Resolves placeholder paths against a [`ValueSet`], following chains of
/// placeholders whose values are themselves placeholders.
///
/// Every path is resolved at most once per resolver. Paths currently being
/// resolved are tracked so that a chain leading back to itself fails with
/// [`InterpolateError::CyclicReference`] instead of recursing forever.
pub struct Resolver<'a> {
	context: &'a Context,
	values: &'a ValueSet,
	cache: ResolutionCache,
	in_progress: Vec<String>,
}

impl<'a> Resolver<'a> {
	pub fn new(context: &'a Context, values: &'a ValueSet) -> Self {
		Self::with_cache(context, values, ResolutionCache::new())
	}

	/// Continue from a partially populated cache.
	pub fn with_cache(context: &'a Context, values: &'a ValueSet, cache: ResolutionCache) -> Self {
		Self {
			context,
			values,
			cache,
			in_progress: Vec::new(),
		}
	}

	pub fn cache(&self) -> &ResolutionCache {
		&self.cache
	}

	pub fn into_cache(self) -> ResolutionCache {
		self.cache
	}

	/// Resolve every path in iteration order. Paths already in the cache are
	/// skipped.
	pub fn resolve_all<I, S>(&mut self, paths: I) -> InterpolateResult<()>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		for path in paths {
			self.resolve(path.as_ref())?;
		}

		Ok(())
	}

	/// Resolve a single path into the cache.
	pub fn resolve(&mut self, path: &str) -> InterpolateResult<()> {
		if self.cache.contains_key(path) {
			return Ok(());
		}

		let context = self.context;
		let options = &context.options;
		let patterns = &context.patterns;

		let raw = match self.values.traverse(path, options) {
			Lookup::Found(raw) => raw,
			Lookup::Missing(text) => {
				if options.debug {
					tracing::debug!(path, "no value found for placeholder");
				}
				self.cache.insert(path.to_string(), text);
				return Ok(());
			}
		};

		if let Some(captures) = patterns.escaped_leaf.captures(&raw) {
			let literal = format!("{}{}{}", options.prefix, &captures["body"], options.suffix);
			self.cache.insert(path.to_string(), literal);
			return Ok(());
		}

		let raw = wrap_string_specifiers(&raw, context, TextEncoding::Raw)?;

		if !patterns.has_placeholders(&raw) {
			self.cache.insert(path.to_string(), raw);
			return Ok(());
		}

		if self.in_progress.iter().any(|pending| pending == path) {
			return Err(InterpolateError::CyclicReference {
				path: path.to_string(),
				chain: format!("{} -> {path}", self.in_progress.join(" -> ")),
			});
		}

		if options.max_depth > 0 && self.in_progress.len() >= options.max_depth {
			return Err(InterpolateError::DepthExceeded {
				path: path.to_string(),
				limit: options.max_depth,
			});
		}

		let nested: Vec<String> = patterns
			.references(&raw)
			.into_iter()
			.filter(|nested| !self.cache.contains_key(nested))
			.collect();

		self.in_progress.push(path.to_string());
		for nested_path in &nested {
			self.resolve(nested_path)?;
		}
		self.in_progress.pop();

		let evaluated = substitute_functions(&raw, context, &self.cache, TextEncoding::Raw)?;
		let value = substitute_parameters(&evaluated, context, &self.cache, TextEncoding::Raw)?;

		if options.debug {
			tracing::debug!(path, raw = %raw, value = %value, "resolved placeholder chain");
		}

		self.cache.insert(path.to_string(), value);

		Ok(())
	}
}

/// Resolve `paths` into `cache` and return the populated cache.
pub fn flatten_and_resolve<S: AsRef<str>>(
	context: &Context,
	values: &ValueSet,
	paths: &[S],
	cache: ResolutionCache,
) -> InterpolateResult<ResolutionCache> {
	let mut resolver = Resolver::with_cache(context, values, cache);
	resolver.resolve_all(paths)?;

	Ok(resolver.into_cache())
}

/// Rewrite `${'name}` into `'${name}'` so the resolved value ends up wrapped
/// in the string specifier.
pub(crate) fn wrap_string_specifiers(
	text: &str,
	context: &Context,
	encoding: TextEncoding,
) -> InterpolateResult<String> {
	let Some(string) = &context.patterns.string else {
		return Ok(text.to_string());
	};

	let options = &context.options;
	let quote = encoding.encode(&options.string_specifier)?;

	replace_each(string, text, |captures| {
		Ok(format!(
			"{quote}{}{quote}",
			options.placeholder(captured_path(captures))
		))
	})
}

/// Replace every expression placeholder in `text` with its evaluated value.
/// An expression whose body the grammar cannot match is an error rather
/// than being left in place.
pub(crate) fn substitute_functions(
	text: &str,
	context: &Context,
	cache: &ResolutionCache,
	encoding: TextEncoding,
) -> InterpolateResult<String> {
	reject_malformed_functions(text, context)?;

	replace_each(&context.patterns.function, text, |captures| {
		let expression = Expression::parse(&captures["body"], &context.patterns)?;
		let value = expression.evaluate(cache)?.to_string();

		if context.options.debug {
			tracing::debug!(expression = %expression.source, value = %value, "evaluated expression");
		}

		encoding.encode(&value)
	})
}

fn reject_malformed_functions(text: &str, context: &Context) -> InterpolateResult<()> {
	let patterns = &context.patterns;

	for envelope in patterns.function_envelope.captures_iter(text) {
		let Some(whole) = envelope.get(0) else {
			continue;
		};

		let well_formed = patterns
			.function
			.find_at(text, whole.start())
			.is_some_and(|found| found.start() == whole.start());

		if !well_formed {
			let body = envelope.name("body").map_or("", |body| body.as_str());
			return Err(InterpolateError::expression(
				body.trim(),
				"the expression contains characters outside the expression grammar",
			));
		}
	}

	Ok(())
}

/// Replace every plain placeholder in `text` with its cached value. Paths
/// missing from the cache become empty, or stay verbatim when missing values
/// are kept.
pub(crate) fn substitute_parameters(
	text: &str,
	context: &Context,
	cache: &ResolutionCache,
	encoding: TextEncoding,
) -> InterpolateResult<String> {
	replace_each(&context.patterns.parameter, text, |captures| {
		match cache.get(captured_path(captures)) {
			Some(value) => encoding.encode(value),
			None if context.options.keep_missing => Ok(captures[0].to_string()),
			None => Ok(String::new()),
		}
	})
}

/// Like [`Regex::replace_all`] with a fallible replacement.
pub(crate) fn replace_each<F>(regex: &Regex, text: &str, mut replacement: F) -> InterpolateResult<String>
where
	F: FnMut(&Captures<'_>) -> InterpolateResult<String>,
{
	let mut output = String::with_capacity(text.len());
	let mut last = 0;

	for captures in regex.captures_iter(text) {
		let Some(whole) = captures.get(0) else {
			continue;
		};

		output.push_str(&text[last..whole.start()]);
		output.push_str(&replacement(&captures)?);
		last = whole.end();
	}

	output.push_str(&text[last..]);

	Ok(output)
}

//! Evaluation of expression placeholders such as `${= ${age} >= 18 =}`.
//!
//! The body of an expression is tokenized, parsed into an [`Expr`] tree and
//! evaluated against the resolution cache. Nothing is ever handed to a
//! general-purpose interpreter, so an expression can only:
//!
//! - combine number, boolean and single-quoted string literals,
//! - read referenced values (placeholders or bare paths),
//! - use `+ - * / %`, unary `+`/`-` and parentheses,
//! - compare with `== === != !== < > <= >=`.

use std::cmp::Ordering;
use std::fmt::Display;

use float_cmp::approx_eq;
use logos::Logos;
use regex::Captures;
use snailquote::unescape;

use crate::InterpolateError;
use crate::InterpolateResult;
use crate::Patterns;
use crate::ResolutionCache;
use crate::document::render_float;
use crate::patterns::captured_path;
use crate::patterns::is_keyword;

/// Raw tokens of an expression body once references have been bound to
/// slots.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum RawToken {
	#[token("===")]
	StrictEqual,
	#[token("!==")]
	StrictNotEqual,
	#[token("==")]
	Equal,
	#[token("!=")]
	NotEqual,
	#[token("<=")]
	LessOrEqual,
	#[token(">=")]
	GreaterOrEqual,
	#[token("<")]
	Less,
	#[token(">")]
	Greater,
	#[token("+")]
	Plus,
	#[token("-")]
	Minus,
	#[token("*")]
	Star,
	#[token("/")]
	Slash,
	#[token("%")]
	Percent,
	#[token("(")]
	OpenParen,
	#[token(")")]
	CloseParen,
	#[token("true")]
	True,
	#[token("false")]
	False,
	#[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
	Number,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"@[0-9]+")]
	Slot,
}

/// Binary operators. Comparisons bind loosest, then `+ -`, then `* / %`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
	Add,
	Subtract,
	Multiply,
	Divide,
	Remainder,
	Equal,
	StrictEqual,
	NotEqual,
	StrictNotEqual,
	Less,
	LessOrEqual,
	Greater,
	GreaterOrEqual,
}

impl BinaryOperator {
	fn from_raw(raw: RawToken) -> Option<Self> {
		let operator = match raw {
			RawToken::Plus => Self::Add,
			RawToken::Minus => Self::Subtract,
			RawToken::Star => Self::Multiply,
			RawToken::Slash => Self::Divide,
			RawToken::Percent => Self::Remainder,
			RawToken::Equal => Self::Equal,
			RawToken::StrictEqual => Self::StrictEqual,
			RawToken::NotEqual => Self::NotEqual,
			RawToken::StrictNotEqual => Self::StrictNotEqual,
			RawToken::Less => Self::Less,
			RawToken::LessOrEqual => Self::LessOrEqual,
			RawToken::Greater => Self::Greater,
			RawToken::GreaterOrEqual => Self::GreaterOrEqual,
			_ => return None,
		};

		Some(operator)
	}

	fn is_comparison(self) -> bool {
		!matches!(
			self,
			Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Remainder
		)
	}

	fn is_additive(self) -> bool {
		matches!(self, Self::Add | Self::Subtract)
	}

	fn is_multiplicative(self) -> bool {
		matches!(self, Self::Multiply | Self::Divide | Self::Remainder)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
	Plus,
	Negate,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
	Literal(ExprValue),
	/// Index into [`Expression::references`].
	Reference(usize),
	Unary {
		operator: UnaryOperator,
		operand: Box<Expr>,
	},
	Binary {
		operator: BinaryOperator,
		left: Box<Expr>,
		right: Box<Expr>,
	},
}

/// A value produced while evaluating an expression.
#[derive(Debug, Clone)]
pub enum ExprValue {
	Number(f64),
	Bool(bool),
	Str(String),
}

impl PartialEq for ExprValue {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Number(value), Self::Number(other_value)) => {
				approx_eq!(f64, *value, *other_value, ulps = 2)
			}
			(Self::Bool(value), Self::Bool(other_value)) => value == other_value,
			(Self::Str(value), Self::Str(other_value)) => value == other_value,
			_ => false,
		}
	}
}

impl Display for ExprValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Number(number) => write!(f, "{}", render_float(*number)),
			Self::Bool(flag) => write!(f, "{flag}"),
			Self::Str(text) => write!(f, "{text}"),
		}
	}
}

impl ExprValue {
	/// Interpret resolved placeholder text: `true`/`false` become booleans,
	/// numeric text becomes a number and anything else stays a string.
	pub fn from_resolved(text: &str) -> Self {
		match text {
			"true" => Self::Bool(true),
			"false" => Self::Bool(false),
			_ => parse_numeric(text).map_or_else(|| Self::Str(text.to_string()), Self::Number),
		}
	}

	/// The numeric reading of this value. Booleans count as `1` and `0`.
	pub fn as_number(&self) -> Option<f64> {
		match self {
			Self::Number(number) => Some(*number),
			Self::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
			Self::Str(text) => parse_numeric(text),
		}
	}

	fn same_kind(&self, other: &Self) -> bool {
		std::mem::discriminant(self) == std::mem::discriminant(other)
	}
}

fn parse_numeric(text: &str) -> Option<f64> {
	let trimmed = text.trim();
	let numeric = !trimmed.is_empty()
		&& trimmed
			.bytes()
			.all(|byte| byte.is_ascii_digit() || matches!(byte, b'+' | b'-' | b'.' | b'e' | b'E'));

	if numeric { trimmed.parse().ok() } else { None }
}

/// Tokens with their payloads decoded.
#[derive(Debug, Clone, PartialEq)]
enum Token {
	Literal(ExprValue),
	Slot(usize),
	Operator(BinaryOperator),
	OpenParen,
	CloseParen,
}

/// A parsed expression body together with the paths it references.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
	/// The body as written, used in error messages.
	pub source: String,
	/// Paths of referenced values, indexed by [`Expr::Reference`].
	pub references: Vec<String>,
	pub root: Expr,
}

impl Expression {
	/// Parse an expression body. Placeholders and bare paths in the body are
	/// bound to reference slots.
	pub fn parse(body: &str, patterns: &Patterns) -> InterpolateResult<Self> {
		let source = body.trim().to_string();
		let (bound, references) = bind(body, patterns);
		let tokens = tokenize(&bound).map_err(|reason| InterpolateError::expression(&source, reason))?;
		let root = ExpressionParser::new(tokens)
			.parse()
			.map_err(|reason| InterpolateError::expression(&source, reason))?;

		Ok(Self {
			source,
			references,
			root,
		})
	}

	/// Evaluate against `cache`. A reference missing from the cache reads as
	/// an empty string.
	pub fn evaluate(&self, cache: &ResolutionCache) -> InterpolateResult<ExprValue> {
		let slots: Vec<ExprValue> = self
			.references
			.iter()
			.map(|path| {
				cache
					.get(path)
					.map_or_else(|| ExprValue::Str(String::new()), |text| ExprValue::from_resolved(text))
			})
			.collect();

		evaluate_expr(&self.root, &slots)
			.map_err(|reason| InterpolateError::expression(&self.source, reason))
	}
}

/// Parse and evaluate `body` in one step.
pub fn evaluate_expression(
	body: &str,
	patterns: &Patterns,
	cache: &ResolutionCache,
) -> InterpolateResult<ExprValue> {
	Expression::parse(body, patterns)?.evaluate(cache)
}

/// Replace every placeholder and bare path in `body` with a `@n` slot and
/// return the rewritten body with the slot paths. Quoted literals are left
/// untouched and a path used twice shares one slot.
fn bind(body: &str, patterns: &Patterns) -> (String, Vec<String>) {
	let mut references: Vec<String> = Vec::new();
	let bound = patterns
		.reference
		.replace_all(body, |captures: &Captures<'_>| {
			if captures.name("quoted").is_some() {
				return captures[0].to_string();
			}

			let path = match captures.name("ident") {
				Some(ident) if is_keyword(ident.as_str()) => return ident.as_str().to_string(),
				Some(ident) => ident.as_str(),
				None => captured_path(captures),
			};

			let index = if let Some(index) = references.iter().position(|known| known == path) {
				index
			} else {
				references.push(path.to_string());
				references.len() - 1
			};

			format!(" @{index} ")
		})
		.into_owned();

	(bound, references)
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
	let mut tokens = Vec::new();

	for (result, span) in RawToken::lexer(source).spanned() {
		let slice = &source[span];
		let Ok(raw) = result else {
			return Err(format!("unexpected input `{slice}`"));
		};

		let token = match raw {
			RawToken::OpenParen => Token::OpenParen,
			RawToken::CloseParen => Token::CloseParen,
			RawToken::True => Token::Literal(ExprValue::Bool(true)),
			RawToken::False => Token::Literal(ExprValue::Bool(false)),
			RawToken::Number => {
				let number = slice
					.parse::<f64>()
					.map_err(|e| format!("invalid number `{slice}`: {e}"))?;
				Token::Literal(ExprValue::Number(number))
			}
			RawToken::SingleQuotedString => {
				let text =
					unescape(slice).map_err(|e| format!("invalid string literal {slice}: {e}"))?;
				Token::Literal(ExprValue::Str(text))
			}
			RawToken::Slot => {
				let index = slice[1..]
					.parse::<usize>()
					.map_err(|e| format!("invalid reference `{slice}`: {e}"))?;
				Token::Slot(index)
			}
			operator => {
				let Some(operator) = BinaryOperator::from_raw(operator) else {
					return Err(format!("unexpected input `{slice}`"));
				};
				Token::Operator(operator)
			}
		};

		tokens.push(token);
	}

	Ok(tokens)
}

/// Recursive descent over the token stream.
///
/// ```text
/// comparison := additive (cmp additive)*
/// additive   := term (('+' | '-') term)*
/// term       := unary (('*' | '/' | '%') unary)*
/// unary      := ('+' | '-') unary | primary
/// primary    := literal | reference | '(' comparison ')'
/// ```
struct ExpressionParser {
	tokens: Vec<Token>,
	cursor: usize,
}

impl ExpressionParser {
	fn new(tokens: Vec<Token>) -> Self {
		Self { tokens, cursor: 0 }
	}

	fn parse(mut self) -> Result<Expr, String> {
		if self.tokens.is_empty() {
			return Err("empty expression".to_string());
		}

		let expr = self.parse_comparison()?;

		if let Some(token) = self.tokens.get(self.cursor) {
			return Err(format!("unexpected token {token:?} after expression"));
		}

		Ok(expr)
	}

	fn peek_operator(&self, accept: fn(BinaryOperator) -> bool) -> Option<BinaryOperator> {
		match self.tokens.get(self.cursor) {
			Some(Token::Operator(operator)) if accept(*operator) => Some(*operator),
			_ => None,
		}
	}

	fn binary_level(
		&mut self,
		accept: fn(BinaryOperator) -> bool,
		next: fn(&mut Self) -> Result<Expr, String>,
	) -> Result<Expr, String> {
		let mut left = next(self)?;

		while let Some(operator) = self.peek_operator(accept) {
			self.cursor += 1;
			let right = next(self)?;
			left = Expr::Binary {
				operator,
				left: Box::new(left),
				right: Box::new(right),
			};
		}

		Ok(left)
	}

	fn parse_comparison(&mut self) -> Result<Expr, String> {
		self.binary_level(BinaryOperator::is_comparison, Self::parse_additive)
	}

	fn parse_additive(&mut self) -> Result<Expr, String> {
		self.binary_level(BinaryOperator::is_additive, Self::parse_term)
	}

	fn parse_term(&mut self) -> Result<Expr, String> {
		self.binary_level(BinaryOperator::is_multiplicative, Self::parse_unary)
	}

	fn parse_unary(&mut self) -> Result<Expr, String> {
		let operator = match self.tokens.get(self.cursor) {
			Some(Token::Operator(BinaryOperator::Add)) => UnaryOperator::Plus,
			Some(Token::Operator(BinaryOperator::Subtract)) => UnaryOperator::Negate,
			_ => return self.parse_primary(),
		};

		self.cursor += 1;
		let operand = self.parse_unary()?;

		Ok(Expr::Unary {
			operator,
			operand: Box::new(operand),
		})
	}

	fn parse_primary(&mut self) -> Result<Expr, String> {
		let Some(token) = self.tokens.get(self.cursor).cloned() else {
			return Err("unexpected end of expression".to_string());
		};
		self.cursor += 1;

		match token {
			Token::Literal(value) => Ok(Expr::Literal(value)),
			Token::Slot(index) => Ok(Expr::Reference(index)),
			Token::OpenParen => {
				let expr = self.parse_comparison()?;
				match self.tokens.get(self.cursor) {
					Some(Token::CloseParen) => {
						self.cursor += 1;
						Ok(expr)
					}
					_ => Err("expected `)`".to_string()),
				}
			}
			other => Err(format!("unexpected token {other:?}")),
		}
	}
}

fn evaluate_expr(expr: &Expr, slots: &[ExprValue]) -> Result<ExprValue, String> {
	match expr {
		Expr::Literal(value) => Ok(value.clone()),
		Expr::Reference(index) => {
			slots
				.get(*index)
				.cloned()
				.ok_or_else(|| format!("unknown reference @{index}"))
		}
		Expr::Unary { operator, operand } => {
			let number = numeric(&evaluate_expr(operand, slots)?)?;
			Ok(ExprValue::Number(match operator {
				UnaryOperator::Plus => number,
				UnaryOperator::Negate => -number,
			}))
		}
		Expr::Binary {
			operator,
			left,
			right,
		} => {
			let left = evaluate_expr(left, slots)?;
			let right = evaluate_expr(right, slots)?;
			apply(*operator, &left, &right)
		}
	}
}

fn numeric(value: &ExprValue) -> Result<f64, String> {
	value
		.as_number()
		.ok_or_else(|| format!("`{value}` is not a number"))
}

fn apply(operator: BinaryOperator, left: &ExprValue, right: &ExprValue) -> Result<ExprValue, String> {
	let value = match operator {
		BinaryOperator::Add => {
			if matches!(left, ExprValue::Str(_)) || matches!(right, ExprValue::Str(_)) {
				ExprValue::Str(format!("{left}{right}"))
			} else {
				ExprValue::Number(numeric(left)? + numeric(right)?)
			}
		}
		BinaryOperator::Subtract => ExprValue::Number(numeric(left)? - numeric(right)?),
		BinaryOperator::Multiply => ExprValue::Number(numeric(left)? * numeric(right)?),
		BinaryOperator::Divide => {
			let divisor = numeric(right)?;
			if approx_eq!(f64, divisor, 0.0, ulps = 2) {
				return Err("division by zero".to_string());
			}
			ExprValue::Number(numeric(left)? / divisor)
		}
		BinaryOperator::Remainder => {
			let divisor = numeric(right)?;
			if approx_eq!(f64, divisor, 0.0, ulps = 2) {
				return Err("modulo by zero".to_string());
			}
			ExprValue::Number(numeric(left)? % divisor)
		}
		BinaryOperator::Equal => ExprValue::Bool(loose_equal(left, right)),
		BinaryOperator::NotEqual => ExprValue::Bool(!loose_equal(left, right)),
		BinaryOperator::StrictEqual => {
			ExprValue::Bool(left.same_kind(right) && loose_equal(left, right))
		}
		BinaryOperator::StrictNotEqual => {
			ExprValue::Bool(!(left.same_kind(right) && loose_equal(left, right)))
		}
		BinaryOperator::Less => ExprValue::Bool(order(left, right).is_some_and(Ordering::is_lt)),
		BinaryOperator::LessOrEqual => {
			ExprValue::Bool(order(left, right).is_some_and(Ordering::is_le))
		}
		BinaryOperator::Greater => ExprValue::Bool(order(left, right).is_some_and(Ordering::is_gt)),
		BinaryOperator::GreaterOrEqual => {
			ExprValue::Bool(order(left, right).is_some_and(Ordering::is_ge))
		}
	};

	Ok(value)
}

fn loose_equal(left: &ExprValue, right: &ExprValue) -> bool {
	match (left.as_number(), right.as_number()) {
		(Some(left), Some(right)) => approx_eq!(f64, left, right, ulps = 2),
		_ => left.to_string() == right.to_string(),
	}
}

fn order(left: &ExprValue, right: &ExprValue) -> Option<Ordering> {
	match (left.as_number(), right.as_number()) {
		(Some(left), Some(right)) => left.partial_cmp(&right),
		_ => Some(left.to_string().cmp(&right.to_string())),
	}
}

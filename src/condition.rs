// Closed expression grammar for the `conditional` step (spec.md §4.6.4).
//
// Grammar (informal):
//   expr       := comparison | call | literal | context_lookup | "(" expr ")"
//   comparison := operand ("==" | "!=" | "<" | "<=" | ">" | ">=") operand
//   call       := ident "(" (expr ("," expr)*)? ")"
//   literal    := "true" | "false" | number | string
//   lookup     := "context" "[" string "]"
//
// `and`/`or`/`not`/`file_exists`/`all_exist`/`is_newer` are the only
// recognized call names. This is intentionally not Turing-complete: the
// evaluator never executes arbitrary user code (spec.md §4.6.4).

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::capabilities::fs::FileSystem;
use crate::context::Context;
use crate::error::{RecipeError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
	Literal(Value),
	ContextLookup(String),
	Compare(Box<Expr>, CompareOp, Box<Expr>),
	And(Vec<Expr>),
	Or(Vec<Expr>),
	Not(Box<Expr>),
	FileExists(Box<Expr>),
	AllExist(Vec<Expr>),
	IsNewer(Box<Expr>, Box<Expr>),
	ArrayLit(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
}

/// Parse a condition string into an `Expr`. Invalid syntax yields
/// `ConditionError` (never a panic).
pub fn parse(source: &str) -> Result<Expr> {
	let tokens = tokenize(source)?;
	let mut parser = Parser { tokens, pos: 0 };
	let expr = parser.parse_expr()?;
	if parser.pos != parser.tokens.len() {
		return Err(RecipeError::ConditionError(format!(
			"unexpected trailing input in condition: {source:?}"
		)));
	}
	Ok(expr)
}

/// Evaluate a parsed expression to a boolean against `context`, resolving
/// `file_exists`/`all_exist`/`is_newer` through the `FileSystem` capability.
pub async fn eval(expr: &Expr, context: &Context, fs: &dyn FileSystem) -> Result<bool> {
	match eval_value(expr, context, fs).await? {
		Value::Bool(b) => Ok(b),
		other => Err(RecipeError::ConditionError(format!(
			"condition did not evaluate to a boolean: {other}"
		))),
	}
}

fn eval_value<'a>(
	expr: &'a Expr,
	context: &'a Context,
	fs: &'a dyn FileSystem,
) -> Pin<Box<dyn Future<Output = Result<Value>> + 'a>> {
	Box::pin(async move {
		match expr {
			Expr::Literal(v) => Ok(v.clone()),
			Expr::ContextLookup(key) => Ok(context.get(key)),
			Expr::ArrayLit(items) => {
				let mut values = Vec::with_capacity(items.len());
				for item in items {
					values.push(eval_value(item, context, fs).await?);
				}
				Ok(Value::Array(values))
			},
			Expr::Compare(lhs, op, rhs) => {
				let l = eval_value(lhs, context, fs).await?;
				let r = eval_value(rhs, context, fs).await?;
				Ok(Value::Bool(compare(&l, *op, &r)?))
			},
			Expr::And(items) => {
				for item in items {
					if !matches!(eval_value(item, context, fs).await?, Value::Bool(true)) {
						return Ok(Value::Bool(false));
					}
				}
				Ok(Value::Bool(true))
			},
			Expr::Or(items) => {
				for item in items {
					if matches!(eval_value(item, context, fs).await?, Value::Bool(true)) {
						return Ok(Value::Bool(true));
					}
				}
				Ok(Value::Bool(false))
			},
			Expr::Not(inner) => {
				let v = eval_value(inner, context, fs).await?;
				match v {
					Value::Bool(b) => Ok(Value::Bool(!b)),
					other => Err(RecipeError::ConditionError(format!("not() expects a boolean, got {other}"))),
				}
			},
			Expr::FileExists(path) => {
				let path = as_string(eval_value(path, context, fs).await?)?;
				Ok(Value::Bool(fs.exists(&path).await))
			},
			Expr::AllExist(paths) => {
				for path_expr in paths {
					let path = as_string(eval_value(path_expr, context, fs).await?)?;
					if !fs.exists(&path).await {
						return Ok(Value::Bool(false));
					}
				}
				Ok(Value::Bool(true))
			},
			Expr::IsNewer(a, b) => {
				let a = as_string(eval_value(a, context, fs).await?)?;
				let b = as_string(eval_value(b, context, fs).await?)?;
				let a_time = fs
					.modified_time(&a)
					.await
					.map_err(|e| RecipeError::ConditionError(format!("is_newer: {e}")))?;
				let b_time = fs
					.modified_time(&b)
					.await
					.map_err(|e| RecipeError::ConditionError(format!("is_newer: {e}")))?;
				Ok(Value::Bool(a_time > b_time))
			},
		}
	})
}

fn as_string(value: Value) -> Result<String> {
	match value {
		Value::String(s) => Ok(s),
		other => Err(RecipeError::ConditionError(format!("expected a path string, got {other}"))),
	}
}

fn compare(lhs: &Value, op: CompareOp, rhs: &Value) -> Result<bool> {
	use CompareOp::*;
	if matches!(op, Eq) {
		return Ok(lhs == rhs);
	}
	if matches!(op, Ne) {
		return Ok(lhs != rhs);
	}
	let (l, r) = match (lhs.as_f64(), rhs.as_f64()) {
		(Some(l), Some(r)) => (l, r),
		_ => match (lhs.as_str(), rhs.as_str()) {
			(Some(l), Some(r)) => {
				return Ok(match op {
					Lt => l < r,
					Le => l <= r,
					Gt => l > r,
					Ge => l >= r,
					Eq | Ne => unreachable!(),
				});
			},
			_ => {
				return Err(RecipeError::ConditionError(format!(
					"cannot order-compare {lhs} and {rhs}"
				)));
			},
		},
	};
	Ok(match op {
		Lt => l < r,
		Le => l <= r,
		Gt => l > r,
		Ge => l >= r,
		Eq | Ne => unreachable!(),
	})
}

// --- tokenizer ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
	Ident(String),
	String(String),
	Number(f64),
	LParen,
	RParen,
	LBracket,
	RBracket,
	Comma,
	Op(CompareOp),
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
	let chars: Vec<char> = source.chars().collect();
	let mut tokens = Vec::new();
	let mut i = 0;
	while i < chars.len() {
		let c = chars[i];
		match c {
			c if c.is_whitespace() => i += 1,
			'(' => {
				tokens.push(Token::LParen);
				i += 1;
			},
			')' => {
				tokens.push(Token::RParen);
				i += 1;
			},
			'[' => {
				tokens.push(Token::LBracket);
				i += 1;
			},
			']' => {
				tokens.push(Token::RBracket);
				i += 1;
			},
			',' => {
				tokens.push(Token::Comma);
				i += 1;
			},
			'"' | '\'' => {
				let quote = c;
				let mut s = String::new();
				i += 1;
				while i < chars.len() && chars[i] != quote {
					if chars[i] == '\\' && i + 1 < chars.len() {
						i += 1;
					}
					s.push(chars[i]);
					i += 1;
				}
				if i >= chars.len() {
					return Err(RecipeError::ConditionError(format!("unterminated string in: {source}")));
				}
				i += 1; // closing quote
				tokens.push(Token::String(s));
			},
			'=' if chars.get(i + 1) == Some(&'=') => {
				tokens.push(Token::Op(CompareOp::Eq));
				i += 2;
			},
			'!' if chars.get(i + 1) == Some(&'=') => {
				tokens.push(Token::Op(CompareOp::Ne));
				i += 2;
			},
			'<' if chars.get(i + 1) == Some(&'=') => {
				tokens.push(Token::Op(CompareOp::Le));
				i += 2;
			},
			'>' if chars.get(i + 1) == Some(&'=') => {
				tokens.push(Token::Op(CompareOp::Ge));
				i += 2;
			},
			'<' => {
				tokens.push(Token::Op(CompareOp::Lt));
				i += 1;
			},
			'>' => {
				tokens.push(Token::Op(CompareOp::Gt));
				i += 1;
			},
			c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
				let start = i;
				i += 1;
				while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
					i += 1;
				}
				let text: String = chars[start..i].iter().collect();
				let n: f64 = text
					.parse()
					.map_err(|_| RecipeError::ConditionError(format!("invalid number: {text}")))?;
				tokens.push(Token::Number(n));
			},
			c if c.is_alphabetic() || c == '_' => {
				let start = i;
				while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
					i += 1;
				}
				tokens.push(Token::Ident(chars[start..i].iter().collect()));
			},
			other => {
				return Err(RecipeError::ConditionError(format!(
					"unexpected character {other:?} in condition: {source}"
				)));
			},
		}
	}
	Ok(tokens)
}

// --- recursive-descent parser -------------------------------------------

struct Parser {
	tokens: Vec<Token>,
	pos: usize,
}

impl Parser {
	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.pos)
	}

	fn bump(&mut self) -> Option<Token> {
		let t = self.tokens.get(self.pos).cloned();
		self.pos += 1;
		t
	}

	fn expect(&mut self, expected: &Token) -> Result<()> {
		match self.bump() {
			Some(ref t) if t == expected => Ok(()),
			other => Err(RecipeError::ConditionError(format!(
				"expected {expected:?}, got {other:?}"
			))),
		}
	}

	fn parse_expr(&mut self) -> Result<Expr> {
		let lhs = self.parse_primary()?;
		if let Some(Token::Op(op)) = self.peek().cloned() {
			self.bump();
			let rhs = self.parse_primary()?;
			return Ok(Expr::Compare(Box::new(lhs), op, Box::new(rhs)));
		}
		Ok(lhs)
	}

	fn parse_primary(&mut self) -> Result<Expr> {
		match self.bump() {
			Some(Token::Number(n)) => Ok(Expr::Literal(Value::from(n))),
			Some(Token::String(s)) => Ok(Expr::Literal(Value::String(s))),
			Some(Token::LParen) => {
				let inner = self.parse_expr()?;
				self.expect(&Token::RParen)?;
				Ok(inner)
			},
			Some(Token::LBracket) => {
				let mut items = Vec::new();
				if self.peek() != Some(&Token::RBracket) {
					items.push(self.parse_expr()?);
					while self.peek() == Some(&Token::Comma) {
						self.bump();
						items.push(self.parse_expr()?);
					}
				}
				self.expect(&Token::RBracket)?;
				Ok(Expr::ArrayLit(items))
			},
			Some(Token::Ident(name)) => self.parse_ident(name),
			other => Err(RecipeError::ConditionError(format!("unexpected token: {other:?}"))),
		}
	}

	fn parse_ident(&mut self, name: String) -> Result<Expr> {
		match name.as_str() {
			"true" => Ok(Expr::Literal(Value::Bool(true))),
			"false" => Ok(Expr::Literal(Value::Bool(false))),
			"context" => {
				self.expect(&Token::LBracket)?;
				let key = match self.bump() {
					Some(Token::String(s)) => s,
					other => {
						return Err(RecipeError::ConditionError(format!(
							"context[...] expects a string key, got {other:?}"
						)));
					},
				};
				self.expect(&Token::RBracket)?;
				Ok(Expr::ContextLookup(key))
			},
			"and" | "or" => {
				let args = self.parse_call_args()?;
				if name == "and" {
					Ok(Expr::And(args))
				} else {
					Ok(Expr::Or(args))
				}
			},
			"not" => {
				let mut args = self.parse_call_args()?;
				if args.len() != 1 {
					return Err(RecipeError::ConditionError("not() expects exactly one argument".into()));
				}
				Ok(Expr::Not(Box::new(args.remove(0))))
			},
			"file_exists" => {
				let mut args = self.parse_call_args()?;
				if args.len() != 1 {
					return Err(RecipeError::ConditionError("file_exists() expects exactly one argument".into()));
				}
				Ok(Expr::FileExists(Box::new(args.remove(0))))
			},
			"all_exist" => {
				let mut args = self.parse_call_args()?;
				if args.len() != 1 {
					return Err(RecipeError::ConditionError("all_exist() expects exactly one argument".into()));
				}
				match args.remove(0) {
					Expr::ArrayLit(items) => Ok(Expr::AllExist(items)),
					other => Ok(Expr::AllExist(vec![other])),
				}
			},
			"is_newer" => {
				let mut args = self.parse_call_args()?;
				if args.len() != 2 {
					return Err(RecipeError::ConditionError("is_newer() expects exactly two arguments".into()));
				}
				let b = args.remove(1);
				let a = args.remove(0);
				Ok(Expr::IsNewer(Box::new(a), Box::new(b)))
			},
			other => Err(RecipeError::ConditionError(format!("unknown identifier in condition: {other}"))),
		}
	}

	fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
		self.expect(&Token::LParen)?;
		let mut args = Vec::new();
		if self.peek() != Some(&Token::RParen) {
			args.push(self.parse_expr()?);
			while self.peek() == Some(&Token::Comma) {
				self.bump();
				args.push(self.parse_expr()?);
			}
		}
		self.expect(&Token::RParen)?;
		Ok(args)
	}
}

// Liquid-dialect template resolution against a Context (spec.md §4.2).

use liquid::ParserBuilder;
use once_cell::sync::Lazy;

use crate::context::Context;
use crate::error::{RecipeError, Result};

/// Process-wide Liquid parser, built once. Step implementations never
/// hold their own parser instance; they go through `render`.
static PARSER: Lazy<liquid::Parser> = Lazy::new(|| {
	ParserBuilder::with_stdlib()
		.build()
		.expect("liquid stdlib parser builds unconditionally")
});

/// Resolves `{{ … }}` / `{% … %}` expressions in `template` against
/// `context`'s artifacts (plus a reserved `config` key exposing the
/// context's config map). Missing paths render as empty strings; only
/// a syntactically invalid template produces a `TemplateError`.
pub fn render(template: &str, context: &Context) -> Result<String> {
	// Cheap escape hatch: literal strings with no template markers never
	// touch the parser, preserving template-idempotence-on-literals even
	// for strings Liquid would otherwise choke on (stray `{` in content).
	if !template.contains("{{") && !template.contains("{%") {
		return Ok(template.to_string());
	}

	let parsed = PARSER
		.parse(template)
		.map_err(|e| RecipeError::TemplateError(e.to_string()))?;

	let globals = liquid::Object::from_iter(
		context
			.template_object()
			.into_iter()
			.map(|(k, v)| (k.into(), json_to_liquid(v))),
	);

	parsed
		.render(&globals)
		.map_err(|e| RecipeError::TemplateError(e.to_string()))
}

/// Recursively renders every string leaf of `value` against `context`,
/// leaving other JSON types untouched. Used wherever a config field is a
/// structured value (MCP server selectors, tool arguments) whose string
/// members are individually templated rather than the field as a whole.
pub fn render_value(value: &serde_json::Value, context: &Context) -> Result<serde_json::Value> {
	use serde_json::Value as V;
	match value {
		V::String(s) => Ok(V::String(render(s, context)?)),
		V::Array(items) => items.iter().map(|v| render_value(v, context)).collect::<Result<Vec<_>>>().map(V::Array),
		V::Object(map) => {
			let mut out = serde_json::Map::with_capacity(map.len());
			for (k, v) in map {
				out.insert(k.clone(), render_value(v, context)?);
			}
			Ok(V::Object(out))
		},
		other => Ok(other.clone()),
	}
}

fn json_to_liquid(value: serde_json::Value) -> liquid::model::Value {
	use liquid::model::Value as LV;
	match value {
		serde_json::Value::Null => LV::Nil,
		serde_json::Value::Bool(b) => LV::scalar(b),
		serde_json::Value::Number(n) => {
			if let Some(i) = n.as_i64() {
				LV::scalar(i)
			} else {
				LV::scalar(n.as_f64().unwrap_or(0.0))
			}
		},
		serde_json::Value::String(s) => LV::scalar(s),
		serde_json::Value::Array(items) => {
			LV::Array(items.into_iter().map(json_to_liquid).collect())
		},
		serde_json::Value::Object(map) => LV::Object(liquid::Object::from_iter(
			map.into_iter().map(|(k, v)| (k.into(), json_to_liquid(v))),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn ctx_with(key: &str, value: serde_json::Value) -> Context {
		let mut ctx = Context::empty();
		ctx.set(key, value);
		ctx
	}

	#[test]
	fn literal_strings_are_idempotent() {
		let ctx = Context::empty();
		assert_eq!(render("hello world", &ctx).unwrap(), "hello world");
		assert_eq!(render("", &ctx).unwrap(), "");
	}

	#[test]
	fn substitutes_simple_variable() {
		let ctx = ctx_with("name", json!("world"));
		assert_eq!(render("hello {{name}}", &ctx).unwrap(), "hello world");
	}

	#[test]
	fn missing_path_renders_empty() {
		let ctx = Context::empty();
		assert_eq!(render("[{{missing}}]", &ctx).unwrap(), "[]");
	}

	#[test]
	fn default_filter_applies() {
		let ctx = Context::empty();
		assert_eq!(
			render("{{missing | default: \"x\"}}", &ctx).unwrap(),
			"x"
		);
	}

	#[test]
	fn dotted_and_bracketed_paths_resolve() {
		let ctx = ctx_with("obj", json!({"inner": {"v": 3}}));
		assert_eq!(render("{{obj.inner.v}}", &ctx).unwrap(), "3");
		assert_eq!(render("{{obj[\"inner\"][\"v\"]}}", &ctx).unwrap(), "3");
	}

	#[test]
	fn config_is_exposed_under_reserved_key() {
		let mut ctx = Context::empty();
		ctx.set("unused", json!(null));
		let ctx = Context::new(ctx.snapshot(), {
			let mut m = serde_json::Map::new();
			m.insert("model".to_string(), json!("stub/echo"));
			m
		});
		assert_eq!(render("{{config.model}}", &ctx).unwrap(), "stub/echo");
	}

	#[test]
	fn render_value_walks_nested_strings() {
		let ctx = ctx_with("name", json!("world"));
		let rendered = render_value(&json!({"greeting": "hi {{name}}", "count": 3, "tags": ["{{name}}"]}), &ctx).unwrap();
		assert_eq!(rendered, json!({"greeting": "hi world", "count": 3, "tags": ["world"]}));
	}

	#[test]
	fn invalid_template_is_a_template_error() {
		let ctx = Context::empty();
		let err = render("{% if %}", &ctx).unwrap_err();
		assert!(matches!(err, RecipeError::TemplateError(_)));
	}
}

// Compiles an LLM `output_format` value into a runtime validator and
// the typed result it produces (spec.md §4.3).

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{RecipeError, Result};

/// A file-like result produced by LLM calls, consumed by `write_files`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FileSpec {
	pub path: String,
	pub content: String,
}

/// `{ files: [FileSpec...], commentary: Option<String> }`, the canonical
/// "files" output shape.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FileGenerationResult {
	pub files: Vec<FileSpec>,
	#[serde(default)]
	pub commentary: Option<String>,
}

/// Primitive/recursive shape for a single object property or list item.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertySchema {
	String,
	Integer,
	Number,
	Boolean,
	Object(ObjectSchema),
	Array(Box<PropertySchema>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
	pub properties: HashMap<String, PropertySchema>,
	pub required: Vec<String>,
}

/// Compiled validator — the runtime counterpart of an `output_format`
/// value. Compilation is pure: identical input schemas compile to
/// structurally identical validators.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
	Text,
	Files,
	Object(ObjectSchema),
	List(Box<PropertySchema>),
}

/// The validated value a `Validator` produces, ready to be stored at
/// `output_key` by `LLMGenerateStep`.
#[derive(Debug, Clone)]
pub enum OutputShape {
	Text(String),
	Files(Vec<FileSpec>),
	Object(Map<String, Value>),
	List(Vec<Value>),
}

impl OutputShape {
	/// The value actually stored at `output_key` (step 5/6 of §4.8:
	/// "files" unwraps to the file list, "list" unwraps to its items).
	pub fn into_stored_value(self) -> Value {
		match self {
			OutputShape::Text(s) => Value::String(s),
			OutputShape::Files(files) => {
				serde_json::to_value(files).expect("FileSpec is always serializable")
			},
			OutputShape::Object(m) => Value::Object(m),
			OutputShape::List(items) => Value::Array(items),
		}
	}
}

pub struct SchemaCompiler;

impl SchemaCompiler {
	/// Compile an `output_format` value into a `Validator`.
	pub fn compile(schema: &Value) -> Result<Validator> {
		match schema {
			Value::String(s) if s == "text" => Ok(Validator::Text),
			Value::String(s) if s == "files" => Ok(Validator::Files),
			Value::String(other) => Err(RecipeError::SchemaError(format!(
				"unsupported output_format string literal: {other:?} (expected \"text\" or \"files\")"
			))),
			Value::Array(items) => {
				let item_schema = items.first().ok_or_else(|| {
					RecipeError::SchemaError("list output_format must have exactly one item schema".into())
				})?;
				Ok(Validator::List(Box::new(Self::compile_property(item_schema)?)))
			},
			Value::Object(map) => {
				let object_schema = Self::compile_object(map)?;
				Ok(Validator::Object(object_schema))
			},
			other => Err(RecipeError::SchemaError(format!(
				"output_format must be \"text\", \"files\", an object schema, or a single-element array; got {other}"
			))),
		}
	}

	fn compile_object(map: &Map<String, Value>) -> Result<ObjectSchema> {
		let ty = map.get("type").and_then(Value::as_str);
		if ty != Some("object") {
			return Err(RecipeError::SchemaError(
				"object output_format must declare type: \"object\"".into(),
			));
		}

		let properties = map
			.get("properties")
			.and_then(Value::as_object)
			.ok_or_else(|| RecipeError::SchemaError("object schema missing properties".into()))?;

		let mut compiled = HashMap::with_capacity(properties.len());
		for (name, prop_schema) in properties {
			compiled.insert(name.clone(), Self::compile_property(prop_schema)?);
		}

		let required = map
			.get("required")
			.and_then(Value::as_array)
			.map(|arr| arr.iter().filter_map(Value::as_str).map(String::from).collect())
			.unwrap_or_default();

		Ok(ObjectSchema { properties: compiled, required })
	}

	fn compile_property(schema: &Value) -> Result<PropertySchema> {
		let map = schema
			.as_object()
			.ok_or_else(|| RecipeError::SchemaError(format!("property schema must be an object: {schema}")))?;

		let ty = map
			.get("type")
			.and_then(Value::as_str)
			.ok_or_else(|| RecipeError::SchemaError(format!("property schema omits \"type\": {schema}")))?;

		match ty {
			"string" => Ok(PropertySchema::String),
			"integer" => Ok(PropertySchema::Integer),
			"number" => Ok(PropertySchema::Number),
			"boolean" => Ok(PropertySchema::Boolean),
			"object" => Ok(PropertySchema::Object(Self::compile_object(map)?)),
			"array" => {
				let items = map
					.get("items")
					.ok_or_else(|| RecipeError::SchemaError("array property schema omits \"items\"".into()))?;
				Ok(PropertySchema::Array(Box::new(Self::compile_property(items)?)))
			},
			other => Err(RecipeError::SchemaError(format!("unsupported property type: {other}"))),
		}
	}

	/// Validate a raw value returned by an `LLMProvider` against a
	/// compiled validator, producing the typed carrier it describes.
	pub fn validate(validator: &Validator, value: &Value) -> Result<OutputShape> {
		match validator {
			Validator::Text => value
				.as_str()
				.map(|s| OutputShape::Text(s.to_string()))
				.ok_or_else(|| RecipeError::SchemaError(format!("expected a string, got {value}"))),
			Validator::Files => {
				let result: FileGenerationResult = serde_json::from_value(value.clone())
					.map_err(|e| RecipeError::SchemaError(format!("expected {{files: [...]}}: {e}")))?;
				Ok(OutputShape::Files(result.files))
			},
			Validator::Object(schema) => {
				let map = value
					.as_object()
					.ok_or_else(|| RecipeError::SchemaError(format!("expected an object, got {value}")))?;
				Self::validate_object(schema, map)?;
				Ok(OutputShape::Object(map.clone()))
			},
			Validator::List(item_schema) => {
				let items = value
					.as_array()
					.ok_or_else(|| RecipeError::SchemaError(format!("expected a list, got {value}")))?;
				for item in items {
					Self::validate_property(item_schema, item)?;
				}
				Ok(OutputShape::List(items.clone()))
			},
		}
	}

	fn validate_object(schema: &ObjectSchema, map: &Map<String, Value>) -> Result<()> {
		for required_field in &schema.required {
			if !map.contains_key(required_field) {
				return Err(RecipeError::SchemaError(format!(
					"missing required field: {required_field}"
				)));
			}
		}
		for (name, prop_schema) in &schema.properties {
			if let Some(value) = map.get(name) {
				Self::validate_property(prop_schema, value)
					.map_err(|e| RecipeError::SchemaError(format!("field {name}: {e}")))?;
			}
		}
		Ok(())
	}

	fn validate_property(schema: &PropertySchema, value: &Value) -> Result<()> {
		let ok = match schema {
			PropertySchema::String => value.is_string(),
			PropertySchema::Integer => value.is_i64() || value.is_u64(),
			PropertySchema::Number => value.is_number(),
			PropertySchema::Boolean => value.is_boolean(),
			PropertySchema::Object(inner) => {
				let map = value
					.as_object()
					.ok_or_else(|| RecipeError::SchemaError(format!("expected an object, got {value}")))?;
				Self::validate_object(inner, map)?;
				true
			},
			PropertySchema::Array(item_schema) => {
				let items = value
					.as_array()
					.ok_or_else(|| RecipeError::SchemaError(format!("expected an array, got {value}")))?;
				for item in items {
					Self::validate_property(item_schema, item)?;
				}
				true
			},
		};
		if ok {
			Ok(())
		} else {
			Err(RecipeError::SchemaError(format!("type mismatch for value {value}")))
		}
	}
}

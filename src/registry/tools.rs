use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value, json };

use crate::errors::{ Error, FieldError };
use crate::types::tools::{ Tool, ToolError };

/// JSON type of a declared parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    /// Accepts any JSON value; used when a schema names a type we do not model
    Any,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Any => "any",
        }
    }

    fn from_schema_name(name: &str) -> Self {
        match name {
            "string" => ParamType::String,
            "number" => ParamType::Number,
            "integer" => ParamType::Integer,
            "boolean" => ParamType::Boolean,
            "object" => ParamType::Object,
            "array" => ParamType::Array,
            _ => ParamType::Any,
        }
    }

    /// Whether `value` has this JSON type
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
            ParamType::Any => true,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A single declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub param_type: ParamType,
    pub required: bool,
    pub description: Option<String>,
}

/// Ordered set of named parameters a tool accepts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSchema {
    params: IndexMap<String, ParameterSpec>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter; a later declaration with the same name replaces the earlier one
    pub fn param(
        mut self,
        name: &str,
        param_type: ParamType,
        required: bool,
        description: Option<&str>
    ) -> Self {
        self.params.insert(name.to_string(), ParameterSpec {
            param_type,
            required,
            description: description.map(str::to_string),
        });
        self
    }

    pub fn required(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.param(name, param_type, true, Some(description))
    }

    pub fn optional(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.param(name, param_type, false, Some(description))
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterSpec)> {
        self.params.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Check arguments against the declared parameters.
    ///
    /// Every failing parameter is reported, not just the first. A `null` value
    /// counts as absent, and arguments that were never declared are accepted
    /// as-is.
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<(), Error> {
        let mut fields = Vec::new();

        for (name, spec) in &self.params {
            match arguments.get(name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        fields.push(FieldError::new(name, "missing required argument"));
                    }
                }
                Some(value) if !spec.param_type.matches(value) => {
                    fields.push(
                        FieldError::new(
                            name,
                            format!("expected {} but got {}", spec.param_type, json_type_name(value))
                        )
                    );
                }
                Some(_) => {}
            }
        }

        if fields.is_empty() { Ok(()) } else { Err(Error::Validation { fields }) }
    }

    /// Render as a JSON Schema object for advertisement
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, spec) in &self.params {
            let mut property = Map::new();
            if spec.param_type != ParamType::Any {
                property.insert("type".into(), json!(spec.param_type.as_str()));
            }
            if let Some(description) = &spec.description {
                property.insert("description".into(), json!(description));
            }
            properties.insert(name.clone(), Value::Object(property));
            if spec.required {
                required.push(json!(name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Rebuild from an advertised JSON Schema, ignoring anything it cannot express
    pub fn from_json_schema(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut parameters = Self::new();
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                let param_type = property
                    .get("type")
                    .and_then(Value::as_str)
                    .map_or(ParamType::Any, ParamType::from_schema_name);
                let description = property.get("description").and_then(Value::as_str);
                parameters = parameters.param(
                    name,
                    param_type,
                    required.contains(&name.as_str()),
                    description
                );
            }
        }
        parameters
    }
}

/// Types that can be decoded from tool arguments and describe their own parameters.
///
/// Usually implemented with `#[derive(ToolParams)]`.
pub trait ToolParams: DeserializeOwned + Send + 'static {
    fn parameter_schema() -> ParameterSchema;
}

/// Executes a tool call
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Adapter for closures over raw argument maps
struct FnHandler<F> {
    handler: F,
}

#[async_trait]
impl<F, Fut> ToolHandler
    for FnHandler<F>
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, ToolError>> + Send
{
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        (self.handler)(arguments).await
    }
}

/// Adapter that decodes arguments into a typed parameter struct first
struct TypedHandler<P, F> {
    handler: F,
    _params: PhantomData<fn() -> P>,
}

#[async_trait]
impl<P, F, Fut> ToolHandler
    for TypedHandler<P, F>
    where
        P: ToolParams,
        F: Fn(P) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, ToolError>> + Send
{
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let params: P = serde_json
            ::from_value(Value::Object(arguments))
            .map_err(|e| ToolError::invalid_arguments(format!("Invalid arguments: {}", e)))?;
        (self.handler)(params).await
    }
}

/// A named tool with its parameters and handler
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
    handler: Arc<dyn ToolHandler>,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
        handler: impl ToolHandler + 'static
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(handler),
        }
    }

    /// Build a tool from a closure over the raw argument map
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
        handler: F
    ) -> Self
        where
            F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<Value, ToolError>> + Send + 'static
    {
        Self::new(name, description, parameters, FnHandler { handler })
    }

    /// Build a tool whose parameters come from a [`ToolParams`] type
    pub fn typed<P, F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
        where
            P: ToolParams,
            F: Fn(P) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<Value, ToolError>> + Send + 'static
    {
        Self::new(name, description, P::parameter_schema(), TypedHandler {
            handler,
            _params: PhantomData,
        })
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }

    /// The advertisement sent to clients
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.parameters.to_json_schema(),
        }
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_schema() -> ParameterSchema {
        ParameterSchema::new()
            .required("text", ParamType::String, "Text to echo")
            .optional("times", ParamType::Integer, "Repeat count")
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_missing_required_argument_is_named() {
        let err = echo_schema().validate(&args(json!({}))).unwrap_err();
        match err {
            Error::Validation { fields } => {
                assert_eq!(fields, vec![FieldError::new("text", "missing required argument")]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_null_counts_as_absent() {
        assert!(echo_schema().validate(&args(json!({"text": null}))).is_err());
        assert!(echo_schema().validate(&args(json!({"text": "a", "times": null}))).is_ok());
    }

    #[test]
    fn test_all_failures_are_reported() {
        let err = echo_schema()
            .validate(&args(json!({"times": 1.5})))
            .unwrap_err();
        match err {
            Error::Validation { fields } => {
                let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["text", "times"]);
                assert_eq!(fields[1].reason, "expected integer but got number");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_arguments_pass_through() {
        assert!(echo_schema().validate(&args(json!({"text": "a", "extra": [1, 2]}))).is_ok());
    }

    #[test]
    fn test_json_schema_roundtrip() {
        let schema = echo_schema().to_json_schema();
        assert_eq!(schema["required"], json!(["text"]));
        assert_eq!(schema["properties"]["times"]["type"], json!("integer"));

        let rebuilt = ParameterSchema::from_json_schema(&schema);
        assert!(rebuilt.get("text").unwrap().required);
        assert_eq!(rebuilt.get("times").unwrap().param_type, ParamType::Integer);
    }

    #[tokio::test]
    async fn test_closure_handler_is_invoked() {
        let tool = ToolSpec::from_fn("echo", "Echo text", echo_schema(), |args| async move {
            Ok(args.get("text").cloned().unwrap_or(Value::Null))
        });

        let result = tool.handler().call(args(json!({"text": "hi"}))).await.unwrap();
        assert_eq!(result, json!("hi"));
        assert_eq!(tool.to_tool().name, "echo");
    }
}

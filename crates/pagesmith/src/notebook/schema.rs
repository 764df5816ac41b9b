use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Validation failure reported by a [`Schema`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SchemaError {
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SchemaError {}

/// Capability every validator must provide: check a candidate and hand back the
/// normalized value (defaults filled in) or an error describing the mismatch.
pub trait Schema: Send + Sync {
    fn validate(&self, candidate: &Value) -> Result<Value, SchemaError>;

    /// JSON Schema document describing accepted values, when one is known.
    fn json_schema(&self) -> Option<Value> {
        None
    }
}

/// Validates by deserializing into `T`, then serializing back so defaults show up
/// in the returned value.
pub struct SerdeSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeSchema<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SerdeSchema<T>
where
    T: JsonSchema,
{
    pub fn schema_document() -> Value {
        serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
    }
}

impl<T> Schema for SerdeSchema<T>
where
    T: DeserializeOwned + Serialize + JsonSchema,
{
    fn validate(&self, candidate: &Value) -> Result<Value, SchemaError> {
        let typed: T = serde_json::from_value(candidate.clone()).map_err(|err| {
            SchemaError::new(err.to_string()).with_details(json!({
                "line": err.line(),
                "column": err.column(),
                "category": format!("{:?}", err.classify()),
            }))
        })?;
        serde_json::to_value(typed).map_err(|err| SchemaError::new(err.to_string()))
    }

    fn json_schema(&self) -> Option<Value> {
        Some(Self::schema_document())
    }
}

/// Adapts a plain closure into a [`Schema`].
pub struct FnSchema<F>(pub F);

impl<F> Schema for FnSchema<F>
where
    F: Fn(&Value) -> Result<Value, SchemaError> + Send + Sync,
{
    fn validate(&self, candidate: &Value) -> Result<Value, SchemaError> {
        (self.0)(candidate)
    }
}

/// Inputs available to a schema factory.
#[derive(Clone, Copy, Debug)]
pub struct SchemaContext<'a> {
    pub frontmatter: &'a Value,
    pub lang: &'a str,
}

pub type SchemaFactory = Arc<dyn Fn(&SchemaContext<'_>) -> Arc<dyn Schema> + Send + Sync>;

#[derive(Clone)]
enum Registration {
    Fixed(Arc<dyn Schema>),
    Factory(SchemaFactory),
}

/// Per-language schema lookup.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    entries: BTreeMap<String, Registration>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, lang: impl Into<String>, schema: Arc<dyn Schema>) -> &mut Self {
        self.entries
            .insert(lang.into(), Registration::Fixed(schema));
        self
    }

    pub fn register_factory<F>(&mut self, lang: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&SchemaContext<'_>) -> Arc<dyn Schema> + Send + Sync + 'static,
    {
        self.entries
            .insert(lang.into(), Registration::Factory(Arc::new(factory)));
        self
    }

    pub fn contains(&self, lang: &str) -> bool {
        self.entries.contains_key(lang)
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn lookup(&self, context: &SchemaContext<'_>) -> Option<Arc<dyn Schema>> {
        match self.entries.get(context.lang)? {
            Registration::Fixed(schema) => Some(schema.clone()),
            Registration::Factory(factory) => Some(factory(context)),
        }
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("languages", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct TableAttrs {
        table: String,
        #[serde(default)]
        temporary: bool,
    }

    #[test]
    fn serde_schema_fills_defaults() {
        let schema = SerdeSchema::<TableAttrs>::new();
        let value = schema.validate(&json!({ "table": "users" })).unwrap();
        assert_eq!(value, json!({ "table": "users", "temporary": false }));
    }

    #[test]
    fn serde_schema_reports_missing_fields() {
        let schema = SerdeSchema::<TableAttrs>::new();
        let err = schema.validate(&json!({})).unwrap_err();
        assert!(err.message.contains("table"), "{err}");
    }

    #[test]
    fn serde_schema_exports_json_schema() {
        let document = SerdeSchema::<TableAttrs>::new().json_schema().unwrap();
        assert!(document["properties"]["table"].is_object());
    }

    #[test]
    fn factory_sees_frontmatter_and_language() {
        let mut registry = SchemaRegistry::new();
        registry.register_factory("csv", |ctx| {
            let strict = ctx.frontmatter["strict"].as_bool().unwrap_or(false);
            let lang = ctx.lang.to_string();
            Arc::new(FnSchema(move |candidate: &Value| {
                if strict && candidate.get("delimiter").is_none() {
                    Err(SchemaError::new(format!("{lang} blocks need a delimiter")))
                } else {
                    Ok(candidate.clone())
                }
            }))
        });

        let strict = json!({ "strict": true });
        let schema = registry
            .lookup(&SchemaContext {
                frontmatter: &strict,
                lang: "csv",
            })
            .unwrap();
        let err = schema.validate(&json!({})).unwrap_err();
        assert_eq!(err.message, "csv blocks need a delimiter");

        let missing = registry.lookup(&SchemaContext {
            frontmatter: &strict,
            lang: "sql",
        });
        assert!(missing.is_none());
    }
}

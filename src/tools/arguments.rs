//! Typed access to tool call arguments.

use super::tool::ToolError;

/// Parsed tool call arguments with typed extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ToolError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| missing("string", key))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, ToolError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| missing("integer", key))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ToolError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| missing("boolean", key))
    }

    pub fn get_array(&self, key: &str) -> Result<&Vec<serde_json::Value>, ToolError> {
        self.value
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| missing("array", key))
    }

    /// Deserialize the whole argument object into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ToolError> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| ToolError::new(format!("Failed to deserialize arguments: {e}")))
    }
}

fn missing(kind: &str, key: &str) -> ToolError {
    ToolError::new(format!("Missing {kind} argument: {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters() {
        let args = ToolArguments::new(serde_json::json!({
            "city": "NYC",
            "days": 3,
            "metric": false,
            "tags": ["a"],
        }));
        assert_eq!(args.get_str("city").unwrap(), "NYC");
        assert_eq!(args.get_i64("days").unwrap(), 3);
        assert!(!args.get_bool("metric").unwrap());
        assert_eq!(args.get_array("tags").unwrap().len(), 1);
        assert_eq!(args.get_str_opt("missing"), None);
    }

    #[test]
    fn missing_key_names_the_key() {
        let args = ToolArguments::new(serde_json::json!({}));
        let err = args.get_str("city").unwrap_err();
        assert_eq!(err.message, "Missing string argument: city");
    }

    #[test]
    fn deserialize_into_struct() {
        #[derive(serde::Deserialize)]
        struct Query {
            city: String,
        }
        let args = ToolArguments::new(serde_json::json!({ "city": "Oslo" }));
        let query: Query = args.deserialize().unwrap();
        assert_eq!(query.city, "Oslo");
    }
}

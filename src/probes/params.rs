//! Invocation parameters and typed accessors
//!
//! Callers send scalar JSON values keyed by parameter id. Handlers read
//! them through the accessors below, which accept the loose encodings a
//! web form produces (numbers as strings, booleans as "true"/"false").

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ProbeError;

/// A probe id plus its parameter mapping, as received from a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProbeInvocation {
    pub probe_id: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl ProbeInvocation {
    pub fn new(probe_id: &str, parameters: Parameters) -> Self {
        Self {
            probe_id: probe_id.to_string(),
            parameters,
        }
    }
}

/// Parameter-id to scalar-value mapping
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, value: impl Into<Value>) {
        self.0.insert(id.to_string(), value.into());
    }

    pub fn with(mut self, id: &str, value: impl Into<Value>) -> Self {
        self.insert(id, value);
        self
    }

    /// Whether the parameter is present with a non-null value
    pub fn contains(&self, id: &str) -> bool {
        self.0.get(id).is_some_and(|value| !value.is_null())
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.0.get(id).filter(|value| !value.is_null())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// String value; numbers and booleans are rendered as text
    pub fn string(&self, id: &str) -> Option<String> {
        match self.get(id)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    /// Non-empty trimmed string, or the fallback
    pub fn string_or(&self, id: &str, fallback: &str) -> String {
        self.string(id)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Numeric value; an unparseable value is an error, an absent one is `None`
    pub fn number(&self, id: &str) -> Result<Option<f64>, ProbeError> {
        let Some(value) = self.get(id) else {
            return Ok(None);
        };
        match value {
            Value::Number(number) => number
                .as_f64()
                .map(Some)
                .ok_or_else(|| ProbeError::invalid_parameter(id, "number out of range")),
            Value::String(text) if text.trim().is_empty() => Ok(None),
            Value::String(text) => text
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| ProbeError::invalid_parameter(id, format!("'{}' is not a number", text))),
            other => Err(ProbeError::invalid_parameter(
                id,
                format!("expected a number, got {}", other),
            )),
        }
    }

    pub fn number_or(&self, id: &str, fallback: f64) -> Result<f64, ProbeError> {
        Ok(self.number(id)?.unwrap_or(fallback))
    }

    /// Number constrained to `[min, max]`; values outside are rejected
    pub fn bounded_number(&self, id: &str, fallback: f64, min: f64, max: f64) -> Result<f64, ProbeError> {
        let value = self.number_or(id, fallback)?;
        if !value.is_finite() || value < min || value > max {
            return Err(ProbeError::invalid_parameter(
                id,
                format!("{} is outside the allowed range {}..={}", value, min, max),
            ));
        }
        Ok(value)
    }

    pub fn boolean(&self, id: &str) -> Result<Option<bool>, ProbeError> {
        let Some(value) = self.get(id) else {
            return Ok(None);
        };
        match value {
            Value::Bool(flag) => Ok(Some(*flag)),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Some(true)),
                "false" | "no" | "off" | "0" => Ok(Some(false)),
                "" => Ok(None),
                _ => Err(ProbeError::invalid_parameter(
                    id,
                    format!("'{}' is not a boolean", text),
                )),
            },
            Value::Number(number) => Ok(Some(number.as_f64().unwrap_or(0.0) != 0.0)),
            other => Err(ProbeError::invalid_parameter(
                id,
                format!("expected a boolean, got {}", other),
            )),
        }
    }

    pub fn boolean_or(&self, id: &str, fallback: bool) -> Result<bool, ProbeError> {
        Ok(self.boolean(id)?.unwrap_or(fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_counts_as_absent() {
        let params = Parameters::new().with("host", Value::Null);
        assert!(!params.contains("host"));
        assert_eq!(params.string("host"), None);
    }

    #[test]
    fn test_numbers_accept_form_strings() {
        let params = Parameters::new()
            .with("timeout", "0.5")
            .with("count", 4)
            .with("blank", "  ");

        assert_eq!(params.number("timeout").unwrap(), Some(0.5));
        assert_eq!(params.number("count").unwrap(), Some(4.0));
        assert_eq!(params.number("blank").unwrap(), None);
        assert_eq!(params.number_or("missing", 7.0).unwrap(), 7.0);
    }

    #[test]
    fn test_unparseable_number_is_rejected() {
        let params = Parameters::new().with("timeout", "soon");
        let error = params.number("timeout").unwrap_err();
        assert!(error.to_string().contains("timeout"));
    }

    #[test]
    fn test_bounded_number_enforces_range() {
        let params = Parameters::new().with("concurrency", 0);
        assert!(params.bounded_number("concurrency", 5.0, 1.0, 50.0).is_err());
        assert_eq!(params.bounded_number("other", 5.0, 1.0, 50.0).unwrap(), 5.0);
    }

    #[test]
    fn test_boolean_encodings() {
        let params = Parameters::new()
            .with("a", true)
            .with("b", "false")
            .with("c", 1)
            .with("d", "maybe");

        assert_eq!(params.boolean("a").unwrap(), Some(true));
        assert_eq!(params.boolean("b").unwrap(), Some(false));
        assert_eq!(params.boolean("c").unwrap(), Some(true));
        assert!(params.boolean("d").is_err());
        assert!(params.boolean_or("e", true).unwrap());
    }

    #[test]
    fn test_invocation_deserializes_from_envelope() {
        let invocation: ProbeInvocation = serde_json::from_value(json!({
            "probe_id": "reverse_dns_lookup",
            "parameters": {"ip_addresses": "8.8.8.8", "timeout": 2}
        }))
        .unwrap();

        assert_eq!(invocation.probe_id, "reverse_dns_lookup");
        assert_eq!(invocation.parameters.len(), 2);
        assert_eq!(invocation.parameters.string_or("ip_addresses", ""), "8.8.8.8");
    }
}

//! Probe descriptors and parameter schemas
//!
//! Descriptors are what discovery UIs consume: a probe id, human readable
//! text and an ordered parameter list. The JSON shape is fixed by the
//! dashboard collaborator, so field names and optional members are
//! serialized exactly as it expects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Semantic type of a probe parameter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    /// One of a fixed option set
    Select,
    /// A bounded number rendered as a slider
    Range,
}

/// One choice of a `Select` parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamOption {
    pub value: Value,
    pub label: String,
}

/// Schema of a single probe parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ParamOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

impl ParameterSpec {
    fn new(id: &str, name: &str, description: &str, param_type: ParameterType) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required: false,
            default: None,
            options: Vec::new(),
            min: None,
            max: None,
            step: None,
        }
    }

    pub fn string(id: &str, name: &str, description: &str) -> Self {
        Self::new(id, name, description, ParameterType::String)
    }

    pub fn number(id: &str, name: &str, description: &str) -> Self {
        Self::new(id, name, description, ParameterType::Number)
    }

    pub fn boolean(id: &str, name: &str, description: &str) -> Self {
        Self::new(id, name, description, ParameterType::Boolean)
    }

    pub fn select(id: &str, name: &str, description: &str, options: Vec<ParamOption>) -> Self {
        let mut spec = Self::new(id, name, description, ParameterType::Select);
        spec.options = options;
        spec
    }

    pub fn range(id: &str, name: &str, description: &str, min: f64, max: f64, step: f64) -> Self {
        Self::new(id, name, description, ParameterType::Range).bounds(min, max, step)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn bounds(mut self, min: f64, max: f64, step: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.step = Some(step);
        self
    }
}

/// Catalog entry describing a probe and its parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub parameters: Vec<ParameterSpec>,
}

impl ProbeDescriptor {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            icon: String::new(),
            parameters: Vec::new(),
        }
    }

    pub fn icon(mut self, icon: &str) -> Self {
        self.icon = icon.to_string();
        self
    }

    pub fn parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn parameter_spec(&self, id: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|spec| spec.id == id)
    }

    /// Ids of required parameters, in declaration order
    pub fn required_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.id.as_str())
    }
}

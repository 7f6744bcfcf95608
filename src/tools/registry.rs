//! Tool declarations and the immutable registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::Result;

/// JSON-schema primitive types allowed in tool parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Object,
    Array,
    Boolean,
    Null,
}

/// One named parameter of a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
}

impl Parameter {
    /// A required parameter
    #[must_use]
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
        }
    }

    /// An optional parameter
    #[must_use]
    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }
}

/// Name, description and parameter schema of a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
}

impl ToolSpec {
    /// Create a spec with no parameters
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a parameter
    #[must_use]
    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// JSON schema object for the parameters
    #[must_use]
    pub fn parameters_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    json!({ "type": p.param_type, "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Catalog entry for chat completions
    #[must_use]
    pub fn to_chat_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_schema(),
            }
        })
    }

    /// Catalog entry for a realtime session
    #[must_use]
    pub fn to_realtime_tool(&self) -> Value {
        json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters_schema(),
        })
    }
}

/// Executes one tool with parsed arguments
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool and return text for the conversation
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArguments` if `args` do not fit the tool, or
    /// any error raised while acting on the host
    async fn call(&self, args: Value) -> Result<String>;
}

/// A spec bound to its handler
#[derive(Clone)]
pub struct ToolDefinition {
    pub spec: ToolSpec,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    /// Bind `handler` to `spec`
    #[must_use]
    pub fn new(spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> Self {
        Self { spec, handler }
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Set of tools available to a session
///
/// Built once, then shared read-only. Registering a name twice keeps the
/// later definition in the earlier slot.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry from definitions
    #[must_use]
    pub fn new(definitions: impl IntoIterator<Item = ToolDefinition>) -> Self {
        let mut registry = Self::default();
        for definition in definitions {
            let name = definition.spec.name.clone();
            if let Some(&slot) = registry.index.get(&name) {
                tracing::warn!(tool = %name, "duplicate tool registration replaced");
                registry.tools[slot] = definition;
            } else {
                registry.index.insert(name, registry.tools.len());
                registry.tools.push(definition);
            }
        }
        registry
    }

    /// Look up a tool by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Specs in registration order
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec.clone()).collect()
    }

    /// Number of tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

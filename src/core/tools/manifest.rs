//! Tool manifest handed to the model stream at session start.
//!
//! The manifest is opaque to the session core: it is only converted into the
//! provider's tool format by the model stream and consulted by executors to
//! reject names the model invented.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// A single tool parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// JSON-Schema type name ("string", "number", ...)
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
}

/// Parameter object of a tool, JSON-Schema style.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(default)]
    pub properties: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// Descriptor of one callable tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: ToolParameters,
}

impl ToolDescriptor {
    /// JSON-Schema object for the parameters (`{"type":"object",...}`).
    pub fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": self.parameters.properties,
            "required": self.parameters.required,
        })
    }
}

/// Ordered list of tool descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolManifest {
    tools: Vec<ToolDescriptor>,
}

impl ToolManifest {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    /// The tools every assistant gets unless it declares its own list.
    pub fn builtin() -> Self {
        Self::new(vec![
            tool(
                "get-customer",
                "Retrieves customer details based on the call 'from' information",
                &[("from", "The phone number of the customer (caller)")],
            ),
            tool(
                "verify-code",
                "Verifies a provided code against the calling number",
                &[
                    ("code", "The verification code to check"),
                    ("from", "The calling number to verify against"),
                ],
            ),
            tool(
                "verify-send",
                "Generates and sends a verification code via SMS to the phone number provided",
                &[(
                    "from",
                    "The calling phone number to send the verification code to. This is the number the call came in from.",
                )],
            ),
            tool(
                "live-agent-handoff",
                "Transfers the call to a human agent",
                &[(
                    "callSid",
                    "The unique identifier of the call to be transferred",
                )],
            ),
        ])
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// Names that appear more than once.
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates = Vec::new();
        for tool in &self.tools {
            if !seen.insert(tool.name.as_str()) && !duplicates.contains(&tool.name) {
                duplicates.push(tool.name.clone());
            }
        }
        duplicates
    }
}

/// Builds a descriptor whose parameters are all required strings.
fn tool(name: &str, description: &str, params: &[(&str, &str)]) -> ToolDescriptor {
    let properties = params
        .iter()
        .map(|(param, desc)| {
            (
                param.to_string(),
                ParameterSpec {
                    param_type: "string".to_string(),
                    description: desc.to_string(),
                },
            )
        })
        .collect();

    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        parameters: ToolParameters {
            properties,
            required: params.iter().map(|(param, _)| param.to_string()).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_manifest_names_in_order() {
        let manifest = ToolManifest::builtin();
        let names: Vec<_> = manifest.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["get-customer", "verify-code", "verify-send", "live-agent-handoff"]
        );
        assert!(manifest.duplicate_names().is_empty());
    }

    #[test]
    fn test_verify_code_requires_both_params() {
        let manifest = ToolManifest::builtin();
        let verify = manifest
            .tools()
            .iter()
            .find(|t| t.name == "verify-code")
            .unwrap();
        assert_eq!(verify.parameters.required, vec!["code", "from"]);
        assert_eq!(verify.parameters.properties["code"].param_type, "string");
    }

    #[test]
    fn test_parameters_schema_shape() {
        let manifest = ToolManifest::builtin();
        let schema = manifest.tools()[0].parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["from"]["type"], "string");
        assert_eq!(schema["required"][0], "from");
    }

    #[test]
    fn test_manifest_yaml_deserialization() {
        let yaml = r#"
- name: check-balance
  description: Looks up an account balance
  parameters:
    properties:
      account:
        type: string
        description: Account number
    required: [account]
- name: check-balance
  description: Duplicate entry
"#;
        let manifest: ToolManifest = serde_yaml::from_str(yaml).unwrap();
        assert!(manifest.contains("check-balance"));
        assert!(!manifest.contains("get-customer"));
        assert_eq!(manifest.duplicate_names(), vec!["check-balance"]);
        assert!(manifest.tools()[1].parameters.properties.is_empty());
    }
}

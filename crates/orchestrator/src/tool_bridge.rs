//! Bridges `sentrybot-tools::ToolRegistry` to the gateway's `ToolCallback`
//! shape: JSON Schema-ish specs for the model, flat string-map args for the
//! tools themselves, with reserved keys carrying per-turn context a tool
//! can't otherwise see.

use std::collections::HashMap;

use sentrybot_tools::{ToolRegistry, ToolSpec};

pub const ARG_CHAT_ID: &str = "_chat_id";
pub const ARG_PROFILE_ID: &str = "_profile_id";

pub fn tool_specs_as_json(registry: &ToolRegistry) -> Vec<serde_json::Value> {
    registry.list_specs().iter().map(spec_to_json).collect()
}

fn spec_to_json(spec: &ToolSpec) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = spec
        .params
        .iter()
        .map(|p| (p.name.clone(), serde_json::json!({ "type": "string", "description": p.description })))
        .collect();
    let required: Vec<&str> = spec.params.iter().filter(|p| p.required).map(|p| p.name.as_str()).collect();

    serde_json::json!({
        "name": spec.name,
        "description": spec.description,
        "parameters": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

/// Flattens a model-provided JSON args object into the string map
/// `Tool::run` expects, then injects `_chat_id`/`_profile_id` so tools that
/// need per-turn context (memory tools) don't have to thread it through the
/// gateway's call signature.
pub fn build_tool_args(
    call_args: &serde_json::Value,
    chat_id: i64,
    profile_id: i64,
) -> HashMap<String, String> {
    let mut args = HashMap::new();
    if let Some(obj) = call_args.as_object() {
        for (key, value) in obj {
            let as_string = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            args.insert(key.clone(), as_string);
        }
    }
    args.insert(ARG_CHAT_ID.to_string(), chat_id.to_string());
    args.insert(ARG_PROFILE_ID.to_string(), profile_id.to_string());
    args
}

pub async fn run_tool(registry: &ToolRegistry, name: &str, args: &HashMap<String, String>) -> String {
    let Some(tool) = registry.get(name) else {
        return serde_json::json!({ "error": format!("unknown tool: {name}") }).to_string();
    };
    match tool.run(args).await {
        Ok(output) if output.success => output.output,
        Ok(output) => serde_json::json!({ "error": output.output }).to_string(),
        Err(err) => serde_json::json!({ "error": err.to_string() }).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentrybot_tools::{Tool, ToolOutput, ToolParam};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".to_string(),
                description: "echoes back".to_string(),
                params: vec![ToolParam { name: "text".to_string(), description: "text".to_string(), required: true }],
            }
        }
        async fn run(&self, args: &HashMap<String, String>) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput { success: true, output: args.get("text").cloned().unwrap_or_default() })
        }
    }

    #[test]
    fn spec_converts_required_params() {
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(EchoTool));
        let specs = tool_specs_as_json(&registry);
        assert_eq!(specs[0]["name"], "echo");
        assert_eq!(specs[0]["parameters"]["required"][0], "text");
    }

    #[test]
    fn build_args_injects_reserved_keys() {
        let call_args = serde_json::json!({ "text": "hi" });
        let args = build_tool_args(&call_args, 7, 9);
        assert_eq!(args.get("text").unwrap(), "hi");
        assert_eq!(args.get(ARG_CHAT_ID).unwrap(), "7");
        assert_eq!(args.get(ARG_PROFILE_ID).unwrap(), "9");
    }

    #[tokio::test]
    async fn run_tool_returns_output_on_success() {
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(EchoTool));
        let args = build_tool_args(&serde_json::json!({ "text": "hi" }), 1, 1);
        let result = run_tool(&registry, "echo", &args).await;
        assert_eq!(result, "hi");
    }

    #[tokio::test]
    async fn run_tool_wraps_unknown_tool_as_error_json() {
        let registry = ToolRegistry::default();
        let result = run_tool(&registry, "missing", &HashMap::new()).await;
        assert!(result.contains("unknown tool"));
    }
}

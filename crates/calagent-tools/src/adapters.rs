//! Tool definitions in the shapes agent frameworks expect.

use serde_json::{json, Value};

use crate::tools::ToolDefinition;

/// OpenAI chat-completions `tools` array.
pub fn openai_tools(tools: &[ToolDefinition]) -> Value {
    let tools_json: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect();
    json!(tools_json)
}

/// Gemini `tools[].functionDeclarations` entry.
///
/// Gemini accepts only a subset of JSON Schema, so `default` is removed.
/// It also rejects object schemas without properties; parameterless tools
/// are declared without `parameters`.
pub fn gemini_tools(tools: &[ToolDefinition]) -> Value {
    let declarations: Vec<Value> = tools
        .iter()
        .map(|t| {
            let mut declaration = json!({
                "name": t.name,
                "description": t.description,
            });
            if has_properties(&t.parameters) {
                let mut parameters = t.parameters.clone();
                strip_defaults(&mut parameters);
                declaration["parameters"] = parameters;
            }
            declaration
        })
        .collect();
    json!({ "functionDeclarations": declarations })
}

fn has_properties(schema: &Value) -> bool {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|properties| !properties.is_empty())
}

/// Remove `default` keywords from a schema, leaving property names alone.
fn strip_defaults(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            map.remove("default");
            for (key, value) in map.iter_mut() {
                match (key.as_str(), value) {
                    ("properties", Value::Object(properties)) => {
                        properties.values_mut().for_each(strip_defaults);
                    }
                    (_, value) => strip_defaults(value),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_defaults),
        _ => {}
    }
}

/* Copyright 2023- The Binedge, Lda team. All rights reserved.
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *     http://www.apache.org/licenses/LICENSE-2.0
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! C1: the Schema Sanitizer (§4.1). Recursively normalizes a tool's
//! `input_schema` so the upstream's validator accepts it. Pure, total, and
//! idempotent: implemented as a structural visitor over `Value` rather
//! than ad hoc rewrites, per §9, so idempotence stays obvious by
//! inspection.

use serde_json::{Map, Value};

const DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn default_type_for_name(name: &str) -> &'static str {
    match name {
        "url" | "uri" | "href" | "link" => "string",
        "headers" | "options" | "params" | "payload" | "data" => "object",
        _ => "string",
    }
}

/// Rule 1: drop keys whose values are empty, recursively.
fn drop_empty_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let empty_keys: Vec<String> = map
                .iter()
                .filter(|(_, v)| is_empty_value(v))
                .map(|(k, _)| k.clone())
                .collect();
            for key in empty_keys {
                map.remove(&key);
            }
            for (_, child) in map.iter_mut() {
                drop_empty_keys(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                drop_empty_keys(item);
            }
        }
        _ => {}
    }
}

/// Rules 2, 4-7 applied at one schema node (the root schema, or one entry of
/// a `properties` map), then recursed into that node's own nested
/// `properties`, so every level of the tree gets the same treatment (§4.1's
/// "Rules (applied recursively)" preamble) rather than only the root.
///
/// `name` is `None` for the root schema (no name-based `type` default
/// applies there) and `Some(property_name)` for a nested property.
fn sanitize_schema_node(obj: &mut Map<String, Value>, name: Option<&str>) {
    match name {
        Some("headers") => sanitize_headers_property(obj),
        Some(name) => {
            // Rule 2 takes priority over rule 4's name-heuristic default: a
            // property that is itself an object schema must get `type:
            // object`, not a default inferred from its own name.
            if obj.contains_key("properties") && !obj.contains_key("type") {
                obj.insert("type".to_string(), Value::String("object".to_string()));
            }
            ensure_type_and_description(obj, name);
        }
        None => {
            if obj.contains_key("properties") && !obj.contains_key("type") {
                obj.insert("type".to_string(), Value::String("object".to_string()));
            }
        }
    }
    prune_required(obj);
    drop_empty_additional_properties(obj);
    if let Some(properties) = obj.get_mut("properties").and_then(Value::as_object_mut) {
        for (child_name, child_schema) in properties.iter_mut() {
            if let Some(child_obj) = child_schema.as_object_mut() {
                sanitize_schema_node(child_obj, Some(child_name));
            }
        }
    }
}

fn ensure_type_and_description(obj: &mut Map<String, Value>, name: &str) {
    let needs_type = obj
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t.trim().is_empty())
        .unwrap_or(true);
    if needs_type {
        obj.insert(
            "type".to_string(),
            Value::String(default_type_for_name(name).to_string()),
        );
    }
    let needs_description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(|d| d.trim().is_empty())
        .unwrap_or(true);
    if needs_description {
        obj.insert(
            "description".to_string(),
            Value::String(format!("{name} parameter")),
        );
    }
}

fn sanitize_headers_property(obj: &mut Map<String, Value>) {
    obj.insert("type".to_string(), Value::String("object".to_string()));
    let needs_seed = obj
        .get("properties")
        .and_then(Value::as_object)
        .map(Map::is_empty)
        .unwrap_or(true);
    if needs_seed {
        let mut seeded = Map::new();
        seeded.insert(
            "user-agent".to_string(),
            serde_json::json!({
                "type": "string",
                "description": "User-Agent header for the request",
            }),
        );
        obj.insert("properties".to_string(), Value::Object(seeded));
    }
    // Any other existing sub-properties get rules 2/4-7 from the caller's
    // recursion into this node's `properties`, same as any other object
    // schema.
}

/// Rule 6: prune `required` entries with no matching property; drop
/// `required` entirely if empty afterwards.
fn prune_required(obj: &mut Map<String, Value>) {
    let known: Vec<String> = obj
        .get("properties")
        .and_then(Value::as_object)
        .map(|p| p.keys().cloned().collect())
        .unwrap_or_default();
    let Some(required) = obj.get("required").and_then(Value::as_array) else {
        return;
    };
    let pruned: Vec<Value> = required
        .iter()
        .filter(|v| v.as_str().map(|s| known.contains(&s.to_string())).unwrap_or(false))
        .cloned()
        .collect();
    if pruned.is_empty() {
        obj.remove("required");
    } else {
        obj.insert("required".to_string(), Value::Array(pruned));
    }
}

/// Rule 7: drop an empty-object `additionalProperties`, preserving explicit
/// booleans.
fn drop_empty_additional_properties(obj: &mut Map<String, Value>) {
    if matches!(obj.get("additionalProperties"), Some(Value::Object(m)) if m.is_empty()) {
        obj.remove("additionalProperties");
    }
}

/// Sanitize a single tool's `input_schema` object in place, applying all
/// seven rules from §4.1 at every level of the schema tree, not just the
/// root. Idempotent: running this twice yields the same result as running it
/// once.
pub fn sanitize_input_schema(schema: &mut Value) {
    drop_empty_keys(schema);
    let Some(obj) = schema.as_object_mut() else {
        return;
    };
    obj.insert(
        "$schema".to_string(),
        Value::String(DRAFT_07.to_string()),
    );
    sanitize_schema_node(obj, None);
}

/// Walk a full RequestEnvelope and sanitize every
/// `mcp_context.tools[*].input_schema` subtree (§4.3: "Run C1 on the
/// resulting envelope").
pub fn sanitize_envelope(envelope: &mut Value) {
    let Some(tools) = envelope
        .get_mut("mcp_context")
        .and_then(|v| v.get_mut("tools"))
        .and_then(Value::as_array_mut)
    else {
        return;
    };
    for tool in tools {
        if let Some(schema) = tool.get_mut("input_schema") {
            sanitize_input_schema(schema);
        }
    }
}

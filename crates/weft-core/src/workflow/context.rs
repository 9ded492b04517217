//! Run execution context with variable tracking and template interpolation.
//!
//! `RunContext` is the mutable state that flows through a workflow run: the
//! variable bag, the position pointer, and the ordered history of visited
//! nodes. It serializes to JSON for persistence on the run record and
//! restores on resume.
//!
//! Interpolation of `{{identifier}}` placeholders comes in two modes:
//! - text mode (prompts, document content): values substitute as display
//!   text; unresolved placeholders stay in place literally.
//! - expression mode (gate conditions): values substitute JSON-encoded so
//!   strings stay quoted; unresolved placeholders become the `undefined`
//!   token and the condition fails closed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Mutable execution state owned by a single workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// String-keyed variable bag. Keys are unique; last write wins.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    /// The node the traversal is at (or will re-enter on resume).
    #[serde(default)]
    pub current_node: Option<String>,
    /// Node ids already exited, in visit order.
    #[serde(default)]
    pub history: Vec<String>,
    /// Free-form metadata stamped at run creation.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl RunContext {
    /// Create a fresh context positioned at the given node.
    pub fn new(current_node: Option<String>) -> Self {
        Self {
            variables: HashMap::new(),
            current_node,
            history: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Merge action-reported updates into the variable bag by shallow key
    /// overwrite.
    pub fn merge_updates(&mut self, updates: &HashMap<String, Value>) {
        for (key, value) in updates {
            self.variables.insert(key.clone(), value.clone());
        }
    }

    /// Record the current node as visited and move the pointer to `next`.
    pub fn advance(&mut self, next: impl Into<String>) {
        if let Some(current) = self.current_node.take() {
            self.history.push(current);
        }
        self.current_node = Some(next.into());
    }

    /// Interpolate a template in text mode against this context's variables.
    pub fn interpolate_text(&self, template: &str) -> String {
        interpolate_text(template, &self.variables)
    }

    /// Serialize the context for persistence on the run record.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(json!({}))
    }

    /// Restore a context from a persisted run record.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

// ---------------------------------------------------------------------------
// Interpolation
// ---------------------------------------------------------------------------

enum InterpolationMode {
    Text,
    Expression,
}

/// Substitute `{{identifier}}` placeholders with variable values as display
/// text. Unresolved placeholders are left in place literally.
pub fn interpolate_text(template: &str, variables: &HashMap<String, Value>) -> String {
    interpolate(template, variables, InterpolationMode::Text)
}

/// Substitute `{{identifier}}` placeholders with the JSON encoding of
/// variable values. Unresolved placeholders become the `undefined` token.
pub fn interpolate_expression(template: &str, variables: &HashMap<String, Value>) -> String {
    interpolate(template, variables, InterpolationMode::Expression)
}

fn interpolate(
    template: &str,
    variables: &HashMap<String, Value>,
    mode: InterpolationMode,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // No closing marker; emit the remainder verbatim.
            out.push_str("{{");
            rest = after;
            break;
        };

        let raw_token = &after[..end];
        match variables.get(raw_token.trim()) {
            Some(value) => out.push_str(&render_value(value, &mode)),
            None => match mode {
                InterpolationMode::Text => {
                    out.push_str("{{");
                    out.push_str(raw_token);
                    out.push_str("}}");
                }
                InterpolationMode::Expression => out.push_str("undefined"),
            },
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn render_value(value: &Value, mode: &InterpolationMode) -> String {
    match mode {
        InterpolationMode::Text => match value {
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            // Objects and arrays render as compact JSON.
            other => serde_json::to_string(other).unwrap_or_default(),
        },
        InterpolationMode::Expression => serde_json::to_string(value).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with(pairs: &[(&str, Value)]) -> RunContext {
        let mut ctx = RunContext::new(Some("start".to_string()));
        for (key, value) in pairs {
            ctx.variables.insert(key.to_string(), value.clone());
        }
        ctx
    }

    // -----------------------------------------------------------------------
    // Variable merging
    // -----------------------------------------------------------------------

    #[test]
    fn test_merge_updates_last_write_wins() {
        let mut ctx = context_with(&[("x", json!(1))]);
        ctx.merge_updates(&HashMap::from([
            ("x".to_string(), json!(2)),
            ("y".to_string(), json!("new")),
        ]));
        assert_eq!(ctx.variables.get("x"), Some(&json!(2)));
        assert_eq!(ctx.variables.get("y"), Some(&json!("new")));
    }

    // -----------------------------------------------------------------------
    // Position tracking
    // -----------------------------------------------------------------------

    #[test]
    fn test_advance_appends_history() {
        let mut ctx = RunContext::new(Some("start".to_string()));
        ctx.advance("middle");
        ctx.advance("end");
        assert_eq!(ctx.current_node.as_deref(), Some("end"));
        assert_eq!(ctx.history, vec!["start", "middle"]);
    }

    #[test]
    fn test_advance_from_empty_pointer() {
        let mut ctx = RunContext::new(None);
        ctx.advance("start");
        assert_eq!(ctx.current_node.as_deref(), Some("start"));
        assert!(ctx.history.is_empty());
    }

    // -----------------------------------------------------------------------
    // Text interpolation
    // -----------------------------------------------------------------------

    #[test]
    fn test_interpolate_number_as_display_text() {
        // A variable set to 5 must appear as "5" in the outgoing prompt.
        let ctx = context_with(&[("x", json!(5))]);
        assert_eq!(ctx.interpolate_text("{{x}}"), "5");
        assert_eq!(ctx.interpolate_text("value is {{x}}!"), "value is 5!");
    }

    #[test]
    fn test_interpolate_string_is_verbatim() {
        let ctx = context_with(&[("topic", json!("AI news"))]);
        assert_eq!(
            ctx.interpolate_text("Summarize {{topic}} today"),
            "Summarize AI news today"
        );
    }

    #[test]
    fn test_interpolate_unresolved_stays_literal() {
        let ctx = context_with(&[]);
        assert_eq!(ctx.interpolate_text("hello {{missing}}"), "hello {{missing}}");
    }

    #[test]
    fn test_interpolate_multiple_placeholders() {
        let ctx = context_with(&[("a", json!("one")), ("b", json!(2))]);
        assert_eq!(ctx.interpolate_text("{{a}}/{{b}}/{{c}}"), "one/2/{{c}}");
    }

    #[test]
    fn test_interpolate_object_renders_compact_json() {
        let ctx = context_with(&[("usage", json!({"input_tokens": 3}))]);
        assert_eq!(
            ctx.interpolate_text("{{usage}}"),
            "{\"input_tokens\":3}"
        );
    }

    #[test]
    fn test_interpolate_unclosed_marker_is_verbatim() {
        let ctx = context_with(&[("x", json!(1))]);
        assert_eq!(ctx.interpolate_text("broken {{x"), "broken {{x");
    }

    #[test]
    fn test_interpolate_token_whitespace_is_trimmed() {
        let ctx = context_with(&[("x", json!(7))]);
        assert_eq!(ctx.interpolate_text("{{ x }}"), "7");
    }

    // -----------------------------------------------------------------------
    // Expression interpolation
    // -----------------------------------------------------------------------

    #[test]
    fn test_expression_interpolation_json_encodes_strings() {
        let variables = HashMap::from([("name".to_string(), json!("alice"))]);
        assert_eq!(
            interpolate_expression("{{name}} == 'alice'", &variables),
            "\"alice\" == 'alice'"
        );
    }

    #[test]
    fn test_expression_interpolation_unresolved_is_undefined() {
        let variables = HashMap::new();
        assert_eq!(
            interpolate_expression("{{approved}} == true", &variables),
            "undefined == true"
        );
    }

    #[test]
    fn test_expression_interpolation_numbers_and_bools() {
        let variables = HashMap::from([
            ("n".to_string(), json!(5)),
            ("flag".to_string(), json!(true)),
        ]);
        assert_eq!(
            interpolate_expression("{{n}} > 3 && {{flag}}", &variables),
            "5 > 3 && true"
        );
    }

    // -----------------------------------------------------------------------
    // Persistence roundtrip
    // -----------------------------------------------------------------------

    #[test]
    fn test_json_roundtrip() {
        let mut ctx = context_with(&[("count", json!(42))]);
        ctx.advance("next");
        ctx.metadata
            .insert("workflow_name".to_string(), json!("digest"));

        let restored = RunContext::from_json(ctx.to_json()).unwrap();
        assert_eq!(restored.variables.get("count"), Some(&json!(42)));
        assert_eq!(restored.current_node.as_deref(), Some("next"));
        assert_eq!(restored.history, vec!["start"]);
        assert_eq!(
            restored.metadata.get("workflow_name"),
            Some(&json!("digest"))
        );
    }

    #[test]
    fn test_from_json_defaults_missing_fields() {
        let restored = RunContext::from_json(json!({})).unwrap();
        assert!(restored.variables.is_empty());
        assert!(restored.current_node.is_none());
        assert!(restored.history.is_empty());
    }
}

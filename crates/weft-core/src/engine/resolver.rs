//! Context resolver — expands `{{...}}` references in a prompt template
//! against an execution's accumulated context.
//!
//! Supported references:
//! - `{{initialContext.KEY}}` — a key from the context supplied at start
//! - `{{stepN.output}}` — output of an earlier step
//! - `{{stepN.userInput}}` — user input collected for step N
//! - `{{context}}` — the entire accumulated context, serialized as JSON
//!
//! Resolution is a single left-to-right pass; an inserted value is never
//! re-scanned for further references, so expansion cannot loop. A reference
//! to an absent key or a step that has not produced the referenced value is
//! an error — the resolver never substitutes an empty string.

use regex::Regex;
use serde_json::Value;

use crate::error::EngineError;
use crate::models::WorkflowExecution;

/// Resolve a prompt template against the accumulated context.
///
/// Pure: identical inputs always produce the identical resolved string.
pub fn resolve_prompt(template: &str, context: &Value) -> Result<String, EngineError> {
    let reference_re = Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").unwrap();
    let step_re = Regex::new(r"^step(\d+)\.(output|userInput)$").unwrap();

    let mut resolved = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in reference_re.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        let reference = caps.get(1).unwrap().as_str();

        resolved.push_str(&template[last_end..whole.start()]);
        resolved.push_str(&lookup(reference, context, &step_re)?);
        last_end = whole.end();
    }
    resolved.push_str(&template[last_end..]);

    Ok(resolved)
}

fn lookup(reference: &str, context: &Value, step_re: &Regex) -> Result<String, EngineError> {
    if reference == "context" {
        return serde_json::to_string(context)
            .map_err(|e| EngineError::Internal(format!("context serialization failed: {}", e)));
    }

    if let Some((prefix, key)) = reference.split_once('.') {
        if prefix == "initialContext" {
            let value = context
                .get("initialContext")
                .and_then(|initial| initial.get(key))
                .ok_or_else(|| {
                    EngineError::Resolution(format!("undefined initial context key '{}'", key))
                })?;
            return Ok(render(value));
        }
    }

    if let Some(caps) = step_re.captures(reference) {
        let step_order: usize = caps[1]
            .parse()
            .map_err(|_| EngineError::Resolution(format!("invalid step reference '{}'", reference)))?;
        let field = &caps[2];
        let entry_key = WorkflowExecution::context_key(step_order);
        let value = context
            .get(&entry_key)
            .and_then(|entry| entry.get(field))
            .ok_or_else(|| {
                EngineError::Resolution(format!(
                    "step {} has no '{}' available yet",
                    step_order, field
                ))
            })?;
        return Ok(render(value));
    }

    Err(EngineError::Resolution(format!(
        "unrecognized context reference '{}'",
        reference
    )))
}

/// Strings insert verbatim; every other JSON value inserts as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Value {
        serde_json::json!({
            "initialContext": { "topic": "AI safety", "audience": "executives" },
            "step0": { "output": "a short summary" },
            "step1": { "userInput": { "notes": "be concise" } }
        })
    }

    #[test]
    fn test_resolves_initial_context_keys() {
        let resolved =
            resolve_prompt("Summarize: {{initialContext.topic}}", &context()).unwrap();
        assert_eq!(resolved, "Summarize: AI safety");
    }

    #[test]
    fn test_resolves_step_output_and_user_input() {
        let resolved = resolve_prompt(
            "Refine using: {{step0.output}} and {{step1.userInput}}",
            &context(),
        )
        .unwrap();
        assert_eq!(
            resolved,
            r#"Refine using: a short summary and {"notes":"be concise"}"#
        );
    }

    #[test]
    fn test_resolves_whole_context_blob() {
        let ctx = serde_json::json!({ "initialContext": { "k": "v" } });
        let resolved = resolve_prompt("All: {{context}}", &ctx).unwrap();
        assert_eq!(resolved, r#"All: {"initialContext":{"k":"v"}}"#);
    }

    #[test]
    fn test_missing_initial_key_is_an_error() {
        let err = resolve_prompt("{{initialContext.missing}}", &context()).unwrap_err();
        assert!(matches!(err, EngineError::Resolution(_)));
    }

    #[test]
    fn test_future_step_reference_is_an_error() {
        let err = resolve_prompt("{{step5.output}}", &context()).unwrap_err();
        assert!(matches!(err, EngineError::Resolution(_)));
    }

    #[test]
    fn test_unrecognized_reference_is_an_error() {
        let err = resolve_prompt("{{weather.today}}", &context()).unwrap_err();
        assert!(matches!(err, EngineError::Resolution(_)));
    }

    #[test]
    fn test_inserted_values_are_not_rescanned() {
        let ctx = serde_json::json!({
            "initialContext": { "a": "{{initialContext.b}}", "b": "nope" }
        });
        let resolved = resolve_prompt("{{initialContext.a}}", &ctx).unwrap();
        // The inserted value still reads as a literal reference.
        assert_eq!(resolved, "{{initialContext.b}}");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let template = "{{initialContext.topic}} / {{step0.output}} / {{context}}";
        let first = resolve_prompt(template, &context()).unwrap();
        for _ in 0..10 {
            assert_eq!(resolve_prompt(template, &context()).unwrap(), first);
        }
    }

    #[test]
    fn test_plain_text_passes_through() {
        let resolved = resolve_prompt("no references here", &context()).unwrap();
        assert_eq!(resolved, "no references here");
    }
}

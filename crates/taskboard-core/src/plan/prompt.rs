//! Prompt construction for the Planner and tolerant JSON extraction from a
//! session's free-text response (§4.6, §8 invariant 8).

use serde_json::Value;

use crate::error::PlanError;

/// Build the instructional prompt embedding `goal` and the required
/// `PlanResult` JSON schema, in the style of the host's meta-plan system
/// prompt builder: a string built up section by section rather than a
/// single format string.
pub fn build_planner_prompt(goal: &str, shared_context: &str) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str("You are decomposing a user goal into a dependency graph of concrete, ");
    prompt.push_str("independently actionable subtasks.\n\n");

    prompt.push_str("## Goal\n\n");
    prompt.push_str(goal);
    prompt.push_str("\n\n");

    if !shared_context.trim().is_empty() {
        prompt.push_str("## Context\n\n");
        prompt.push_str(shared_context);
        prompt.push_str("\n\n");
    }

    prompt.push_str("## Output format\n\n");
    prompt.push_str("Respond with a single JSON object matching this schema:\n\n");
    prompt.push_str(
        r#"{
  "workspace_name": string,
  "workspace_context": string,
  "max_concurrent": number | null,
  "tasks": [
    {
      "title": string,
      "description": string,
      "prompt": string,
      "priority": 0 | 1 | 2 | 3,
      "tags": [string],
      "depends_on": [number]
    }
  ]
}
"#,
    );
    prompt.push('\n');
    prompt.push_str("`depends_on` is a list of 0-based indices into `tasks`, referring to other ");
    prompt.push_str("tasks in this same plan that must complete first. Do not reference a task's ");
    prompt.push_str("own index. Priority 0 is most urgent, 3 is least. Every task needs a ");
    prompt.push_str("non-empty title and prompt.\n\n");
    prompt.push_str("You may think out loud before the JSON, but the JSON object itself must be ");
    prompt.push_str("complete and parseable, either bare or inside a fenced code block.\n");

    prompt
}

/// Extract a `PlanResult`-shaped JSON object from free text (§8 invariant
/// 8): tolerates raw JSON, JSON fenced with a ```json tag, JSON fenced with
/// a bare ``` tag, or JSON embedded between prose (the longest `{...}` span
/// that parses). Rejects anything that yields no parseable object.
pub fn extract_plan_json(text: &str) -> Result<Value, PlanError> {
    if let Some(fenced) = extract_fenced(text, "json") {
        if let Ok(value) = serde_json::from_str(&fenced) {
            return Ok(value);
        }
    }
    if let Some(fenced) = extract_fenced(text, "") {
        if let Ok(value) = serde_json::from_str(&fenced) {
            return Ok(value);
        }
    }
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }
    if let Some(value) = longest_parseable_object(text) {
        return Ok(value);
    }
    Err(PlanError::NoJsonFound)
}

fn extract_fenced(text: &str, lang_tag: &str) -> Option<String> {
    let opener = format!("```{lang_tag}");
    let start = text.find(&opener)?;
    let after_opener = start + opener.len();
    let rest = &text[after_opener..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

/// Scan every `{` as a candidate start, try to parse the shortest balanced
/// span from it, and keep the longest span across all starts that parses
/// as valid JSON.
fn longest_parseable_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut best: Option<Value> = None;
    let mut best_len = 0usize;

    for start in 0..bytes.len() {
        if bytes[start] != b'{' {
            continue;
        }
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escape = false;
        for (offset, &byte) in bytes[start..].iter().enumerate() {
            if in_string {
                if escape {
                    escape = false;
                } else if byte == b'\\' {
                    escape = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let span = &text[start..start + offset + 1];
                        if span.len() > best_len {
                            if let Ok(value) = serde_json::from_str::<Value>(span) {
                                best = Some(value);
                                best_len = span.len();
                            }
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_raw_json() {
        let text = r#"{"workspace_name":"w","tasks":[]}"#;
        let value = extract_plan_json(text).unwrap();
        assert_eq!(value["workspace_name"], "w");
    }

    #[test]
    fn extracts_fenced_with_json_tag() {
        let text = "Here is the plan:\n```json\n{\"workspace_name\":\"w\",\"tasks\":[]}\n```\nDone.";
        let value = extract_plan_json(text).unwrap();
        assert_eq!(value["workspace_name"], "w");
    }

    #[test]
    fn extracts_fenced_without_tag() {
        let text = "```\n{\"workspace_name\":\"w\",\"tasks\":[]}\n```";
        let value = extract_plan_json(text).unwrap();
        assert_eq!(value["workspace_name"], "w");
    }

    #[test]
    fn extracts_json_embedded_in_prose() {
        let text = "Sure, thinking about it... {\"workspace_name\":\"w\",\"tasks\":[]} hope that helps!";
        let value = extract_plan_json(text).unwrap();
        assert_eq!(value["workspace_name"], "w");
    }

    #[test]
    fn rejects_malformed_input() {
        let text = "no json here at all, just prose.";
        assert_eq!(extract_plan_json(text), Err(PlanError::NoJsonFound));
    }
}

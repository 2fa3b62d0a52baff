//! Prompt construction and response parsing for the AI assistant.
//!
//! The model is asked for JSON; replies are often wrapped in Markdown code
//! fences and sometimes omit fields, so parsing strips fences and fills gaps
//! with fixed defaults. Anything that is not a JSON object is an error.

use serde_json::Value;

use crate::{
    Categorization, FieldError, PrioritizationTask, Prioritization, PrioritizeRequest,
    PrioritizedTask, ServiceError, TaskPriority, UserContext,
};

pub const CATEGORIZE_TEMPERATURE: f32 = 0.3;
pub const PRIORITIZE_TEMPERATURE: f32 = 0.4;

pub const CATEGORIES: &[&str] = &[
    "Work", "Personal", "Health", "Finance", "Learning", "Shopping", "Home", "Creative", "Social",
    "Travel", "Other",
];

pub const DEFAULT_CATEGORY: &str = "Other";
pub const DEFAULT_CONFIDENCE: u8 = 50;
pub const DEFAULT_REASONING: &str = "AI-suggested category";
pub const DEFAULT_SUMMARY: &str = "AI-generated prioritization";

/// Model output that could not be read as a JSON object.
#[derive(Debug)]
pub enum ParseError {
    NotJson(serde_json::Error),
    NotObject,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotJson(e) => write!(f, "model output is not valid JSON: {e}"),
            Self::NotObject => f.write_str("model output is not a JSON object"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NotJson(e) => Some(e),
            Self::NotObject => None,
        }
    }
}

// ─── Prompts ────────────────────────────────────────────────────────────────

pub fn categorize_prompt(title: &str, description: Option<&str>, priority: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are a task categorization AI assistant. Analyze the following task and suggest an appropriate category.\n\n",
    );
    prompt.push_str(&format!("Task Title: {title}\n"));
    if let Some(description) = description.filter(|d| !d.is_empty()) {
        prompt.push_str(&format!("Description: {description}\n"));
    }
    if let Some(priority) = priority.filter(|p| !p.is_empty()) {
        prompt.push_str(&format!("Priority: {priority}\n"));
    }
    prompt.push_str(&format!(
        "\nCommon categories include: {}.\n\n",
        CATEGORIES.join(", ")
    ));
    prompt.push_str(
        "Respond in JSON format with:\n\
         {\n  \"category\": \"suggested category name\",\n  \
         \"confidence\": confidence score from 0-100,\n  \
         \"reasoning\": \"brief explanation why this category fits\"\n}\n\n\
         Choose the most appropriate category based on the task content. Only respond with valid JSON.",
    );
    prompt
}

pub fn prioritize_prompt(tasks: &[PrioritizationTask], context: Option<&UserContext>) -> String {
    let mut prompt = String::from(
        "You are a smart task prioritization AI assistant. Analyze the following tasks and recommend the optimal order to complete them.\n\n\
         Consider:\n- Deadlines (due_date)\n- Current priority level\n- Task status\n- Category and context\n- Estimated impact and effort\n",
    );
    if let Some(behavior) = context.and_then(|c| c.past_behavior.as_deref()) {
        prompt.push_str(&format!("- User's past behavior: {behavior}\n"));
    }
    if let Some(preferences) = context.and_then(|c| c.preferences.as_deref()) {
        prompt.push_str(&format!("- User's preferences: {preferences}\n"));
    }
    let listing = serde_json::to_string_pretty(tasks).unwrap_or_else(|_| "[]".to_string());
    prompt.push_str(&format!("\nTasks to prioritize:\n{listing}\n\n"));
    prompt.push_str(
        "Respond in JSON format with:\n\
         {\n  \"prioritizedTasks\": [\n    {\n      \"taskId\": \"task id\",\n      \
         \"recommendedOrder\": 1,\n      \"score\": 0-100 priority score,\n      \
         \"reasoning\": \"why this task should be done at this order\",\n      \
         \"suggestedPriority\": \"low|medium|high|urgent (optional update)\"\n    }\n  ],\n  \
         \"summary\": \"Overall prioritization strategy and key insights\"\n}\n\n\
         Focus on high-value tasks, urgent deadlines, and minimizing context switching. Only respond with valid JSON.",
    );
    prompt
}

// ─── Request checks ─────────────────────────────────────────────────────────

pub fn validate_categorize_title(title: Option<&str>) -> Result<String, ServiceError> {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::BadRequest("Task title is required for categorization".into()))
}

/// Every task needs id, title, status and priority; failures are reported by index.
pub fn validate_prioritize_request(req: &PrioritizeRequest) -> Result<(), ServiceError> {
    if req.tasks.is_empty() {
        return Err(ServiceError::BadRequest(
            "Tasks array is required and must not be empty".into(),
        ));
    }
    let details: Vec<FieldError> = req
        .tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            [&t.id, &t.title, &t.status, &t.priority]
                .iter()
                .any(|f| f.trim().is_empty())
        })
        .map(|(i, _)| {
            FieldError::new(
                format!("tasks[{i}]"),
                "All tasks must have id, title, status, and priority",
            )
        })
        .collect();
    if details.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Validation(details))
    }
}

// ─── Parsing ────────────────────────────────────────────────────────────────

/// Remove a surrounding Markdown code fence (with or without a language tag).
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag, if any. It may run straight into the body.
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(rest.len());
    let body = rest[tag_len..].trim();
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn parse_object(text: &str) -> Result<serde_json::Map<String, Value>, ParseError> {
    match serde_json::from_str::<Value>(strip_code_fences(text)).map_err(ParseError::NotJson)? {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::NotObject),
    }
}

fn non_empty_str(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read a 0-100 score from a number or numeric string.
fn score(v: Option<&Value>) -> Option<u8> {
    let n = match v? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(n.round().clamp(0.0, 100.0) as u8)
}

pub fn parse_categorization(text: &str) -> Result<Categorization, ParseError> {
    let obj = parse_object(text)?;
    Ok(Categorization {
        category: non_empty_str(obj.get("category")).unwrap_or_else(|| DEFAULT_CATEGORY.into()),
        confidence: score(obj.get("confidence"))
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_CONFIDENCE),
        reasoning: non_empty_str(obj.get("reasoning")).unwrap_or_else(|| DEFAULT_REASONING.into()),
    })
}

pub fn parse_prioritization(text: &str) -> Result<Prioritization, ParseError> {
    let obj = parse_object(text)?;
    let prioritized_tasks = obj
        .get("prioritizedTasks")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_object)
                .enumerate()
                .filter_map(|(i, entry)| {
                    let task_id = non_empty_str(entry.get("taskId"))?;
                    let recommended_order = entry
                        .get("recommendedOrder")
                        .and_then(Value::as_u64)
                        .and_then(|n| u32::try_from(n).ok())
                        .unwrap_or(i as u32 + 1);
                    Some(PrioritizedTask {
                        task_id,
                        recommended_order,
                        score: score(entry.get("score")).unwrap_or(0),
                        reasoning: non_empty_str(entry.get("reasoning")).unwrap_or_default(),
                        suggested_priority: entry
                            .get("suggestedPriority")
                            .and_then(Value::as_str)
                            .and_then(|p| p.trim().to_lowercase().parse::<TaskPriority>().ok()),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Prioritization {
        prioritized_tasks,
        summary: non_empty_str(obj.get("summary")).unwrap_or_else(|| DEFAULT_SUMMARY.into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_and_without_language() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn strips_a_language_tag_without_a_newline() {
        assert_eq!(strip_code_fences("```json{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json {\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```JSON\r\n[1,2]\r\n```"), "[1,2]");
    }

    #[test]
    fn categorization_reads_fenced_reply() {
        let reply = "```json\n{\"category\":\"Work\",\"confidence\":92,\"reasoning\":\"Quarterly report\"}\n```";
        let c = parse_categorization(reply).unwrap();
        assert_eq!(c.category, "Work");
        assert_eq!(c.confidence, 92);
        assert_eq!(c.reasoning, "Quarterly report");
    }

    #[test]
    fn categorization_fills_defaults_and_clamps() {
        let c = parse_categorization(r#"{"confidence": 250}"#).unwrap();
        assert_eq!(c.category, DEFAULT_CATEGORY);
        assert_eq!(c.confidence, 100);
        assert_eq!(c.reasoning, DEFAULT_REASONING);

        let c = parse_categorization(r#"{"category":"Health","confidence":"n/a"}"#).unwrap();
        assert_eq!(c.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn malformed_output_is_an_error() {
        assert!(matches!(
            parse_categorization("Sure! The category is Work."),
            Err(ParseError::NotJson(_))
        ));
        assert!(matches!(parse_categorization("[1,2]"), Err(ParseError::NotObject)));
        assert!(matches!(parse_prioritization("\"text\""), Err(ParseError::NotObject)));
    }

    #[test]
    fn prioritization_skips_entries_without_ids() {
        let reply = r#"{
            "prioritizedTasks": [
                {"taskId": "b", "recommendedOrder": 1, "score": 88.6, "reasoning": "due today", "suggestedPriority": "URGENT"},
                {"recommendedOrder": 2},
                {"taskId": "a", "score": -5, "suggestedPriority": "whenever"}
            ]
        }"#;
        let p = parse_prioritization(reply).unwrap();
        assert_eq!(p.summary, DEFAULT_SUMMARY);
        assert_eq!(p.prioritized_tasks.len(), 2);
        assert_eq!(p.prioritized_tasks[0].score, 89);
        assert_eq!(p.prioritized_tasks[0].suggested_priority, Some(TaskPriority::Urgent));
        assert_eq!(p.prioritized_tasks[1].task_id, "a");
        assert_eq!(p.prioritized_tasks[1].recommended_order, 3);
        assert_eq!(p.prioritized_tasks[1].score, 0);
        assert_eq!(p.prioritized_tasks[1].suggested_priority, None);
    }

    #[test]
    fn prompts_carry_task_fields() {
        let prompt = categorize_prompt("Pay rent", Some("before the 5th"), None);
        assert!(prompt.contains("Task Title: Pay rent"));
        assert!(prompt.contains("Description: before the 5th"));
        assert!(!prompt.contains("Priority:"));
        assert!(prompt.contains("Finance"));

        let tasks = vec![PrioritizationTask {
            id: "t1".into(),
            title: "Ship".into(),
            status: "todo".into(),
            priority: "high".into(),
            ..Default::default()
        }];
        let ctx = UserContext {
            past_behavior: None,
            preferences: Some("mornings for deep work".into()),
        };
        let prompt = prioritize_prompt(&tasks, Some(&ctx));
        assert!(prompt.contains("\"id\": \"t1\""));
        assert!(prompt.contains("User's preferences: mornings for deep work"));
        assert!(!prompt.contains("past behavior"));
    }

    #[test]
    fn prioritize_request_reports_incomplete_tasks() {
        assert!(validate_prioritize_request(&PrioritizeRequest::default()).is_err());
        let req = PrioritizeRequest {
            tasks: vec![
                PrioritizationTask {
                    id: "t1".into(),
                    title: "Ship".into(),
                    status: "todo".into(),
                    priority: "high".into(),
                    ..Default::default()
                },
                PrioritizationTask {
                    id: "t2".into(),
                    ..Default::default()
                },
            ],
            user_context: None,
        };
        let err = validate_prioritize_request(&req).unwrap_err();
        assert_eq!(err.details()[0].field, "tasks[1]");
    }
}

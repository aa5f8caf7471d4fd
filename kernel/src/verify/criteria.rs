//! Verifier: per-kind acceptance criterion evaluation and fix-task synthesis.

use std::collections::HashSet;

use serde_json::Value;

use crate::artifact::Artifact;
use crate::event::EventStore;
use crate::event::types::EventType;
use crate::task::{AcceptanceCriterion, CriterionKind, NewTask, Task, VerificationResult};

pub struct Verifier;

impl Verifier {
    /// Dispatch a single criterion by kind, emitting `VERIFICATION_RUN` before and
    /// `VERIFICATION_PASSED`/`VERIFICATION_FAILED` after.
    pub fn verify_criterion(criterion: &AcceptanceCriterion, output: &str, artifacts: &[Artifact], store: &mut EventStore) -> VerificationResult {
        store.append(EventType::VerificationRun, serde_json::json!({"criterion_id": criterion.id, "kind": criterion.kind}));

        let (passed, message, evidence) = match criterion.kind {
            CriterionKind::Schema => verify_schema(criterion, output),
            CriterionKind::Contains => verify_contains(criterion, output, true),
            CriterionKind::NotContains => verify_contains(criterion, output, false),
            CriterionKind::WordLimit => verify_word_limit(criterion, output),
            CriterionKind::Lint => verify_lint(criterion, output),
            CriterionKind::Test => verify_test(criterion, artifacts),
            CriterionKind::Custom => verify_custom(criterion, output),
        };

        let event_type = if passed { EventType::VerificationPassed } else { EventType::VerificationFailed };
        store.append(
            event_type,
            serde_json::json!({"criterion_id": criterion.id, "message": message, "evidence": evidence}),
        );

        VerificationResult {
            criterion_id: criterion.id.clone(),
            passed,
            message,
            evidence,
        }
    }

    pub fn verify_all(criteria: &[AcceptanceCriterion], output: &str, artifacts: &[Artifact], store: &mut EventStore) -> VerifyAllResult {
        let results: Vec<VerificationResult> = criteria.iter().map(|c| Self::verify_criterion(c, output, artifacts, store)).collect();
        let failed_criteria: Vec<String> = results.iter().filter(|r| !r.passed).map(|r| r.criterion_id.clone()).collect();
        VerifyAllResult {
            all_passed: failed_criteria.is_empty(),
            results,
            failed_criteria,
        }
    }
}

pub struct VerifyAllResult {
    pub all_passed: bool,
    pub results: Vec<VerificationResult>,
    pub failed_criteria: Vec<String>,
}

fn check_type(value: &Value, ty: &str) -> bool {
    match ty {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        _ => true,
    }
}

/// Minimal recursive schema walker: `type`, `required`, and nested `properties`.
fn schema_walk(value: &Value, schema: &Value) -> Option<String> {
    if let Some(ty) = schema.get("type").and_then(|t| t.as_str()) {
        if !check_type(value, ty) {
            return Some(format!("expected type '{ty}'"));
        }
    }
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required {
            if let Some(name) = field.as_str() {
                if value.get(name).is_none() {
                    return Some(format!("missing required field '{name}'"));
                }
            }
        }
    }
    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, sub_schema) in properties {
            if let Some(sub_value) = value.get(key) {
                if let Some(err) = schema_walk(sub_value, sub_schema) {
                    return Some(format!("field '{key}': {err}"));
                }
            }
        }
    }
    None
}

fn verify_schema(criterion: &AcceptanceCriterion, output: &str) -> (bool, String, Option<String>) {
    let value: Value = match serde_json::from_str(output) {
        Ok(v) => v,
        Err(err) => return (false, format!("output is not valid JSON: {err}"), Some(output.to_string())),
    };
    match schema_walk(&value, &criterion.config) {
        None => (true, "schema satisfied".to_string(), None),
        Some(err) => (false, err.clone(), Some(err)),
    }
}

fn patterns_of(config: &Value) -> Vec<String> {
    if let Some(pattern) = config.get("pattern").and_then(|p| p.as_str()) {
        return vec![pattern.to_string()];
    }
    config
        .get("patterns")
        .and_then(|p| p.as_array())
        .map(|arr| arr.iter().filter_map(|p| p.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn verify_contains(criterion: &AcceptanceCriterion, output: &str, must_match: bool) -> (bool, String, Option<String>) {
    let patterns = patterns_of(&criterion.config);
    for raw in &patterns {
        let re = match regex::RegexBuilder::new(raw).case_insensitive(true).build() {
            Ok(re) => re,
            Err(err) => return (false, format!("invalid pattern '{raw}': {err}"), None),
        };
        let matched = re.is_match(output);
        if must_match && !matched {
            return (false, format!("pattern '{raw}' did not match"), None);
        }
        if !must_match && matched {
            return (false, format!("forbidden pattern '{raw}' matched"), Some(raw.clone()));
        }
    }
    (true, "all patterns satisfied".to_string(), None)
}

fn verify_word_limit(criterion: &AcceptanceCriterion, output: &str) -> (bool, String, Option<String>) {
    let min_words = criterion.config.get("min_words").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
    let max_words = criterion.config.get("max_words").and_then(|v| v.as_u64()).unwrap_or(u64::MAX) as usize;
    let count = output.split_whitespace().filter(|w| !w.is_empty()).count();
    if count < min_words || count > max_words {
        (false, format!("word count {count} outside [{min_words}, {max_words}]"), None)
    } else {
        (true, format!("word count {count} within [{min_words}, {max_words}]"), None)
    }
}

fn verify_lint(criterion: &AcceptanceCriterion, output: &str) -> (bool, String, Option<String>) {
    let mut balance = 0i32;
    for ch in output.chars() {
        match ch {
            '{' | '(' | '[' => balance += 1,
            '}' | ')' | ']' => balance -= 1,
            _ => {}
        }
    }
    if balance != 0 {
        return (false, format!("unbalanced brackets (delta {balance})"), None);
    }
    if criterion.config.get("no_console").and_then(|v| v.as_bool()).unwrap_or(false) && output.contains("console.log") {
        return (false, "forbidden console.log present".to_string(), None);
    }
    if criterion.config.get("no_any").and_then(|v| v.as_bool()).unwrap_or(false) && output.contains(": any") {
        return (false, "forbidden 'any' type present".to_string(), None);
    }
    (true, "lint checks passed".to_string(), None)
}

fn verify_test(criterion: &AcceptanceCriterion, artifacts: &[Artifact]) -> (bool, String, Option<String>) {
    let Some(file_name) = criterion.config.get("file_name").and_then(|v| v.as_str()) else {
        return (true, "no file_name configured; simulated pass".to_string(), None);
    };
    if artifacts.iter().any(|a| a.name == file_name) {
        (true, format!("artifact '{file_name}' exists"), None)
    } else {
        (false, format!("artifact '{file_name}' not found"), None)
    }
}

fn verify_custom(criterion: &AcceptanceCriterion, output: &str) -> (bool, String, Option<String>) {
    let check = criterion.config.get("check").and_then(|v| v.as_str()).unwrap_or("");
    match check {
        "is_not_empty" if output.trim().is_empty() => (false, "output is empty".to_string(), None),
        "is_not_empty" => (true, "output is non-empty".to_string(), None),
        "starts_with_header" if output.trim_start().starts_with('#') => (true, "starts with a header".to_string(), None),
        "starts_with_header" => (false, "does not start with a header".to_string(), None),
        "has_code_block" if output.contains("```") => (true, "contains a code block".to_string(), None),
        "has_code_block" => (false, "no code block found".to_string(), None),
        "no_todos" if output.to_uppercase().contains("TODO") => (false, "TODO marker present".to_string(), Some("TODO".to_string())),
        "no_todos" => (true, "no TODO markers".to_string(), None),
        other => (false, format!("unknown custom check '{other}'"), None),
    }
}

/// Build the spec for a fix task: original prompt plus a bullet list of failures, acceptance
/// criteria narrowed to the failed subset, depends on the original, priority bumped by 10.
pub fn generate_fix_task(original: &Task, failed_results: &[VerificationResult]) -> NewTask {
    let mut prompt = format!("{}\n\nThe following acceptance criteria failed previously:\n", original.prompt);
    for result in failed_results {
        let evidence = result.evidence.clone().unwrap_or_default();
        prompt.push_str(&format!("- {} ({evidence})\n", result.message));
    }
    prompt.push_str("Focus exclusively on resolving the criteria listed above.");

    let failed_ids: HashSet<&str> = failed_results.iter().map(|r| r.criterion_id.as_str()).collect();
    let acceptance_criteria = original
        .acceptance_criteria
        .iter()
        .filter(|c| failed_ids.contains(c.id.as_str()))
        .cloned()
        .collect();

    let mut tags = original.tags.clone();
    tags.insert("fix".to_string());
    tags.insert("retry".to_string());

    NewTask {
        title: format!("Fix: {}", original.title),
        prompt,
        acceptance_criteria,
        dependencies: vec![original.id.clone()],
        priority: Some((original.priority as u16 + 10).min(100) as u8),
        context_refs: original.context_refs.clone(),
        tags,
        parent: None,
        estimated_tokens: original.estimated_tokens,
    }
}

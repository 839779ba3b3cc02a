use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

/// An outgoing edge in the adjacency list.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub edge_id: String,
    pub target: String,
    /// `None` or empty means unconditional.
    pub condition: Option<String>,
}

/// What a condition expression is evaluated against.
pub struct ConditionScope<'a> {
    /// The flow input.
    pub input: &'a str,
    /// Output of the edge's source node (or the upstream output for a
    /// condition node).
    pub output: &'a str,
    pub variables: &'a HashMap<String, Value>,
    /// Caller-supplied request context.
    pub context: &'a serde_json::Map<String, Value>,
    pub results: &'a HashMap<String, String>,
}

impl ConditionScope<'_> {
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "input" => return Some(self.input.to_string()),
            "output" => return Some(self.output.to_string()),
            _ => {}
        }
        if let Some(node_id) = key.strip_prefix("results.") {
            return self.results.get(node_id).cloned();
        }
        self.variables
            .get(key)
            .or_else(|| self.context.get(key))
            .and_then(value_text)
    }

    fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.context.contains_key(name)
    }
}

fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Evaluate an edge or condition-node expression.
///
/// Supported expressions:
/// - empty or `always`: true; `never`: false
/// - `true` / `false`: the scope output equals that literal
/// - `variable_exists:<name>`
/// - `key == "value"`, `key != "value"`, `key contains "value"`, where `key`
///   is `input`, `output`, `results.<node id>` or a variable name
///
/// Returns `false` for unparseable expressions.
pub fn evaluate_condition(expr: &str, scope: &ConditionScope<'_>) -> bool {
    let expr = expr.trim();

    match expr {
        "" | "always" => return true,
        "never" => return false,
        "true" | "false" => return scope.output.trim() == expr,
        _ => {}
    }

    if let Some(name) = expr.strip_prefix("variable_exists:") {
        return scope.has_variable(name.trim());
    }

    // key contains "value"
    if let Some((key, substr)) = parse_operator(expr, " contains ") {
        return scope.lookup(key).is_some_and(|s| s.contains(substr));
    }

    // key != "value"
    if let Some((key, value)) = parse_operator(expr, "!=") {
        return scope.lookup(key).is_some_and(|s| s != value);
    }

    // key == "value"
    if let Some((key, value)) = parse_operator(expr, "==") {
        return scope.lookup(key).is_some_and(|s| s == value);
    }

    warn!(condition = %expr, "Unrecognized condition, treating as false");
    false
}

/// Parse `key OP "value"` expressions, returning (key, value).
/// The key must be a single token.
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let (key, val) = expr.split_once(op)?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    let val = val.trim();
    let val = val
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(val);
    Some((key, val))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixture {
        variables: HashMap<String, Value>,
        context: serde_json::Map<String, Value>,
        results: HashMap<String, String>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut variables = HashMap::new();
            variables.insert("status".into(), json!("success"));
            variables.insert("check".into(), json!(true));
            let mut context = serde_json::Map::new();
            context.insert("lang".into(), json!("zh"));
            let mut results = HashMap::new();
            results.insert("search".into(), "3 hits found".into());
            Self {
                variables,
                context,
                results,
            }
        }

        fn eval(&self, expr: &str, output: &str) -> bool {
            let scope = ConditionScope {
                input: "hello world",
                output,
                variables: &self.variables,
                context: &self.context,
                results: &self.results,
            };
            evaluate_condition(expr, &scope)
        }
    }

    #[test]
    fn test_keywords() {
        let f = Fixture::new();
        assert!(f.eval("", "x"));
        assert!(f.eval("  always ", "x"));
        assert!(!f.eval("never", "x"));
    }

    #[test]
    fn test_boolean_literals_match_output() {
        let f = Fixture::new();
        assert!(f.eval("true", "true"));
        assert!(!f.eval("true", "false"));
        assert!(f.eval("false", "false"));
        assert!(!f.eval("false", "anything else"));
    }

    #[test]
    fn test_input_and_output_contains() {
        let f = Fixture::new();
        assert!(f.eval("input contains hello", ""));
        assert!(f.eval(r#"input contains "world""#, ""));
        assert!(!f.eval("input contains bye", ""));
        assert!(f.eval(r#"output contains "created""#, "The file was created."));
    }

    #[test]
    fn test_variable_exists() {
        let f = Fixture::new();
        assert!(f.eval("variable_exists:status", ""));
        assert!(f.eval("variable_exists: lang", ""));
        assert!(!f.eval("variable_exists:missing", ""));
    }

    #[test]
    fn test_comparisons() {
        let f = Fixture::new();
        assert!(f.eval(r#"status == "success""#, ""));
        assert!(!f.eval(r#"status == "failure""#, ""));
        assert!(f.eval(r#"status != "failure""#, ""));
        assert!(!f.eval(r#"status != "success""#, ""));
        assert!(f.eval(r#"check == "true""#, ""));
        assert!(f.eval(r#"lang == "zh""#, ""));
        assert!(f.eval(r#"results.search contains "hits""#, ""));
        assert!(f.eval(r#"output == "done""#, "done"));
    }

    #[test]
    fn test_operator_inside_value() {
        let f = Fixture::new();
        assert!(f.eval(r#"output == "a contains b""#, "a contains b"));
    }

    #[test]
    fn test_missing_key_and_garbage() {
        let f = Fixture::new();
        assert!(!f.eval(r#"missing == "value""#, ""));
        assert!(!f.eval(r#"results.nope != "x""#, ""));
        assert!(!f.eval("this is not valid", ""));
    }
}

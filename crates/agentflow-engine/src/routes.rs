use std::sync::Arc;

use agentflow_core::config::RouteConfig;
use agentflow_core::types::{Payload, TypeTag};

/// Predicate over the most recent result.
pub type RoutePredicate = Arc<dyn Fn(&Payload) -> bool + Send + Sync>;

/// Condition that must hold for a manual route to fire.
#[derive(Clone, Default)]
pub enum RouteCondition {
    /// Always fire.
    #[default]
    Always,
    /// Fire when the result carries this tag.
    TypeIs(TypeTag),
    /// Fire when a simple expression matches the result body.
    /// Supported: `key == "value"`, `key != "value"`, `key contains "substr"`.
    Expr(String),
    /// Fire when the closure returns true.
    Predicate(RoutePredicate),
}

impl std::fmt::Debug for RouteCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::TypeIs(tag) => write!(f, "TypeIs({})", tag),
            Self::Expr(expr) => write!(f, "Expr({:?})", expr),
            Self::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

impl RouteCondition {
    pub fn predicate(f: impl Fn(&Payload) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    pub fn matches(&self, result: &Payload) -> bool {
        match self {
            Self::Always => true,
            Self::TypeIs(tag) => &result.tag == tag,
            Self::Expr(expr) => evaluate_condition(expr, result),
            Self::Predicate(f) => f(result),
        }
    }
}

/// A manual override redirecting flow from one agent instance to another.
#[derive(Debug, Clone)]
pub struct Route {
    pub from: String,
    pub to: String,
    pub priority: i32,
    pub condition: RouteCondition,
}

impl Route {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        priority: i32,
        condition: RouteCondition,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            priority,
            condition,
        }
    }

    /// Create an unconditional route.
    pub fn always(from: impl Into<String>, to: impl Into<String>, priority: i32) -> Self {
        Self::new(from, to, priority, RouteCondition::Always)
    }

    /// Create a route guarded by a closure.
    pub fn when(
        from: impl Into<String>,
        to: impl Into<String>,
        priority: i32,
        f: impl Fn(&Payload) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(from, to, priority, RouteCondition::predicate(f))
    }
}

impl From<&RouteConfig> for Route {
    fn from(cfg: &RouteConfig) -> Self {
        let condition = match &cfg.when {
            Some(expr) => RouteCondition::Expr(expr.clone()),
            None => RouteCondition::Always,
        };
        Self::new(cfg.from.clone(), cfg.to.clone(), cfg.priority, condition)
    }
}

/// Manual routes, kept sorted by descending priority.
///
/// Routes with equal priority keep insertion order. Resolution walks the
/// table front to back and the first match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, route: Route) {
        let pos = self
            .routes
            .iter()
            .position(|r| r.priority < route.priority)
            .unwrap_or(self.routes.len());
        self.routes.insert(pos, route);
    }

    /// Target of the first route out of `from` whose condition holds.
    pub fn resolve(&self, from: &str, result: &Payload) -> Option<&str> {
        self.routes
            .iter()
            .filter(|r| r.from == from)
            .find(|r| r.condition.matches(result))
            .map(|r| r.to.as_str())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Comparison in a route expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Contains,
}

/// Evaluate a simple conditional expression against a result.
///
/// Object bodies are looked up by key; scalar bodies are exposed as `value`.
/// The key `$type` reads the result's type tag. Returns `false` for
/// unparseable expressions and missing keys.
pub fn evaluate_condition(expr: &str, result: &Payload) -> bool {
    let Some((key, op, expected)) = parse_expr(expr) else {
        return false;
    };
    let Some(actual) = lookup(result, key) else {
        return false;
    };
    match op {
        Op::Eq => actual == expected,
        Op::Ne => actual != expected,
        Op::Contains => actual.contains(expected),
    }
}

/// Render the value under `key` as a string for comparison.
fn lookup(result: &Payload, key: &str) -> Option<String> {
    if key == "$type" {
        return Some(result.tag.to_string());
    }
    let value = match &result.body {
        serde_json::Value::Object(obj) => obj.get(key)?,
        scalar if key == "value" => scalar,
        _ => return None,
    };
    Some(match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Split `key OP "value"` into its parts.
///
/// The key runs to the first space or operator character, the operator must
/// follow it directly, and everything after the operator is the value. A
/// quoted value is taken verbatim between its outer quotes.
fn parse_expr(expr: &str) -> Option<(&str, Op, &str)> {
    let expr = expr.trim();
    let key_end = expr
        .find(|c: char| c.is_whitespace() || c == '=' || c == '!')
        .unwrap_or(expr.len());
    let (key, rest) = expr.split_at(key_end);
    if key.is_empty() {
        return None;
    }

    let rest = rest.trim_start();
    let (op, rest) = if let Some(r) = rest.strip_prefix("==") {
        (Op::Eq, r)
    } else if let Some(r) = rest.strip_prefix("!=") {
        (Op::Ne, r)
    } else if let Some(r) = rest.strip_prefix("contains") {
        // `containsx` is not the operator.
        if !r.starts_with(|c: char| c.is_whitespace() || c == '"') {
            return None;
        }
        (Op::Contains, r)
    } else {
        return None;
    };

    let raw = rest.trim();
    let value = match raw.strip_prefix('"') {
        Some(inner) => inner.strip_suffix('"')?,
        None if raw.is_empty() || raw.contains('"') => return None,
        None => raw,
    };
    Some((key, op, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(status: &str) -> Payload {
        Payload::new("Report", json!({"status": status, "words": 12}))
    }

    #[test]
    fn test_priority_order_descending() {
        let mut table = RouteTable::new();
        table.add(Route::always("a", "low", 1));
        table.add(Route::always("a", "high", 10));
        table.add(Route::always("a", "mid", 5));

        let priorities: Vec<i32> = table.routes().iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![10, 5, 1]);
        assert_eq!(table.resolve("a", &report("ok")), Some("high"));
    }

    #[test]
    fn test_higher_priority_wins_when_both_match() {
        let mut table = RouteTable::new();
        table.add(Route::when("a", "b", 1, |_| true));
        table.add(Route::when("a", "c", 10, |_| true));
        for _ in 0..10 {
            assert_eq!(table.resolve("a", &report("ok")), Some("c"));
        }
    }

    #[test]
    fn test_falls_through_to_lower_priority() {
        let mut table = RouteTable::new();
        table.add(Route::when("a", "c", 10, |p| p.field("status") == Some(&json!("bad"))));
        table.add(Route::always("a", "b", 1));
        assert_eq!(table.resolve("a", &report("ok")), Some("b"));
        assert_eq!(table.resolve("a", &report("bad")), Some("c"));
    }

    #[test]
    fn test_equal_priority_keeps_insertion_order() {
        let mut table = RouteTable::new();
        table.add(Route::always("a", "first", 5));
        table.add(Route::always("a", "second", 5));
        assert_eq!(table.resolve("a", &report("ok")), Some("first"));
    }

    #[test]
    fn test_only_matching_source() {
        let mut table = RouteTable::new();
        table.add(Route::always("x", "y", 100));
        assert_eq!(table.resolve("a", &report("ok")), None);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_type_condition() {
        let cond = RouteCondition::TypeIs("Report".into());
        assert!(cond.matches(&report("ok")));
        assert!(!cond.matches(&Payload::text("hi")));
    }

    #[test]
    fn test_condition_equals() {
        assert!(evaluate_condition(r#"status == "ok""#, &report("ok")));
        assert!(!evaluate_condition(r#"status == "bad""#, &report("ok")));
    }

    #[test]
    fn test_condition_not_equals() {
        assert!(evaluate_condition(r#"status != "bad""#, &report("ok")));
        assert!(!evaluate_condition(r#"status != "ok""#, &report("ok")));
    }

    #[test]
    fn test_condition_contains() {
        let p = Payload::text("The file was created successfully.");
        assert!(evaluate_condition(r#"value contains "created""#, &p));
        assert!(!evaluate_condition(r#"value contains "deleted""#, &p));
    }

    #[test]
    fn test_condition_non_string_and_type() {
        assert!(evaluate_condition(r#"words == "12""#, &report("ok")));
        assert!(evaluate_condition(r#"$type == "Report""#, &report("ok")));
    }

    #[test]
    fn test_condition_missing_key() {
        assert!(!evaluate_condition(r#"missing == "value""#, &report("ok")));
    }

    #[test]
    fn test_condition_invalid_expr() {
        assert!(!evaluate_condition("this is not valid", &report("ok")));
    }

    #[test]
    fn test_condition_value_holding_operator_text() {
        let p = Payload::new("Ticket", json!({"kind": "contains_pii", "expr": "a != b"}));
        assert!(evaluate_condition(r#"kind == "contains_pii""#, &p));
        assert!(evaluate_condition(r#"expr == "a != b""#, &p));
        assert!(!evaluate_condition(r#"expr != "a != b""#, &p));
        assert!(evaluate_condition(r#"kind contains "pii""#, &p));
        assert!(evaluate_condition(r#"expr contains "!=""#, &p));
    }

    #[test]
    fn test_condition_key_holding_operator_word() {
        let p = Payload::new("Doc", json!({"contains_pii": "yes", "status": "ok"}));
        assert!(evaluate_condition(r#"contains_pii == "yes""#, &p));
        assert!(!evaluate_condition(r#"contains_pii != "yes""#, &p));
    }

    #[test]
    fn test_condition_spacing_and_bare_values() {
        assert!(evaluate_condition(r#"status=="ok""#, &report("ok")));
        assert!(evaluate_condition("words == 12", &report("ok")));
        assert!(evaluate_condition(r#"status == """#, &report("")));
        assert!(!evaluate_condition(r#"status == "ok"#, &report("ok")));
        assert!(!evaluate_condition("status containsok", &report("ok")));
        assert!(!evaluate_condition(r#"== "ok""#, &report("ok")));
    }

    #[test]
    fn test_route_from_config() {
        let cfg = RouteConfig {
            from: "tokenize".into(),
            to: "summarize".into(),
            priority: 3,
            when: Some(r#"value == "x""#.into()),
        };
        let route = Route::from(&cfg);
        assert_eq!(route.priority, 3);
        assert!(matches!(route.condition, RouteCondition::Expr(_)));

        let cfg = RouteConfig {
            when: None,
            ..cfg
        };
        assert!(matches!(Route::from(&cfg).condition, RouteCondition::Always));
    }
}

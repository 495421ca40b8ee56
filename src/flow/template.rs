//! `{{ ... }}` template binding.
//!
//! A reference is a dotted path, optionally namespaced:
//! `{{context.n1.items}}`, `{{input.user.id}}`, `{{env.BASE}}` or bare `{{n1.items}}`.
//! Bare paths are looked up in the run context first, then in the input,
//! then in the environment. Unresolvable or malformed references are left in
//! the output verbatim so unbound variables stay visible to the user.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::common::walk;

/// Regex pattern for a template reference, capturing inner whitespace so rewrites keep formatting
/// Format: `{{path}}` or `{{ path }}`
const TEMPLATE_PATTERN: &str = r"\{\{(\s*)([^{}]*?)(\s*)\}\}";
/// Regex pattern for a well-formed reference path (after `[n]` normalization)
const PATH_PATTERN: &str = r"^[A-Za-z_$][A-Za-z0-9_$\-]*(\.[A-Za-z0-9_$\-]+)*$";

static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(TEMPLATE_PATTERN).unwrap());
static PATH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(PATH_PATTERN).unwrap());
static INDEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

pub const CONTEXT_NAMESPACE: &str = "context";
pub const INPUT_NAMESPACE: &str = "input";
pub const ENV_NAMESPACE: &str = "env";

/// Namespace a reference was written against.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Namespace {
    Context,
    Input,
    Env,
    Bare,
}

/// A single `{{ ... }}` reference found in a template.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub namespace: Namespace,
    /// normalized path as written, namespace included
    pub path: String,
    /// literal text of the reference
    pub raw: String,
}

/// References of a template split by whether they currently resolve.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValidation {
    pub references: Vec<TemplateRef>,
    pub unresolved: Vec<TemplateRef>,
}

impl TemplateValidation {
    pub fn is_valid(&self) -> bool {
        self.unresolved.is_empty()
    }

    fn merge(
        &mut self,
        other: TemplateValidation,
    ) {
        self.references.extend(other.references);
        self.unresolved.extend(other.unresolved);
    }
}

/// Merged lookup scope for one binding pass.
///
/// Top-level keys are the union of context, input and env (context wins,
/// then input, then env); the three sources are also reachable under their
/// namespace key.
#[derive(Debug, Clone)]
pub struct TemplateScope {
    scope: Value,
}

impl TemplateScope {
    pub fn new(
        context: &Value,
        input: Option<&Value>,
        env: Option<&Value>,
    ) -> Self {
        let mut scope = Map::new();
        for source in [Some(context), input, env].into_iter().flatten() {
            if let Value::Object(map) = source {
                for (k, v) in map {
                    scope.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }

        scope.insert(CONTEXT_NAMESPACE.to_string(), context.clone());
        scope.insert(INPUT_NAMESPACE.to_string(), input.cloned().unwrap_or_else(|| Value::Object(Map::new())));
        scope.insert(ENV_NAMESPACE.to_string(), env.cloned().unwrap_or_else(|| Value::Object(Map::new())));

        Self {
            scope: Value::Object(scope),
        }
    }

    /// Walk a normalized dotted path. Any missing segment yields `None`.
    pub fn lookup(
        &self,
        path: &str,
    ) -> Option<&Value> {
        walk(&self.scope, path.split('.'))
    }

    /// Substitute every resolvable reference in `template`.
    pub fn resolve(
        &self,
        template: &str,
    ) -> String {
        TEMPLATE_RE
            .replace_all(template, |caps: &Captures| {
                let resolved = normalize_path(&caps[2]).and_then(|path| self.lookup(&path).map(render));
                resolved.unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Apply `resolve` to every string leaf of `value`, preserving its shape.
    ///
    /// A string made of exactly one resolvable reference is replaced by the
    /// referenced value itself, so arrays and objects keep their type.
    pub fn resolve_structure(
        &self,
        value: &Value,
    ) -> Value {
        match value {
            Value::String(s) => {
                if let Some(found) = self.whole_reference(s) {
                    return found.clone();
                }
                Value::String(self.resolve(s))
            }
            Value::Array(arr) => Value::Array(arr.iter().map(|v| self.resolve_structure(v)).collect()),
            Value::Object(obj) => Value::Object(obj.iter().map(|(k, v)| (k.clone(), self.resolve_structure(v))).collect()),
            _ => value.clone(),
        }
    }

    pub fn validate(
        &self,
        template: &str,
    ) -> TemplateValidation {
        let references = references(template);
        let unresolved = references.iter().filter(|r| self.lookup(&r.path).is_none()).cloned().collect();
        TemplateValidation {
            references,
            unresolved,
        }
    }

    /// `validate` over every string leaf of `value`.
    pub fn validate_structure(
        &self,
        value: &Value,
    ) -> TemplateValidation {
        let mut validation = TemplateValidation::default();
        match value {
            Value::String(s) => validation.merge(self.validate(s)),
            Value::Array(arr) => arr.iter().for_each(|v| validation.merge(self.validate_structure(v))),
            Value::Object(obj) => obj.values().for_each(|v| validation.merge(self.validate_structure(v))),
            _ => {}
        }
        validation
    }

    fn whole_reference(
        &self,
        s: &str,
    ) -> Option<&Value> {
        let caps = TEMPLATE_RE.captures(s)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != s.len() {
            return None;
        }
        let path = normalize_path(&caps[2])?;
        self.lookup(&path)
    }
}

/// Resolve `template` against a context plus optional input and env values.
pub fn resolve(
    template: &str,
    context: &Value,
    input: Option<&Value>,
    env: Option<&Value>,
) -> String {
    TemplateScope::new(context, input, env).resolve(template)
}

/// Resolve every string leaf of `value`.
pub fn resolve_structure(
    value: &Value,
    context: &Value,
    input: Option<&Value>,
    env: Option<&Value>,
) -> Value {
    TemplateScope::new(context, input, env).resolve_structure(value)
}

/// Report the references of `template` and which of them are unresolvable.
pub fn validate(
    template: &str,
    context: &Value,
    input: Option<&Value>,
    env: Option<&Value>,
) -> TemplateValidation {
    TemplateScope::new(context, input, env).validate(template)
}

/// Extract the well-formed references of `template`, in order of appearance.
pub fn references(template: &str) -> Vec<TemplateRef> {
    TEMPLATE_RE
        .captures_iter(template)
        .filter_map(|caps| {
            let path = normalize_path(&caps[2])?;
            Some(TemplateRef {
                namespace: namespace_of(&path),
                path,
                raw: caps[0].to_string(),
            })
        })
        .collect()
}

/// Rewrite the path of every well-formed reference with `f`, keeping the
/// surrounding whitespace. Malformed references are left untouched.
pub fn rewrite_paths(
    template: &str,
    f: impl Fn(&str) -> String,
) -> String {
    TEMPLATE_RE
        .replace_all(template, |caps: &Captures| match normalize_path(&caps[2]) {
            Some(path) => format!("{{{{{}{}{}}}}}", &caps[1], f(&path), &caps[3]),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// `a[0].b` becomes `a.0.b`; returns `None` for anything that is not a path.
fn normalize_path(inner: &str) -> Option<String> {
    let normalized = INDEX_RE.replace_all(inner.trim(), ".$1");
    PATH_RE.is_match(&normalized).then(|| normalized.into_owned())
}

fn namespace_of(path: &str) -> Namespace {
    match path.split('.').next() {
        Some(CONTEXT_NAMESPACE) if path.contains('.') => Namespace::Context,
        Some(INPUT_NAMESPACE) if path.contains('.') => Namespace::Input,
        Some(ENV_NAMESPACE) if path.contains('.') => Namespace::Env,
        _ => Namespace::Bare,
    }
}

/// Text form of a resolved value: strings verbatim, everything else as JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // ==================== resolve tests ====================

    #[test]
    fn test_resolve_no_variables() {
        let ctx = json!({"a": 1});
        assert_eq!(resolve("hello world", &ctx, None, None), "hello world");
        assert_eq!(resolve("", &ctx, None, None), "");
        assert_eq!(resolve("{ single } braces", &ctx, None, None), "{ single } braces");
    }

    #[test]
    fn test_resolve_nested_path() {
        let ctx = json!({"a": {"b": "x"}});
        assert_eq!(resolve("{{a.b}}", &ctx, None, None), "x");
        assert_eq!(resolve("{{ a.b }}!", &ctx, None, None), "x!");
    }

    #[test]
    fn test_resolve_unresolved_left_literal() {
        let ctx = json!({"a": {"b": "x"}});
        assert_eq!(resolve("{{a.c}}", &ctx, None, None), "{{a.c}}");
        assert_eq!(resolve("pre {{ missing }} post", &ctx, None, None), "pre {{ missing }} post");
        assert_eq!(resolve("{{a.b.c}}", &ctx, None, None), "{{a.b.c}}");
    }

    #[test]
    fn test_resolve_malformed_left_literal() {
        let ctx = json!({"a": 1, "b": 2});
        assert_eq!(resolve("{{ a + b }}", &ctx, None, None), "{{ a + b }}");
        assert_eq!(resolve("{{}}", &ctx, None, None), "{{}}");
    }

    #[test]
    fn test_resolve_non_string_values() {
        let ctx = json!({"n": {"count": 42, "ok": true, "none": null, "list": [1, 2]}});
        assert_eq!(resolve("count: {{n.count}}", &ctx, None, None), "count: 42");
        assert_eq!(resolve("{{n.ok}}", &ctx, None, None), "true");
        assert_eq!(resolve("{{n.none}}", &ctx, None, None), "null");
        assert_eq!(resolve("{{n.list}}", &ctx, None, None), "[1,2]");
    }

    #[test]
    fn test_resolve_array_index() {
        let ctx = json!({"n": {"items": [{"v": "first"}, {"v": "second"}]}});
        assert_eq!(resolve("{{n.items.1.v}}", &ctx, None, None), "second");
        assert_eq!(resolve("{{n.items[0].v}}", &ctx, None, None), "first");
    }

    #[test]
    fn test_resolve_namespaces() {
        let ctx = json!({"user": "ctx-user"});
        let input = json!({"user": "input-user", "only_input": 1});
        let env = json!({"BASE": "http://api", "user": "env-user"});

        assert_eq!(resolve("{{env.BASE}}/x", &ctx, Some(&input), Some(&env)), "http://api/x");
        assert_eq!(resolve("{{input.user}}", &ctx, Some(&input), Some(&env)), "input-user");
        assert_eq!(resolve("{{context.user}}", &ctx, Some(&input), Some(&env)), "ctx-user");
        // bare lookups: context, then input, then env
        assert_eq!(resolve("{{user}}", &ctx, Some(&input), Some(&env)), "ctx-user");
        assert_eq!(resolve("{{only_input}}", &ctx, Some(&input), Some(&env)), "1");
        assert_eq!(resolve("{{BASE}}", &ctx, Some(&input), Some(&env)), "http://api");
        assert_eq!(resolve("{{env.MISSING}}", &ctx, Some(&input), Some(&env)), "{{env.MISSING}}");
    }

    // ==================== resolve_structure tests ====================

    #[test]
    fn test_resolve_structure_preserves_shape() {
        let ctx = json!({"a": "v"});
        let value = json!({"x": "{{a}}", "y": [1, "{{a}}"]});
        assert_eq!(resolve_structure(&value, &ctx, None, None), json!({"x": "v", "y": [1, "v"]}));
    }

    #[test]
    fn test_resolve_structure_whole_reference_keeps_type() {
        let ctx = json!({"n1": {"items": [1, 2, 3], "count": 3}});
        let value = json!({"items": "{{n1.items}}", "count": "{{ n1.count }}", "label": "n={{n1.count}}"});
        assert_eq!(resolve_structure(&value, &ctx, None, None), json!({"items": [1, 2, 3], "count": 3, "label": "n=3"}));
    }

    #[test]
    fn test_resolve_structure_non_string_passthrough() {
        let ctx = json!({});
        assert_eq!(resolve_structure(&json!(42), &ctx, None, None), json!(42));
        assert_eq!(resolve_structure(&json!(true), &ctx, None, None), json!(true));
        assert_eq!(resolve_structure(&Value::Null, &ctx, None, None), Value::Null);
        assert_eq!(resolve_structure(&json!({"k": "{{nope}}"}), &ctx, None, None), json!({"k": "{{nope}}"}));
    }

    // ==================== validate tests ====================

    #[test]
    fn test_validate_reports_unresolved() {
        let ctx = json!({"n1": {"a": 1}});
        let env = json!({"TOKEN": "t"});
        let validation = validate("{{n1.a}} {{n1.b}} {{env.TOKEN}} {{input.q}} {{ bad expr }}", &ctx, None, Some(&env));

        assert_eq!(validation.references.len(), 4);
        assert_eq!(validation.references[2].namespace, Namespace::Env);
        assert_eq!(validation.references[3].namespace, Namespace::Input);
        let unresolved: Vec<&str> = validation.unresolved.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(unresolved, vec!["n1.b", "input.q"]);
        assert!(!validation.is_valid());
    }

    #[test]
    fn test_validate_structure() {
        let scope = TemplateScope::new(&json!({"a": 1}), None, None);
        let validation = scope.validate_structure(&json!({"x": "{{a}}", "y": ["{{b}}"], "z": 3}));
        assert_eq!(validation.references.len(), 2);
        assert_eq!(validation.unresolved.len(), 1);
        assert_eq!(validation.unresolved[0].raw, "{{b}}");
    }

    #[test]
    fn test_references_namespace_single_segment() {
        let refs = references("{{env}} {{context.a}}");
        assert_eq!(refs[0].namespace, Namespace::Bare);
        assert_eq!(refs[1].namespace, Namespace::Context);
    }

    #[test]
    fn test_rewrite_paths_keeps_whitespace() {
        let out = rewrite_paths("a {{ n1.x }} b {{n2.y}} {{ a + b }}", |p| p.to_uppercase());
        assert_eq!(out, "a {{ N1.X }} b {{N2.Y}} {{ a + b }}");
    }
}

use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};

use regex::Regex;
use rquickjs::{Context as JsContext, Ctx, Exception, FromJs, Runtime as JsRuntime};
use serde_json::{Map, Value};

use crate::{FlowlineError, Result, config::SandboxConfig};

static RETURN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|[^.\w$])return\b").expect("valid return pattern"));
static IDENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid identifier pattern"));

/// Names that may not be bound as script constants.
const RESERVED: &[&str] = &[
    "data", "vars", "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for",
    "function", "if", "import", "in", "instanceof", "let", "new", "null", "return", "super", "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void",
    "while", "with", "yield", "await", "JSON", "Math",
];

/// Embedded QuickJS evaluator for transform expressions.
///
/// Every evaluation gets a fresh runtime with memory and stack limits and a
/// wall-clock deadline. No host functions are exposed.
#[derive(Debug, Clone)]
pub struct ScriptSandbox {
    config: SandboxConfig,
}

impl ScriptSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
        }
    }

    /// Evaluate `code` with `data` and `vars` bound.
    ///
    /// `code` is either a single expression or a function body containing
    /// `return`. Each top-level key of `vars` that is a plain identifier is
    /// also bound as a constant.
    pub fn evaluate(
        &self,
        code: &str,
        data: &Value,
        vars: &Value,
    ) -> Result<Value> {
        let script = build_script(code, data, vars)?;

        let runtime = JsRuntime::new().map_err(|e| FlowlineError::Script(e.to_string()))?;
        runtime.set_memory_limit(self.config.memory_limit_bytes);
        runtime.set_max_stack_size(self.config.max_stack_bytes);

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let deadline = Instant::now() + timeout;
        runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() > deadline)));

        let ctx = JsContext::full(&runtime).map_err(|e| FlowlineError::Script(e.to_string()))?;
        ctx.with(|ctx| {
            let result: std::result::Result<String, _> = ctx.eval(script);
            match result {
                Ok(json_str) => serde_json::from_str(&json_str).map_err(|e| FlowlineError::Script(e.to_string())),
                Err(rquickjs::Error::Exception) => {
                    if Instant::now() > deadline {
                        return Err(FlowlineError::Script(format!("script timed out after {} ms", self.config.timeout_ms)));
                    }
                    Err(FlowlineError::Exception {
                        ecode: "JS_EXEC_ERROR".to_string(),
                        message: exception_message(&ctx),
                    })
                }
                Err(e) => Err(FlowlineError::Script(e.to_string())),
            }
        })
    }
}

fn exception_message(ctx: &Ctx<'_>) -> String {
    let caught = ctx.catch();
    match Exception::from_js(ctx, caught.clone()) {
        Ok(exception) => exception.message().unwrap_or_default(),
        Err(_) => caught.as_string().and_then(|s| s.to_string().ok()).unwrap_or_else(|| "uncaught exception".to_string()),
    }
}

/// Wrap user code into a script whose completion value is the JSON text of its result.
fn build_script(
    code: &str,
    data: &Value,
    vars: &Value,
) -> Result<String> {
    let body = if has_return_statement(code) {
        code.to_string()
    } else {
        format!("return ({});", code.trim().trim_end_matches(';'))
    };

    let mut bindings = String::new();
    if let Value::Object(scope) = vars {
        for key in scope.keys().filter(|k| IDENT_RE.is_match(k) && !RESERVED.contains(&k.as_str())) {
            bindings.push_str(&format!("const {} = vars[{}];\n", key, serde_json::to_string(key)?));
        }
    }

    let empty = Value::Object(Map::new());
    let vars = if vars.is_object() { vars } else { &empty };
    Ok(format!(
        "(function() {{\nconst data = {};\nconst vars = {};\n{}const __result = (function() {{\n{}\n}})();\nreturn __result === undefined ? 'null' : JSON.stringify(__result);\n}})()",
        serde_json::to_string(data)?,
        serde_json::to_string(vars)?,
        bindings,
        body
    ))
}

/// Whether `code` returns at its own top level, making it a function body.
///
/// Strings, comments and nested function bodies are ignored, as are
/// property accesses (`x.return`) and object keys (`{ return: 1 }`).
fn has_return_statement(code: &str) -> bool {
    let visible = top_level_code(code);
    RETURN_RE.find_iter(&visible).any(|m| !visible[m.end()..].trim_start().starts_with(':'))
}

enum Scan {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// `code` with literals, comments and function bodies blanked out.
fn top_level_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut state = Scan::Code;
    // one entry per open brace, true for function bodies
    let mut braces: Vec<bool> = Vec::new();
    let mut function_depth = 0usize;
    let mut function_next = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match state {
            Scan::Quoted(quote) => {
                if c == '\\' {
                    i += 1;
                } else if c == quote {
                    state = Scan::Code;
                }
                out.push(' ');
            }
            Scan::LineComment => {
                if c == '\n' {
                    state = Scan::Code;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            Scan::BlockComment => {
                if c == '*' && next == Some('/') {
                    state = Scan::Code;
                    i += 1;
                }
                out.push(' ');
            }
            Scan::Code => match c {
                '/' if next == Some('/') => {
                    state = Scan::LineComment;
                    out.push(' ');
                }
                '/' if next == Some('*') => {
                    state = Scan::BlockComment;
                    i += 1;
                    out.push(' ');
                }
                '\'' | '"' | '`' => {
                    state = Scan::Quoted(c);
                    out.push(' ');
                }
                '{' => {
                    out.push(if function_depth == 0 { c } else { ' ' });
                    braces.push(function_next);
                    if function_next {
                        function_depth += 1;
                    }
                    function_next = false;
                }
                '}' => {
                    if braces.pop() == Some(true) {
                        function_depth -= 1;
                    }
                    out.push(if function_depth == 0 { c } else { ' ' });
                }
                '=' if next == Some('>') => {
                    function_next = chars[i + 2..].iter().find(|ch| !ch.is_whitespace()) == Some(&'{');
                    i += 1;
                    out.push_str(if function_depth == 0 { "=>" } else { "  " });
                }
                c if c.is_alphanumeric() || c == '_' || c == '$' => {
                    let start = i;
                    while i + 1 < chars.len() && (chars[i + 1].is_alphanumeric() || chars[i + 1] == '_' || chars[i + 1] == '$') {
                        i += 1;
                    }
                    let word: String = chars[start..=i].iter().collect();
                    if word == "function" {
                        function_next = true;
                    }
                    if function_depth == 0 {
                        out.push_str(&word);
                    } else {
                        out.extend(std::iter::repeat_n(' ', word.chars().count()));
                    }
                }
                _ => out.push(if function_depth == 0 { c } else { ' ' }),
            },
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sandbox() -> ScriptSandbox {
        ScriptSandbox::new(SandboxConfig::default())
    }

    #[test]
    fn test_expression() {
        let result = sandbox().evaluate("item.value * 2", &Value::Null, &json!({"item": {"value": 21}})).unwrap();
        assert_eq!(result, json!(42));
    }

    #[test]
    fn test_function_body() {
        let code = "const out = data.map(x => x + 1);\nreturn { out, n: out.length };";
        let result = sandbox().evaluate(code, &json!([1, 2]), &json!({})).unwrap();
        assert_eq!(result, json!({"out": [2, 3], "n": 2}));
    }

    #[test]
    fn test_vars_reachable_by_path() {
        let result = sandbox().evaluate("vars['http_request-1'].status_code", &Value::Null, &json!({"http_request-1": {"status_code": 200}})).unwrap();
        assert_eq!(result, json!(200));
    }

    #[test]
    fn test_undefined_is_null() {
        assert_eq!(sandbox().evaluate("undefined", &Value::Null, &json!({})).unwrap(), Value::Null);
    }

    #[test]
    fn test_throw_is_exception() {
        let err = sandbox().evaluate("(() => { throw new Error('boom'); })()", &Value::Null, &json!({})).unwrap_err();
        match err {
            FlowlineError::Exception {
                message,
                ..
            } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_timeout() {
        let sandbox = ScriptSandbox::new(SandboxConfig {
            timeout_ms: 50,
            ..Default::default()
        });
        let err = sandbox.evaluate("(() => { while (true) {} })()", &Value::Null, &json!({})).unwrap_err();
        assert!(matches!(err, FlowlineError::Script(_)));
    }

    #[test]
    fn test_property_named_return_is_an_expression() {
        let result = sandbox().evaluate("x.return", &Value::Null, &json!({"x": {"return": 5}})).unwrap();
        assert_eq!(result, json!(5));
        let result = sandbox().evaluate("({ return: 4 }).return + 1", &Value::Null, &json!({})).unwrap();
        assert_eq!(result, json!(5));
    }

    #[test]
    fn test_return_inside_string_is_an_expression() {
        assert_eq!(sandbox().evaluate("'return'", &Value::Null, &json!({})).unwrap(), json!("return"));
        assert_eq!(sandbox().evaluate("`to return` + \"!\"", &Value::Null, &json!({})).unwrap(), json!("to return!"));
    }

    #[test]
    fn test_return_in_nested_function_is_an_expression() {
        let result = sandbox().evaluate("items.map(v => { return v * 2 })", &Value::Null, &json!({"items": [1, 2]})).unwrap();
        assert_eq!(result, json!([2, 4]));
    }

    #[test]
    fn test_statement_return_is_a_function_body() {
        assert_eq!(sandbox().evaluate("if (true) return 3;", &Value::Null, &json!({})).unwrap(), json!(3));
        let code = "const f = function() { return 1; };\nreturn f() + 1;";
        assert_eq!(sandbox().evaluate(code, &Value::Null, &json!({})).unwrap(), json!(2));
    }

    #[test]
    fn test_return_detection_skips_comments() {
        assert!(!has_return_statement("// return early\n1 + 1"));
        assert!(!has_return_statement("/* return */ data.length"));
        assert!(has_return_statement("const n = 1; /* note */ return n"));
        assert!(has_return_statement("{ return 1 }"));
        assert!(!has_return_statement("x?.return"));
    }

    #[test]
    fn test_reserved_keys_not_bound() {
        let result = sandbox().evaluate("typeof vars['class']", &Value::Null, &json!({"class": 1})).unwrap();
        assert_eq!(result, json!("number"));
    }
}

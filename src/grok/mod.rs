//! Grok pattern compiler.
//!
//! A root expression mixes plain regex with placeholders of the form
//! `%{NAME}`, `%{NAME:capture}` or `%{NAME:capture:int|float}`. Placeholders
//! are expanded recursively from a [`PatternRegistry`] into one anchored
//! regex; the result is a [`CompiledMatcher`] that can be shared across
//! workers.

pub mod patterns;

use crate::error::ConfigError;
use crate::event::Value;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"%\{(?P<name>[A-Za-z0-9_]+)(?::(?P<capture>[^:}]+))?(?::(?P<kind>[^:}]*))?\}")
        .expect("placeholder regex is valid")
});

static PATTERN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("pattern name regex is valid"));

/// Prefix of the regex group names generated for `%{NAME:capture}`.
const GROUP_PREFIX: &str = "__grok";

/// Name used in errors for references made directly from a root expression.
const ROOT: &str = "<root>";

/// A set of named pattern definitions.
///
/// Registries are plain values: build one per pipeline, pass it to a
/// [`Compiler`], and nothing else sees it.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    definitions: HashMap<String, String>,
}

impl PatternRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with [`patterns::BUILTIN_PATTERNS`].
    pub fn with_builtins() -> Self {
        let definitions = patterns::BUILTIN_PATTERNS
            .iter()
            .map(|(name, expr)| (name.to_string(), expr.to_string()))
            .collect();
        PatternRegistry { definitions }
    }

    /// Add or replace a definition. References inside `expression` are not
    /// resolved until compile time.
    pub fn define(&mut self, name: &str, expression: &str) -> Result<(), ConfigError> {
        if !PATTERN_NAME.is_match(name) {
            return Err(ConfigError::InvalidPatternName(name.to_string()));
        }
        self.definitions
            .insert(name.to_string(), expression.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.definitions.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Load definitions in pattern-file format: one `NAME expression` per
    /// line, blank lines and `#` comments ignored. Returns the number of
    /// definitions added.
    pub fn load_str(&mut self, text: &str) -> Result<usize, ConfigError> {
        let mut added = 0;
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, expression) = match line.split_once(char::is_whitespace) {
                Some((name, expression)) if !expression.trim().is_empty() => {
                    (name, expression.trim())
                }
                _ => {
                    return Err(ConfigError::InvalidPatternDefinition {
                        line: index + 1,
                        message: format!("expected 'NAME expression', got '{}'", line),
                    })
                }
            };
            self.define(name, expression)?;
            added += 1;
        }
        Ok(added)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<usize, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.load_str(&text)
    }
}

/// Conversion applied to a captured substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureType {
    String,
    Int,
    Float,
}

impl CaptureType {
    fn parse(capture: &str, kind: &str) -> Result<Self, ConfigError> {
        match kind {
            "int" => Ok(CaptureType::Int),
            "float" => Ok(CaptureType::Float),
            _ => Err(ConfigError::InvalidCaptureType {
                capture: capture.to_string(),
                kind: kind.to_string(),
            }),
        }
    }

    /// Convert captured text; text that does not parse is kept verbatim.
    fn convert(self, text: &str) -> Value {
        match self {
            CaptureType::String => Value::Text(text.to_string()),
            CaptureType::Int => text
                .parse::<i64>()
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::Text(text.to_string())),
            CaptureType::Float => text
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::Text(text.to_string())),
        }
    }
}

/// A named capture slot of a compiled matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSlot {
    /// Group name inside the expanded regex.
    group: String,
    /// Field name the captured text is stored under.
    pub name: String,
    pub capture_type: CaptureType,
}

/// A fully expanded, anchored grok expression.
#[derive(Debug)]
pub struct CompiledMatcher {
    source: String,
    regex: Regex,
    slots: Vec<CaptureSlot>,
}

impl CompiledMatcher {
    /// The root expression this matcher was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The expanded regex, including anchors.
    pub fn expanded(&self) -> &str {
        self.regex.as_str()
    }

    pub fn slots(&self) -> &[CaptureSlot] {
        &self.slots
    }

    /// Capture names in group order, without duplicates.
    pub fn capture_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            if !names.contains(&slot.name.as_str()) {
                names.push(&slot.name);
            }
        }
        names
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Match the whole of `text`. Returns `None` when it does not match;
    /// otherwise every named capture that participated, in group order.
    /// Optional groups that did not participate are left out.
    pub fn captures(&self, text: &str) -> Option<IndexMap<String, Value>> {
        let caps = self.regex.captures(text)?;
        let mut fields = IndexMap::with_capacity(self.slots.len());
        for slot in &self.slots {
            if let Some(m) = caps.name(&slot.group) {
                fields.insert(slot.name.clone(), slot.capture_type.convert(m.as_str()));
            }
        }
        Some(fields)
    }
}

#[derive(Default)]
struct Expansion {
    regex: String,
    generated: HashMap<String, (String, CaptureType)>,
}

/// Compiles root expressions against a registry and caches the result per
/// distinct expression.
pub struct Compiler {
    registry: Arc<PatternRegistry>,
    cache: Mutex<HashMap<String, Arc<CompiledMatcher>>>,
}

impl Compiler {
    pub fn new(registry: PatternRegistry) -> Self {
        Compiler {
            registry: Arc::new(registry),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Number of distinct root expressions compiled so far.
    pub fn cached(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn compile(&self, expression: &str) -> Result<Arc<CompiledMatcher>, ConfigError> {
        if let Some(matcher) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(expression)
        {
            return Ok(Arc::clone(matcher));
        }

        let matcher = Arc::new(self.build(expression)?);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(expression.to_string())
            .or_insert_with(|| Arc::clone(&matcher));
        Ok(matcher)
    }

    fn build(&self, expression: &str) -> Result<CompiledMatcher, ConfigError> {
        let mut expansion = Expansion::default();
        let mut stack = Vec::new();
        self.expand(expression, ROOT, &mut stack, &mut expansion)?;

        let anchored = format!(r"\A(?:{})\z", expansion.regex);
        let regex = Regex::new(&anchored).map_err(|source| ConfigError::InvalidExpression {
            pattern: expression.to_string(),
            source,
        })?;

        // Generated groups map back to their capture names; any other named
        // group was written directly in the expression and keeps its name.
        let slots = regex
            .capture_names()
            .flatten()
            .map(|group| match expansion.generated.get(group) {
                Some((name, capture_type)) => CaptureSlot {
                    group: group.to_string(),
                    name: name.clone(),
                    capture_type: *capture_type,
                },
                None => CaptureSlot {
                    group: group.to_string(),
                    name: group.to_string(),
                    capture_type: CaptureType::String,
                },
            })
            .collect();

        Ok(CompiledMatcher {
            source: expression.to_string(),
            regex,
            slots,
        })
    }

    fn expand(
        &self,
        expression: &str,
        origin: &str,
        stack: &mut Vec<String>,
        out: &mut Expansion,
    ) -> Result<(), ConfigError> {
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(expression) {
            let Some(whole) = caps.get(0) else { continue };
            out.regex.push_str(&expression[last..whole.start()]);
            last = whole.end();

            let name = &caps["name"];
            if stack.iter().any(|seen| seen == name) {
                let mut chain = stack.clone();
                chain.push(name.to_string());
                return Err(ConfigError::CyclicPattern { chain });
            }
            let definition =
                self.registry
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownPattern {
                        name: name.to_string(),
                        referenced_from: origin.to_string(),
                    })?;

            match caps.name("capture") {
                Some(capture) => {
                    let capture = capture.as_str();
                    let capture_type = match caps.name("kind") {
                        Some(kind) => CaptureType::parse(capture, kind.as_str())?,
                        None => CaptureType::String,
                    };
                    let group = format!("{}{}", GROUP_PREFIX, out.generated.len());
                    out.regex.push_str(&format!("(?P<{}>", group));
                    out.generated
                        .insert(group, (capture.to_string(), capture_type));
                }
                None => out.regex.push_str("(?:"),
            }

            stack.push(name.to_string());
            self.expand(definition, name, stack, out)?;
            stack.pop();
            out.regex.push(')');
        }
        out.regex.push_str(&expression[last..]);
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new(PatternRegistry::with_builtins())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler_with(defs: &[(&str, &str)]) -> Compiler {
        let mut registry = PatternRegistry::new();
        for (name, expr) in defs {
            registry.define(name, expr).unwrap();
        }
        Compiler::new(registry)
    }

    #[test]
    fn test_expands_nested_references() {
        let compiler = compiler_with(&[("DIGITS", r"\d+"), ("PAIR", r"%{DIGITS}-%{DIGITS}")]);
        let matcher = compiler.compile("%{PAIR:pair}").unwrap();
        assert_eq!(matcher.expanded(), r"\A(?:(?P<__grok0>(?:\d+)-(?:\d+)))\z");
        assert_eq!(matcher.capture_names(), vec!["pair"]);
    }

    #[test]
    fn test_captures_are_exact_substrings() {
        let compiler = Compiler::default();
        let matcher = compiler
            .compile("%{IP:client} %{WORD:method} %{URIPATHPARAM:request}")
            .unwrap();
        let fields = matcher
            .captures("55.3.244.1 GET /index.html?x=1")
            .unwrap();
        assert_eq!(fields["client"], Value::from("55.3.244.1"));
        assert_eq!(fields["method"], Value::from("GET"));
        assert_eq!(fields["request"], Value::from("/index.html?x=1"));
    }

    #[test]
    fn test_match_is_anchored() {
        let compiler = Compiler::default();
        let matcher = compiler.compile("%{INT:n}").unwrap();
        assert!(matcher.captures("42").is_some());
        assert!(matcher.captures("x42").is_none());
        assert!(matcher.captures("42x").is_none());
    }

    #[test]
    fn test_optional_group_absent_when_not_matched() {
        let compiler = Compiler::default();
        let matcher = compiler
            .compile(r"%{WORD:verb}(?: %{INT:code})?")
            .unwrap();
        let fields = matcher.captures("ok").unwrap();
        assert_eq!(fields.len(), 1);
        assert!(!fields.contains_key("code"));

        let fields = matcher.captures("ok 200").unwrap();
        assert_eq!(fields["code"], Value::from("200"));
    }

    #[test]
    fn test_raw_named_groups_are_captures() {
        let compiler = Compiler::default();
        let matcher = compiler
            .compile(r"(?P<stamp>%{YEAR}-%{MONTHNUM2}) %{GREEDYDATA:rest}")
            .unwrap();
        assert_eq!(matcher.capture_names(), vec!["stamp", "rest"]);
        let fields = matcher.captures("2017-01 hello there").unwrap();
        assert_eq!(fields["stamp"], Value::from("2017-01"));
        assert_eq!(fields["rest"], Value::from("hello there"));
    }

    #[test]
    fn test_typed_captures() {
        let compiler = Compiler::default();
        let matcher = compiler
            .compile("%{NUMBER:bytes:int} %{NUMBER:ratio:float}")
            .unwrap();
        let fields = matcher.captures("512 0.25").unwrap();
        assert_eq!(fields["bytes"], Value::Integer(512));
        assert_eq!(fields["ratio"], Value::Float(0.25));

        // Not an integer: the text is kept as-is
        let fields = matcher.captures("1.5 2").unwrap();
        assert_eq!(fields["bytes"], Value::from("1.5"));
    }

    #[test]
    fn test_unknown_capture_type_fails() {
        let compiler = Compiler::default();
        let err = compiler.compile("%{NUMBER:n:bool}").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCaptureType { .. }));
    }

    #[test]
    fn test_unknown_pattern_fails() {
        let compiler = compiler_with(&[("A", "%{MISSING}")]);
        match compiler.compile("%{A:a}") {
            Err(ConfigError::UnknownPattern {
                name,
                referenced_from,
            }) => {
                assert_eq!(name, "MISSING");
                assert_eq!(referenced_from, "A");
            }
            other => panic!("expected UnknownPattern, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_fails() {
        let compiler = compiler_with(&[("A", "x%{B}"), ("B", "y%{C}"), ("C", "%{A}")]);
        match compiler.compile("%{A}") {
            Err(ConfigError::CyclicPattern { chain }) => {
                assert_eq!(chain, vec!["A", "B", "C", "A"]);
            }
            other => panic!("expected CyclicPattern, got {:?}", other),
        }

        let compiler = compiler_with(&[("SELF", "%{SELF}")]);
        assert!(matches!(
            compiler.compile("%{SELF}"),
            Err(ConfigError::CyclicPattern { .. })
        ));
    }

    #[test]
    fn test_repeated_reference_is_not_a_cycle() {
        let compiler = compiler_with(&[("D", r"\d"), ("TWO", "%{D}%{D}")]);
        assert!(compiler.compile("%{TWO}%{TWO}").is_ok());
    }

    #[test]
    fn test_invalid_expression_fails() {
        let compiler = compiler_with(&[("BAD", "(unclosed")]);
        assert!(matches!(
            compiler.compile("%{BAD}"),
            Err(ConfigError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn test_duplicate_capture_names_allowed() {
        let compiler = Compiler::default();
        let matcher = compiler
            .compile("%{WORD:w} %{INT:n}|%{INT:n} %{WORD:w}")
            .unwrap();
        assert_eq!(matcher.capture_names(), vec!["w", "n"]);
        let fields = matcher.captures("7 seven").unwrap();
        assert_eq!(fields["n"], Value::from("7"));
        assert_eq!(fields["w"], Value::from("seven"));
    }

    #[test]
    fn test_cache_per_expression() {
        let compiler = Compiler::default();
        let a = compiler.compile("%{INT:n}").unwrap();
        let b = compiler.compile("%{INT:n}").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        compiler.compile("%{WORD:w}").unwrap();
        assert_eq!(compiler.cached(), 2);
    }

    #[test]
    fn test_load_pattern_file_format() {
        let mut registry = PatternRegistry::new();
        let added = registry
            .load_str("# comment\n\nQUEUE_ID [0-9A-F]{10,11}\nPOSTFIX %{QUEUE_ID:queue}: .*\n")
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(registry.get("QUEUE_ID"), Some("[0-9A-F]{10,11}"));

        let compiler = Compiler::new(registry);
        let fields = compiler
            .compile("%{POSTFIX}")
            .unwrap()
            .captures("ABCDEF0123: removed")
            .unwrap();
        assert_eq!(fields["queue"], Value::from("ABCDEF0123"));
    }

    #[test]
    fn test_load_rejects_malformed_lines() {
        let mut registry = PatternRegistry::new();
        let err = registry.load_str("GOOD x\nLONELY\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPatternDefinition { line: 2, .. }));

        assert!(matches!(
            registry.define("bad-name", "x"),
            Err(ConfigError::InvalidPatternName(_))
        ));
    }

    #[test]
    fn test_every_builtin_compiles() {
        let compiler = Compiler::default();
        for (name, _) in patterns::BUILTIN_PATTERNS {
            let expression = format!("%{{{}}}", name);
            if let Err(e) = compiler.compile(&expression) {
                panic!("builtin {} failed to compile: {}", name, e);
            }
        }
    }

    #[test]
    fn test_builtin_ip_and_syslog() {
        let compiler = Compiler::default();
        let ip = compiler.compile("%{IP:ip}").unwrap();
        assert!(ip.is_match("10.0.0.5"));
        assert!(ip.is_match("fe80::1"));
        assert!(ip.is_match("2001:db8:0:0:0:0:2:1"));
        assert!(!ip.is_match("not-an-ip"));

        let syslog = compiler.compile("%{SYSLOGBASE} %{GREEDYDATA:msg}").unwrap();
        let fields = syslog
            .captures("Mar  7 04:02:16 myhost sshd[1234]: Accepted publickey")
            .unwrap();
        assert_eq!(fields["timestamp"], Value::from("Mar  7 04:02:16"));
        assert_eq!(fields["logsource"], Value::from("myhost"));
        assert_eq!(fields["program"], Value::from("sshd"));
        assert_eq!(fields["pid"], Value::from("1234"));
        assert_eq!(fields["msg"], Value::from("Accepted publickey"));
    }
}

//! Parameter declarations and the ordered source chain that resolves them.
//!
//! Resolution is a pure function of the declarations and the sources handed
//! in: explicit arguments, an environment snapshot, an optional
//! hyperparameter file, then declared defaults. Nothing here reads the
//! process environment except `EnvironmentSource::from_process`.

use crate::error::{MissingParameter, TrainingError, TrainingResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Declared type of a parameter; drives coercion of raw string values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Opaque location (filesystem path or URI), kept verbatim.
    Path,
    Text,
    Integer,
    Float,
    Flag,
    Choice(&'static [&'static str]),
    /// JSON array (`["a","b"]`) or comma-separated values.
    List,
}

impl ParamKind {
    #[must_use]
    pub fn expected(&self) -> String {
        match self {
            Self::Path => "non-empty path".to_string(),
            Self::Text => "text".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Float => "finite number".to_string(),
            Self::Flag => "boolean (true/false)".to_string(),
            Self::Choice(options) => format!("one of {}", options.join("|")),
            Self::List => "JSON array or comma-separated list".to_string(),
        }
    }

    /// Coerce a raw value to this kind.
    pub fn coerce(&self, parameter: &str, raw: &str) -> TrainingResult<ParamValue> {
        let invalid = || TrainingError::invalid(parameter, raw, self.expected());
        let trimmed = raw.trim();

        match self {
            Self::Path => {
                if trimmed.is_empty() {
                    return Err(invalid());
                }
                Ok(ParamValue::Path(raw.to_string()))
            }
            Self::Text => Ok(ParamValue::Text(raw.to_string())),
            Self::Integer => trimmed.parse::<i64>().map(ParamValue::Integer).map_err(|_| invalid()),
            Self::Float => match trimmed.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(ParamValue::Float(v)),
                _ => Err(invalid()),
            },
            Self::Flag => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(ParamValue::Flag(true)),
                "false" | "0" | "no" | "off" => Ok(ParamValue::Flag(false)),
                _ => Err(invalid()),
            },
            Self::Choice(options) => {
                let lowered = trimmed.to_ascii_lowercase();
                options
                    .iter()
                    .find(|o| **o == lowered)
                    .map(|o| ParamValue::Choice((*o).to_string()))
                    .ok_or_else(invalid)
            }
            Self::List => {
                let items: Vec<String> = if trimmed.starts_with('[') {
                    serde_json::from_str(trimmed).map_err(|_| invalid())?
                } else {
                    trimmed
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                };
                if items.is_empty() {
                    return Err(invalid());
                }
                Ok(ParamValue::List(items))
            }
        }
    }
}

/// A resolved, typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Path(String),
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
    Choice(String),
    List(Vec<String>),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(s) | Self::Text(s) | Self::Choice(s) => f.write_str(s),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{v}"),
            Self::List(items) => f.write_str(&items.join(",")),
        }
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "detail", rename_all = "snake_case")]
pub enum Origin {
    Argument,
    Environment(String),
    File(PathBuf),
    Default,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Argument => f.write_str("argument"),
            Self::Environment(var) => write!(f, "env {var}"),
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Default => f.write_str("default"),
        }
    }
}

/// Declaration of a single named parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    /// Long CLI flag, without the leading `--`.
    pub flag: &'static str,
    pub env: Option<&'static str>,
    pub kind: ParamKind,
    pub default: Option<String>,
    pub required: bool,
    pub help: &'static str,
}

impl ParamSpec {
    #[must_use]
    pub fn new(name: &'static str, flag: &'static str, kind: ParamKind) -> Self {
        Self { name, flag, env: None, kind, default: None, required: true, help: "" }
    }

    #[must_use]
    pub fn path(name: &'static str, flag: &'static str) -> Self {
        Self::new(name, flag, ParamKind::Path)
    }

    #[must_use]
    pub fn env(mut self, var: &'static str) -> Self {
        self.env = Some(var);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Absent optional parameters resolve to nothing instead of failing.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn help(mut self, help: &'static str) -> Self {
        self.help = help;
        self
    }

    fn missing(&self) -> MissingParameter {
        MissingParameter {
            name: self.name.to_string(),
            flag: self.flag.to_string(),
            env: self.env.map(str::to_string),
        }
    }
}

/// One provider in the resolution chain.
pub trait ParameterSource {
    fn name(&self) -> &'static str;

    /// Raw value for `spec` and its origin, if this source supplies one.
    fn lookup(&self, spec: &ParamSpec) -> Option<(String, Origin)>;
}

/// Explicit arguments keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct ArgumentSource {
    values: BTreeMap<String, String>,
}

impl ArgumentSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Record `value` under `name` when present.
    pub fn set_opt<T: ToString>(&mut self, name: &str, value: Option<T>) {
        if let Some(value) = value {
            self.set(name, value.to_string());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ArgumentSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

impl ParameterSource for ArgumentSource {
    fn name(&self) -> &'static str {
        "arguments"
    }

    fn lookup(&self, spec: &ParamSpec) -> Option<(String, Origin)> {
        self.values.get(spec.name).map(|v| (v.clone(), Origin::Argument))
    }
}

/// Snapshot of environment variables. Empty values count as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSource {
    vars: BTreeMap<String, String>,
}

impl EnvironmentSource {
    /// Capture the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        std::env::vars().collect()
    }

    /// Value of `var`, ignoring empty or whitespace-only values.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&str> {
        self.vars.get(var).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    #[must_use]
    pub fn contains(&self, var: &str) -> bool {
        self.get(var).is_some()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

impl ParameterSource for EnvironmentSource {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn lookup(&self, spec: &ParamSpec) -> Option<(String, Origin)> {
        let var = spec.env?;
        self.get(var).map(|v| (v.to_string(), Origin::Environment(var.to_string())))
    }
}

/// Flat hyperparameter file (JSON object or TOML table).
///
/// Keys may use the parameter name (`learning_rate`) or its flag
/// (`learning-rate`). Scalars are stringified; arrays are kept as JSON so
/// list parameters coerce the same way they do from the environment.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileSource {
    pub fn load(path: &Path) -> TrainingResult<Self> {
        let invalid = |expected: String| {
            TrainingError::invalid("config", path.display().to_string(), expected)
        };
        let content =
            std::fs::read_to_string(path).map_err(|e| invalid(format!("readable file ({e})")))?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        let table: serde_json::Value = if is_toml {
            let value: toml::Value = toml::from_str(&content)
                .map_err(|e| invalid(format!("TOML table ({e})")))?;
            serde_json::to_value(value)?
        } else {
            serde_json::from_str(&content).map_err(|e| invalid(format!("JSON object ({e})")))?
        };

        let serde_json::Value::Object(map) = table else {
            return Err(invalid("flat key/value table".to_string()));
        };

        let mut values = BTreeMap::new();
        for (key, value) in map {
            let raw = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Array(_) => value.to_string(),
                serde_json::Value::Null | serde_json::Value::Object(_) => continue,
            };
            values.insert(key, raw);
        }

        Ok(Self { path: path.to_path_buf(), values })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ParameterSource for FileSource {
    fn name(&self) -> &'static str {
        "file"
    }

    fn lookup(&self, spec: &ParamSpec) -> Option<(String, Origin)> {
        self.values
            .get(spec.name)
            .or_else(|| self.values.get(spec.flag))
            .map(|v| (v.clone(), Origin::File(self.path.clone())))
    }
}

/// Ordered sources; the first one that supplies a value wins.
#[derive(Default)]
pub struct SourceChain {
    sources: Vec<Box<dyn ParameterSource>>,
}

impl SourceChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, source: impl ParameterSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    #[must_use]
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    fn lookup(&self, spec: &ParamSpec) -> Option<(String, Origin)> {
        self.sources.iter().find_map(|s| s.lookup(spec))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub value: ParamValue,
    pub origin: Origin,
}

/// Resolved configuration for one run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct RunConfiguration {
    values: BTreeMap<String, Resolved>,
}

impl RunConfiguration {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Resolved> {
        self.values.get(name)
    }

    #[must_use]
    pub fn origin(&self, name: &str) -> Option<&Origin> {
        self.values.get(name).map(|r| &r.origin)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resolved)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn require(&self, name: &str) -> TrainingResult<&ParamValue> {
        self.values.get(name).map(|r| &r.value).ok_or_else(|| {
            TrainingError::MissingConfiguration(vec![MissingParameter {
                name: name.to_string(),
                flag: name.replace('_', "-"),
                env: None,
            }])
        })
    }

    fn mismatch(name: &str, value: &ParamValue, expected: &str) -> TrainingError {
        TrainingError::invalid(name, value.to_string(), expected)
    }

    pub fn path(&self, name: &str) -> TrainingResult<&str> {
        match self.require(name)? {
            ParamValue::Path(p) => Ok(p),
            other => Err(Self::mismatch(name, other, "path")),
        }
    }

    /// Path for an optional parameter; `None` when it did not resolve.
    pub fn optional_path(&self, name: &str) -> TrainingResult<Option<&str>> {
        if self.values.contains_key(name) {
            self.path(name).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn text(&self, name: &str) -> TrainingResult<&str> {
        match self.require(name)? {
            ParamValue::Text(s) => Ok(s),
            other => Err(Self::mismatch(name, other, "text")),
        }
    }

    pub fn integer(&self, name: &str) -> TrainingResult<i64> {
        match self.require(name)? {
            ParamValue::Integer(v) => Ok(*v),
            other => Err(Self::mismatch(name, other, "integer")),
        }
    }

    pub fn float(&self, name: &str) -> TrainingResult<f64> {
        match self.require(name)? {
            ParamValue::Float(v) => Ok(*v),
            #[allow(clippy::cast_precision_loss)]
            ParamValue::Integer(v) => Ok(*v as f64),
            other => Err(Self::mismatch(name, other, "float")),
        }
    }

    pub fn flag(&self, name: &str) -> TrainingResult<bool> {
        match self.require(name)? {
            ParamValue::Flag(v) => Ok(*v),
            other => Err(Self::mismatch(name, other, "boolean")),
        }
    }

    pub fn choice(&self, name: &str) -> TrainingResult<&str> {
        match self.require(name)? {
            ParamValue::Choice(s) => Ok(s),
            other => Err(Self::mismatch(name, other, "choice")),
        }
    }

    pub fn list(&self, name: &str) -> TrainingResult<&[String]> {
        match self.require(name)? {
            ParamValue::List(items) => Ok(items),
            other => Err(Self::mismatch(name, other, "list")),
        }
    }
}

/// Resolve every declared parameter against `chain`.
///
/// Missing required parameters are collected and reported together. If
/// nothing is missing, the first value that fails coercion (in declaration
/// order) is reported.
pub fn resolve(specs: &[ParamSpec], chain: &SourceChain) -> TrainingResult<RunConfiguration> {
    let mut values = BTreeMap::new();
    let mut missing = Vec::new();
    let mut invalid = None;

    for spec in specs {
        let found = chain
            .lookup(spec)
            .or_else(|| spec.default.clone().map(|d| (d, Origin::Default)));

        let Some((raw, origin)) = found else {
            if spec.required {
                missing.push(spec.missing());
            }
            continue;
        };

        match spec.kind.coerce(spec.name, &raw) {
            Ok(value) => {
                values.insert(spec.name.to_string(), Resolved { value, origin });
            }
            Err(err) => {
                invalid.get_or_insert(err);
            }
        }
    }

    if !missing.is_empty() {
        return Err(TrainingError::MissingConfiguration(missing));
    }
    if let Some(err) = invalid {
        return Err(err);
    }

    Ok(RunConfiguration { values })
}

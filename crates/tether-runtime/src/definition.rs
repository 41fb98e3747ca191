//! Container definitions: the OCI-style document an engine runs.
//!
//! The document is kept as raw JSON so engines see every field they
//! understand; only the `process` section is interpreted here.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tether_core::error::EngineError;

/// The process section of a container definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Program and arguments; the first entry is the executable.
    pub args: Vec<String>,
    /// Environment as `KEY=value` entries.
    #[serde(default)]
    pub env: Vec<String>,
    /// Working directory.
    #[serde(default = "root_dir")]
    pub cwd: String,
    /// Whether a terminal is allocated.
    #[serde(default)]
    pub terminal: bool,
}

fn root_dir() -> String {
    "/".into()
}

impl ProcessSpec {
    /// Creates a process running `args` in `/` with an empty environment.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            cwd: root_dir(),
            terminal: false,
        }
    }

    /// Iterates over well-formed `KEY=value` environment entries.
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().filter_map(|entry| entry.split_once('='))
    }
}

/// A parsed container definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDefinition {
    document: Value,
    process: Option<ProcessSpec>,
}

impl ContainerDefinition {
    /// Loads a definition from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not hold a valid
    /// definition.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::from_io(&e, format!("cannot read `{}`", path.display())))?;
        Self::from_json(&content)
    }

    /// Parses a definition from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object or its `process`
    /// section is malformed.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let document: Value = serde_json::from_str(json)
            .map_err(|e| EngineError::new(format!("cannot parse container definition: {e}")))?;
        Self::from_value(document)
    }

    /// Wraps an already-parsed JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not an object or its `process`
    /// section is malformed.
    pub fn from_value(document: Value) -> Result<Self, EngineError> {
        if !document.is_object() {
            return Err(EngineError::new(
                "invalid container definition: expected a JSON object",
            ));
        }
        let process = match document.get("process") {
            None | Some(Value::Null) => None,
            Some(section) => Some(
                ProcessSpec::deserialize(section)
                    .map_err(|e| EngineError::new(format!("invalid process section: {e}")))?,
            ),
        };
        Ok(Self { document, process })
    }

    /// Returns a builder seeded with `template`.
    #[must_use]
    pub fn builder(template: Value) -> DefinitionBuilder {
        DefinitionBuilder::from_template(template)
    }

    /// The process section, if the definition has one.
    #[must_use]
    pub const fn process(&self) -> Option<&ProcessSpec> {
        self.process.as_ref()
    }

    /// The raw document.
    #[must_use]
    pub const fn document(&self) -> &Value {
        &self.document
    }

    /// String annotations attached to the definition.
    #[must_use]
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.document
            .get("annotations")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_owned())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Serializes the document back to JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        self.document.to_string()
    }
}

/// Incremental editor for a definition document.
///
/// Each setter creates the intermediate sections it needs, so it can be
/// applied to any template, including an empty object.
#[derive(Debug, Clone)]
pub struct DefinitionBuilder {
    document: Value,
}

impl DefinitionBuilder {
    /// Starts from `template`; non-object templates are replaced by `{}`.
    #[must_use]
    pub fn from_template(template: Value) -> Self {
        let document = if template.is_object() {
            template
        } else {
            Value::Object(Map::new())
        };
        Self { document }
    }

    /// Parses a JSON template.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON.
    pub fn from_json(template: &str) -> Result<Self, EngineError> {
        let value = serde_json::from_str(template)
            .map_err(|e| EngineError::new(format!("cannot parse definition template: {e}")))?;
        Ok(Self::from_template(value))
    }

    /// Sets the root filesystem path.
    #[must_use]
    pub fn root_path(mut self, path: impl Into<String>) -> Self {
        self.set(&["root"], "path", json!(path.into()));
        self
    }

    /// Sets the process arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        self.set(&["process"], "args", json!(args));
        self
    }

    /// Appends a `KEY=value` environment entry.
    #[must_use]
    pub fn env(mut self, key: &str, value: &str) -> Self {
        if let Some(process) = section(&mut self.document, &["process"]) {
            let env = process
                .entry("env")
                .or_insert_with(|| Value::Array(Vec::new()));
            if !env.is_array() {
                *env = Value::Array(Vec::new());
            }
            if let Value::Array(entries) = env {
                entries.push(json!(format!("{key}={value}")));
            }
        }
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.set(&["process"], "cwd", json!(cwd.into()));
        self
    }

    /// Enables or disables terminal allocation.
    #[must_use]
    pub fn terminal(mut self, enabled: bool) -> Self {
        self.set(&["process"], "terminal", json!(enabled));
        self
    }

    /// Sets the hostname.
    #[must_use]
    pub fn hostname(mut self, name: impl Into<String>) -> Self {
        self.set(&[], "hostname", json!(name.into()));
        self
    }

    /// Adds or replaces an annotation.
    #[must_use]
    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.set(&["annotations"], &key, json!(value.into()));
        self
    }

    /// Sets the memory limit in bytes.
    #[must_use]
    pub fn memory_limit(mut self, bytes: i64) -> Self {
        self.set(&["linux", "resources", "memory"], "limit", json!(bytes));
        self
    }

    /// Sets the relative CPU weight.
    #[must_use]
    pub fn cpu_shares(mut self, shares: u64) -> Self {
        self.set(&["linux", "resources", "cpu"], "shares", json!(shares));
        self
    }

    /// Sets the CPU quota in microseconds per period.
    #[must_use]
    pub fn cpu_quota(mut self, quota: i64) -> Self {
        self.set(&["linux", "resources", "cpu"], "quota", json!(quota));
        self
    }

    /// Sets the maximum number of processes.
    #[must_use]
    pub fn pids_limit(mut self, limit: i64) -> Self {
        self.set(&["linux", "resources", "pids"], "limit", json!(limit));
        self
    }

    /// Finishes the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting `process` section is malformed.
    pub fn build(self) -> Result<ContainerDefinition, EngineError> {
        ContainerDefinition::from_value(self.document)
    }

    fn set(&mut self, path: &[&str], key: &str, value: Value) {
        if let Some(map) = section(&mut self.document, path) {
            let _ = map.insert(key.to_owned(), value);
        }
    }
}

/// Walks `path` from the document root, replacing non-object sections on
/// the way, and returns the innermost object.
fn section<'a>(document: &'a mut Value, path: &[&str]) -> Option<&'a mut Map<String, Value>> {
    let mut current = document;
    for key in path {
        current = ensure_object(current)?
            .entry((*key).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current)
}

fn ensure_object(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}

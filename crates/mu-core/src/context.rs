//! Template context.
//!
//! A context maps variable names to string values that templates can
//! reference as `{{ name }}`. Two names are populated by
//! [`Context::with_build_defaults`]:
//! - `build_time` - UTC timestamp of the invocation (`%Y%m%d%H%M%S`)
//! - `user` - the invoking user, from `USER` or `USERNAME`
//!
//! The built-ins `env()` and `cmd()` are never stored here.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

static VARIABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Caller-supplied variables available to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    vars: BTreeMap<String, String>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from `KEY=VALUE` entries, as given on a command line.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ctx = Self::new();
        for entry in entries {
            let (key, value) = parse_entry(entry.as_ref())?;
            ctx.vars.insert(key, value);
        }
        Ok(ctx)
    }

    /// Fill in `build_time` and `user` unless the caller already set them.
    pub fn with_build_defaults(mut self) -> Self {
        self.vars
            .entry("build_time".to_string())
            .or_insert_with(|| chrono::Utc::now().format("%Y%m%d%H%M%S").to_string());

        if !self.vars.contains_key("user") {
            let user = std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_default();
            self.vars.insert("user".to_string(), user);
        }
        self
    }

    /// Add or replace a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Context
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Split a `KEY=VALUE` entry. The value may itself contain `=`.
pub fn parse_entry(entry: &str) -> Result<(String, String)> {
    let (key, value) = entry
        .split_once('=')
        .ok_or_else(|| Error::InvalidContextEntry(entry.to_string()))?;
    let key = key.trim();
    if !VARIABLE_NAME.is_match(key) {
        return Err(Error::InvalidVariableName(key.to_string()));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Builder for creating a Context.
pub struct ContextBuilder {
    ctx: Context,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: Context::new(),
        }
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.set(name, value);
        self
    }

    pub fn with_build_time(self, build_time: impl Into<String>) -> Self {
        self.with_var("build_time", build_time)
    }

    pub fn with_user(self, user: impl Into<String>) -> Self {
        self.with_var("user", user)
    }

    pub fn build(self) -> Context {
        self.ctx
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let ctx = ContextBuilder::new()
            .with_build_time("20240101120000")
            .with_var("region", "us-east-1")
            .build();

        assert_eq!(ctx.get("build_time"), Some("20240101120000"));
        assert_eq!(ctx.get("region"), Some("us-east-1"));
        assert_eq!(ctx.get("missing"), None);
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_from_entries() {
        let ctx = Context::from_entries(["stage=prod", "query=a=b"]).unwrap();
        assert_eq!(ctx.get("stage"), Some("prod"));
        assert_eq!(ctx.get("query"), Some("a=b"));
    }

    #[test]
    fn test_from_entries_rejects_missing_equals() {
        let err = Context::from_entries(["stage"]).unwrap_err();
        assert!(matches!(err, Error::InvalidContextEntry(e) if e == "stage"));
    }

    #[test]
    fn test_from_entries_rejects_bad_name() {
        let err = Context::from_entries(["build-time=now"]).unwrap_err();
        assert!(matches!(err, Error::InvalidVariableName(n) if n == "build-time"));

        let err = Context::from_entries(["1st=x"]).unwrap_err();
        assert!(matches!(err, Error::InvalidVariableName(_)));
    }

    #[test]
    fn test_build_defaults_do_not_override() {
        let ctx = ContextBuilder::new()
            .with_build_time("T")
            .with_user("deployer")
            .build()
            .with_build_defaults();

        assert_eq!(ctx.get("build_time"), Some("T"));
        assert_eq!(ctx.get("user"), Some("deployer"));
    }

    #[test]
    fn test_build_defaults_fill_in() {
        let ctx = Context::new().with_build_defaults();
        let build_time = ctx.get("build_time").unwrap();
        assert_eq!(build_time.len(), 14);
        assert!(build_time.chars().all(|c| c.is_ascii_digit()));
        assert!(ctx.contains("user"));
    }

    #[test]
    fn test_from_iterator_and_iter_order() {
        let ctx: Context = [("b", "2"), ("a", "1")].into_iter().collect();
        let names: Vec<&str> = ctx.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}

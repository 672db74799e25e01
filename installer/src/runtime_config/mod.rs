// Runtime options file (~user/.odoorc)
//
// Two disjoint groups: computed options (written active, first) and default options (written
// commented out, after). Insertion order is preserved in both groups.

pub mod compute;
pub mod profile;

use anyhow::Result;
use std::fmt;

pub use compute::{compute_limits, compute_runtime_options, default_options, ResourceLimits};
pub use profile::{HostProfiler, LiveHostProfiler, ResourceProfile};

pub const OPTIONS_SECTION: &str = "[options]";
pub const OPTIONS_FILE_NAME: &str = ".odoorc";
pub const OPTIONS_FILE_MODE: u32 = 0o640;

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Float(f64),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Text(s) => f.write_str(s),
            OptionValue::Int(n) => write!(f, "{}", n),
            OptionValue::Bool(true) => f.write_str("True"),
            OptionValue::Bool(false) => f.write_str("False"),
            // `{:?}` keeps the trailing `.0` on whole numbers.
            OptionValue::Float(x) => write!(f, "{:?}", x),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Text(s)
    }
}

impl From<i64> for OptionValue {
    fn from(n: i64) -> Self {
        OptionValue::Int(n)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<f64> for OptionValue {
    fn from(x: f64) -> Self {
        OptionValue::Float(x)
    }
}

/// Insertion-ordered option mapping. Re-inserting a key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionSet {
    entries: Vec<(String, OptionValue)>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<OptionValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeOptions {
    computed: OptionSet,
    defaults: OptionSet,
}

impl RuntimeOptions {
    /// Fails if any key appears in both groups.
    pub fn new(computed: OptionSet, defaults: OptionSet) -> Result<Self> {
        let collisions: Vec<&str> = computed
            .keys()
            .filter(|k| defaults.contains_key(k))
            .collect();
        if !collisions.is_empty() {
            anyhow::bail!(
                "Runtime option keys are both computed and default: {}",
                collisions.join(", ")
            );
        }
        Ok(Self { computed, defaults })
    }

    pub fn computed(&self) -> &OptionSet {
        &self.computed
    }

    pub fn defaults(&self) -> &OptionSet {
        &self.defaults
    }

    /// `[options]`, then `key = value` for computed options, then `#key = value` for defaults.
    pub fn render(&self) -> String {
        let mut out = String::from(OPTIONS_SECTION);
        out.push('\n');
        for (k, v) in self.computed.iter() {
            out.push_str(&format!("{} = {}\n", k, v));
        }
        for (k, v) in self.defaults.iter() {
            out.push_str(&format!("#{} = {}\n", k, v));
        }
        out
    }
}

/// Active `key = value` entries of the `[options]` section, in file order.
///
/// Commented lines (`#` or `;`) and other sections are skipped.
pub fn parse_active_options(contents: &str) -> Vec<(String, String)> {
    let mut in_options = false;
    let mut out = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_options = line == OPTIONS_SECTION;
            continue;
        }
        if !in_options {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            out.push((k.trim().to_string(), v.trim().to_string()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RuntimeOptions {
        let mut computed = OptionSet::new();
        computed.insert("workers", 4_i64);
        computed.insert("list_db", false);
        computed.insert("db_name", "koozic-v2");
        let mut defaults = OptionSet::new();
        defaults.insert("http_port", 8069_i64);
        defaults.insert("osv_memory_age_limit", 1.0_f64);
        defaults.insert("demo", "{}");
        RuntimeOptions::new(computed, defaults).expect("disjoint")
    }

    #[test]
    fn value_display_matches_ini_conventions() {
        assert_eq!(OptionValue::Bool(true).to_string(), "True");
        assert_eq!(OptionValue::Bool(false).to_string(), "False");
        assert_eq!(OptionValue::Float(1.0).to_string(), "1.0");
        assert_eq!(OptionValue::Int(-1).to_string(), "-1");
        assert_eq!(OptionValue::from("").to_string(), "");
    }

    #[test]
    fn insert_keeps_first_position_on_replace() {
        let mut s = OptionSet::new();
        s.insert("b", 1_i64);
        s.insert("a", 2_i64);
        s.insert("b", 3_i64);
        assert_eq!(s.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(s.get("b"), Some(&OptionValue::Int(3)));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn colliding_groups_are_rejected() {
        let mut computed = OptionSet::new();
        computed.insert("workers", 2_i64);
        let mut defaults = OptionSet::new();
        defaults.insert("workers", 0_i64);
        let err = RuntimeOptions::new(computed, defaults).unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn render_puts_computed_first_and_comments_defaults() {
        let text = sample().render();
        assert_eq!(
            text,
            "[options]\n\
             workers = 4\n\
             list_db = False\n\
             db_name = koozic-v2\n\
             #http_port = 8069\n\
             #osv_memory_age_limit = 1.0\n\
             #demo = {}\n"
        );
    }

    #[test]
    fn parse_active_options_reads_back_computed_section() {
        let opts = sample();
        let parsed = parse_active_options(&opts.render());
        let expected: Vec<(String, String)> = opts
            .computed()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn parse_active_options_ignores_other_sections() {
        let parsed = parse_active_options("[misc]\na = 1\n[options]\n; note\nb = 2\n");
        assert_eq!(parsed, vec![("b".to_string(), "2".to_string())]);
    }
}

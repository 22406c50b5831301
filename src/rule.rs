//! Routing rules and profiles.
//!
//! A [`Rule`] pairs a [`Matcher`] (named constraints combined with AND) with a
//! destination [`Template`]. A [`Profile`] is an ordered list of rules plus a
//! default template; the first matching rule wins.
//!
//! Rules are usually authored as [`RuleConfig`] values inside a settings
//! document and compiled with [`ProfileConfig::compile`], which validates
//! templates, globs, regexes and ranges before any file is touched.

use crate::scan::FileRecord;
use crate::tags::{SizeTiers, TemplateError};
use crate::template::Template;
use chrono::NaiveDate;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Name reported for files routed by a profile's default template.
pub const DEFAULT_RULE_NAME: &str = "(default)";

/// Profile configuration defects, reported before planning starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("rule '{rule}': {source}")]
    Template {
        rule: String,
        #[source]
        source: TemplateError,
    },
    #[error("rule '{rule}': invalid glob '{pattern}': {reason}")]
    InvalidGlob {
        rule: String,
        pattern: String,
        reason: String,
    },
    #[error("rule '{rule}': invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        rule: String,
        pattern: String,
        reason: String,
    },
    #[error("rule '{rule}': {what} range is empty (lower bound must be below upper bound)")]
    EmptyRange { rule: String, what: &'static str },
}

/// A single named condition on a file.
pub trait Constraint: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, record: &FileRecord) -> bool;
}

/// File name contains any of the keywords (case-insensitive).
#[derive(Debug, Clone)]
pub struct NameContains {
    keywords: Vec<String>,
}

impl NameContains {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl Constraint for NameContains {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn matches(&self, record: &FileRecord) -> bool {
        let name = record.file_name.to_lowercase();
        self.keywords.iter().any(|k| name.contains(k.as_str()))
    }
}

/// Extension is one of a set (compared lowercase, leading dots ignored).
#[derive(Debug, Clone)]
pub struct ExtensionIn {
    extensions: HashSet<String>,
}

impl ExtensionIn {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }
}

impl Constraint for ExtensionIn {
    fn name(&self) -> &'static str {
        "extension"
    }

    fn matches(&self, record: &FileRecord) -> bool {
        self.extensions.contains(&record.extension)
    }
}

/// Size in bytes within `[min, max)`.
#[derive(Debug, Clone, Copy)]
pub struct SizeRange {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl Constraint for SizeRange {
    fn name(&self) -> &'static str {
        "size"
    }

    fn matches(&self, record: &FileRecord) -> bool {
        self.min.is_none_or(|min| record.size >= min)
            && self.max.is_none_or(|max| record.size < max)
    }
}

/// Local modification date within `[from, to)`.
#[derive(Debug, Clone, Copy)]
pub struct ModifiedBetween {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl Constraint for ModifiedBetween {
    fn name(&self) -> &'static str {
        "date"
    }

    fn matches(&self, record: &FileRecord) -> bool {
        let date = record.modified.date_naive();
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date < to)
    }
}

/// File name matches a glob pattern.
#[derive(Debug, Clone)]
pub struct NameGlob(pub Pattern);

impl Constraint for NameGlob {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn matches(&self, record: &FileRecord) -> bool {
        self.0.matches(&record.file_name)
    }
}

/// File name matches a regular expression.
#[derive(Debug, Clone)]
pub struct NameRegex(pub Regex);

impl Constraint for NameRegex {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn matches(&self, record: &FileRecord) -> bool {
        self.0.is_match(&record.file_name)
    }
}

/// Conjunction of constraints. An empty matcher matches every file.
#[derive(Debug, Default)]
pub struct Matcher {
    constraints: Vec<Box<dyn Constraint>>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constraint: impl Constraint + 'static) {
        self.constraints.push(Box::new(constraint));
    }

    pub fn with(mut self, constraint: impl Constraint + 'static) -> Self {
        self.push(constraint);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Names of the configured constraints, in evaluation order.
    pub fn constraint_names(&self) -> Vec<&'static str> {
        self.constraints.iter().map(|c| c.name()).collect()
    }

    pub fn matches(&self, record: &FileRecord) -> bool {
        self.constraints.iter().all(|c| c.matches(record))
    }
}

/// A routing rule: matcher, destination template and folder affixes.
#[derive(Debug)]
pub struct Rule {
    name: String,
    matcher: Matcher,
    template: Template,
    prefix: String,
    suffix: String,
}

impl Rule {
    pub fn new(name: impl Into<String>, template: Template) -> Self {
        Self {
            name: name.into(),
            matcher: Matcher::new(),
            template,
            prefix: String::new(),
            suffix: String::new(),
        }
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_constraint(mut self, constraint: impl Constraint + 'static) -> Self {
        self.matcher.push(constraint);
        self
    }

    /// Text added around the last folder of the rendered destination.
    pub fn with_affixes(mut self, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self.suffix = suffix.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn matches(&self, record: &FileRecord) -> bool {
        self.matcher.matches(record)
    }

    /// Renders the destination folder for `record`, before normalization.
    pub fn render(&self, record: &FileRecord, tiers: &SizeTiers) -> String {
        let rendered = self.template.render(record, tiers);
        if self.prefix.is_empty() && self.suffix.is_empty() {
            return rendered;
        }

        let trimmed = rendered.trim_end_matches(['/', '\\']);
        let (head, last) = match trimmed.rfind(['/', '\\']) {
            Some(idx) => trimmed.split_at(idx + 1),
            None => ("", trimmed),
        };
        format!("{head}{}{last}{}", self.prefix, self.suffix)
    }
}

/// Ordered rules plus a default destination.
#[derive(Debug)]
pub struct Profile {
    name: String,
    rules: Vec<Rule>,
    default_rule: Rule,
}

impl Profile {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>, default_template: Template) -> Self {
        Self {
            name: name.into(),
            rules,
            default_rule: Rule::new(DEFAULT_RULE_NAME, default_template),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn default_rule(&self) -> &Rule {
        &self.default_rule
    }

    /// First rule in list order that matches, or the default rule.
    pub fn select_rule(&self, record: &FileRecord) -> &Rule {
        self.rules
            .iter()
            .find(|rule| rule.matches(record))
            .unwrap_or(&self.default_rule)
    }
}

/// Serialized form of a [`Rule`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    /// Any of these substrings in the file name (case-insensitive).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
    /// Inclusive lower size bound in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    /// Exclusive upper size bound in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// Inclusive lower bound on the local modification date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_from: Option<NaiveDate>,
    /// Exclusive upper bound on the local modification date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_to: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_glob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_regex: Option<String>,
    pub template: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suffix: String,
}

impl RuleConfig {
    /// Validates and builds the runtime rule.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleError`] naming this rule if its template, glob, regex
    /// or ranges are invalid.
    pub fn compile(&self) -> Result<Rule, RuleError> {
        let template = Template::parse(&self.template).map_err(|source| RuleError::Template {
            rule: self.name.clone(),
            source,
        })?;

        let mut matcher = Matcher::new();
        if self.keywords.iter().any(|k| !k.trim().is_empty()) {
            matcher.push(NameContains::new(&self.keywords));
        }
        if self.extensions.iter().any(|e| !e.trim().is_empty()) {
            matcher.push(ExtensionIn::new(&self.extensions));
        }
        if self.min_size.is_some() || self.max_size.is_some() {
            if let (Some(min), Some(max)) = (self.min_size, self.max_size)
                && min >= max
            {
                return Err(self.empty_range("size"));
            }
            matcher.push(SizeRange {
                min: self.min_size,
                max: self.max_size,
            });
        }
        if self.modified_from.is_some() || self.modified_to.is_some() {
            if let (Some(from), Some(to)) = (self.modified_from, self.modified_to)
                && from >= to
            {
                return Err(self.empty_range("date"));
            }
            matcher.push(ModifiedBetween {
                from: self.modified_from,
                to: self.modified_to,
            });
        }
        if let Some(pattern) = &self.name_glob {
            let glob = Pattern::new(pattern).map_err(|e| RuleError::InvalidGlob {
                rule: self.name.clone(),
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            matcher.push(NameGlob(glob));
        }
        if let Some(pattern) = &self.name_regex {
            let regex = Regex::new(pattern).map_err(|e| RuleError::InvalidRegex {
                rule: self.name.clone(),
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            matcher.push(NameRegex(regex));
        }

        Ok(Rule::new(&self.name, template)
            .with_matcher(matcher)
            .with_affixes(&self.prefix, &self.suffix))
    }

    fn empty_range(&self, what: &'static str) -> RuleError {
        RuleError::EmptyRange {
            rule: self.name.clone(),
            what,
        }
    }
}

/// Serialized form of a [`Profile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    pub default_template: String,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl ProfileConfig {
    /// Compiles every rule and the default template.
    ///
    /// # Errors
    ///
    /// Returns the first [`RuleError`] encountered.
    pub fn compile(&self) -> Result<Profile, RuleError> {
        let rules = self
            .rules
            .iter()
            .map(RuleConfig::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let default_template =
            Template::parse(&self.default_template).map_err(|source| RuleError::Template {
                rule: DEFAULT_RULE_NAME.to_string(),
                source,
            })?;

        Ok(Profile::new(&self.name, rules, default_template))
    }
}

//! Settings loading, legacy preset migration and file filtering.
//!
//! Settings live in a versioned TOML document:
//!
//! ```toml
//! version = 2
//!
//! [organizer]
//! operation = "copy"        # or "move"
//! conflict = "skip"         # or "overwrite", "rename"
//! recursive = true
//! detect_mime = false
//!
//! [size_tiers]
//! fallback = "Large"
//! tiers = [
//!     { label = "Small", below = 1048576 },
//!     { label = "Medium", below = 104857600 },
//! ]
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp", "node_modules/**"]
//! extensions = ["bak", "tmp"]
//! regex = []
//!
//! [[profiles]]
//! name = "photos"
//! default_template = "Unsorted"
//!
//! [[profiles.rules]]
//! name = "jpeg"
//! extensions = ["jpg", "jpeg"]
//! template = "{Year}/{Month}/Photos"
//! ```
//!
//! Documents without a `version`, or with `version = 1`, are preset files in
//! the older flat format (a map from preset name to a list of rules) and are
//! migrated on load.

use crate::executor::ConflictPolicy;
use crate::planner::OperationKind;
use crate::rule::{Profile, ProfileConfig, RuleConfig, RuleError};
use crate::tags::{SizeTier, SizeTiers, TierError};
use chrono::NaiveDate;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Schema version written by this build.
pub const SETTINGS_VERSION: u32 = 2;

/// Name of the per-directory settings file.
pub const LOCAL_CONFIG_FILE: &str = ".smartorgrc.toml";

const MIB: u64 = 1024 * 1024;

/// Errors that can occur while loading or compiling settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("IO error reading configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration in {}: {reason}", path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("configuration version {found} is newer than the supported version {supported}")]
    UnsupportedVersion { found: i64, supported: u32 },

    #[error("invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),

    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },

    #[error("invalid size tiers: {0}")]
    SizeTiers(#[from] TierError),

    #[error("invalid profile '{profile}': {source}")]
    Profile {
        profile: String,
        #[source]
        source: RuleError,
    },

    #[error("profile '{0}' is defined more than once")]
    DuplicateProfile(String),

    #[error("unknown profile '{name}' (available: {available})")]
    UnknownProfile { name: String, available: String },

    #[error("invalid legacy preset '{preset}': {reason}")]
    Legacy { preset: String, reason: String },
}

/// Defaults for organize runs; command-line flags override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizerSettings {
    pub operation: OperationKind,
    pub conflict: ConflictPolicy,
    pub recursive: bool,
    /// Sniff file contents for a MIME type (used by `{Category}`).
    pub detect_mime: bool,
}

impl Default for OrganizerSettings {
    fn default() -> Self {
        Self {
            operation: OperationKind::Copy,
            conflict: ConflictPolicy::Skip,
            recursive: true,
            detect_mime: false,
        }
    }
}

/// Serialized form of [`SizeTiers`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeTierSettings {
    pub tiers: Vec<SizeTier>,
    pub fallback: String,
}

impl Default for SizeTierSettings {
    fn default() -> Self {
        let tiers = SizeTiers::default();
        Self {
            tiers: tiers.tiers().to_vec(),
            fallback: tiers.fallback().to_string(),
        }
    }
}

/// The settings document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub version: u32,
    #[serde(default)]
    pub organizer: OrganizerSettings,
    #[serde(default)]
    pub size_tiers: SizeTierSettings,
    #[serde(default)]
    pub filters: FilterRules,
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            organizer: OrganizerSettings::default(),
            size_tiers: SizeTierSettings::default(),
            filters: FilterRules::default(),
            profiles: builtin_profiles(),
        }
    }
}

fn builtin_profiles() -> Vec<ProfileConfig> {
    vec![
        ProfileConfig {
            name: "by-date".to_string(),
            default_template: "{Year}/{Month}".to_string(),
            rules: Vec::new(),
        },
        ProfileConfig {
            name: "by-type".to_string(),
            default_template: "{Category}/{Ext}".to_string(),
            rules: Vec::new(),
        },
        ProfileConfig {
            name: "photos".to_string(),
            default_template: "Unsorted".to_string(),
            rules: vec![RuleConfig {
                name: "photos".to_string(),
                extensions: ["jpg", "jpeg", "png", "heic", "gif", "webp"]
                    .map(String::from)
                    .to_vec(),
                template: "{Year}/{Month}/Photos".to_string(),
                ..Default::default()
            }],
        },
    ]
}

impl Settings {
    /// Loads settings, falling back to the built-in defaults.
    ///
    /// Looks in this order:
    /// 1. `config_path`, if given
    /// 2. `.smartorgrc.toml` in the current directory
    /// 3. `~/.config/smartorg/config.toml`
    ///
    /// # Errors
    ///
    /// Returns an error if a file is found (or explicitly given) but cannot be
    /// read, parsed or migrated.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(home_config) = user_config_path()
            && home_config.exists()
        {
            return Self::load_from_file(&home_config);
        }

        debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Loads one file. `.json` files are read as legacy presets; anything
    /// else is TOML.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let settings = if is_json {
            Self::from_legacy_json(&content).map_err(|e| invalid(path, e))?
        } else {
            Self::from_toml(&content).map_err(|e| invalid(path, e))?
        };
        info!(path = %path.display(), profiles = settings.profiles.len(), "loaded configuration");
        Ok(settings)
    }

    /// Parses a TOML settings document, migrating legacy presets.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut table: toml::Table = toml::from_str(content).map_err(parse_error)?;
        let version = match table.get("version") {
            None => None,
            Some(value) => Some(value.as_integer().ok_or_else(|| parse_error("version must be an integer"))?),
        };

        match version {
            None | Some(1) => {
                table.remove("version");
                let presets: LegacyPresets =
                    toml::Value::Table(table).try_into().map_err(parse_error)?;
                migrate_legacy(presets)
            }
            Some(v) if v == i64::from(SETTINGS_VERSION) => {
                toml::from_str(content).map_err(parse_error)
            }
            Some(v) if v > i64::from(SETTINGS_VERSION) => Err(ConfigError::UnsupportedVersion {
                found: v,
                supported: SETTINGS_VERSION,
            }),
            Some(v) => Err(parse_error(format!("unknown configuration version {v}"))),
        }
    }

    /// Parses a legacy JSON preset file.
    pub fn from_legacy_json(content: &str) -> Result<Self, ConfigError> {
        let mut value: serde_json::Value = serde_json::from_str(content).map_err(parse_error)?;
        if let Some(object) = value.as_object_mut()
            && let Some(version) = object.remove("version")
        {
            match version.as_i64() {
                Some(1) => {}
                Some(v) if v > i64::from(SETTINGS_VERSION) => {
                    return Err(ConfigError::UnsupportedVersion {
                        found: v,
                        supported: SETTINGS_VERSION,
                    });
                }
                _ => return Err(parse_error("JSON files are only read as version 1 presets")),
            }
        }
        let presets: LegacyPresets = serde_json::from_value(value).map_err(parse_error)?;
        migrate_legacy(presets)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(parse_error)
    }

    /// Validates every profile, the size tiers and the filters.
    ///
    /// # Errors
    ///
    /// Returns the first configuration defect found. Unknown template tags
    /// are reported here, before any file is touched.
    pub fn compile(&self) -> Result<CompiledSettings, ConfigError> {
        let tiers = SizeTiers::new(
            self.size_tiers.tiers.clone(),
            self.size_tiers.fallback.clone(),
        )?;
        let filters = CompiledFilters::new(&self.filters)?;

        let mut seen = HashSet::new();
        let mut profiles = Vec::with_capacity(self.profiles.len());
        for config in &self.profiles {
            if !seen.insert(config.name.as_str()) {
                return Err(ConfigError::DuplicateProfile(config.name.clone()));
            }
            let profile = config.compile().map_err(|source| ConfigError::Profile {
                profile: config.name.clone(),
                source,
            })?;
            profiles.push(profile);
        }

        Ok(CompiledSettings {
            organizer: self.organizer.clone(),
            tiers,
            filters,
            profiles,
        })
    }
}

/// `~/.config/smartorg/config.toml`, when `HOME` is set.
pub fn user_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("smartorg")
            .join("config.toml")
    })
}

fn parse_error(e: impl ToString) -> ConfigError {
    ConfigError::ConfigInvalid {
        path: PathBuf::new(),
        reason: e.to_string(),
    }
}

/// Attaches the file path to parse errors raised without one.
fn invalid(path: &Path, e: ConfigError) -> ConfigError {
    match e {
        ConfigError::ConfigInvalid { reason, .. } => ConfigError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    }
}

/// Validated settings, ready to drive a run.
#[derive(Debug)]
pub struct CompiledSettings {
    pub organizer: OrganizerSettings,
    pub tiers: SizeTiers,
    pub filters: CompiledFilters,
    pub profiles: Vec<Profile>,
}

impl CompiledSettings {
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                name: name.to_string(),
                available: self
                    .profiles
                    .iter()
                    .map(Profile::name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Preset name to rules, the version 1 format.
type LegacyPresets = BTreeMap<String, Vec<LegacyRule>>;

/// A version 1 rule. Sizes are whole megabytes where 0 means no bound.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct LegacyRule {
    name: String,
    /// Comma-separated keywords, any of which may match.
    contains: String,
    /// Comma-separated extensions.
    extensions: String,
    size_min: u64,
    /// Inclusive.
    size_max: u64,
    /// `yyyy-MM-dd`; only files modified after this day match.
    date_after: Option<String>,
    destination: String,
    pattern: String,
    prefix: String,
    suffix: String,
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl LegacyRule {
    /// Converts to a version 2 rule; `None` for a rule that can never match.
    fn migrate(self, preset: &str, index: usize) -> Result<Option<RuleConfig>, ConfigError> {
        let name = if self.name.trim().is_empty() {
            format!("rule {}", index + 1)
        } else {
            self.name.trim().to_string()
        };

        if self.size_max > 0 && self.size_min > self.size_max {
            warn!(
                preset,
                rule = %name,
                size_min = self.size_min,
                size_max = self.size_max,
                "legacy rule has a minimum size above its maximum and never matched; dropped"
            );
            return Ok(None);
        }

        if !self.destination.trim().is_empty() {
            warn!(
                preset,
                rule = %name,
                destination = %self.destination,
                "legacy destination folder dropped; choose the output root when organizing"
            );
        }

        let modified_from = match self.date_after.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(date) => {
                let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
                    ConfigError::Legacy {
                        preset: preset.to_string(),
                        reason: format!("rule '{}' has invalid date '{}': {}", name, date, e),
                    }
                })?;
                day.succ_opt()
            }
        };

        Ok(Some(RuleConfig {
            keywords: split_list(&self.contains),
            extensions: split_list(&self.extensions),
            min_size: (self.size_min > 0).then(|| self.size_min.saturating_mul(MIB)),
            max_size: (self.size_max > 0).then(|| self.size_max.saturating_mul(MIB).saturating_add(1)),
            modified_from,
            template: self.pattern.trim().to_string(),
            prefix: self.prefix,
            suffix: self.suffix,
            name,
            ..Default::default()
        }))
    }
}

fn migrate_legacy(presets: LegacyPresets) -> Result<Settings, ConfigError> {
    let profiles = presets
        .into_iter()
        .map(|(preset, rules)| {
            let rules = rules
                .into_iter()
                .enumerate()
                .map(|(i, rule)| rule.migrate(&preset, i))
                .filter_map(Result::transpose)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ProfileConfig {
                name: preset,
                default_template: "Unsorted".to_string(),
                rules,
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    info!(profiles = profiles.len(), "migrated legacy presets to version {}", SETTINGS_VERSION);
    Ok(Settings {
        profiles,
        ..Settings::default()
    })
}

/// Exclusion rules applied while scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Whitelist; overrides every exclude rule.
    #[serde(default)]
    pub include: IncludeRules,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns matched against the path relative to the scan root.
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regexes matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Pre-compiled [`FilterRules`].
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

impl CompiledFilters {
    /// # Errors
    ///
    /// Returns an error if any glob or regex pattern is invalid.
    pub fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Whether a file (path relative to the scan root) should be organized.
    ///
    /// Include patterns win; then hidden files, exact names, extensions, globs
    /// and regexes exclude, in that order.
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self
            .include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension()
            && self
                .exclude_extensions
                .contains(&ext.to_string_lossy().to_lowercase())
        {
            return false;
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::FileRecord;
    use chrono::{Local, TimeZone};
    use tempfile::TempDir;

    fn filters(exclude: ExcludeRules, include: Vec<&str>) -> CompiledFilters {
        CompiledFilters::new(&FilterRules {
            enable_hidden_files: true,
            exclude,
            include: IncludeRules {
                patterns: include.into_iter().map(String::from).collect(),
            },
        })
        .unwrap()
    }

    fn record(name: &str, size: u64, y: i32, m: u32, d: u32) -> FileRecord {
        let modified = Local.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();
        FileRecord::new(format!("/in/{name}"), size, modified)
    }

    #[test]
    fn test_defaults_compile_with_builtin_profiles() {
        let compiled = Settings::default().compile().unwrap();
        assert!(compiled.profile("photos").is_ok());
        assert!(compiled.profile("by-date").is_ok());
        assert_eq!(compiled.tiers, SizeTiers::default());
        assert_eq!(compiled.organizer.conflict, ConflictPolicy::Skip);
        assert_eq!(compiled.organizer.operation, OperationKind::Copy);
    }

    #[test]
    fn test_unknown_profile_lists_available() {
        let compiled = Settings::default().compile().unwrap();
        let err = compiled.profile("nope").unwrap_err();
        assert!(err.to_string().contains("by-date"));
    }

    #[test]
    fn test_parse_version_two() {
        let settings = Settings::from_toml(
            r#"
version = 2

[organizer]
operation = "move"
conflict = "rename"

[size_tiers]
fallback = "Big"
tiers = [{ label = "Little", below = 100 }]

[[profiles]]
name = "docs"
default_template = "Other/{Ext}"

[[profiles.rules]]
name = "reports"
keywords = ["report", "invoice"]
extensions = ["pdf"]
modified_from = "2023-01-01"
template = "{Year}/Reports"
prefix = "Q_"
"#,
        )
        .unwrap();

        assert_eq!(settings.organizer.operation, OperationKind::Move);
        assert_eq!(settings.organizer.conflict, ConflictPolicy::Rename);
        assert!(settings.organizer.recursive);
        let compiled = settings.compile().unwrap();
        assert_eq!(compiled.tiers.label_for(150), "Big");

        let profile = compiled.profile("docs").unwrap();
        let rule = profile.select_rule(&record("Invoice-3.pdf", 10, 2023, 6, 1));
        assert_eq!(rule.name(), "reports");
        let fallback = profile.select_rule(&record("Invoice-3.pdf", 10, 2022, 6, 1));
        assert_eq!(fallback.template().as_str(), "Other/{Ext}");
    }

    #[test]
    fn test_unknown_tag_rejected_at_compile() {
        let settings = Settings::from_toml(
            r#"
version = 2
[[profiles]]
name = "broken"
default_template = "{Author}"
"#,
        )
        .unwrap();
        let err = settings.compile().unwrap_err();
        assert!(matches!(err, ConfigError::Profile { ref profile, .. } if profile == "broken"));
        assert!(err.to_string().contains("Author"));
    }

    #[test]
    fn test_newer_version_rejected() {
        let err = Settings::from_toml("version = 3").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { found: 3, .. }));
    }

    #[test]
    fn test_duplicate_profiles_rejected() {
        let mut settings = Settings::default();
        settings.profiles.push(settings.profiles[0].clone());
        assert!(matches!(
            settings.compile(),
            Err(ConfigError::DuplicateProfile(_))
        ));
    }

    #[test]
    fn test_invalid_tiers_rejected() {
        let mut settings = Settings::default();
        settings.size_tiers.tiers.reverse();
        assert!(matches!(settings.compile(), Err(ConfigError::SizeTiers(_))));
    }

    #[test]
    fn test_migrate_legacy_json() {
        let settings = Settings::from_legacy_json(
            r#"{
                "Work": [{
                    "name": "Big reports",
                    "contains": "report, summary",
                    "extensions": ".pdf,docx",
                    "size_min": 1,
                    "size_max": 5,
                    "date_after": "2023-03-31",
                    "destination": "/home/me/Sorted",
                    "pattern": "{Year}/{Month}",
                    "prefix": "W_",
                    "suffix": ""
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(settings.version, SETTINGS_VERSION);
        let profile = &settings.profiles[0];
        assert_eq!(profile.name, "Work");
        assert_eq!(profile.default_template, "Unsorted");

        let rule = &profile.rules[0];
        assert_eq!(rule.keywords, vec!["report", "summary"]);
        assert_eq!(rule.extensions, vec![".pdf", "docx"]);
        assert_eq!(rule.min_size, Some(MIB));
        assert_eq!(rule.max_size, Some(5 * MIB + 1));
        assert_eq!(rule.modified_from, NaiveDate::from_ymd_opt(2023, 4, 1));
        assert_eq!(rule.prefix, "W_");

        let compiled = settings.compile().unwrap();
        let work = compiled.profile("Work").unwrap();
        // Exactly 5 MB still matches; the day after the cutoff matches.
        let at_max = record("annual report.pdf", 5 * MIB, 2023, 4, 1);
        assert_eq!(work.select_rule(&at_max).name(), "Big reports");
        let on_cutoff = record("annual report.pdf", 2 * MIB, 2023, 3, 31);
        assert_ne!(work.select_rule(&on_cutoff).name(), "Big reports");
    }

    #[test]
    fn test_legacy_zero_bounds_are_unbounded() {
        let settings = Settings::from_legacy_json(
            r#"{ "All": [{ "name": "", "size_min": 0, "size_max": 0, "date_after": null }] }"#,
        )
        .unwrap();
        let rule = &settings.profiles[0].rules[0];
        assert_eq!(rule.name, "rule 1");
        assert_eq!(rule.min_size, None);
        assert_eq!(rule.max_size, None);
        assert_eq!(rule.modified_from, None);
        assert_eq!(rule.template, "");
    }

    #[test]
    fn test_legacy_inverted_size_range_drops_rule() {
        let settings = Settings::from_legacy_json(
            r#"{ "P": [
                { "name": "never", "size_min": 10, "size_max": 2 },
                { "name": "kept", "extensions": "txt", "size_min": 2, "size_max": 2 }
            ] }"#,
        )
        .unwrap();

        let names: Vec<_> = settings.profiles[0].rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["kept"]);
        assert!(settings.compile().is_ok());
    }

    #[test]
    fn test_legacy_toml_without_version_is_migrated() {
        let settings = Settings::from_toml(
            r#"
[[Music]]
name = "mp3"
extensions = "mp3"
pattern = "{First_Letter}"
"#,
        )
        .unwrap();
        assert_eq!(settings.version, SETTINGS_VERSION);
        assert_eq!(settings.profiles[0].rules[0].template, "{First_Letter}");
    }

    #[test]
    fn test_legacy_bad_date() {
        let err = Settings::from_legacy_json(r#"{ "P": [{ "date_after": "31/03/2023" }] }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Legacy { .. }));
    }

    #[test]
    fn test_migrated_settings_round_trip_through_toml() {
        let migrated = Settings::from_legacy_json(
            r#"{ "Photos": [{ "name": "jpg", "extensions": "jpg", "pattern": "{Year}" }] }"#,
        )
        .unwrap();
        let text = migrated.to_toml_string().unwrap();
        let reparsed = Settings::from_toml(&text).unwrap();
        assert_eq!(reparsed.profiles, migrated.profiles);
        assert_eq!(reparsed.organizer, migrated.organizer);
    }

    #[test]
    fn test_load_explicit_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "version = 2\n[organizer]\nrecursive = false\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert!(!settings.organizer.recursive);
        assert!(settings.profiles.is_empty());

        let missing = Settings::load(Some(&temp_dir.path().join("none.toml")));
        assert!(matches!(missing, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "version = 2\n[organizer\n").unwrap();

        match Settings::load_from_file(&path) {
            Err(ConfigError::ConfigInvalid { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_hidden_file_excluded_by_default() {
        let compiled = CompiledFilters::default();
        assert!(!compiled.should_include(Path::new(".DS_Store")));
        assert!(compiled.should_include(Path::new("photo.jpg")));
    }

    #[test]
    fn test_exclude_names_and_extensions() {
        let compiled = filters(
            ExcludeRules {
                filenames: vec!["Thumbs.db".to_string()],
                extensions: vec!["bak".to_string(), ".tmp".to_string()],
                ..Default::default()
            },
            vec![],
        );
        assert!(!compiled.should_include(Path::new("Thumbs.db")));
        assert!(!compiled.should_include(Path::new("file.BAK")));
        assert!(!compiled.should_include(Path::new("file.tmp")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn test_exclude_glob_respects_directory_boundaries() {
        let compiled = filters(
            ExcludeRules {
                patterns: vec!["**/logs/**".to_string()],
                ..Default::default()
            },
            vec![],
        );
        assert!(!compiled.should_include(Path::new("logs/file.txt")));
        assert!(!compiled.should_include(Path::new("app/logs/file.txt")));
        assert!(compiled.should_include(Path::new("my_logs/file.txt")));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let compiled = filters(
            ExcludeRules {
                regex: vec![r"^draft_.*\.txt$".to_string()],
                ..Default::default()
            },
            vec!["draft_keep.txt"],
        );
        assert!(compiled.should_include(Path::new("draft_keep.txt")));
        assert!(!compiled.should_include(Path::new("draft_other.txt")));
    }

    #[test]
    fn test_invalid_filter_patterns_rejected() {
        let bad_regex = FilterRules {
            exclude: ExcludeRules {
                regex: vec!["[invalid(".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            CompiledFilters::new(&bad_regex),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let bad_glob = FilterRules {
            exclude: ExcludeRules {
                patterns: vec!["[invalid".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            CompiledFilters::new(&bad_glob),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }
}

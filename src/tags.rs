//! Dynamic template tags and their resolution against a [`FileRecord`].
//!
//! The set of tags is closed: every placeholder a template may use is a
//! variant of [`Tag`], so an unknown name is rejected when the template is
//! parsed rather than when a file is being organized.

use crate::file_category::FileMapper;
use crate::scan::FileRecord;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing or resolving templates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown tag '{{{name}}}' (supported: {})", Tag::names().join(", "))]
    UnknownTag { name: String },
    #[error("unterminated placeholder starting at byte {position} in '{template}'")]
    UnterminatedPlaceholder { template: String, position: usize },
    #[error("empty placeholder '{{}}' in '{template}'")]
    EmptyPlaceholder { template: String },
}

/// A placeholder that can appear inside `{...}` in a destination template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Year,
    Month,
    Day,
    Week,
    Ext,
    Name,
    FirstLetter,
    SizeTier,
    Category,
}

impl Tag {
    pub const ALL: [Tag; 9] = [
        Tag::Year,
        Tag::Month,
        Tag::Day,
        Tag::Week,
        Tag::Ext,
        Tag::Name,
        Tag::FirstLetter,
        Tag::SizeTier,
        Tag::Category,
    ];

    /// The name as written between braces.
    pub fn name(&self) -> &'static str {
        match self {
            Tag::Year => "Year",
            Tag::Month => "Month",
            Tag::Day => "Day",
            Tag::Week => "Week",
            Tag::Ext => "Ext",
            Tag::Name => "Name",
            Tag::FirstLetter => "First_Letter",
            Tag::SizeTier => "Size_Tier",
            Tag::Category => "Category",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tag::Year => "four-digit year of the last modification (local time)",
            Tag::Month => "two-digit month of the last modification",
            Tag::Day => "two-digit day of the month of the last modification",
            Tag::Week => "two-digit ISO week number of the last modification",
            Tag::Ext => "lowercase extension without the dot, empty if none",
            Tag::Name => "file name without its extension",
            Tag::FirstLetter => "first letter of the file name, uppercased; # for non-letters",
            Tag::SizeTier => "size bucket label from the configured tiers",
            Tag::Category => "broad category folder (images, documents, ...)",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Tag::name).collect()
    }

    /// Computes this tag's value for `record`.
    pub fn resolve(&self, record: &FileRecord, tiers: &SizeTiers) -> String {
        match self {
            Tag::Year => format!("{:04}", record.modified.year()),
            Tag::Month => format!("{:02}", record.modified.month()),
            Tag::Day => format!("{:02}", record.modified.day()),
            Tag::Week => format!("{:02}", record.modified.iso_week().week()),
            Tag::Ext => record.extension.to_lowercase(),
            Tag::Name => record.stem().to_string(),
            Tag::FirstLetter => first_letter(&record.file_name),
            Tag::SizeTier => tiers.label_for(record.size).to_string(),
            Tag::Category => FileMapper::shared()
                .categorize(
                    record.mime_type.as_deref(),
                    Some(record.extension.as_str()).filter(|ext| !ext.is_empty()),
                )
                .dir_name()
                .to_string(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

impl FromStr for Tag {
    type Err = TemplateError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .into_iter()
            .find(|tag| tag.name() == name)
            .ok_or_else(|| TemplateError::UnknownTag {
                name: name.to_string(),
            })
    }
}

fn first_letter(file_name: &str) -> String {
    match file_name.chars().next() {
        Some(c) if c.is_alphabetic() => c.to_uppercase().collect(),
        _ => "#".to_string(),
    }
}

/// Resolves a tag given by name.
///
/// # Errors
///
/// Returns [`TemplateError::UnknownTag`] if `name` is not a supported tag.
///
/// # Examples
///
/// ```
/// use chrono::{Local, TimeZone};
/// use smartorg::scan::FileRecord;
/// use smartorg::tags::{resolve_tag, SizeTiers};
///
/// let modified = Local.with_ymd_and_hms(2023, 5, 1, 9, 30, 0).unwrap();
/// let record = FileRecord::new("/photos/beach.JPG", 2048, modified);
/// let tiers = SizeTiers::default();
///
/// assert_eq!(resolve_tag(&record, "Month", &tiers).unwrap(), "05");
/// assert_eq!(resolve_tag(&record, "Ext", &tiers).unwrap(), "jpg");
/// assert!(resolve_tag(&record, "Colour", &tiers).is_err());
/// ```
pub fn resolve_tag(
    record: &FileRecord,
    name: &str,
    tiers: &SizeTiers,
) -> Result<String, TemplateError> {
    Ok(name.parse::<Tag>()?.resolve(record, tiers))
}

/// Errors raised when size tiers are malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierError {
    #[error("size tier labels must not be empty")]
    EmptyLabel,
    #[error("size tier '{label}' bound {below} is not above the previous tier's bound")]
    NotAscending { label: String, below: u64 },
}

/// One size bucket: files strictly smaller than `below` bytes get `label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeTier {
    pub label: String,
    pub below: u64,
}

/// Ordered size buckets used by the `{Size_Tier}` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeTiers {
    tiers: Vec<SizeTier>,
    fallback: String,
}

const MIB: u64 = 1024 * 1024;

impl SizeTiers {
    /// Validates and builds tiers.
    ///
    /// # Errors
    ///
    /// Fails if a label is empty or bounds are not strictly ascending.
    pub fn new(tiers: Vec<SizeTier>, fallback: impl Into<String>) -> Result<Self, TierError> {
        let fallback = fallback.into();
        if fallback.trim().is_empty() {
            return Err(TierError::EmptyLabel);
        }
        let mut previous: Option<u64> = None;
        for tier in &tiers {
            if tier.label.trim().is_empty() {
                return Err(TierError::EmptyLabel);
            }
            if previous.is_some_and(|bound| tier.below <= bound) {
                return Err(TierError::NotAscending {
                    label: tier.label.clone(),
                    below: tier.below,
                });
            }
            previous = Some(tier.below);
        }
        Ok(Self { tiers, fallback })
    }

    pub fn tiers(&self) -> &[SizeTier] {
        &self.tiers
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn label_for(&self, size: u64) -> &str {
        self.tiers
            .iter()
            .find(|tier| size < tier.below)
            .map(|tier| tier.label.as_str())
            .unwrap_or(&self.fallback)
    }
}

impl Default for SizeTiers {
    /// `Small` below 1 MiB, `Medium` below 100 MiB, `Large` otherwise.
    fn default() -> Self {
        Self {
            tiers: vec![
                SizeTier {
                    label: "Small".to_string(),
                    below: MIB,
                },
                SizeTier {
                    label: "Medium".to_string(),
                    below: 100 * MIB,
                },
            ],
            fallback: "Large".to_string(),
        }
    }
}

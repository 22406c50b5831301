//! Destination path templates.
//!
//! A template such as `{Year}/{Month}/Photos` is parsed once into literal and
//! tag segments. Rendering a parsed template cannot fail.

use crate::scan::FileRecord;
use crate::tags::{SizeTiers, Tag, TemplateError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Tag(Tag),
}

/// A parsed destination template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parses `source`, validating every placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnknownTag`] for an unsupported tag name,
    /// [`TemplateError::UnterminatedPlaceholder`] for a `{` without a closing
    /// `}`, and [`TemplateError::EmptyPlaceholder`] for `{}`.
    ///
    /// # Examples
    ///
    /// ```
    /// use smartorg::template::Template;
    ///
    /// assert!(Template::parse("{Year}/{Month}/Photos").is_ok());
    /// assert!(Template::parse("{Year}/{Colour}").is_err());
    /// ```
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];
            let close = after_open
                .find('}')
                .ok_or_else(|| TemplateError::UnterminatedPlaceholder {
                    template: source.to_string(),
                    position: offset + open,
                })?;

            let name = &after_open[..close];
            if name.is_empty() {
                return Err(TemplateError::EmptyPlaceholder {
                    template: source.to_string(),
                });
            }
            let tag = name.parse::<Tag>()?;

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Tag(tag));

            let consumed = open + 1 + close + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Tags used by this template, in order of appearance.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Tag(tag) => Some(*tag),
            Segment::Literal(_) => None,
        })
    }

    /// Substitutes every tag for `record`; literals are copied unchanged.
    pub fn render(&self, record: &FileRecord, tiers: &SizeTiers) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Tag(tag) => out.push_str(&tag.resolve(record, tiers)),
            }
        }
        out
    }
}

/// Parses and renders a template in one step.
///
/// # Errors
///
/// Returns the parse error when the template is malformed.
pub fn resolve_template(
    template: &str,
    record: &FileRecord,
    tiers: &SizeTiers,
) -> Result<String, TemplateError> {
    Ok(Template::parse(template)?.render(record, tiers))
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Template::parse(&source).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn photo() -> FileRecord {
        let modified = Local.with_ymd_and_hms(2023, 5, 1, 10, 0, 0).unwrap();
        FileRecord::new("/in/sunset.jpg", 3 * 1024 * 1024, modified)
    }

    #[test]
    fn test_parse_segments() {
        let template = Template::parse("{Year}/Week{Week}-{Month}m").unwrap();
        assert_eq!(
            template.segments(),
            &[
                Segment::Tag(Tag::Year),
                Segment::Literal("/Week".to_string()),
                Segment::Tag(Tag::Week),
                Segment::Literal("-".to_string()),
                Segment::Tag(Tag::Month),
                Segment::Literal("m".to_string()),
            ]
        );
    }

    #[test]
    fn test_render_substitutes_tags_and_keeps_literals() {
        let template = Template::parse("{Year}/{Month}/Photos ({Size_Tier})").unwrap();
        assert_eq!(
            template.render(&photo(), &SizeTiers::default()),
            "2023/05/Photos (Medium)"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let template = Template::parse("{First_Letter}/{Name}.{Ext}/{Day}").unwrap();
        let tiers = SizeTiers::default();
        let first = template.render(&photo(), &tiers);
        let second = template.render(&photo(), &tiers);
        assert_eq!(first, second);
        assert_eq!(first, "S/sunset.jpg/01");
    }

    #[test]
    fn test_literal_only_template() {
        let template = Template::parse("Unsorted").unwrap();
        assert_eq!(template.tags().count(), 0);
        assert_eq!(template.render(&photo(), &SizeTiers::default()), "Unsorted");
    }

    #[test]
    fn test_stray_closing_brace_is_literal() {
        let template = Template::parse("a}b/{Ext}").unwrap();
        assert_eq!(template.render(&photo(), &SizeTiers::default()), "a}b/jpg");
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert_eq!(
            Template::parse("{Year}/{Author}"),
            Err(TemplateError::UnknownTag {
                name: "Author".to_string()
            })
        );
        // Tag names are case-sensitive.
        assert!(Template::parse("{year}").is_err());
    }

    #[test]
    fn test_unterminated_and_empty_placeholders() {
        assert_eq!(
            Template::parse("Photos/{Year"),
            Err(TemplateError::UnterminatedPlaceholder {
                template: "Photos/{Year".to_string(),
                position: 7,
            })
        );
        assert!(matches!(
            Template::parse("a/{}/b"),
            Err(TemplateError::EmptyPlaceholder { .. })
        ));
    }

    #[test]
    fn test_resolve_template_helper() {
        let resolved = resolve_template("{Ext}/{Year}", &photo(), &SizeTiers::default());
        assert_eq!(resolved.unwrap(), "jpg/2023");
        assert!(resolve_template("{Nope}", &photo(), &SizeTiers::default()).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        #[derive(Deserialize)]
        struct Doc {
            template: Template,
        }
        let ok: Doc = toml::from_str("template = \"{Year}/{Ext}\"").unwrap();
        assert_eq!(ok.template.as_str(), "{Year}/{Ext}");
        assert!(toml::from_str::<Doc>("template = \"{Bogus}\"").is_err());
    }
}

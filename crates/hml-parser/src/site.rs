//! `<site>` document model and parser.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{ParseError, ParseResult};

/// One forecast point parsed from an embedded HML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRecord {
    id: String,
    /// Attributes of the root `<site>` element.
    pub properties: BTreeMap<String, String>,
    pub disclaimers: Disclaimers,
    pub observed: Option<Observed>,
}

impl SiteRecord {
    /// Site identifier (the `id` attribute), used as the gauge LID.
    pub fn site_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disclaimers {
    pub ahps_xml_version: String,
    pub status: String,
    pub quality: Option<String>,
    pub standing: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub properties: BTreeMap<String, String>,
    pub datum: Vec<Datum>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datum {
    pub valid: String,
    pub primary: String,
    pub secondary: String,
}

/// Parse a single, complete `<site>` document.
///
/// Anything other than whitespace after the closing root element is an
/// error, as is a root element that is never closed.
pub fn parse_site(xml: &str) -> ParseResult<SiteRecord> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut builder = SiteBuilder::default();
    let mut path: Vec<String> = Vec::new();
    let mut root_closed = false;

    loop {
        let position = reader.buffer_position();
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(ParseError::Syntax {
                    position: reader.buffer_position(),
                    message: e.to_string(),
                })
            }
        };

        match event {
            Event::Start(e) => {
                if root_closed {
                    return Err(ParseError::TrailingContent(position));
                }
                let name = element_name(&e);
                builder.open(&path, &name, &e)?;
                path.push(name);
            }
            Event::Empty(e) => {
                if root_closed {
                    return Err(ParseError::TrailingContent(position));
                }
                let name = element_name(&e);
                builder.open(&path, &name, &e)?;
                builder.close(&path, &name)?;
                root_closed = path.is_empty();
            }
            Event::End(_) => {
                let name = path.pop().ok_or_else(|| ParseError::Syntax {
                    position,
                    message: "closing tag without an open element".to_string(),
                })?;
                builder.close(&path, &name)?;
                root_closed = path.is_empty();
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| ParseError::Syntax {
                    position,
                    message: e.to_string(),
                })?;
                if root_closed || path.is_empty() {
                    if !text.trim().is_empty() {
                        return Err(ParseError::TrailingContent(position));
                    }
                } else {
                    builder.text(&path, &text);
                }
            }
            Event::CData(c) => {
                if root_closed || path.is_empty() {
                    return Err(ParseError::TrailingContent(position));
                }
                builder.text(&path, &String::from_utf8_lossy(&c));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = path.last() {
        return Err(ParseError::UnclosedElement(open.clone()));
    }
    if !root_closed {
        return Err(ParseError::Empty);
    }

    builder.finish()
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart) -> ParseResult<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::Attribute(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| ParseError::Attribute(err.to_string()))?;
        map.insert(key, value.into_owned());
    }
    Ok(map)
}

#[derive(Debug, Default)]
struct DatumFields {
    valid: Option<String>,
    primary: Option<String>,
    secondary: Option<String>,
}

#[derive(Debug, Default)]
struct SiteBuilder {
    properties: Option<BTreeMap<String, String>>,
    saw_disclaimers: bool,
    ahps_xml_version: Option<String>,
    status: Option<String>,
    quality: Option<String>,
    standing: Option<String>,
    observed: Option<Observed>,
    datum: Option<DatumFields>,
}

impl SiteBuilder {
    fn open(&mut self, parents: &[String], name: &str, e: &BytesStart) -> ParseResult<()> {
        match (parents.len(), name) {
            (0, "site") => self.properties = Some(attributes(e)?),
            (0, other) => return Err(ParseError::UnexpectedRoot(other.to_string())),
            (1, "disclaimers") => self.saw_disclaimers = true,
            (1, "observed") => {
                self.observed = Some(Observed {
                    properties: attributes(e)?,
                    datum: Vec::new(),
                })
            }
            (2, "datum") if parents[1] == "observed" => self.datum = Some(DatumFields::default()),
            _ => {
                // An empty leaf still counts as present.
                if let Some(slot) = self.leaf_slot(parents, name) {
                    slot.get_or_insert_with(String::new);
                }
            }
        }
        Ok(())
    }

    fn close(&mut self, parents: &[String], name: &str) -> ParseResult<()> {
        if parents.len() == 2 && parents[1] == "observed" && name == "datum" {
            let fields = self.datum.take().unwrap_or_default();
            let datum = Datum {
                valid: fields.valid.ok_or(ParseError::Missing("observed/datum/valid"))?,
                primary: fields.primary.ok_or(ParseError::Missing("observed/datum/primary"))?,
                secondary: fields
                    .secondary
                    .ok_or(ParseError::Missing("observed/datum/secondary"))?,
            };
            if let Some(observed) = self.observed.as_mut() {
                observed.datum.push(datum);
            }
        }
        Ok(())
    }

    fn text(&mut self, path: &[String], text: &str) {
        if let Some((name, parents)) = path.split_last() {
            if let Some(slot) = self.leaf_slot(parents, name) {
                slot.get_or_insert_with(String::new).push_str(text);
            }
        }
    }

    fn leaf_slot(&mut self, parents: &[String], name: &str) -> Option<&mut Option<String>> {
        if parents.len() == 2 && parents[1] == "disclaimers" {
            return match name {
                "AHPSXMLversion" => Some(&mut self.ahps_xml_version),
                "status" => Some(&mut self.status),
                "quality" => Some(&mut self.quality),
                "standing" => Some(&mut self.standing),
                _ => None,
            };
        }
        if parents.len() == 3 && parents[1] == "observed" && parents[2] == "datum" {
            let datum = self.datum.as_mut()?;
            return match name {
                "valid" => Some(&mut datum.valid),
                "primary" => Some(&mut datum.primary),
                "secondary" => Some(&mut datum.secondary),
                _ => None,
            };
        }
        None
    }

    fn finish(self) -> ParseResult<SiteRecord> {
        let properties = self.properties.ok_or(ParseError::Missing("site"))?;
        let id = properties
            .get("id")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(ParseError::Missing("site@id"))?;

        if !self.saw_disclaimers {
            return Err(ParseError::Missing("disclaimers"));
        }

        let disclaimers = Disclaimers {
            ahps_xml_version: self
                .ahps_xml_version
                .ok_or(ParseError::Missing("disclaimers/AHPSXMLversion"))?,
            status: self.status.ok_or(ParseError::Missing("disclaimers/status"))?,
            quality: self.quality,
            standing: self.standing,
        };

        Ok(SiteRecord {
            id,
            properties,
            disclaimers,
            observed: self.observed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::fixtures::{hml_site, hml_site_minimal};

    #[test]
    fn test_parse_full_site() {
        let site = parse_site(&hml_site("BRRW3")).unwrap();

        assert_eq!(site.site_id(), "BRRW3");
        assert_eq!(site.properties["timezone"], "UTC");
        assert_eq!(site.disclaimers.ahps_xml_version, "2.2");
        assert_eq!(site.disclaimers.quality.as_deref(), Some("UNCHECKED"));

        let observed = site.observed.unwrap();
        assert_eq!(observed.datum.len(), 2);
        assert_eq!(observed.datum[0].primary, "12.30");
        assert_eq!(observed.datum[1].secondary, "-999");
    }

    #[test]
    fn test_parse_minimal_site() {
        let site = parse_site(&hml_site_minimal("MNLW3")).unwrap();

        assert_eq!(site.site_id(), "MNLW3");
        assert!(site.observed.is_none());
        assert!(site.disclaimers.standing.is_none());
    }

    #[test]
    fn test_trailing_content_rejected() {
        let xml = format!("{}\n\n$$", hml_site_minimal("MNLW3"));
        let err = parse_site(&xml).unwrap_err();

        assert!(matches!(err, ParseError::TrailingContent(_)));
        assert!(err.is_syntax());
    }

    #[test]
    fn test_unclosed_root_rejected() {
        let xml = r#"<?xml version="1.0"?><site id="X"><disclaimers><AHPSXMLversion>2.2</AHPSXMLversion><status>P</status></disclaimers>"#;
        assert!(parse_site(xml).unwrap_err().is_syntax());
    }

    #[test]
    fn test_mismatched_tags_rejected() {
        let xml = r#"<site id="X"><disclaimers></observed></site>"#;
        assert!(parse_site(xml).unwrap_err().is_syntax());
    }

    #[test]
    fn test_missing_id_rejected() {
        let xml = r#"<site name="no id"><disclaimers><AHPSXMLversion>2.2</AHPSXMLversion><status>P</status></disclaimers></site>"#;
        assert_eq!(parse_site(xml).unwrap_err(), ParseError::Missing("site@id"));
    }

    #[test]
    fn test_missing_disclaimer_status_rejected() {
        let xml = r#"<site id="X"><disclaimers><AHPSXMLversion>2.2</AHPSXMLversion></disclaimers></site>"#;
        let err = parse_site(xml).unwrap_err();

        assert_eq!(err, ParseError::Missing("disclaimers/status"));
        assert!(!err.is_syntax());
    }

    #[test]
    fn test_empty_leaf_counts_as_present() {
        let xml = r#"<site id="X"><disclaimers><AHPSXMLversion>2.2</AHPSXMLversion><status/></disclaimers></site>"#;
        let site = parse_site(xml).unwrap();
        assert_eq!(site.disclaimers.status, "");
    }

    #[test]
    fn test_wrong_root_rejected() {
        let xml = r#"<forecast id="X"></forecast>"#;
        assert!(matches!(parse_site(xml), Err(ParseError::UnexpectedRoot(_))));
    }

    #[test]
    fn test_escaped_text() {
        let xml = r#"<site id="A&amp;B"><disclaimers><AHPSXMLversion>2.2</AHPSXMLversion><status>A &lt; B</status></disclaimers></site>"#;
        let site = parse_site(xml).unwrap();

        assert_eq!(site.site_id(), "A&B");
        assert_eq!(site.disclaimers.status, "A < B");
    }
}

//! XML tree bridge (spec.md §6, SPEC_FULL.md "XML bridge")
//!
//! AMF's `XmlDocument`/`XmlString` values carry raw XML text; the codec
//! itself never builds a DOM. `from_bytes`/`to_bytes` validate that text is
//! well-formed via `quick_xml`'s pull parser and refuse to round-trip a
//! `<!DOCTYPE` declaration or an external entity reference, matching the
//! XXE-denial defaults `Context` carries (`forbid_dtd`, `forbid_entities`).

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{AmfError, Result};
use crate::value::Value;

/// Parses and validates `bytes` as XML, returning the text unchanged if it
/// passes. Rejects a DOCTYPE declaration when `forbid_dtd` is set, and an
/// internal general entity declaration when `forbid_entities` is set —
/// together these close the classic XXE vector (external entity expansion
/// rides in through a DOCTYPE's internal subset).
pub fn from_bytes(bytes: &[u8], forbid_dtd: bool, forbid_entities: bool) -> Result<String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| AmfError::Decode("XML payload is not valid UTF-8".into()))?
        .to_string();

    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::DocType(_)) if forbid_dtd => {
                tracing::warn!("rejected XML payload with a DOCTYPE declaration");
                return Err(AmfError::Decode("XML DOCTYPE declarations are forbidden".into()));
            }
            Ok(Event::DocType(dt)) if forbid_entities => {
                let body = dt.decode().unwrap_or_default();
                if body.contains("<!ENTITY") {
                    tracing::warn!("rejected XML payload with an internal entity declaration");
                    return Err(AmfError::Decode(
                        "XML internal entity declarations are forbidden".into(),
                    ));
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "XML parse error");
                return Err(AmfError::Decode(format!("XML parse error: {}", e)));
            }
        }
        buf.clear();
    }
    Ok(text)
}

/// Serializes already-validated XML text back to bytes. The in-memory
/// representation is the text itself, so this is a pass-through; it exists
/// so callers have a symmetric encode-side entry point (spec.md §6
/// `tostring`).
pub fn to_bytes(xml: &str) -> Vec<u8> {
    xml.as_bytes().to_vec()
}

/// True if `value` is one of AMF's two XML-carrying variants (spec.md §6
/// `is_xml`).
pub fn is_xml(value: &Value) -> bool {
    matches!(value, Value::XmlDocument(_) | Value::XmlString(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_xml_round_trips() {
        let xml = "<root><child attr=\"1\">text</child></root>";
        let parsed = from_bytes(xml.as_bytes(), true, true).unwrap();
        assert_eq!(parsed, xml);
        assert_eq!(to_bytes(&parsed), xml.as_bytes());
    }

    #[test]
    fn malformed_xml_is_rejected() {
        let xml = "<root><unclosed></root>";
        assert!(matches!(from_bytes(xml.as_bytes(), true, true), Err(AmfError::Decode(_))));
    }

    #[test]
    fn doctype_is_rejected_when_forbidden() {
        let xml = "<!DOCTYPE root SYSTEM \"evil.dtd\"><root/>";
        assert!(matches!(from_bytes(xml.as_bytes(), true, true), Err(AmfError::Decode(_))));
    }

    #[test]
    fn doctype_is_allowed_when_not_forbidden_and_has_no_entity() {
        let xml = "<!DOCTYPE root><root/>";
        assert!(from_bytes(xml.as_bytes(), false, true).is_ok());
    }

    #[test]
    fn internal_entity_declaration_is_rejected_when_forbidden() {
        let xml = "<!DOCTYPE root [<!ENTITY xxe SYSTEM \"file:///etc/passwd\">]><root>&xxe;</root>";
        assert!(matches!(
            from_bytes(xml.as_bytes(), false, true),
            Err(AmfError::Decode(_))
        ));
    }

    #[test]
    fn is_xml_distinguishes_xml_variants_from_plain_strings() {
        assert!(is_xml(&Value::XmlDocument("<a/>".into())));
        assert!(is_xml(&Value::XmlString("<a/>".into())));
        assert!(!is_xml(&Value::String("<a/>".into())));
    }
}

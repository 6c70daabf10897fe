//! Operation identifier extraction.
//!
//! The identifier comes from the action header when present, otherwise from
//! an `action=` parameter of the Content-Type, e.g.
//! `application/soap+xml;charset=UTF-8;action="getAccount"`.

use http::header::{HeaderMap, HeaderName, CONTENT_TYPE};
use tracing::{debug, trace};

/// Default header carrying the SOAP 1.1 operation identifier.
pub const SOAP_ACTION_HEADER: &str = "SOAPAction";

/// Marker searched for in each Content-Type token (case-sensitive, raw substring).
const ACTION_MARKER: &str = "action=";

/// Extract the operation identifier, exactly as sent.
///
/// Quote characters are preserved; use [`parse_soap_action`] before matching rules.
pub fn extract_operation_id(headers: &HeaderMap, action_header: &HeaderName) -> Option<String> {
    if let Some(value) = headers.get(action_header) {
        // A present header is authoritative; Content-Type is never consulted.
        return Some(match value.to_str() {
            Ok(action) => action.to_string(),
            Err(_) => {
                debug!(header = %action_header, "Action header is not visible ASCII");
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            }
        });
    }

    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    trace!(content_type = %content_type, "Looking for action in Content-Type");
    operation_from_content_type(content_type).map(str::to_string)
}

/// Find the identifier in a Content-Type value.
///
/// The value is split on `;` (empty tokens skipped). The first token that
/// contains `action=` anywhere yields everything after the marker, so a
/// parameter such as `xaction=` also matches.
pub fn operation_from_content_type(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .filter(|token| !token.is_empty())
        .find_map(|token| {
            token
                .find(ACTION_MARKER)
                .map(|index| &token[index + ACTION_MARKER.len()..])
        })
}

/// Identifier form used for rule matching: every `"` removed.
pub fn parse_soap_action(raw: &str) -> String {
    raw.replace('"', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn action_header() -> HeaderName {
        HeaderName::from_static("soapaction")
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_header_value_verbatim() {
        let h = headers(&[("SOAPAction", "\"getAccount\"")]);
        assert_eq!(
            extract_operation_id(&h, &action_header()),
            Some("\"getAccount\"".to_string())
        );
    }

    #[test]
    fn test_header_wins_over_content_type() {
        let h = headers(&[
            ("soapaction", "getBalance"),
            ("content-type", "application/soap+xml;action=\"getAccount\""),
        ]);
        assert_eq!(
            extract_operation_id(&h, &action_header()),
            Some("getBalance".to_string())
        );
    }

    #[test]
    fn test_empty_header_is_present() {
        let h = headers(&[("SOAPAction", "")]);
        assert_eq!(extract_operation_id(&h, &action_header()), Some(String::new()));
    }

    #[test]
    fn test_opaque_header_never_falls_back_to_content_type() {
        let mut h = HeaderMap::new();
        h.insert(
            HeaderName::from_static("soapaction"),
            HeaderValue::from_bytes(b"get\xC4ccount").unwrap(),
        );
        h.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/soap+xml;action=getAccount"),
        );
        let operation = extract_operation_id(&h, &action_header()).unwrap();
        assert_ne!(operation, "getAccount");
        assert_eq!(operation, "get\u{FFFD}ccount");
    }

    #[test]
    fn test_content_type_fallback() {
        let h = headers(&[(
            "content-type",
            "application/soap+xml;charset=UTF-8;action=\"getAccount\"",
        )]);
        assert_eq!(
            extract_operation_id(&h, &action_header()),
            Some("\"getAccount\"".to_string())
        );
    }

    #[test]
    fn test_no_source() {
        let h = headers(&[("content-type", "text/xml; charset=utf-8")]);
        assert_eq!(extract_operation_id(&h, &action_header()), None);
        assert_eq!(extract_operation_id(&HeaderMap::new(), &action_header()), None);
    }

    #[test]
    fn test_content_type_keeps_leading_whitespace_token() {
        assert_eq!(
            operation_from_content_type("application/soap+xml; action=getAccount"),
            Some("getAccount")
        );
        assert_eq!(
            operation_from_content_type("application/soap+xml;;action=x"),
            Some("x")
        );
    }

    #[test]
    fn test_content_type_first_token_wins() {
        assert_eq!(
            operation_from_content_type("application/soap+xml;action=first;action=second"),
            Some("first")
        );
    }

    #[test]
    fn test_content_type_raw_substring_match() {
        assert_eq!(
            operation_from_content_type("application/soap+xml;xaction=foo"),
            Some("foo")
        );
        assert_eq!(operation_from_content_type("application/soap+xml;Action=foo"), None);
    }

    #[test]
    fn test_parse_soap_action() {
        assert_eq!(parse_soap_action("\"getAccount\""), "getAccount");
        assert_eq!(parse_soap_action("getAccount"), "getAccount");
        assert_eq!(parse_soap_action("\"urn:bank\"#\"get\""), "urn:bank#get");
    }
}

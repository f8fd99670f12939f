//! Top-level field lookup in a JSON object
//!
//! The service's responses are small objects. We only ever need one or two
//! top-level fields, so there is no tree: the scanner walks the text once,
//! skipping nested values, and returns the raw field text.

use crate::error::Error;

/// Raw text of top-level field `name`.
///
/// Strings come back without their quotes (escapes left as-is); numbers,
/// `true`/`false`/`null` come back as their bare token. Nested objects and
/// arrays are returned verbatim.
pub fn field<'a>(doc: &'a str, name: &str) -> Option<&'a str> {
    let bytes = doc.as_bytes();
    let mut pos = skip_ws(bytes, 0);
    if bytes.get(pos) != Some(&b'{') {
        return None;
    }
    pos += 1;

    loop {
        pos = skip_ws(bytes, pos);
        match bytes.get(pos)? {
            b'}' => return None,
            b',' => {
                pos += 1;
                continue;
            }
            b'"' => {}
            _ => return None,
        }

        let (key_start, key_end) = string_span(bytes, pos)?;
        pos = skip_ws(bytes, key_end + 1);
        if bytes.get(pos) != Some(&b':') {
            return None;
        }
        pos = skip_ws(bytes, pos + 1);

        let (value_start, value_end) = value_span(bytes, pos)?;
        if &doc[key_start..key_end] == name {
            if bytes[value_start] == b'"' {
                return Some(&doc[value_start + 1..value_end - 1]);
            }
            return Some(&doc[value_start..value_end]);
        }
        pos = value_end;
    }
}

/// Top-level field parsed as an unsigned integer.
pub fn uint_field(doc: &str, name: &str) -> Result<u32, Error> {
    field(doc, name)
        .ok_or(Error::Value("field missing from response"))?
        .trim_matches('"')
        .parse()
        .map_err(|_| Error::Value("field is not an unsigned integer"))
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while matches!(bytes.get(pos), Some(b' ' | b'\t' | b'\r' | b'\n')) {
        pos += 1;
    }
    pos
}

/// Span of the string contents starting at the opening quote `pos`.
/// Returns (first content byte, closing quote).
fn string_span(bytes: &[u8], pos: usize) -> Option<(usize, usize)> {
    let start = pos + 1;
    let mut i = start;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'"' => return Some((start, i)),
            _ => i += 1,
        }
    }
    None
}

/// Span of the value starting at `pos`, end exclusive.
fn value_span(bytes: &[u8], pos: usize) -> Option<(usize, usize)> {
    match bytes.get(pos)? {
        b'"' => string_span(bytes, pos).map(|(_, close)| (pos, close + 1)),
        b'{' | b'[' => {
            let mut depth = 0usize;
            let mut i = pos;
            while let Some(&b) = bytes.get(i) {
                match b {
                    b'"' => {
                        i = string_span(bytes, i)?.1;
                    }
                    b'{' | b'[' => depth += 1,
                    b'}' | b']' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some((pos, i + 1));
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            None
        }
        _ => {
            let mut i = pos;
            while let Some(&b) = bytes.get(i) {
                if matches!(b, b',' | b'}' | b']' | b' ' | b'\t' | b'\r' | b'\n') {
                    break;
                }
                i += 1;
            }
            if i == pos { None } else { Some((pos, i)) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_LAST: &str = r#"{"id":"0F4X","value":"21.4","feed_id":2917,
        "feed_key":"plant-temperature","created_at":"2024-05-01T13:04:09Z",
        "location":null,"lat":null,"lon":null,"ele":null,"created_epoch":1714568649}"#;

    #[test]
    fn string_field_without_quotes() {
        assert_eq!(field(DATA_LAST, "value"), Some("21.4"));
        assert_eq!(field(DATA_LAST, "feed_key"), Some("plant-temperature"));
    }

    #[test]
    fn bare_tokens() {
        assert_eq!(field(DATA_LAST, "feed_id"), Some("2917"));
        assert_eq!(field(DATA_LAST, "location"), Some("null"));
        assert_eq!(field(DATA_LAST, "created_epoch"), Some("1714568649"));
    }

    #[test]
    fn nested_keys_are_not_top_level() {
        let feed = r#"{"name":"Plant CO2","group":{"key":"default","name":"Default"},
            "groups":[{"key":"default"}],"key":"plant-co2","last_value":"410.0"}"#;
        assert_eq!(field(feed, "key"), Some("plant-co2"));
        assert_eq!(field(feed, "group"), Some(r#"{"key":"default","name":"Default"}"#));
        assert_eq!(field(feed, "missing"), None);
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        let doc = r#"{"description":"say \"hi\" {not nested}","value":"7"}"#;
        assert_eq!(field(doc, "value"), Some("7"));
        assert_eq!(field(doc, "description"), Some(r#"say \"hi\" {not nested}"#));
    }

    #[test]
    fn not_an_object() {
        assert_eq!(field("[1,2]", "value"), None);
        assert_eq!(field("", "value"), None);
        assert_eq!(field(r#"{"value":"#, "value"), None);
    }

    #[test]
    fn integer_fields() {
        let time = r#"{"year":2024,"mon":5,"mday":1,"hour":13,"min":4,"sec":9}"#;
        assert_eq!(uint_field(time, "hour"), Ok(13));
        assert_eq!(uint_field(time, "year"), Ok(2024));
        assert!(uint_field(time, "wday").is_err());
        assert!(uint_field(r#"{"hour":-1}"#, "hour").is_err());
    }
}

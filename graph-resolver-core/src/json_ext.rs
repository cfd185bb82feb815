use displaydoc::Display;
use thiserror::Error;

/// Value classes reported by the raw JSON extractor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JsonKind {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
    /// The path named a member that is absent from the document.
    NotExist,
}

/// Error types for raw JSON traversal.
///
/// Callers treat every variant as "value missing"; a malformed payload
/// never aborts resolution on its own.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
pub enum ExtractError {
    /// key path not found
    PathNotFound,
    /// malformed JSON value
    Malformed,
}

/// Walk `data` along `path` and return the byte span of the value found
/// there, together with its kind.
///
/// The span aliases `data`: nothing is copied and string escapes are left
/// intact. Strings are returned without their surrounding quotes; the
/// caller re-quotes when emitting. Path elements are object keys; arrays
/// are traversed through [`array_each`].
pub fn extract<'a, S: AsRef<str>>(
    data: &'a [u8],
    path: &[S],
) -> Result<(&'a [u8], JsonKind), ExtractError> {
    let mut offset = skip_ws(data, 0);
    if offset >= data.len() {
        return Err(ExtractError::PathNotFound);
    }
    for key in path {
        if data.get(offset) != Some(&b'{') {
            return Err(ExtractError::PathNotFound);
        }
        match object_member_offset(data, offset, key.as_ref().as_bytes())? {
            Some(member) => offset = member,
            None => return Err(ExtractError::PathNotFound),
        }
    }
    let (start, end, kind) = value_span(data, offset)?;
    Ok((&data[start..end], kind))
}

/// Invoke `visit(value, kind, offset)` once per element of the array at
/// `path`, in source order and without copying.
///
/// `offset` is the value's position within the array span, mirroring what
/// [`extract`] would return for the element.
pub fn array_each<'a, S, F>(data: &'a [u8], path: &[S], mut visit: F) -> Result<(), ExtractError>
where
    S: AsRef<str>,
    F: FnMut(&'a [u8], JsonKind, usize),
{
    let (array, kind) = extract(data, path)?;
    if kind != JsonKind::Array {
        return Err(ExtractError::Malformed);
    }
    let mut i = skip_ws(array, 1);
    if array.get(i) == Some(&b']') {
        return Ok(());
    }
    loop {
        let (start, end, kind) = value_span(array, i)?;
        visit(&array[start..end], kind, start);
        let after = if kind == JsonKind::String { end + 1 } else { end };
        i = skip_ws(array, after);
        match array.get(i) {
            Some(b',') => i = skip_ws(array, i + 1),
            Some(b']') => return Ok(()),
            _ => return Err(ExtractError::Malformed),
        }
    }
}

fn skip_ws(data: &[u8], mut i: usize) -> usize {
    while i < data.len() && matches!(data[i], b' ' | b'\t' | b'\n' | b'\r') {
        i += 1;
    }
    i
}

/// Span and kind of the value starting at `offset`. String spans exclude
/// the surrounding quotes.
fn value_span(data: &[u8], offset: usize) -> Result<(usize, usize, JsonKind), ExtractError> {
    let end = value_end(data, offset)?;
    let kind = match data[offset] {
        b'{' => JsonKind::Object,
        b'[' => JsonKind::Array,
        b'"' => return Ok((offset + 1, end - 1, JsonKind::String)),
        b't' | b'f' => JsonKind::Boolean,
        b'n' => JsonKind::Null,
        _ => JsonKind::Number,
    };
    Ok((offset, end, kind))
}

/// End offset (exclusive) of the value starting at `offset`.
fn value_end(data: &[u8], offset: usize) -> Result<usize, ExtractError> {
    match data.get(offset) {
        Some(b'{') => delimited_end(data, offset, b'{', b'}'),
        Some(b'[') => delimited_end(data, offset, b'[', b']'),
        Some(b'"') => string_end(data, offset),
        Some(b't') => literal_end(data, offset, b"true"),
        Some(b'f') => literal_end(data, offset, b"false"),
        Some(b'n') => literal_end(data, offset, b"null"),
        Some(b) if *b == b'-' || b.is_ascii_digit() => Ok(number_end(data, offset)),
        _ => Err(ExtractError::Malformed),
    }
}

fn string_end(data: &[u8], start: usize) -> Result<usize, ExtractError> {
    let mut i = start + 1;
    while i < data.len() {
        match data[i] {
            b'\\' => i += 2,
            b'"' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(ExtractError::Malformed)
}

fn literal_end(data: &[u8], start: usize, literal: &[u8]) -> Result<usize, ExtractError> {
    if data[start..].starts_with(literal) {
        Ok(start + literal.len())
    } else {
        Err(ExtractError::Malformed)
    }
}

fn number_end(data: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < data.len() && matches!(data[i], b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E') {
        i += 1;
    }
    i
}

/// Brace matching for objects and arrays, string-aware.
fn delimited_end(data: &[u8], start: usize, open: u8, close: u8) -> Result<usize, ExtractError> {
    let mut depth = 0usize;
    let mut i = start;
    while i < data.len() {
        let b = data[i];
        if b == b'"' {
            i = string_end(data, i)?;
            continue;
        }
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Ok(i + 1);
            }
        }
        i += 1;
    }
    Err(ExtractError::Malformed)
}

/// Offset of the value belonging to `key` in the object starting at
/// `object_start`, or `None` when the member is absent.
///
/// Keys are compared byte for byte, escapes intact, the same way the
/// extracted values are returned.
fn object_member_offset(
    data: &[u8],
    object_start: usize,
    key: &[u8],
) -> Result<Option<usize>, ExtractError> {
    let mut i = skip_ws(data, object_start + 1);
    loop {
        match data.get(i) {
            Some(b'}') => return Ok(None),
            Some(b'"') => {}
            _ => return Err(ExtractError::Malformed),
        }
        let name_end = string_end(data, i)?;
        let name = &data[i + 1..name_end - 1];
        i = skip_ws(data, name_end);
        if data.get(i) != Some(&b':') {
            return Err(ExtractError::Malformed);
        }
        i = skip_ws(data, i + 1);
        if name == key {
            return Ok(Some(i));
        }
        i = skip_ws(data, value_end(data, i)?);
        match data.get(i) {
            Some(b',') => i = skip_ws(data, i + 1),
            Some(b'}') => return Ok(None),
            _ => return Err(ExtractError::Malformed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn extract_nested_key() {
        let data = br#"{"a":{"b":{"c":42}}}"#;
        let (value, kind) = extract(data, &["a", "b", "c"]).unwrap();
        assert_eq!(value, b"42");
        assert_eq!(kind, JsonKind::Number);
    }

    #[test]
    fn extract_string_is_unquoted_with_escapes_intact() {
        let data = br#"{"greeting":"hello \"world\""}"#;
        let (value, kind) = extract(data, &["greeting"]).unwrap();
        assert_eq!(value, br#"hello \"world\""#);
        assert_eq!(kind, JsonKind::String);
    }

    #[test]
    fn extract_object_and_array_spans_include_delimiters() {
        let data = br#"{"user":{"name":"ada"},"tags":[1,2]}"#;
        let (value, kind) = extract(data, &["user"]).unwrap();
        assert_eq!(value, br#"{"name":"ada"}"#);
        assert_eq!(kind, JsonKind::Object);

        let (value, kind) = extract(data, &["tags"]).unwrap();
        assert_eq!(value, b"[1,2]");
        assert_eq!(kind, JsonKind::Array);
    }

    #[test]
    fn extract_literals() {
        let data = br#"{"t":true,"f":false,"n":null,"x":-1.5e3}"#;
        assert_eq!(extract(data, &["t"]).unwrap(), (&b"true"[..], JsonKind::Boolean));
        assert_eq!(extract(data, &["f"]).unwrap(), (&b"false"[..], JsonKind::Boolean));
        assert_eq!(extract(data, &["n"]).unwrap(), (&b"null"[..], JsonKind::Null));
        assert_eq!(extract(data, &["x"]).unwrap(), (&b"-1.5e3"[..], JsonKind::Number));
    }

    #[test]
    fn extract_missing_key_is_path_not_found() {
        let data = br#"{"a":1}"#;
        assert_eq!(extract(data, &["b"]), Err(ExtractError::PathNotFound));
        assert_eq!(extract(data, &["a", "b"]), Err(ExtractError::PathNotFound));
    }

    #[test]
    fn extract_empty_data_is_path_not_found() {
        assert_eq!(extract(b"", &["a"]), Err(ExtractError::PathNotFound));
        assert_eq!(extract(b"  ", &["a"]), Err(ExtractError::PathNotFound));
    }

    #[test]
    fn extract_malformed_value() {
        assert_eq!(extract(b"garbage", &[] as &[&str]), Err(ExtractError::Malformed));
        assert_eq!(
            extract(br#"{"a":"unterminated}"#, &["a"]),
            Err(ExtractError::Malformed),
        );
    }

    #[test]
    fn extract_tolerates_whitespace() {
        let data = b" {\n\t\"a\" :  { \"b\" : \"c\" } } ";
        let (value, kind) = extract(data, &["a", "b"]).unwrap();
        assert_eq!(value, b"c");
        assert_eq!(kind, JsonKind::String);
    }

    #[test]
    fn array_each_visits_in_source_order() {
        let data = br#"{"xs":[{"a":1}, "two", 3, null]}"#;
        let mut seen = Vec::new();
        array_each(data, &["xs"], |value, kind, _| {
            seen.push((value.to_vec(), kind));
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                (br#"{"a":1}"#.to_vec(), JsonKind::Object),
                (b"two".to_vec(), JsonKind::String),
                (b"3".to_vec(), JsonKind::Number),
                (b"null".to_vec(), JsonKind::Null),
            ],
        );
    }

    #[test]
    fn array_each_offsets_point_into_the_array_span() {
        let data = br#"[10,20]"#;
        let mut offsets = Vec::new();
        array_each(data, &[] as &[&str], |_, _, offset| offsets.push(offset)).unwrap();
        assert_eq!(offsets, vec![1, 4]);
    }

    #[test]
    fn array_each_empty_array_visits_nothing() {
        let mut count = 0;
        array_each(br#"{"xs":[]}"#, &["xs"], |_, _, _| count += 1).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn array_each_rejects_non_arrays() {
        assert_eq!(
            array_each(br#"{"xs":1}"#, &["xs"], |_, _, _| {}),
            Err(ExtractError::Malformed),
        );
    }
}

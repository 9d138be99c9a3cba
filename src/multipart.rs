use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// An uploaded file: original client filename plus the raw payload bytes.
/// Bytes are never round-tripped through a text encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Value of one form field: plain text or an uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub enum PartValue {
    Text(String),
    File(FilePart),
}

impl PartValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PartValue::Text(s) => Some(s),
            PartValue::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FilePart> {
        match self {
            PartValue::File(f) => Some(f),
            PartValue::Text(_) => None,
        }
    }
}

/// True when the content type declares a multipart form body. Callers must
/// check this (and boundary presence) before parsing; the parser itself
/// degrades silently on malformed input instead of failing.
pub fn is_form_data(content_type: &str) -> bool {
    content_type
        .to_ascii_lowercase()
        .contains("multipart/form-data")
}

/// Extract the `boundary=` parameter from a content-type header value.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let idx = content_type.find("boundary=")?;
    let rest = &content_type[idx + "boundary=".len()..];
    let rest = rest.split(';').next().unwrap_or("").trim();
    let rest = rest.trim_matches('"');
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

/// Decode a fully buffered `multipart/form-data` body into named fields.
///
/// Single pass over the bytes with three states: seeking the next
/// `--<boundary>` delimiter, reading part headers, reading the part body.
/// Parts without a `Content-Disposition` header are skipped; a part whose
/// headers carry a `filename` attribute becomes a [`FilePart`] with the raw
/// bytes up to the next delimiter, otherwise the value is the text between
/// the blank line and the first line break after it. Repeated field names
/// overwrite (last one wins).
///
/// Not a hardened RFC 2046 implementation: no nested multipart, no
/// chunked reassembly, and a delimiter sequence occurring inside a binary
/// payload terminates that payload.
pub fn parse_form_data(body: &[u8], boundary: &str) -> HashMap<String, PartValue> {
    let mut fields = HashMap::new();
    if boundary.is_empty() {
        return fields;
    }
    let delimiter = format!("--{boundary}").into_bytes();

    enum State {
        SeekBoundary,
        ReadHeaders,
        ReadBody {
            name: String,
            filename: Option<String>,
            end: usize,
        },
    }

    let mut state = State::SeekBoundary;
    let mut pos = 0usize;

    loop {
        match state {
            State::SeekBoundary => {
                // Everything before the next delimiter (preamble, epilogue)
                // is not part data.
                let Some(at) = find(&body[pos..], &delimiter) else {
                    break;
                };
                pos += at + delimiter.len();
                if body[pos..].starts_with(b"--") {
                    break; // closing delimiter
                }
                if body[pos..].starts_with(b"\r\n") {
                    pos += 2;
                } else if body[pos..].starts_with(b"\n") {
                    pos += 1;
                }
                state = State::ReadHeaders;
            }
            State::ReadHeaders => {
                let end = find(&body[pos..], &delimiter).map_or(body.len(), |i| pos + i);
                let segment = &body[pos..end];
                // Headers run until the blank line; a part without one has
                // headers only and an empty payload.
                let (header_bytes, payload_off) = match find(segment, b"\r\n\r\n") {
                    Some(i) => (&segment[..i], i + 4),
                    None => match find(segment, b"\n\n") {
                        Some(i) => (&segment[..i], i + 2),
                        None => (segment, segment.len()),
                    },
                };
                match disposition(header_bytes) {
                    Some((name, filename)) => {
                        pos += payload_off;
                        state = State::ReadBody { name, filename, end };
                    }
                    None => {
                        pos = end;
                        state = State::SeekBoundary;
                    }
                }
            }
            State::ReadBody { name, filename, end } => {
                let mut payload = &body[pos..end];
                // Drop the line break that precedes the next delimiter.
                if payload.ends_with(b"\r\n") {
                    payload = &payload[..payload.len() - 2];
                } else if payload.ends_with(b"\n") {
                    payload = &payload[..payload.len() - 1];
                }
                let value = match filename {
                    Some(filename) => PartValue::File(FilePart {
                        filename,
                        data: payload.to_vec(),
                    }),
                    None => PartValue::Text(first_line(payload)),
                };
                fields.insert(name, value);
                pos = end;
                state = State::SeekBoundary;
            }
        }
    }
    fields
}

/// `name` (required) and `filename` (optional) attributes of the part's
/// `Content-Disposition` header, or `None` when the header is absent.
fn disposition(header_bytes: &[u8]) -> Option<(String, Option<String>)> {
    let text = String::from_utf8_lossy(header_bytes);
    let line = text
        .lines()
        .find(|l| l.to_ascii_lowercase().starts_with("content-disposition"))?;
    let name = name_re().captures(line)?.get(1)?.as_str().to_string();
    let filename = filename_re()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    Some((name, filename))
}

fn first_line(payload: &[u8]) -> String {
    let line = match payload.iter().position(|&b| b == b'\n') {
        Some(i) => &payload[..i],
        None => payload,
    };
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `[ ;]` keeps this from matching inside `filename=`.
    RE.get_or_init(|| Regex::new(r#"(?i)[ ;]name="([^"]*)""#).expect("static regex"))
}

fn filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)filename="([^"]*)""#).expect("static regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "----TestBoundary7MA4YWxk";

    fn text_part(name: &str, value: &str) -> Vec<u8> {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .into_bytes()
    }

    fn file_part(name: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        out.extend_from_slice(data);
        out.extend_from_slice(b"\r\n");
        out
    }

    fn close() -> Vec<u8> {
        format!("--{BOUNDARY}--\r\n").into_bytes()
    }

    #[test]
    fn boundary_extraction() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=\"quoted bound\"; charset=utf-8"),
            Some("quoted bound".to_string())
        );
        assert_eq!(boundary_from_content_type("multipart/form-data"), None);
        assert_eq!(boundary_from_content_type("application/json"), None);
    }

    #[test]
    fn text_and_file_fields() {
        let mut body = text_part("inventory_name", "Laptop");
        body.extend(file_part("photo", "x.jpg", &[0x01, 0x02, 0x03]));
        body.extend(close());

        let fields = parse_form_data(&body, BOUNDARY);
        assert_eq!(
            fields.get("inventory_name").and_then(|v| v.as_text()),
            Some("Laptop")
        );
        let photo = fields.get("photo").and_then(|v| v.as_file()).unwrap();
        assert_eq!(photo.filename, "x.jpg");
        assert_eq!(photo.data, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn binary_payload_with_embedded_line_breaks_survives() {
        let data = [0xFF, 0xD8, b'\r', b'\n', 0x00, b'\n', 0x7F, 0xFE];
        let mut body = file_part("photo", "raw.bin", &data);
        body.extend(close());

        let fields = parse_form_data(&body, BOUNDARY);
        let photo = fields.get("photo").and_then(|v| v.as_file()).unwrap();
        assert_eq!(photo.data, data);
    }

    #[test]
    fn repeated_name_last_wins() {
        let mut body = text_part("description", "first");
        body.extend(text_part("description", "second"));
        body.extend(close());

        let fields = parse_form_data(&body, BOUNDARY);
        assert_eq!(
            fields.get("description").and_then(|v| v.as_text()),
            Some("second")
        );
    }

    #[test]
    fn part_without_disposition_is_ignored() {
        let mut body =
            format!("--{BOUNDARY}\r\nContent-Type: text/plain\r\n\r\norphan\r\n").into_bytes();
        body.extend(text_part("kept", "yes"));
        body.extend(close());

        let fields = parse_form_data(&body, BOUNDARY);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("kept").and_then(|v| v.as_text()), Some("yes"));
    }

    #[test]
    fn headers_only_part_yields_empty_value() {
        let mut body =
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"blank\"\r\n").into_bytes();
        body.extend(close());

        let fields = parse_form_data(&body, BOUNDARY);
        assert_eq!(fields.get("blank").and_then(|v| v.as_text()), Some(""));
    }

    #[test]
    fn text_value_stops_at_first_line_break() {
        let mut body = text_part("notes", "line one\r\nline two");
        body.extend(close());

        let fields = parse_form_data(&body, BOUNDARY);
        assert_eq!(
            fields.get("notes").and_then(|v| v.as_text()),
            Some("line one")
        );
    }

    #[test]
    fn preamble_and_epilogue_are_ignored() {
        let mut body = b"ignore this preamble\r\n".to_vec();
        body.extend(text_part("inventory_name", "Router"));
        body.extend(close());
        body.extend_from_slice(b"trailing junk");

        let fields = parse_form_data(&body, BOUNDARY);
        assert_eq!(fields.len(), 1);
        assert_eq!(
            fields.get("inventory_name").and_then(|v| v.as_text()),
            Some("Router")
        );
    }

    #[test]
    fn empty_boundary_produces_empty_mapping() {
        let body = text_part("inventory_name", "Laptop");
        assert!(parse_form_data(&body, "").is_empty());
    }
}

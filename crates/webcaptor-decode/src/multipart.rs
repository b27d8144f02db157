//! Multipart form decoder

use crate::form::group_pairs;
use crate::TYPED_DECODER_PRIORITY;
use bytes::Bytes;
use memchr::memmem;
use tracing::debug;
use webcaptor_core::content_type::decode_text;
use webcaptor_core::events::{AttachedFile, FileAttachments};
use webcaptor_core::plugins::{BodyDecoder, DecodeError, PluginInfo};
use webcaptor_core::{BodyPayload, ContentType};

/// Maximum headers per part
const MAX_PART_HEADERS: usize = 16;

/// Decodes `multipart/*` bodies. Text parts become fields of the value tree;
/// parts with a filename go to the attachment map, or are dropped entirely
/// when file capture is disabled.
#[derive(Debug)]
pub struct MultipartDecoder {
    include_files: bool,
}

impl MultipartDecoder {
    pub fn new(include_files: bool) -> Self {
        Self { include_files }
    }
}

impl PluginInfo for MultipartDecoder {
    fn name(&self) -> &str {
        "multipart-decoder"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Decodes multipart form fields and file attachments"
    }
}

impl BodyDecoder for MultipartDecoder {
    fn priority(&self) -> i32 {
        TYPED_DECODER_PRIORITY
    }

    fn supports(&self, content_type: Option<&ContentType>) -> bool {
        content_type.is_some_and(|ct| ct.contains("multipart"))
    }

    fn decode(
        &self,
        content_type: Option<&ContentType>,
        bytes: &[u8],
    ) -> Result<BodyPayload, DecodeError> {
        let boundary = content_type
            .and_then(|ct| ct.param("boundary"))
            .filter(|b| !b.is_empty())
            .ok_or(DecodeError::MissingBoundary)?;

        let mut fields: Vec<(String, String)> = Vec::new();
        let mut files = FileAttachments::new();

        let parts =
            split_parts(bytes, boundary).map_err(|e| DecodeError::malformed(content_type, e))?;
        for raw in parts {
            let part = parse_part(raw).map_err(|e| DecodeError::malformed(content_type, e))?;
            let Some(name) = part.name else {
                continue;
            };
            let part_type = part.content_type.as_deref().map(ContentType::parse);

            if part.filename.is_some() {
                if self.include_files {
                    files.entry(name.clone()).or_default().push(AttachedFile {
                        field_name: name,
                        filename: part.filename,
                        content_type: part.content_type,
                        size: part.body.len(),
                        bytes: Bytes::copy_from_slice(part.body),
                    });
                } else {
                    debug!(field = %name, "Dropping multipart file part");
                }
            } else {
                fields.push((name, decode_text(part_type.as_ref(), part.body)));
            }
        }

        let payload = BodyPayload::new(group_pairs(fields));
        Ok(if self.include_files {
            payload.with_files(files)
        } else {
            payload
        })
    }
}

/// One parsed part
struct Part<'a> {
    name: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
    body: &'a [u8],
}

/// Split a multipart body on `--boundary` delimiter lines
fn split_parts<'a>(bytes: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>, String> {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();

    // Delimiters only count at the start of a line
    let positions: Vec<usize> = memmem::find_iter(bytes, delimiter)
        .filter(|&pos| pos == 0 || bytes[pos - 1] == b'\n')
        .collect();
    if positions.is_empty() {
        return Err("boundary delimiter not found".to_string());
    }

    let mut parts = Vec::new();
    for window in positions.windows(2) {
        let segment = &bytes[window[0] + delimiter.len()..window[1]];
        if segment.starts_with(b"--") {
            break;
        }
        parts.push(trim_line_break_end(trim_line_break_start(segment)));
    }
    Ok(parts)
}

fn trim_line_break_start(segment: &[u8]) -> &[u8] {
    segment
        .strip_prefix(b"\r\n")
        .or_else(|| segment.strip_prefix(b"\n"))
        .unwrap_or(segment)
}

fn trim_line_break_end(segment: &[u8]) -> &[u8] {
    segment
        .strip_suffix(b"\r\n")
        .or_else(|| segment.strip_suffix(b"\n"))
        .unwrap_or(segment)
}

fn parse_part(raw: &[u8]) -> Result<Part<'_>, String> {
    // A part without headers starts directly with the blank line
    if let Some(body) = raw.strip_prefix(b"\r\n") {
        return Ok(Part {
            name: None,
            filename: None,
            content_type: None,
            body,
        });
    }

    let mut headers = [httparse::EMPTY_HEADER; MAX_PART_HEADERS];
    let (header_len, parsed) = match httparse::parse_headers(raw, &mut headers) {
        Ok(httparse::Status::Complete(result)) => result,
        Ok(httparse::Status::Partial) => return Err("truncated part headers".to_string()),
        Err(e) => return Err(format!("invalid part headers: {}", e)),
    };

    let mut part = Part {
        name: None,
        filename: None,
        content_type: None,
        body: &raw[header_len..],
    };
    for header in parsed {
        let value = String::from_utf8_lossy(header.value);
        if header.name.eq_ignore_ascii_case("content-disposition") {
            part.name = disposition_param(&value, "name");
            part.filename = disposition_param(&value, "filename");
        } else if header.name.eq_ignore_ascii_case("content-type") {
            part.content_type = Some(value.trim().to_string());
        }
    }
    Ok(part)
}

/// Extract a parameter from a `Content-Disposition` value
fn disposition_param(value: &str, param: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|item| {
        let (key, val) = item.split_once('=')?;
        if key.trim().eq_ignore_ascii_case(param) {
            Some(val.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

//! Single-part payload extraction
//!
//! Layout consumed from the body:
//! ```text
//! --boundary\r\n
//! Content-Disposition: form-data; name="file"; filename="shot.png"\r\n
//! Content-Type: image/png\r\n
//! \r\n
//! <payload bytes>\r\n
//! --boundary--\r\n
//! ```

use super::scan::{LineRead, Scanner, UntilRead};
use super::{Boundary, BoundarySide, ExtractedPayload, MultipartError, MultipartResult};
use tokio::io::AsyncRead;

/// Lines between the opening boundary and the payload: the boundary line,
/// Content-Disposition, Content-Type and the blank separator.
pub const HEADER_LINES: usize = 4;

/// CRLF terminating the part ahead of the closing boundary
pub const PART_TRAILER: usize = 2;

/// Index of the Content-Type line when no header names itself
const CONTENT_TYPE_LINE: usize = 2;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Bounds applied while extracting
#[derive(Debug, Clone)]
pub struct ExtractLimits {
    /// Scan window size in bytes
    pub chunk_size: usize,
    /// Largest accepted payload
    pub max_payload_bytes: usize,
    /// Longest accepted header line
    pub max_header_line: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            max_payload_bytes: 32 * 1024 * 1024,
            max_header_line: 8 * 1024,
        }
    }
}

/// Extract the first part of a multipart body.
pub async fn extract_payload<R: AsyncRead + Unpin>(
    reader: R,
    boundary: &Boundary,
    limits: &ExtractLimits,
) -> MultipartResult<ExtractedPayload> {
    boundary.check_window(limits.chunk_size)?;
    let mut scanner = Scanner::new(reader, limits.chunk_size);

    if !scanner.seek(boundary.as_bytes()).await? {
        return Err(MultipartError::BoundaryNotFound {
            which: BoundarySide::Opening,
        });
    }

    let mut headers = Vec::with_capacity(HEADER_LINES);
    for index in 0..HEADER_LINES {
        match scanner.read_line(limits.max_header_line).await? {
            LineRead::Line(line) => headers.push(String::from_utf8_lossy(&line).into_owned()),
            LineRead::TooLong => {
                return Err(MultipartError::MalformedPart(format!(
                    "header line {} exceeds {} bytes",
                    index, limits.max_header_line
                )))
            }
            LineRead::Exhausted => {
                return Err(MultipartError::MalformedPart(format!(
                    "body ended inside header line {}",
                    index
                )))
            }
        }
    }

    let mut bytes = Vec::new();
    let result = scanner
        .read_until(
            boundary.as_bytes(),
            PART_TRAILER,
            &mut bytes,
            limits.max_payload_bytes,
        )
        .await?;
    match result {
        UntilRead::Found => {}
        UntilRead::Exhausted => {
            return Err(MultipartError::BoundaryNotFound {
                which: BoundarySide::Closing,
            })
        }
        UntilRead::LimitExceeded => {
            return Err(MultipartError::PayloadTooLarge {
                limit: limits.max_payload_bytes,
            })
        }
    }

    log::debug!(
        "Extracted {} payload bytes (headers: {:?})",
        bytes.len(),
        &headers[1..]
    );

    Ok(ExtractedPayload {
        bytes,
        content_type: declared_content_type(&headers),
        filename: disposition_filename(&headers),
    })
}

/// Split `Name: value` into its parts
fn header_field(line: &str) -> Option<(&str, &str)> {
    line.split_once(':')
        .map(|(name, value)| (name.trim(), value.trim()))
}

fn declared_content_type(headers: &[String]) -> String {
    let value = headers
        .iter()
        .skip(1)
        .filter_map(|line| header_field(line))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value)
        .or_else(|| {
            headers
                .get(CONTENT_TYPE_LINE)
                .and_then(|line| header_field(line))
                .map(|(_, value)| value)
        });

    let media_type = value
        .and_then(|v| v.split(';').next())
        .map(str::trim)
        .unwrap_or_default();

    if media_type.is_empty() {
        DEFAULT_CONTENT_TYPE.to_string()
    } else {
        media_type.to_ascii_lowercase()
    }
}

fn disposition_filename(headers: &[String]) -> Option<String> {
    let (_, value) = headers
        .iter()
        .skip(1)
        .filter_map(|line| header_field(line))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-disposition"))?;

    value
        .split(';')
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("filename"))
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

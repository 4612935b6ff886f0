use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};


/// The largest CGI response head accepted from an application.
pub const MAX_HEAD_LEN: usize = 64 * 1024;
/// The largest number of header lines accepted in a CGI response head.
pub const MAX_HEADERS: usize = 128;


/// Errors that may occur while parsing a CGI response head.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HeadError {
    /// No blank line was found within [`MAX_HEAD_LEN`] bytes.
    #[error("CGI response head exceeds {MAX_HEAD_LEN} bytes")]
    TooLarge,
    /// The head has more than [`MAX_HEADERS`] header lines.
    #[error("CGI response head has more than {MAX_HEADERS} headers")]
    TooManyHeaders,
    /// A header line is not of the form `Name: value`.
    #[error("malformed CGI response head: {0}")]
    Malformed(httparse::Error),
    /// The `Status` header does not start with a valid status code.
    #[error("invalid CGI Status header {0:?}")]
    InvalidStatus(String),
    /// A header name or value is not valid for HTTP.
    #[error("invalid CGI response header {0:?}")]
    InvalidHeader(String),
}


/// The status line and headers of a CGI/1.1 response.
#[derive(Debug, Clone)]
pub struct Head {
    /// The HTTP status derived from the `Status` and `Location` headers.
    pub status: StatusCode,
    /// All other response headers, in order of appearance.
    pub headers: HeaderMap,
}

/// Parses the CGI response head at the start of `buf`.
///
/// The head ends at the first empty line; both `\r\n` and bare `\n` line
/// endings are accepted. Returns `Ok(None)` if `buf` does not contain the
/// full head yet. On success the number of consumed bytes is returned next
/// to the [`Head`]; everything after it is response body.
///
/// The status is taken from the `Status` header (RFC 3875, Section 6.3.3),
/// which may also be written as an HTTP status line such as
/// `HTTP/1.1 404 Not Found`. Without one, a `Location` header implies
/// `302 Found` and everything else `200 OK`.
///
/// # Errors
/// Returns an error if the head is malformed or exceeds [`MAX_HEAD_LEN`] or
/// [`MAX_HEADERS`].
pub fn parse_head(buf: &[u8]) -> Result<Option<(Head, usize)>, HeadError> {
    let mut raw = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let (consumed, raw) = match httparse::parse_headers(buf, &mut raw) {
        Ok(httparse::Status::Complete(res)) => res,
        Ok(httparse::Status::Partial) if buf.len() >= MAX_HEAD_LEN => return Err(HeadError::TooLarge),
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => return Err(HeadError::TooManyHeaders),
        Err(e) => return Err(HeadError::Malformed(e)),
    };
    if consumed > MAX_HEAD_LEN {
        return Err(HeadError::TooLarge);
    }

    let mut status = None;
    let mut headers = HeaderMap::with_capacity(raw.len());
    for h in raw {
        if h.name.eq_ignore_ascii_case("status") {
            status = Some(parse_status(h.value)?);
            continue;
        }
        let invalid = || HeadError::InvalidHeader(h.name.to_owned());
        let name = HeaderName::from_bytes(h.name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_bytes(h.value).map_err(|_| invalid())?;
        headers.append(name, value);
    }

    let status = status.unwrap_or(if headers.contains_key(http::header::LOCATION) {
        StatusCode::FOUND
    } else {
        StatusCode::OK
    });
    Ok(Some((Head { status, headers }, consumed)))
}

fn parse_status(value: &[u8]) -> Result<StatusCode, HeadError> {
    let invalid = || HeadError::InvalidStatus(String::from_utf8_lossy(value).into_owned());
    let text = std::str::from_utf8(value).map_err(|_| invalid())?;
    let mut words = text.split_ascii_whitespace();
    let mut code = words.next().ok_or_else(invalid)?;
    if code.starts_with("HTTP/") {
        code = words.next().ok_or_else(invalid)?;
    }
    StatusCode::from_bytes(code.as_bytes()).map_err(|_| invalid())
}

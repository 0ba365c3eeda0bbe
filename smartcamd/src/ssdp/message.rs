use std::collections::HashMap;
use chrono::{DateTime, Utc};
use shared::protocol::{METHOD_NOTIFY, METHOD_SEARCH};
use shared::types::ServiceRegistration;

/// A request received on the discovery channel
#[derive(Debug, PartialEq, Eq)]
pub enum Request {
    Search {
        search_target: String,
        max_wait_secs: u64,
    },
    /// Third-party announcement; accepted and ignored
    Notify,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("datagram is not valid UTF-8")]
    InvalidUtf8,
    #[error("no blank line after the header block")]
    MissingSeparator,
    #[error("malformed request line")]
    BadRequestLine,
    #[error("malformed header line: {0:?}")]
    BadHeader(String),
    #[error("missing required header {0}")]
    MissingHeader(&'static str),
    #[error("invalid MX value {0:?}")]
    BadMx(String),
    #[error("unsupported request {0:?}")]
    Unsupported(String),
}

/// Parse a datagram as request line plus headers, terminated by a blank line.
/// Header names are lower-cased.
pub fn parse(buf: &[u8]) -> Result<Request, ParseError> {
    let packet = std::str::from_utf8(buf).map_err(|_| ParseError::InvalidUtf8)?;
    let (head, _payload) = packet
        .split_once("\r\n\r\n")
        .ok_or(ParseError::MissingSeparator)?;

    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(ParseError::BadRequestLine)?;
    let mut parts = request_line.split(' ');
    let method = parts.next().ok_or(ParseError::BadRequestLine)?;
    let target = parts.next().ok_or(ParseError::BadRequestLine)?;

    let mut headers = HashMap::new();
    for line in lines {
        let line = line.replacen(": ", ":", 1);
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::BadHeader(line.clone()))?;
        headers.insert(name.to_ascii_lowercase(), value.trim().to_string());
    }

    match (method, target) {
        (METHOD_SEARCH, "*") => {
            let search_target = headers
                .remove("st")
                .ok_or(ParseError::MissingHeader("ST"))?;
            let mx = headers.get("mx").ok_or(ParseError::MissingHeader("MX"))?;
            let max_wait_secs = mx
                .parse::<u64>()
                .map_err(|_| ParseError::BadMx(mx.clone()))?;
            Ok(Request::Search { search_target, max_wait_secs })
        }
        (METHOD_NOTIFY, "*") => Ok(Request::Notify),
        _ => Err(ParseError::Unsupported(request_line.to_string())),
    }
}

/// HTTP-style date, always GMT
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Unicast answer to a search. Manifestation, silent flag and host override
/// are never exposed.
pub fn build_response(reg: &ServiceRegistration, at: DateTime<Utc>) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         USN: {}\r\n\
         LOCATION: {}\r\n\
         ST: {}\r\n\
         EXT:\r\n\
         SERVER: {}\r\n\
         CACHE-CONTROL: {}\r\n\
         DATE: {}\r\n\
         \r\n",
        reg.usn,
        reg.location,
        reg.service_type,
        reg.server,
        reg.cache_control,
        http_date(at)
    )
}

/// Multicast announcement. Alive and byebye differ only in `nts`.
pub fn build_notify(reg: &ServiceRegistration, default_host: &str, nts: &str) -> String {
    let host = reg.host.as_deref().unwrap_or(default_host);
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}\r\n\
         NTS: {}\r\n\
         USN: {}\r\n\
         LOCATION: {}\r\n\
         NT: {}\r\n\
         EXT:\r\n\
         SERVER: {}\r\n\
         CACHE-CONTROL: {}\r\n\
         \r\n",
        host, nts, reg.usn, reg.location, reg.service_type, reg.server, reg.cache_control
    )
}

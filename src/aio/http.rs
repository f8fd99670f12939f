//! Adafruit IO REST client over any `Connector`
//!
//! One connection per request, `Connection: close`, whole response read into
//! a fixed buffer.

use core::fmt::Write;

use heapless::{String, Vec};

use crate::aio::json;
use crate::clock::TimeStruct;
use crate::error::Error;
use crate::traits::{Connector, FeedHandle, FeedReader, Link, Payload, TimeSource};

const RESPONSE_CAPACITY: usize = 4096;
const REQUEST_CAPACITY: usize = 384;

pub type Path = String<128>;

/// Parsed response, borrowing the receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct Response<'a> {
    pub status: u16,
    pub body: &'a str,
}

pub struct HttpSession<'c, C: Connector> {
    connector: C,
    host: &'c str,
    port: u16,
    username: &'c str,
    key: &'c str,
    response: Vec<u8, RESPONSE_CAPACITY>,
}

impl<'c, C: Connector> HttpSession<'c, C> {
    pub fn new(connector: C, host: &'c str, port: u16, username: &'c str, key: &'c str) -> Self {
        Self {
            connector,
            host,
            port,
            username,
            key,
            response: Vec::new(),
        }
    }

    /// `/api/v2/{username}/{rest}`
    fn path(&self, rest: core::fmt::Arguments<'_>) -> Result<Path, Error> {
        let mut path = String::new();
        write!(path, "/api/v2/{}/{}", self.username, rest)
            .map_err(|_| Error::Value("request path too long"))?;
        Ok(path)
    }

    /// GET `path` and return the body of a 2xx response.
    pub async fn get(&mut self, path: &str) -> Result<&str, Error> {
        let mut request: String<REQUEST_CAPACITY> = String::new();
        write!(
            request,
            "GET {} HTTP/1.1\r\nHost: {}\r\nX-AIO-Key: {}\r\nAccept: application/json\r\nConnection: close\r\n\r\n",
            path, self.host, self.key
        )
        .map_err(|_| Error::Value("request too long"))?;

        self.response.clear();
        {
            let mut link = self.connector.open(self.host, self.port).await?;
            let outcome = exchange(&mut link, request.as_bytes(), &mut self.response).await;
            link.close().await;
            outcome?;
        }

        let response = parse_response(&mut self.response)?;
        log::debug!("HTTP GET {} -> status {}", path, response.status);
        check_status(response.status)?;
        Ok(response.body)
    }
}

async fn exchange<L: Link, const N: usize>(
    link: &mut L,
    request: &[u8],
    response: &mut Vec<u8, N>,
) -> Result<(), Error> {
    link.write_all(request).await?;
    let mut chunk = [0u8; 512];
    loop {
        let n = link.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        response
            .extend_from_slice(&chunk[..n])
            .map_err(|_| Error::Runtime("response too large"))?;
    }
}

fn check_status(status: u16) -> Result<(), Error> {
    match status {
        200..=299 => Ok(()),
        429 => Err(Error::Runtime("throttled by the service")),
        500..=599 => Err(Error::Runtime("service error")),
        _ => Err(Error::Rejected(status)),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Split a raw HTTP/1.x response into status and body, de-chunking the body
/// in place if needed.
pub fn parse_response<const N: usize>(raw: &mut Vec<u8, N>) -> Result<Response<'_>, Error> {
    let head_end = find(raw, b"\r\n\r\n").ok_or(Error::Value("incomplete HTTP response"))?;
    let head = core::str::from_utf8(&raw[..head_end])
        .map_err(|_| Error::Value("HTTP head is not UTF-8"))?;

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or("");
    let mut parts = status_line.split(' ');
    if !parts.next().is_some_and(|v| v.starts_with("HTTP/1.")) {
        return Err(Error::Value("not an HTTP response"));
    }
    let status: u16 = parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or(Error::Value("bad HTTP status line"))?;

    let mut chunked = false;
    let mut content_length = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("transfer-encoding") && value.eq_ignore_ascii_case("chunked") {
            chunked = true;
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().ok();
        }
    }

    let body_start = head_end + 4;
    let body_len = if chunked {
        dechunk(&mut raw[body_start..])?
    } else {
        let available = raw.len() - body_start;
        match content_length {
            Some(len) if len > available => return Err(Error::Io("HTTP body truncated")),
            Some(len) => len,
            None => available,
        }
    };

    let body = core::str::from_utf8(&raw[body_start..body_start + body_len])
        .map_err(|_| Error::Value("HTTP body is not UTF-8"))?;
    Ok(Response { status, body })
}

/// Decode a chunked body in place. Returns the decoded length.
fn dechunk(body: &mut [u8]) -> Result<usize, Error> {
    let mut read = 0;
    let mut write = 0;
    loop {
        let line_end =
            find(&body[read..], b"\r\n").ok_or(Error::Io("HTTP chunk truncated"))? + read;
        let size_text = core::str::from_utf8(&body[read..line_end])
            .map_err(|_| Error::Value("bad chunk size"))?;
        let size_text = size_text.split(';').next().unwrap_or("").trim();
        let size =
            usize::from_str_radix(size_text, 16).map_err(|_| Error::Value("bad chunk size"))?;
        read = line_end + 2;
        if size == 0 {
            return Ok(write);
        }
        if size > body.len() - read {
            return Err(Error::Io("HTTP chunk truncated"));
        }
        body.copy_within(read..read + size, write);
        write += size;
        read = match (read + size).checked_add(2) {
            Some(next) if next <= body.len() => next,
            _ => return Err(Error::Io("HTTP chunk truncated")),
        };
    }
}

/// Build a `TimeStruct` from the time integration's JSON.
pub fn parse_time(body: &str) -> Result<TimeStruct, Error> {
    let narrow = |name: &str, max: u32| -> Result<u32, Error> {
        let value = json::uint_field(body, name)?;
        if value > max {
            return Err(Error::Value("time field out of range"));
        }
        Ok(value)
    };
    Ok(TimeStruct {
        year: narrow("year", 9999)? as u16,
        mon: narrow("mon", 12)? as u8,
        mday: narrow("mday", 31)? as u8,
        hour: narrow("hour", 23)? as u8,
        min: narrow("min", 59)? as u8,
        sec: narrow("sec", 61)?.min(59) as u8,
        wday: narrow("wday", 6)? as u8,
        yday: narrow("yday", 366)? as u16,
        isdst: json::field(body, "isdst").is_some_and(|v| v != "0" && v != "false"),
    })
}

fn bounded<const N: usize>(text: &str) -> Result<String<N>, Error> {
    let mut out = String::new();
    out.push_str(text).map_err(|_| Error::Value("field too long"))?;
    Ok(out)
}

impl<C: Connector> FeedReader for HttpSession<'_, C> {
    async fn resolve_feed(&mut self, key: &str) -> Result<FeedHandle, Error> {
        let path = self.path(format_args!("feeds/{}", key))?;
        let body = self.get(&path).await?;
        let resolved = json::field(body, "key").ok_or(Error::Value("feed has no key"))?;
        bounded(resolved)
    }

    async fn receive_data(&mut self, feed: &FeedHandle) -> Result<Payload, Error> {
        let path = self.path(format_args!("feeds/{}/data/last", feed))?;
        let body = self.get(&path).await?;
        let value = json::field(body, "value").ok_or(Error::Value("feed has no value"))?;
        bounded(value)
    }
}

impl<C: Connector> TimeSource for HttpSession<'_, C> {
    async fn receive_time(&mut self) -> Result<TimeStruct, Error> {
        let path = self.path(format_args!("integrations/time/struct.json"))?;
        let body = self.get(&path).await?;
        parse_time(body)
    }
}

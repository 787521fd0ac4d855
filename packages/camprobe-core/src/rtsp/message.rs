//! RTSP/1.0 request building and response-head parsing.
//!
//! Only the status line and headers are ever read; probing never needs the
//! SDP body.

use crate::error::{Error, Result};

/// Methods the prober issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
        }
    }
}

/// `rtsp://host:port/path`, adding the leading slash when missing.
pub fn request_url(host: &str, port: u16, path: &str) -> String {
    if path.starts_with('/') {
        format!("rtsp://{}:{}{}", host, port, path)
    } else {
        format!("rtsp://{}:{}/{}", host, port, path)
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub cseq: u32,
    pub user_agent: String,
    pub authorization: Option<String>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>, cseq: u32, user_agent: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            cseq,
            user_agent: user_agent.into(),
            authorization: None,
        }
    }

    pub fn with_authorization(mut self, value: String) -> Self {
        self.authorization = Some(value);
        self
    }

    /// Wire form, terminated by the blank line.
    pub fn encode(&self) -> String {
        let mut out = format!(
            "{} {} RTSP/1.0\r\nCSeq: {}\r\nUser-Agent: {}\r\n",
            self.method.as_str(),
            self.url,
            self.cseq,
            self.user_agent
        );
        if self.method == Method::Describe {
            out.push_str("Accept: application/sdp\r\n");
        }
        if let Some(ref auth) = self.authorization {
            out.push_str("Authorization: ");
            out.push_str(auth);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out
    }
}

/// Status line and headers of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl Response {
    pub fn parse(head: &str) -> Result<Self> {
        let mut lines = head.lines();
        let status_line = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::Protocol("empty RTSP response".to_string()))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("RTSP/") {
            return Err(Error::Protocol(format!(
                "not an RTSP status line: {}",
                status_line
            )));
        }
        let status = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| Error::Protocol(format!("bad status line: {}", status_line)))?;
        let reason = parts.next().unwrap_or_default().trim().to_string();

        let headers = lines
            .map(str::trim_end)
            .take_while(|l| !l.is_empty())
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        Ok(Self {
            status,
            reason,
            headers,
        })
    }

    /// First header with this name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers_named(name).next()
    }

    /// Values of every header with this name, case-insensitive.
    pub fn headers_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every `WWW-Authenticate` value; devices often offer Digest and Basic.
    pub fn challenges(&self) -> Vec<&str> {
        self.headers_named("WWW-Authenticate").collect()
    }
}

//! Credential proofs for camera protocols.
//!
//! - WS-Security UsernameToken with PasswordDigest (ONVIF SOAP)
//! - HTTP Digest and Basic `Authorization` values (RTSP reuses the HTTP scheme)
//!
//! Everything here is a pure function of its inputs apart from the random
//! WS-Security nonce. Digest challenges are never cached: callers pass the
//! nonce from the response they just received.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};

const PASSWORD_DIGEST_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
const BASE64_ENCODING_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// A username/password pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// The values carried in a WS-Security UsernameToken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameToken {
    pub username: String,
    /// base64(SHA-1(nonce ++ created ++ password))
    pub password_digest: String,
    /// base64 of the raw nonce bytes
    pub nonce: String,
    pub created: String,
}

impl UsernameToken {
    /// Build a token with a fresh 16-byte random nonce and the current UTC time.
    pub fn generate(username: &str, password: &str) -> Self {
        let nonce: [u8; 16] = rand::random();
        let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        Self::with_nonce(username, password, &nonce, &created)
    }

    /// Build a token from a known nonce and timestamp.
    pub fn with_nonce(username: &str, password: &str, nonce: &[u8], created: &str) -> Self {
        Self {
            username: username.to_string(),
            password_digest: password_digest(nonce, created, password),
            nonce: BASE64.encode(nonce),
            created: created.to_string(),
        }
    }

    /// Render as a `<Security>` element for a SOAP 1.2 header whose envelope
    /// prefix is `s`.
    pub fn to_xml(&self) -> String {
        format!(
            r#"<Security s:mustUnderstand="1" xmlns="{wsse}">
      <UsernameToken>
        <Username>{username}</Username>
        <Password Type="{digest_type}">{digest}</Password>
        <Nonce EncodingType="{encoding}">{nonce}</Nonce>
        <Created xmlns="{wsu}">{created}</Created>
      </UsernameToken>
    </Security>"#,
            wsse = WSSE_NS,
            username = escape_xml(&self.username),
            digest_type = PASSWORD_DIGEST_TYPE,
            digest = self.password_digest,
            encoding = BASE64_ENCODING_TYPE,
            nonce = self.nonce,
            wsu = WSU_NS,
            created = self.created,
        )
    }
}

/// WS-Security header element with a freshly generated nonce.
pub fn ws_security_header(username: &str, password: &str) -> String {
    UsernameToken::generate(username, password).to_xml()
}

/// PasswordDigest = base64(SHA-1(nonce ++ created ++ password))
pub fn password_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Realm and nonce from a `WWW-Authenticate: Digest ...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
}

/// A parsed `WWW-Authenticate` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Digest(DigestChallenge),
    Basic { realm: Option<String> },
}

impl Challenge {
    /// Parse one `WWW-Authenticate` header value.
    pub fn parse(value: &str) -> Result<Challenge> {
        let value = value.trim();
        let (scheme, rest) = value.split_once(char::is_whitespace).unwrap_or((value, ""));

        if scheme.eq_ignore_ascii_case("digest") {
            let params = parse_auth_params(rest);
            let realm = find_param(&params, "realm")
                .ok_or_else(|| Error::Protocol("Digest challenge without realm".to_string()))?;
            let nonce = find_param(&params, "nonce")
                .ok_or_else(|| Error::Protocol("Digest challenge without nonce".to_string()))?;
            Ok(Challenge::Digest(DigestChallenge {
                realm,
                nonce,
                opaque: find_param(&params, "opaque"),
            }))
        } else if scheme.eq_ignore_ascii_case("basic") {
            let params = parse_auth_params(rest);
            Ok(Challenge::Basic {
                realm: find_param(&params, "realm"),
            })
        } else {
            Err(Error::Protocol(format!(
                "unsupported authentication scheme: {}",
                scheme
            )))
        }
    }

    /// Pick the strongest scheme from every `WWW-Authenticate` header a
    /// response carried. Digest wins over Basic.
    pub fn select<'a>(values: impl IntoIterator<Item = &'a str>) -> Result<Challenge> {
        let mut basic = None;
        let mut last_err = None;
        for value in values {
            match Challenge::parse(value) {
                Ok(c @ Challenge::Digest(_)) => return Ok(c),
                Ok(c) => basic = basic.or(Some(c)),
                Err(e) => last_err = Some(e),
            }
        }
        basic.ok_or_else(|| {
            last_err.unwrap_or_else(|| Error::Protocol("missing WWW-Authenticate".to_string()))
        })
    }

    /// `Authorization` header value answering this challenge.
    pub fn authorization(&self, username: &str, password: &str, method: &str, uri: &str) -> String {
        match self {
            Challenge::Digest(digest) => {
                digest_authorization(digest, username, password, method, uri)
            }
            Challenge::Basic { .. } => basic_authorization(username, password),
        }
    }
}

/// `Digest username=.., realm=.., nonce=.., uri=.., response=..`
///
/// HA1 = MD5(username:realm:password), HA2 = MD5(method:uri),
/// response = MD5(HA1:nonce:HA2).
pub fn digest_authorization(
    challenge: &DigestChallenge,
    username: &str,
    password: &str,
    method: &str,
    uri: &str,
) -> String {
    let ha1 = format!(
        "{:x}",
        md5::compute(format!("{}:{}:{}", username, challenge.realm, password))
    );
    let ha2 = format!("{:x}", md5::compute(format!("{}:{}", method, uri)));
    let response = format!(
        "{:x}",
        md5::compute(format!("{}:{}:{}", ha1, challenge.nonce, ha2))
    );

    let mut value = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
        username, challenge.realm, challenge.nonce, uri, response
    );
    if let Some(ref opaque) = challenge.opaque {
        value.push_str(&format!(", opaque=\"{}\"", opaque));
    }
    value
}

/// `Basic base64(username:password)`
pub fn basic_authorization(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{}:{}", username, password)))
}

/// Split `key="value", key=value` pairs. Quoted values may contain commas.
fn parse_auth_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.trim().is_empty() {
            break;
        }
        if chars.next() != Some('=') {
            continue;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        params.push((key.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    params
}

fn find_param(params: &[(String, String)], name: &str) -> Option<String> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

pub(crate) fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_digest_known_vector() {
        // Worked example from the ONVIF Application Programmer's Guide
        let nonce = BASE64.decode("LKqI6G/AikKCQrN0zqZFlg==").unwrap();
        let digest = password_digest(&nonce, "2010-09-16T07:50:45Z", "userpassword");
        assert_eq!(digest, "tuOSpGlFlIXsozq4HFNeeGeFLEI=");
    }

    #[test]
    fn test_username_token_xml() {
        let token = UsernameToken::with_nonce("admin", "secret", &[7u8; 16], "2024-01-01T00:00:00Z");
        let xml = token.to_xml();
        assert!(xml.contains("<Username>admin</Username>"));
        assert!(xml.contains("#PasswordDigest"));
        assert!(xml.contains(&format!(">{}</Nonce>", BASE64.encode([7u8; 16]))));
        assert!(xml.contains(">2024-01-01T00:00:00Z</Created>"));
        assert!(!xml.contains("secret"));
    }

    #[test]
    fn test_ws_security_nonce_differs_per_header() {
        let a = UsernameToken::generate("admin", "admin");
        let b = UsernameToken::generate("admin", "admin");
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(BASE64.decode(&a.nonce).unwrap().len(), 16);
    }

    #[test]
    fn test_username_is_escaped() {
        let token = UsernameToken::with_nonce("a<b&c", "x", &[0u8; 16], "t");
        assert!(token.to_xml().contains("<Username>a&lt;b&amp;c</Username>"));
    }

    #[test]
    fn test_digest_authorization_rfc2617_vector() {
        let challenge = DigestChallenge {
            realm: "testrealm@host.com".to_string(),
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093".to_string(),
            opaque: None,
        };
        let value = digest_authorization(&challenge, "Mufasa", "Circle Of Life", "GET", "/dir/index.html");
        // HA1/HA2 chain without qop
        assert!(value.contains("response=\"670fd8c2df070c60b045671b8b24ff02\""));
        assert!(value.starts_with("Digest username=\"Mufasa\", realm=\"testrealm@host.com\""));
        assert!(value.contains("uri=\"/dir/index.html\""));
    }

    #[test]
    fn test_digest_authorization_is_deterministic() {
        let challenge = DigestChallenge {
            realm: "test".to_string(),
            nonce: "abc123".to_string(),
            opaque: None,
        };
        let uri = "rtsp://10.0.0.2:554/live/ch00_0";
        let a = digest_authorization(&challenge, "admin", "admin", "DESCRIBE", uri);
        let b = digest_authorization(&challenge, "admin", "admin", "DESCRIBE", uri);
        assert_eq!(a, b);
        let c = digest_authorization(&challenge, "admin", "other", "DESCRIBE", uri);
        assert_ne!(a, c);
    }

    #[test]
    fn test_basic_authorization() {
        assert_eq!(
            basic_authorization("Aladdin", "open sesame"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }

    #[test]
    fn test_parse_digest_challenge() {
        let challenge = Challenge::parse(
            r#"Digest realm="HipcamRealServer", nonce="3b27a446bfa49b0c48c3edb631e09054", stale=FALSE"#,
        )
        .unwrap();
        assert_eq!(
            challenge,
            Challenge::Digest(DigestChallenge {
                realm: "HipcamRealServer".to_string(),
                nonce: "3b27a446bfa49b0c48c3edb631e09054".to_string(),
                opaque: None,
            })
        );
    }

    #[test]
    fn test_parse_quoted_comma_and_basic() {
        let challenge = Challenge::parse(r#"digest nonce="n1", realm="a, b""#).unwrap();
        match challenge {
            Challenge::Digest(d) => {
                assert_eq!(d.realm, "a, b");
                assert_eq!(d.nonce, "n1");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            Challenge::parse(r#"Basic realm="cam""#).unwrap(),
            Challenge::Basic {
                realm: Some("cam".to_string())
            }
        );
    }

    #[test]
    fn test_malformed_challenges_are_protocol_errors() {
        assert!(matches!(
            Challenge::parse(r#"Digest realm="x""#),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(Challenge::parse("Negotiate abc"), Err(Error::Protocol(_))));
        assert!(matches!(Challenge::select(Vec::<&str>::new()), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_select_prefers_digest() {
        let selected = Challenge::select([r#"Basic realm="x""#, r#"Digest realm="x", nonce="y""#]).unwrap();
        assert!(matches!(selected, Challenge::Digest(_)));
    }
}

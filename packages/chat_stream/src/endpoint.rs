//! Connection endpoint with an embedded bearer credential.
//!
//! The WebSocket handshake cannot carry custom headers from a browser, so the
//! server reads the credential from the query string:
//! `ws://host/path?Authorization=Bearer%20<token>`.

use std::fmt;

use crate::error::EndpointError;

const AUTH_PARAM: &str = "Authorization";

#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    /// Byte offset where the credential value starts, for redaction.
    credential_at: usize,
}

impl Endpoint {
    /// Build an endpoint from a `ws://` or `wss://` base and a bearer token.
    pub fn new(base: &str, token: &str) -> Result<Self, EndpointError> {
        let base = base.trim();
        let (scheme, rest) = base
            .split_once("://")
            .ok_or_else(|| EndpointError::UnsupportedScheme(base.to_string()))?;
        if !matches!(scheme, "ws" | "wss") {
            return Err(EndpointError::UnsupportedScheme(scheme.to_string()));
        }

        let host_end = rest.find(['/', '?']).unwrap_or(rest.len());
        if rest[..host_end].is_empty() {
            return Err(EndpointError::MissingHost);
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(EndpointError::MissingCredential);
        }

        let separator = if base.contains('?') { '&' } else { '?' };
        let mut url = format!("{base}{separator}{AUTH_PARAM}=");
        let credential_at = url.len();
        url.push_str(&urlencoding::encode(&format!("Bearer {token}")));

        Ok(Self { url, credential_at })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// The URL with the credential replaced, safe for logs.
    pub fn redacted(&self) -> String {
        format!("{}<redacted>", &self.url[..self.credential_at])
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Endpoint").field(&self.redacted()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_goes_in_query() {
        let ep = Endpoint::new("ws://localhost:8080/ws/chat", "abc123").unwrap();
        assert_eq!(
            ep.as_str(),
            "ws://localhost:8080/ws/chat?Authorization=Bearer%20abc123"
        );
    }

    #[test]
    fn token_is_percent_encoded() {
        let ep = Endpoint::new("wss://chat.example.com/ws", "a+b/c=").unwrap();
        assert_eq!(
            ep.as_str(),
            "wss://chat.example.com/ws?Authorization=Bearer%20a%2Bb%2Fc%3D"
        );
    }

    #[test]
    fn existing_query_is_extended() {
        let ep = Endpoint::new("ws://h/ws/chat?room=7", "t").unwrap();
        assert_eq!(ep.as_str(), "ws://h/ws/chat?room=7&Authorization=Bearer%20t");
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            Endpoint::new("http://h/ws", "t"),
            Err(EndpointError::UnsupportedScheme("http".to_string()))
        );
        assert!(matches!(
            Endpoint::new("localhost:8080/ws", "t"),
            Err(EndpointError::UnsupportedScheme(_))
        ));
        assert_eq!(Endpoint::new("ws:///ws", "t"), Err(EndpointError::MissingHost));
        assert_eq!(
            Endpoint::new("ws://h/ws", "  "),
            Err(EndpointError::MissingCredential)
        );
    }

    #[test]
    fn display_and_debug_redact_token() {
        let ep = Endpoint::new("ws://h/ws", "secret").unwrap();
        assert_eq!(ep.to_string(), "ws://h/ws?Authorization=<redacted>");
        assert!(!format!("{ep:?}").contains("secret"));
    }
}

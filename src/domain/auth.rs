//! Live stream authorization.
//!
//! A publisher announces a URL path (`/live/john`) and a publishing name.
//! The path must match one of the `live` channel patterns, and the
//! publishing name must be the token derived from the channel secret.

use super::pattern::{CompiledPattern, Variables};
use super::stream::{Channels, Stream, StreamType};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Variable carrying the publisher identity in a live channel pattern.
pub const USERNAME_VAR: &str = "username";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("empty publishing name provided")]
    EmptyPublishingName,
    #[error("stream has no live stream key")]
    EmptySecret,
    #[error("invalid authentication token")]
    InvalidToken,
}

/// A live channel matched by [`Authorizer::authorize`].
#[derive(Debug, Clone)]
pub struct LiveMatch {
    /// Channel key the path matched
    pub channel: String,
    pub stream: Stream,
    pub vars: Variables,
}

pub struct Authorizer {
    channels: Arc<Channels>,
}

impl Authorizer {
    pub fn new(channels: Arc<Channels>) -> Self {
        Self { channels }
    }

    /// Returns the first live channel whose pattern matches `url_path`.
    ///
    /// Channels are visited in map order, which is unspecified: configure
    /// patterns that cannot overlap.
    pub fn authorize(&self, url_path: &str) -> Option<LiveMatch> {
        let path = normalize(url_path);

        for (channel, stream) in self.channels.iter() {
            if stream.kind != StreamType::Live {
                continue;
            }
            let pattern = match CompiledPattern::compile(&normalize(channel)) {
                Ok(pattern) => pattern,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Skipping live channel with invalid pattern");
                    continue;
                }
            };
            if let Some(vars) = pattern.matches_exact(&path) {
                debug!(channel = %channel, ?vars, "Live path authorized");
                return Some(LiveMatch {
                    channel: channel.clone(),
                    stream: stream.clone(),
                    vars,
                });
            }
        }
        None
    }
}

/// Checks the publishing token of a live connection.
///
/// The expected token is the hex encoded XOR of `username` with the stream
/// secret repeated to the username's length. Without a username only the
/// presence of a publishing name is checked.
pub fn validate_token(
    stream: &Stream,
    username: Option<&str>,
    publishing_name: &str,
) -> Result<(), AuthError> {
    if publishing_name.is_empty() {
        return Err(AuthError::EmptyPublishingName);
    }

    let Some(username) = username else {
        return Ok(());
    };
    let secret = stream
        .live_stream_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or(AuthError::EmptySecret)?;

    if publishing_name != expected_token(secret, username) {
        return Err(AuthError::InvalidToken);
    }
    Ok(())
}

pub fn expected_token(secret: &str, username: &str) -> String {
    let key = secret.as_bytes();
    let xored: Vec<u8> = username
        .bytes()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    hex::encode(xored)
}

/// Extracts the path of a connection URL (`rtmp://host:1935/live/john` gives
/// `/live/john`). Bare paths are returned with a leading slash.
pub fn url_path(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|idx| &rest[idx..]).unwrap_or("/"),
        None => without_query,
    };
    normalize(path)
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stream::fixtures;
    use std::collections::HashMap;

    fn live_stream(secret: &str) -> Stream {
        let mut stream = fixtures::stream(StreamType::Live, "live/{username}");
        stream.live_stream_key = Some(secret.to_string());
        stream
    }

    fn channels() -> Arc<Channels> {
        Arc::new(HashMap::from([
            ("live/{username}".to_string(), live_stream("s3cr3t")),
            (
                "videos/{name}".to_string(),
                fixtures::stream(StreamType::VideoEncoded, "videos/{name}"),
            ),
        ]))
    }

    #[test]
    fn test_authorize_matches_live_channel() {
        let authorizer = Authorizer::new(channels());
        let matched = authorizer.authorize("/live/john").unwrap();
        assert_eq!(matched.channel, "live/{username}");
        assert_eq!(matched.vars[USERNAME_VAR], "john");
    }

    #[test]
    fn test_authorize_ignores_other_types_and_unknown_paths() {
        let authorizer = Authorizer::new(channels());
        assert!(authorizer.authorize("/videos/movie").is_none());
        assert!(authorizer.authorize("/live").is_none());
        assert!(authorizer.authorize("/live/john/extra").is_none());
    }

    #[test]
    fn test_expected_token_is_hex_xor() {
        // 'a' ^ 'k' = 0x0a, 'b' ^ 'e' = 0x07, 'c' ^ 'k' = 0x08
        assert_eq!(expected_token("ke", "abc"), "0a0708");
    }

    #[test]
    fn test_validate_token() {
        let stream = live_stream("s3cr3t");
        let token = expected_token("s3cr3t", "john");

        assert!(validate_token(&stream, Some("john"), &token).is_ok());
        assert_eq!(
            validate_token(&stream, Some("john"), "deadbeef"),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            validate_token(&stream, Some("jane"), &token),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_validate_token_rejects_empty_publishing_name() {
        let stream = live_stream("s3cr3t");
        assert_eq!(
            validate_token(&stream, Some("john"), ""),
            Err(AuthError::EmptyPublishingName)
        );
        assert_eq!(
            validate_token(&stream, None, ""),
            Err(AuthError::EmptyPublishingName)
        );
    }

    #[test]
    fn test_validate_token_without_secret() {
        let mut stream = live_stream("");
        assert_eq!(
            validate_token(&stream, Some("john"), "abc"),
            Err(AuthError::EmptySecret)
        );
        stream.live_stream_key = None;
        assert!(validate_token(&stream, None, "anything").is_ok());
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("rtmp://localhost:1935/live/john"), "/live/john");
        assert_eq!(url_path("rtmp://localhost"), "/");
        assert_eq!(url_path("live/john/"), "/live/john");
        assert_eq!(url_path("/live/john?x=1"), "/live/john");
    }
}

//! Process configuration read from the environment.
//!
//! Stream definitions come from the YAML file at `CONFIG_PATH`, see
//! [`crate::adapters::yaml`].

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// What happens when a second publisher shows up for a live stream key that
/// already has a running transcoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Feed the running transcoder
    #[default]
    Join,
    /// Refuse the new publisher
    Reject,
}

impl FromStr for ReconnectPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "join" => Ok(ReconnectPolicy::Join),
            "reject" => Ok(ReconnectPolicy::Reject),
            other => Err(format!("unknown reconnect policy: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// HTTP server bind address, the port comes from the YAML file
    pub addr: String,
    /// YAML stream configuration
    pub config_path: String,
    /// Root of every stream input and output
    pub data_dir: String,
    /// Static files served for unknown routes
    pub frontend_dir: String,
    /// Grace period before killing a stopped live transcoder, and again
    /// before removing its directory
    pub live_cleanup_delay: Duration,
    pub reconnect_policy: ReconnectPolicy,
    pub ffmpeg_path: String,
    /// Log transcode commands instead of running them
    pub encoder_dry_run: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("0.0.0.0")),
            config_path: env::var("CONFIG_PATH").unwrap_or_else(|_| String::from("config.yml")),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| String::from("./data")),
            frontend_dir: env::var("FRONTEND_DIR").unwrap_or_else(|_| String::from("./frontend")),
            live_cleanup_delay: Duration::from_secs(
                env::var("LIVE_CLEANUP_DELAY_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            reconnect_policy: env::var("LIVE_RECONNECT_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| String::from("ffmpeg")),
            encoder_dry_run: env::var("ENCODER_DRY_RUN")
                .unwrap_or_else(|_| String::from("false"))
                .parse()
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_policy_parse() {
        assert_eq!("join".parse::<ReconnectPolicy>(), Ok(ReconnectPolicy::Join));
        assert_eq!(" Reject ".parse::<ReconnectPolicy>(), Ok(ReconnectPolicy::Reject));
        assert!("replace".parse::<ReconnectPolicy>().is_err());
        assert_eq!(ReconnectPolicy::default(), ReconnectPolicy::Join);
    }
}

//! Host configuration (spec §6). Values are gathered from CLI flags by
//! `blackhole-host-bin`; this struct is the crate's own notion of config,
//! independent of any particular argument parser.

use crate::error::{HostError, Result};

const DEFAULT_PORT: u16 = 9527;

/// Fully resolved host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub port: u16,
    pub lan_enabled: bool,
    pub relay_url: Option<String>,
    pub relay_token: Option<String>,
    pub shell: Option<String>,
    pub dev_mode: bool,
}

impl HostConfig {
    /// Resolve from explicit CLI overrides plus environment fallbacks, the
    /// way the teacher's binaries layer `clap` flags over env vars.
    ///
    /// - port: `--port`, else `BLACKHOLE_PORT`, else 9527
    /// - lan_enabled: `false` when `--no-lan` is passed
    /// - relay_url / relay_token: `WORMHOLE_URL` / `WORMHOLE_TOKEN`
    /// - dev_mode: `--dev-mode` or `BLACKHOLE_DEV=1`; in release builds
    ///   requires `--confirm-dev-mode` too (spec §6)
    pub fn resolve(
        port_flag: Option<u16>,
        no_lan: bool,
        shell_flag: Option<String>,
        dev_mode_flag: bool,
        confirm_dev_mode: bool,
    ) -> Result<Self> {
        let port = port_flag
            .or_else(|| std::env::var("BLACKHOLE_PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(DEFAULT_PORT);

        let relay_url = std::env::var("WORMHOLE_URL").ok().filter(|s| !s.is_empty());
        let relay_token = std::env::var("WORMHOLE_TOKEN").ok().filter(|s| !s.is_empty());

        let dev_mode = dev_mode_flag || std::env::var("BLACKHOLE_DEV").as_deref() == Ok("1");
        if dev_mode && !cfg!(debug_assertions) && !confirm_dev_mode {
            return Err(HostError::DevModeNotConfirmed);
        }

        Ok(Self {
            port,
            lan_enabled: !no_lan,
            relay_url,
            relay_token,
            shell: shell_flag,
            dev_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_9527() {
        std::env::remove_var("BLACKHOLE_PORT");
        let cfg = HostConfig::resolve(None, false, None, false, false).unwrap();
        assert_eq!(cfg.port, 9527);
    }

    #[test]
    fn explicit_port_wins_over_env() {
        let cfg = HostConfig::resolve(Some(4000), false, None, false, false).unwrap();
        assert_eq!(cfg.port, 4000);
    }

    #[test]
    fn no_lan_disables_listener() {
        let cfg = HostConfig::resolve(None, true, None, false, false).unwrap();
        assert!(!cfg.lan_enabled);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `serve` configuration, assembled from CLI flags.

use std::time::Duration;

/// Runtime configuration for `kaddht-node serve`.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind: String,
    pub advertised: Option<String>,
    pub seeds: Vec<String>,
    pub ttl: Duration,
    pub refresh: Option<Duration>,
}

impl NodeConfig {
    pub fn new(bind: String, advertised: Option<String>, seeds: Vec<String>, ttl_secs: u64, refresh_secs: Option<u64>) -> Self {
        Self {
            bind,
            advertised,
            seeds,
            ttl: Duration::from_secs(ttl_secs),
            refresh: refresh_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_split_from_comma_list() {
        let seeds = "127.0.0.1:9000,127.0.0.1:9001"
            .split(',')
            .map(str::to_string)
            .collect::<Vec<_>>();
        assert_eq!(seeds, vec!["127.0.0.1:9000", "127.0.0.1:9001"]);
    }

    #[test]
    fn config_defaults_have_no_explicit_refresh() {
        let cfg = NodeConfig::new("127.0.0.1:0".into(), None, Vec::new(), 3600, None);
        assert_eq!(cfg.ttl, Duration::from_secs(3600));
        assert!(cfg.refresh.is_none());
    }
}

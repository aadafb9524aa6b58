//! Configuration resolution.

use std::time::Duration;

use meshspider::config::parse_node_port;
use meshspider::{SpiderConfig, SpiderResult};

use crate::cli::ProbeArgs;

/// Environment variable naming the dump file.
pub const DUMP_ENV: &str = "MESHSPIDER_DUMP";

/// Dump file used when neither flag nor environment names one.
pub const DEFAULT_DUMP: &str = "spider-dump.json.gz";

/// Resolve the dump output path.
pub fn resolve_dump_path(explicit: Option<&str>) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }

    if let Ok(env_path) = std::env::var(DUMP_ENV) {
        if !env_path.is_empty() {
            return env_path;
        }
    }

    DEFAULT_DUMP.to_string()
}

/// Build the worker settings from the probe flags.
pub fn spider_config(args: &ProbeArgs) -> SpiderResult<SpiderConfig> {
    let mut config = SpiderConfig {
        pool_size: args.pool_size.max(1),
        node_timeout: Duration::from_secs(args.timeout),
        request_timeout: Duration::from_secs(args.request_timeout),
        retries: args.retries,
        ..Default::default()
    };
    for spec in &args.ip_port {
        let (node, port) = parse_node_port(spec)?;
        config.port_overrides.insert(node, port);
    }
    Ok(config)
}

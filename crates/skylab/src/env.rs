use std::fs;

use anyhow::{Context, bail};
use skylab_client::BuilderId;
use skylab_model::{LeaseCaps, PoolPolicy};

use crate::cli::EndpointArgs;

/// Service endpoints of one deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    pub swarming_service: String,
    pub buildbucket_host: String,
    pub builder: BuilderId,
    pub inventory_host: String,
}

impl Environment {
    pub fn prod() -> Self {
        Self {
            swarming_service: "https://chromeos-swarming.appspot.com/".into(),
            buildbucket_host: "cr-buildbucket.appspot.com".into(),
            builder: BuilderId::default(),
            inventory_host: "ufs.api.cr.dev".into(),
        }
    }

    pub fn dev() -> Self {
        Self {
            swarming_service: "https://chromium-swarm-dev.appspot.com/".into(),
            buildbucket_host: "cr-buildbucket-dev.appspot.com".into(),
            builder: BuilderId::default(),
            inventory_host: "staging.ufs.api.cr.dev".into(),
        }
    }

    /// Base environment with every explicit override applied.
    pub fn resolve(dev: bool, args: &EndpointArgs) -> anyhow::Result<Self> {
        let mut env = if dev { Self::dev() } else { Self::prod() };
        if let Some(s) = &args.swarming_service {
            env.swarming_service = s.clone();
        }
        if let Some(h) = &args.buildbucket_host {
            env.buildbucket_host = h.clone();
        }
        if let Some(b) = &args.builder {
            env.builder = parse_builder(b)?;
        }
        if let Some(h) = &args.inventory_host {
            env.inventory_host = h.clone();
        }
        Ok(env)
    }
}

fn parse_builder(s: &str) -> anyhow::Result<BuilderId> {
    let parts: Vec<&str> = s.split('/').map(str::trim).collect();
    match parts.as_slice() {
        [project, bucket, builder] if parts.iter().all(|p| !p.is_empty()) => Ok(BuilderId {
            project: project.to_string(),
            bucket: bucket.to_string(),
            builder: builder.to_string(),
        }),
        _ => bail!("builder {s:?} must look like project/bucket/builder"),
    }
}

pub fn pool_policy(args: &EndpointArgs) -> PoolPolicy {
    let mut policy = PoolPolicy::default();
    if let Some(pool) = &args.pool {
        policy.skylab_pool = pool.clone();
    }
    policy
}

pub fn lease_caps(args: &EndpointArgs) -> LeaseCaps {
    let mut caps = LeaseCaps::default();
    if let Some(cap) = args.model_cap {
        caps.model = cap;
    }
    if let Some(cap) = args.board_cap {
        caps.board = cap;
    }
    caps
}

/// Bearer token from `--token`, else from `--token-file`; none means anonymous.
pub fn load_token(args: &EndpointArgs) -> anyhow::Result<Option<String>> {
    if let Some(token) = &args.token {
        return Ok(Some(token.trim().to_string()));
    }
    let Some(path) = &args.token_file else {
        return Ok(None);
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read token file {}", path.display()))?;
    let token = raw.trim();
    if token.is_empty() {
        bail!("token file {} is empty", path.display());
    }
    Ok(Some(token.to_string()))
}

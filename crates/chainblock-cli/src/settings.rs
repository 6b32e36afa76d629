use anyhow::Context;
use chainblock_core::{Actor, ActorPool, ActorProfile, Config};
use graph_client::{Credentials, HttpGraphClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolve the config file location.
///
/// Priority:
/// 1. `--config` flag / `CHAINBLOCK_CONFIG` env var (passed in as `explicit`)
/// 2. `~/.chainblock/config.yaml`
/// 3. `./chainblock.yaml` when no home directory is known
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    match home::home_dir() {
        Some(home) => home.join(".chainblock").join("config.yaml"),
        None => PathBuf::from("chainblock.yaml"),
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config from {}", path.display()))
}

fn client_for(config: &Config, profile: &ActorProfile) -> anyhow::Result<HttpGraphClient> {
    let credentials = Credentials {
        bearer_token: config.api.bearer_token.clone(),
        csrf_token: profile.csrf_token.clone(),
        auth_token: profile.auth_token.clone(),
    };
    Ok(HttpGraphClient::new(&credentials, config.client_options())?)
}

/// Log in every configured profile. The primary must succeed; any other
/// profile that fails is left out of the pool.
pub async fn connect(config: &Config) -> anyhow::Result<(Actor, ActorPool)> {
    let primary_name = config.primary_profile()?.name.clone();
    let mut primary = None;
    let mut actors = Vec::with_capacity(config.actors.len());

    for profile in &config.actors {
        let attempt = async {
            let client = client_for(config, profile)?;
            Ok::<_, anyhow::Error>(Actor::connect(Arc::new(client)).await?)
        };
        match attempt.await {
            Ok(actor) => {
                debug!(profile = %profile.name, screen_name = %actor.user.screen_name, "actor connected");
                if profile.name == primary_name && primary.is_none() {
                    primary = Some(actor.clone());
                }
                actors.push(actor);
            }
            Err(e) if profile.name == primary_name => {
                return Err(e.context(format!("failed to connect primary actor '{}'", profile.name)));
            }
            Err(e) => warn!(profile = %profile.name, error = %e, "actor unavailable, skipping"),
        }
    }

    let primary = primary.context("primary actor not connected")?;
    Ok((primary, ActorPool::new(actors)))
}

/// Starting point written by `config init`.
pub fn config_template() -> Config {
    Config {
        actors: vec![ActorProfile {
            name: "main".into(),
            csrf_token: String::new(),
            auth_token: String::new(),
        }],
        ..Config::default()
    }
}

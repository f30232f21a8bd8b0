use super::args::*;
use anyhow::{Context, Result};
use asice::{AsicConfig, AsicConfigOverrides, Ed25519Verifier};
use std::fs;

pub mod combine;
pub mod create;
pub mod extract;
pub mod keygen;
pub mod verify;

use crate::trust::TrustPolicy;

pub fn dispatch(cli: Cli) -> Result<i32> {
    match cli.cmd {
        Command::Create(args) => create::run(args),
        Command::Verify(args) => verify::run(args),
        Command::Extract(args) => extract::run(args),
        Command::Combine(args) => combine::run(args),
        Command::Keygen(args) => keygen::run(args),
    }
}

/// Defaults, then the `--config` file, then explicit flags.
pub(crate) fn load_settings(args: &ConfigArgs) -> Result<AsicConfig> {
    let mut config = AsicConfig::default();
    if let Some(path) = &args.config {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let overrides: AsicConfigOverrides = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        config = config.apply(overrides);
    }
    if let Some(algorithm) = args.digest {
        config = config.with_digest_algorithm(algorithm);
    }
    tracing::debug!(?config, "effective container settings");
    Ok(config)
}

pub(crate) fn load_verifier(args: &TrustArgs) -> Result<Ed25519Verifier> {
    let policy = match &args.trust {
        Some(path) => TrustPolicy::from_file(path)?,
        None => TrustPolicy::from_public_keys(&args.pubkey)?,
    };
    policy.verifier()
}

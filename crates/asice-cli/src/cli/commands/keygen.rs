//! `asice keygen` - Generate an ed25519 signing keypair for containers.
//!
//! With `--policy` the public key is also registered in a trust policy, so a
//! freshly generated key can be used with `verify --trust` right away.

use anyhow::{Context, Result};
use asice::signing::compute_key_id_from_verifying_key;
use ed25519_dalek::SigningKey;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::cli::args::KeygenArgs;
use crate::exit_codes;
use crate::trust::{TrustPolicy, TrustedKey};

const PRIVATE_KEY_FILE: &str = "private_key.pem";
const PUBLIC_KEY_FILE: &str = "public_key.pem";

pub fn run(args: KeygenArgs) -> Result<i32> {
    use pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    fs::create_dir_all(&args.out)
        .with_context(|| format!("cannot create key directory {}", args.out.display()))?;
    let private_path = args.out.join(PRIVATE_KEY_FILE);
    let public_path = args.out.join(PUBLIC_KEY_FILE);
    if !args.force {
        if let Some(taken) = [&private_path, &public_path].into_iter().find(|p| p.exists()) {
            anyhow::bail!(
                "refusing to replace signing key {} (pass --force)",
                taken.display()
            );
        }
    }

    let signing_key = SigningKey::generate(&mut rand::thread_rng());
    let verifying_key = signing_key.verifying_key();
    let key_id = compute_key_id_from_verifying_key(&verifying_key)?;

    let private_pem = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .context("PKCS#8 encoding of the signing key failed")?;
    write_private(&private_path, private_pem.as_bytes())?;
    let public_pem = verifying_key
        .to_public_key_pem(LineEnding::LF)
        .context("SPKI encoding of the verifying key failed")?;
    fs::write(&public_path, public_pem)
        .with_context(|| format!("cannot write {}", public_path.display()))?;

    tracing::info!(key_id = %key_id, dir = %args.out.display(), "signing keypair generated");
    println!("Signing key:   {}", private_path.display());
    println!("Verifying key: {}", public_path.display());
    println!("key_id: {key_id}");

    if let Some(policy_path) = &args.policy {
        let mut policy = TrustPolicy::load_or_default(policy_path)?;
        let added = policy.add_key(TrustedKey {
            key_id: key_id.clone(),
            public_key_path: Some(absolute(&public_path)?),
            name: args.name.clone(),
        });
        policy.write_file(policy_path)?;
        let verb = if added { "Registered" } else { "Updated" };
        println!("{verb} {key_id} in trust policy {}", policy_path.display());
    }

    Ok(exit_codes::SUCCESS)
}

/// Write the signing key readable by the owner only.
fn write_private(path: &Path, pem: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        if path.exists() {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("cannot restrict {}", path.display()))?;
        }
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    file.write_all(pem)
        .with_context(|| format!("cannot write {}", path.display()))
}

fn absolute(path: &Path) -> Result<std::path::PathBuf> {
    fs::canonicalize(path).with_context(|| format!("cannot resolve {}", path.display()))
}

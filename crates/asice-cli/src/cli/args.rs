use asice::{DialectKind, DigestAlgorithm};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "asice",
    version,
    about = "Create, verify, extract and combine ASiC-E signed containers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build and sign a container from files
    Create(CreateArgs),
    /// Verify every entry and signature of a container
    Verify(VerifyArgs),
    /// Verify a container and write its content entries to a directory
    Extract(ExtractArgs),
    /// Merge signed containers into one
    Combine(CombineArgs),
    /// Generate an ed25519 keypair for signing
    Keygen(KeygenArgs),
}

/// Settings shared by every command that opens or writes containers.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// YAML or JSON file with container settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Content digest algorithm (sha256, sha384, sha512)
    #[arg(long)]
    pub digest: Option<DigestAlgorithm>,
}

/// Which keys to trust when verifying.
#[derive(Args, Debug, Clone, Default)]
pub struct TrustArgs {
    /// Trust policy YAML (trusted_key_ids / trusted_keys)
    #[arg(long, conflicts_with = "pubkey")]
    pub trust: Option<PathBuf>,

    /// Trust the given SPKI PEM public key (repeatable)
    #[arg(long)]
    pub pubkey: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Output container path
    #[arg(long, short)]
    pub out: PathBuf,

    /// Private signing key (PKCS#8 PEM)
    #[arg(long)]
    pub key: PathBuf,

    /// Subject recorded for the signer
    #[arg(long, default_value = "CN=asice")]
    pub subject: String,

    /// Manifest dialect (detached/cades, inline/xades)
    #[arg(long)]
    pub dialect: Option<DialectKind>,

    /// Entry to mark as the root file (detached dialect only)
    #[arg(long)]
    pub root: Option<String>,

    #[command(flatten)]
    pub settings: ConfigArgs,

    /// Files to add, as PATH or NAME=PATH
    #[arg(required = true)]
    pub files: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Container to verify
    pub container: PathBuf,

    #[command(flatten)]
    pub trust: TrustArgs,

    #[command(flatten)]
    pub settings: ConfigArgs,

    /// Print the verification report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Container to extract
    pub container: PathBuf,

    /// Destination directory
    #[arg(long, short)]
    pub out: PathBuf,

    /// Overwrite existing files
    #[arg(long, short)]
    pub force: bool,

    #[command(flatten)]
    pub trust: TrustArgs,

    #[command(flatten)]
    pub settings: ConfigArgs,
}

#[derive(Args, Debug)]
pub struct CombineArgs {
    /// Output container path
    #[arg(long, short)]
    pub out: PathBuf,

    #[command(flatten)]
    pub settings: ConfigArgs,

    /// Containers to merge, in order
    #[arg(required = true, num_args = 2..)]
    pub sources: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Directory for private_key.pem and public_key.pem
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Replace an existing keypair in the output directory
    #[arg(long, short)]
    pub force: bool,

    /// Trust policy to register the new public key in (created if missing)
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<PathBuf>,

    /// Label recorded for the key in the trust policy
    #[arg(long, requires = "policy")]
    pub name: Option<String>,
}

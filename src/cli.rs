//! # Command Line Interface
//!
//! Operator tooling: generate wrapping keys, seal credential payloads into the
//! stored record format and inspect sealed records.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::DataSourceConfig;
use crate::domain::{CipherRecord, Credential, KeyContext};
use crate::services::credential_vault::{CredentialVault, WrappingKey};

#[derive(Parser, Debug)]
#[command(name = "datasource-broker")]
#[command(about = "Data source credential tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file (defaults to DATA_SOURCE_* environment variables)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a new random wrapping key
    Keygen {
        /// Key name
        #[arg(long, default_value = "data-source-wrapping-key")]
        name: String,

        /// Key namespace
        #[arg(long, default_value = "default")]
        namespace: String,
    },

    /// Seal a credential JSON payload with the configured wrapping key
    Seal {
        /// Credential record name
        #[arg(long)]
        name: String,

        /// Credential record namespace
        #[arg(long)]
        namespace: String,

        /// File holding the credential JSON ("-" or absent for stdin)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Open a sealed credential record and describe it
    Open {
        /// File holding the sealed record JSON ("-" or absent for stdin)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Print secret values instead of redacting them
        #[arg(long)]
        reveal: bool,
    },
}

/// Sealed record as printed by `seal` and read by `open`
#[derive(Debug, Serialize, Deserialize)]
pub struct SealedCredential {
    pub name: String,
    pub namespace: String,
    pub cipher: CipherRecord,
}

/// Run a parsed command, writing results to stdout.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Keygen { name, namespace } => {
            let key = WrappingKey::generate(&name, &namespace)?;
            println!("DATA_SOURCE_WRAPPING_KEY_NAME={}", name);
            println!("DATA_SOURCE_WRAPPING_KEY_NAMESPACE={}", namespace);
            println!("DATA_SOURCE_WRAPPING_KEY={}", key.to_base64().as_str());
            Ok(())
        }
        Commands::Seal { name, namespace, input } => {
            let vault = load_vault(cli.config.as_deref())?;
            let payload = zeroize::Zeroizing::new(read_input(input.as_deref())?);
            let sealed = seal(&vault, &name, &namespace, &payload)?;
            println!("{}", serde_json::to_string_pretty(&sealed)?);
            Ok(())
        }
        Commands::Open { input, reveal } => {
            let vault = load_vault(cli.config.as_deref())?;
            let document = read_input(input.as_deref())?;
            let sealed: SealedCredential =
                serde_json::from_str(&document).context("Input is not a sealed credential record")?;
            println!("{}", describe(&vault, &sealed, reveal)?);
            Ok(())
        }
    }
}

fn load_vault(config_path: Option<&Path>) -> anyhow::Result<CredentialVault> {
    let config = match config_path {
        Some(path) => DataSourceConfig::from_toml_file(path)?,
        None => DataSourceConfig::from_env()?,
    };
    let key = config.wrapping_key.load().context("Failed to load wrapping key")?;
    Ok(CredentialVault::new(key))
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer).context("Failed to read stdin")?;
            Ok(buffer)
        }
    }
}

/// Seal a credential JSON payload under `name`/`namespace`.
pub fn seal(
    vault: &CredentialVault,
    name: &str,
    namespace: &str,
    payload: &str,
) -> anyhow::Result<SealedCredential> {
    let credential: Credential = match serde_json::from_str(payload) {
        Ok(credential) => credential,
        Err(e) => bail!("Credential payload is malformed: {:?} error at line {}", e.classify(), e.line()),
    };
    let cipher = vault.encrypt_credential(&credential, &KeyContext::new(name, namespace))?;
    Ok(SealedCredential { name: name.to_string(), namespace: namespace.to_string(), cipher })
}

/// Human-readable description of a sealed record. Secrets are redacted unless
/// `reveal` is set.
pub fn describe(
    vault: &CredentialVault,
    sealed: &SealedCredential,
    reveal: bool,
) -> anyhow::Result<String> {
    let context = KeyContext::new(&sealed.name, &sealed.namespace);
    let credential = vault.decrypt_credential(&sealed.cipher, &context)?;

    let mut lines = vec![
        format!("record:       {}", context),
        format!("wrapping key: {}", sealed.cipher.wrapping_key),
        format!("version:      {}", sealed.cipher.version()),
        format!("scheme:       {}", credential.scheme()),
    ];
    match &credential {
        Credential::NoAuth => {}
        Credential::UsernamePassword { username, password } => {
            lines.push(format!("username:     {}", username));
            lines.push(format!("password:     {}", secret(password.expose_secret(), reveal)));
        }
        Credential::ApiKey { api_key } => {
            lines.push(format!("api key:      {}", secret(api_key.expose_secret(), reveal)));
        }
    }
    Ok(lines.join("\n"))
}

fn secret(value: &str, reveal: bool) -> String {
    if reveal {
        value.to_string()
    } else {
        "[REDACTED]".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::new(WrappingKey::new("primary", "default", [8u8; 32]))
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["datasource-broker", "keygen", "--name", "k1"]).unwrap();
        assert!(matches!(cli.command, Commands::Keygen { ref name, .. } if name == "k1"));

        let cli = Cli::try_parse_from([
            "datasource-broker",
            "seal",
            "--name",
            "logs",
            "--namespace",
            "tenant-a",
            "--config",
            "broker.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("broker.toml")));
    }

    #[test]
    fn test_seal_then_describe_redacts_by_default() {
        let vault = vault();
        let sealed = seal(
            &vault,
            "logs",
            "tenant-a",
            r#"{"scheme":"username_password","user":"admin","pass":"hunter2"}"#,
        )
        .unwrap();

        let json = serde_json::to_string(&sealed).unwrap();
        assert!(!json.contains("hunter2"));

        let redacted = describe(&vault, &sealed, false).unwrap();
        assert!(redacted.contains("username:     admin"));
        assert!(!redacted.contains("hunter2"));

        let revealed = describe(&vault, &sealed, true).unwrap();
        assert!(revealed.contains("hunter2"));
    }

    #[test]
    fn test_seal_rejects_malformed_payload_without_echoing_it() {
        let err = seal(&vault(), "n", "ns", r#"{"scheme":"api_key","token":"abc-secret"}"#)
            .unwrap_err();
        assert!(!err.to_string().contains("abc-secret"));
    }

    #[test]
    fn test_describe_with_wrong_context_fails() {
        let vault = vault();
        let mut sealed =
            seal(&vault, "logs", "tenant-a", r#"{"scheme":"api_key","api_key":"k"}"#).unwrap();
        sealed.name = "other".to_string();
        assert!(describe(&vault, &sealed, false).is_err());
    }
}

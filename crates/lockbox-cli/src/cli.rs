use clap::{Args, Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "lockbox",
    about = "Provision and manage encrypted key-value stores",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to a health check when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Provision a throwaway in-memory store and round-trip an entry.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print a raw store key, derived from a seed or random.
    GenerateKey {
        /// Seed of at least 32 bytes; omit for a random key.
        #[arg(long)]
        seed: Option<String>,
    },
    /// Create a store, optionally replacing an existing one.
    Provision {
        #[command(flatten)]
        target: StoreTarget,
        /// Key derivation method: raw, kdf:argon2i[:mod|:int] or none.
        #[arg(long)]
        method: Option<String>,
        /// Destroy any store already at the URI.
        #[arg(long)]
        recreate: bool,
    },
    /// Open a store to verify the key, optionally counting a category.
    Open {
        #[command(flatten)]
        target: StoreTarget,
        #[arg(long)]
        category: Option<String>,
    },
    /// Re-wrap a store's key under a new pass key.
    Rekey {
        #[command(flatten)]
        target: StoreTarget,
        #[arg(long)]
        new_method: Option<String>,
        #[arg(long)]
        new_key: String,
    },
    /// Delete a store.
    Remove {
        #[arg(long)]
        uri: Option<String>,
    },
    /// URL-safe base64 of a string.
    Encode { text: String },
}

/// Location and pass key shared by store commands.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct StoreTarget {
    /// Store URI; falls back to the configured one.
    #[arg(long)]
    pub uri: Option<String>,
    /// Pass key; falls back to LOCKBOX_PASS_KEY.
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_health_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["lockbox"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_health_subcommand() {
        let cli = Cli::try_parse_from(["lockbox", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Health));
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["lockbox", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }

    #[test]
    fn parses_provision_flags() {
        let cli = Cli::try_parse_from([
            "lockbox",
            "provision",
            "--uri",
            "sqlite:///tmp/w.db",
            "--method",
            "raw",
            "--recreate",
        ])
        .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Provision {
                target: StoreTarget {
                    uri: Some("sqlite:///tmp/w.db".into()),
                    key: None,
                },
                method: Some("raw".into()),
                recreate: true,
            })
        );
    }

    #[test]
    fn parses_generate_key_seed() {
        let cli = Cli::try_parse_from(["lockbox", "generate-key", "--seed", "abc"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::GenerateKey {
                seed: Some("abc".into())
            })
        );
    }
}

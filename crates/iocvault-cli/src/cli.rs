//! CLI argument definitions for iocvault.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// iocvault -- encrypted threat-intel credentials and IOC lookups.
#[derive(Parser)]
#[command(
    name = "iocvault",
    version,
    about = "iocvault -- encrypted threat-intel credentials and IOC lookups",
    long_about = "Stores VirusTotal, AbuseIPDB and AlienVault OTX API keys encrypted at rest \
                  and dispatches indicator lookups with them."
)]
pub struct Cli {
    /// Configuration file (default: config/default.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage provider integrations.
    Integration {
        #[command(subcommand)]
        action: IntegrationAction,
    },

    /// Look up an indicator with one provider.
    Lookup {
        #[command(flatten)]
        owner: Owner,
        /// virustotal, abuseipdb or alienvault.
        #[arg(long)]
        provider: String,
        /// ip, domain, hash or url.
        #[arg(long)]
        kind: String,
        /// The indicator value.
        #[arg(long)]
        value: String,
        /// Integration to use; defaults to the provider default.
        #[arg(long)]
        integration: Option<String>,
    },

    /// Report an abusive IP to AbuseIPDB.
    Report {
        #[command(flatten)]
        owner: Owner,
        #[arg(long)]
        ip: String,
        /// Abuse category ids, comma-separated (e.g. 18,22).
        #[arg(long, value_delimiter = ',')]
        categories: Vec<u32>,
        #[arg(long)]
        comment: String,
        /// Integration to use; defaults to the AbuseIPDB default.
        #[arg(long)]
        integration: Option<String>,
    },

    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Show configuration status and run the encryption self-test.
    Doctor,
}

/// The user every command acts on behalf of.
#[derive(Args, Debug, Clone)]
pub struct Owner {
    #[arg(long)]
    pub user: String,
}

/// Actions for managing integrations.
#[derive(Subcommand)]
pub enum IntegrationAction {
    /// Store a new integration.
    Add {
        #[command(flatten)]
        owner: Owner,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        api_key: String,
        /// Make this the provider default.
        #[arg(long)]
        default: bool,
        /// Provider-specific settings as a JSON document.
        #[arg(long)]
        configuration: Option<String>,
    },
    /// List integrations, newest first.
    List {
        #[command(flatten)]
        owner: Owner,
        /// Only these providers (repeatable).
        #[arg(long)]
        provider: Vec<String>,
        /// Only these states: active, inactive (repeatable).
        #[arg(long)]
        status: Vec<String>,
        /// Case-insensitive match on name or provider.
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one integration.
    Show {
        #[command(flatten)]
        owner: Owner,
        #[arg(long)]
        id: String,
    },
    /// Change fields of an integration.
    Update {
        #[command(flatten)]
        owner: Owner,
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        default: Option<bool>,
        #[arg(long)]
        configuration: Option<String>,
    },
    /// Flip an integration between active and inactive.
    Toggle {
        #[command(flatten)]
        owner: Owner,
        #[arg(long)]
        id: String,
    },
    /// Delete an integration.
    Delete {
        #[command(flatten)]
        owner: Owner,
        #[arg(long)]
        id: String,
    },
    /// Print the decrypted API key.
    Reveal {
        #[command(flatten)]
        owner: Owner,
        #[arg(long)]
        id: String,
    },
    /// Show whether a provider has a usable integration.
    Status {
        #[command(flatten)]
        owner: Owner,
        #[arg(long)]
        provider: String,
    },
}

/// Actions for managing users.
#[derive(Subcommand)]
pub enum UserAction {
    /// Delete a user and all of their integrations.
    Delete {
        #[command(flatten)]
        owner: Owner,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn report_categories_split_on_commas() {
        let cli = Cli::try_parse_from([
            "iocvault", "report", "--user", "u1", "--ip", "1.2.3.4", "--categories", "18,22",
            "--comment", "ssh brute force",
        ])
        .unwrap();

        match cli.command {
            Commands::Report { categories, owner, .. } => {
                assert_eq!(categories, [18, 22]);
                assert_eq!(owner.user, "u1");
            }
            _ => panic!("expected report"),
        }
    }

    #[test]
    fn update_flags_are_optional_values() {
        let cli = Cli::try_parse_from([
            "iocvault", "integration", "update", "--user", "u1", "--id", "i1", "--active", "false",
        ])
        .unwrap();

        match cli.command {
            Commands::Integration {
                action: IntegrationAction::Update { active, default, name, .. },
            } => {
                assert_eq!(active, Some(false));
                assert_eq!(default, None);
                assert_eq!(name, None);
            }
            _ => panic!("expected integration update"),
        }
    }

    #[test]
    fn user_is_required() {
        assert!(Cli::try_parse_from(["iocvault", "integration", "list"]).is_err());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["iocvault", "doctor", "--config", "/tmp/x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
    }
}

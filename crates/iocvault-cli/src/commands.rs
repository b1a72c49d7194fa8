//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use iocvault_providers::{IocKind, ProviderKind, ProviderResponse, Providers};
use iocvault_store::{Database, UserStore};
use iocvault_vault::{
    Encryptor, IntegrationDirectory, IntegrationPatch, IntegrationStatus, ListFilter,
    NewIntegration,
};
use serde_json::json;
use tracing::{info, warn};

use crate::cli::{Commands, IntegrationAction, Owner, UserAction};
use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::helpers::{parse_configuration, print_json};

// ---------------------------------------------------------------------------
// Application context
// ---------------------------------------------------------------------------

/// Everything a command needs, built once from the configuration.
pub struct App {
    pub directory: Arc<IntegrationDirectory>,
    pub users: UserStore,
    pub providers: Providers,
}

impl App {
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let secret = config.encryption_secret()?;
        let encryptor =
            Encryptor::from_secret(secret).context("failed to derive the encryption key")?;
        if !encryptor.self_test() {
            bail!("encryption self-test failed");
        }

        let path = &config.database.path;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let db = Database::open_and_migrate(path.clone())
            .await
            .context("failed to open database")?;
        info!(path = %path.display(), "store initialized");

        let directory = Arc::new(IntegrationDirectory::new(db.clone(), Arc::new(encryptor)));
        let providers = Providers::new(&config.providers, directory.clone())
            .context("failed to build provider clients")?;

        Ok(Self {
            directory,
            users: UserStore::new(db),
            providers,
        })
    }
}

/// Run one command. Everything except `doctor` opens the vault first, so a
/// missing or broken encryption key stops it before any work is done.
pub async fn run(config: &AppConfig, config_path: Option<&Path>, command: Commands) -> Result<()> {
    match command {
        Commands::Doctor => doctor(config, config_path),
        Commands::Integration { action } => integration(&App::open(config).await?, action).await,
        Commands::Lookup {
            owner,
            provider,
            kind,
            value,
            integration,
        } => {
            let app = App::open(config).await?;
            lookup(&app, &owner, &provider, &kind, &value, integration.as_deref()).await
        }
        Commands::Report {
            owner,
            ip,
            categories,
            comment,
            integration,
        } => {
            let app = App::open(config).await?;
            report(&app, &owner, &ip, &categories, &comment, integration.as_deref()).await
        }
        Commands::User { action } => user(&App::open(config).await?, action).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: integration
// ---------------------------------------------------------------------------

async fn integration(app: &App, action: IntegrationAction) -> Result<()> {
    let dir = &app.directory;
    match action {
        IntegrationAction::Add {
            owner,
            provider,
            name,
            api_key,
            default,
            configuration,
        } => {
            let provider: ProviderKind = provider.parse()?;
            let mut new = NewIntegration::new(provider.as_str(), &name, &api_key);
            new.is_default = default;
            new.configuration = parse_configuration(configuration.as_deref())?;

            let created = dir.create(&owner.user, new).await?;
            print_json(&created)
        }
        IntegrationAction::List {
            owner,
            provider,
            status,
            search,
        } => {
            let providers = provider
                .iter()
                .map(|p| p.parse::<ProviderKind>().map(|k| k.as_str().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            let statuses = status
                .iter()
                .map(|s| s.parse())
                .collect::<Result<Vec<_>, _>>()?;
            let filter = ListFilter {
                providers,
                statuses,
                search,
            };
            print_json(&dir.list(&owner.user, &filter).await?)
        }
        IntegrationAction::Show { owner, id } => {
            print_json(&dir.get_record(&id, &owner.user).await?)
        }
        IntegrationAction::Update {
            owner,
            id,
            name,
            api_key,
            active,
            default,
            configuration,
        } => {
            let patch = IntegrationPatch {
                name,
                api_key,
                is_active: active,
                is_default: default,
                configuration: parse_configuration(configuration.as_deref())?,
            };
            print_json(&dir.update(&id, &owner.user, patch).await?)
        }
        IntegrationAction::Toggle { owner, id } => {
            print_json(&dir.toggle_active(&id, &owner.user).await?)
        }
        IntegrationAction::Delete { owner, id } => {
            dir.delete(&id, &owner.user).await?;
            print_json(&json!({ "id": id, "deleted": true }))
        }
        IntegrationAction::Reveal { owner, id } => {
            warn!(integration_id = %id, "revealing decrypted API key");
            print_json(&dir.get_decrypted_api_key_with_details(&id, &owner.user).await?)
        }
        IntegrationAction::Status { owner, provider } => {
            let provider: ProviderKind = provider.parse()?;
            let status = dir
                .status(provider.as_str(), &owner.user)
                .await?
                .unwrap_or_else(|| IntegrationStatus {
                    provider: provider.as_str().to_string(),
                    is_active: false,
                    has_api_key: false,
                });
            print_json(&status)
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommands: lookup, report
// ---------------------------------------------------------------------------

async fn lookup(
    app: &App,
    owner: &Owner,
    provider: &str,
    kind: &str,
    value: &str,
    pinned: Option<&str>,
) -> Result<()> {
    let provider: ProviderKind = provider.parse()?;
    let kind: IocKind = kind.parse()?;

    let outcome = async {
        let id = app
            .providers
            .resolve_integration(provider, &owner.user, pinned)
            .await?;
        app.providers
            .lookup(provider, kind, value, &id, &owner.user)
            .await
    }
    .await;

    finish(provider, outcome)
}

async fn report(
    app: &App,
    owner: &Owner,
    ip: &str,
    categories: &[u32],
    comment: &str,
    pinned: Option<&str>,
) -> Result<()> {
    let provider = ProviderKind::AbuseIpdb;

    let outcome = async {
        let id = app
            .providers
            .resolve_integration(provider, &owner.user, pinned)
            .await?;
        app.providers
            .abuseipdb()
            .report_ip(ip, categories, comment, &id, &owner.user)
            .await
    }
    .await;

    finish(provider, outcome)
}

/// Print the envelope for both outcomes; a failure still exits non-zero.
fn finish(
    provider: ProviderKind,
    outcome: iocvault_providers::Result<ProviderResponse>,
) -> Result<()> {
    match outcome {
        Ok(response) => print_json(&response),
        Err(err) => {
            print_json(&ProviderResponse::failure(provider, &err))?;
            Err(err).context(format!("{provider} dispatch failed"))
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand: user
// ---------------------------------------------------------------------------

async fn user(app: &App, action: UserAction) -> Result<()> {
    match action {
        UserAction::Delete { owner } => {
            let removed = app.users.delete(&owner.user).await?;
            info!(user_id = %owner.user, removed, "user deleted");
            print_json(&json!({
                "userId": owner.user,
                "integrationsDeleted": removed,
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand: doctor
// ---------------------------------------------------------------------------

/// Report configuration and run the encryption self-test. Fails when the
/// vault could not operate.
fn doctor(config: &AppConfig, config_path: Option<&Path>) -> Result<()> {
    let secret = config.encryption_secret().ok();
    let self_test = match secret {
        Some(secret) => Some(Encryptor::from_secret(secret).is_ok_and(|e| e.self_test())),
        None => None,
    };

    let providers: serde_json::Map<String, serde_json::Value> = ProviderKind::ALL
        .into_iter()
        .map(|kind| {
            let settings = match kind {
                ProviderKind::VirusTotal => &config.providers.virustotal,
                ProviderKind::AbuseIpdb => &config.providers.abuseipdb,
                ProviderKind::AlienVault => &config.providers.alienvault,
            };
            let base_url = settings
                .base_url
                .as_deref()
                .unwrap_or(kind.default_base_url());
            (
                kind.as_str().to_string(),
                json!({ "baseUrl": base_url, "timeoutSecs": settings.timeout_secs }),
            )
        })
        .collect();

    let config_file = config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    print_json(&json!({
        "version": env!("CARGO_PKG_VERSION"),
        "configFile": config_file,
        "database": {
            "path": config.database.path.display().to_string(),
            "exists": config.database.path.exists(),
        },
        "log": { "level": config.log.level, "json": config.log.json },
        "encryptionKeyConfigured": secret.is_some(),
        "encryptionSelfTest": self_test,
        "providers": providers,
    }))?;

    match self_test {
        None => config.encryption_secret().map(|_| ()),
        Some(false) => bail!("encryption self-test failed"),
        Some(true) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn config_in(dir: &Path, key: Option<&str>) -> AppConfig {
        let mut config = AppConfig::default();
        config.database.path = dir.join("data").join("iocvault.db");
        config.security.encryption_key = key.map(str::to_string);
        config
    }

    fn command(args: &[&str]) -> Commands {
        let mut argv = vec!["iocvault"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[tokio::test]
    async fn vault_commands_require_a_key() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path(), None);

        let err = run(&config, None, command(&["integration", "list", "--user", "u1"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no encryption key configured"));
        assert!(!config.database.path.exists());
    }

    #[tokio::test]
    async fn doctor_runs_without_opening_the_vault() {
        let tmp = tempfile::tempdir().unwrap();

        let missing = config_in(tmp.path(), None);
        assert!(run(&missing, None, command(&["doctor"])).await.is_err());

        let configured = config_in(tmp.path(), Some("doctor-secret"));
        run(&configured, None, command(&["doctor"])).await.unwrap();
        assert!(!configured.database.path.exists());
    }

    #[tokio::test]
    async fn integration_commands_open_and_migrate_the_store() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path(), Some("cli-secret"));

        run(
            &config,
            None,
            command(&[
                "integration", "add", "--user", "u1", "--provider", "virustotal", "--name",
                "main", "--api-key", "vt-key",
            ]),
        )
        .await
        .unwrap();
        assert!(config.database.path.exists());

        let app = App::open(&config).await.unwrap();
        let listed = app.directory.list("u1", &ListFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].provider, "virustotal");
    }
}

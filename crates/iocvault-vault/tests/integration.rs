//! Integration tests for the iocvault-vault crate.
//!
//! These tests exercise the directory end to end: default selection,
//! fallback, user scoping, listing filters and cascade on user deletion.

use std::sync::Arc;

use iocvault_store::{Database, UserStore};
use iocvault_vault::{
    ActiveStatus, Encryptor, IntegrationDirectory, IntegrationPatch, ListFilter, NewIntegration,
    VaultError,
};

async fn test_directory() -> (IntegrationDirectory, Database) {
    let db = Database::in_memory_migrated().await.unwrap();
    let encryptor = Arc::new(Encryptor::from_secret("integration-test-secret").unwrap());
    (IntegrationDirectory::new(db.clone(), encryptor), db)
}

// ═══════════════════════════════════════════════════════════════════════
//  Default selection
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn second_default_replaces_first() {
    let (dir, _) = test_directory().await;

    let first = dir
        .create("u1", NewIntegration::new("virustotal", "first", "K1").as_default())
        .await
        .unwrap();
    assert_eq!(dir.get_decrypted_api_key(&first.id, "u1").await.unwrap(), "K1");

    let resolved = dir
        .get_default_or_fallback("virustotal", "u1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.integration.id, first.id);
    assert_eq!(resolved.api_key, "K1");

    let second = dir
        .create("u1", NewIntegration::new("virustotal", "second", "K2").as_default())
        .await
        .unwrap();

    let first = dir.get_by_id(&first.id, "u1").await.unwrap();
    assert!(!first.is_default);

    let resolved = dir
        .get_default_or_fallback("virustotal", "u1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.integration.id, second.id);
    assert_eq!(resolved.api_key, "K2");
}

#[tokio::test]
async fn update_to_default_clears_siblings() {
    let (dir, _) = test_directory().await;

    let a = dir
        .create("u1", NewIntegration::new("abuseipdb", "a", "ka").as_default())
        .await
        .unwrap();
    let b = dir
        .create("u1", NewIntegration::new("abuseipdb", "b", "kb"))
        .await
        .unwrap();
    // Another provider's default is independent.
    let other = dir
        .create("u1", NewIntegration::new("virustotal", "vt", "kv").as_default())
        .await
        .unwrap();

    let patch = IntegrationPatch {
        is_default: Some(true),
        ..IntegrationPatch::default()
    };
    dir.update(&b.id, "u1", patch).await.unwrap();

    assert!(!dir.get_by_id(&a.id, "u1").await.unwrap().is_default);
    assert!(dir.get_by_id(&b.id, "u1").await.unwrap().is_default);
    assert!(dir.get_by_id(&other.id, "u1").await.unwrap().is_default);

    let defaults = dir
        .list("u1", &ListFilter::default())
        .await
        .unwrap()
        .into_iter()
        .filter(|i| i.provider == "abuseipdb" && i.is_default)
        .count();
    assert_eq!(defaults, 1);
}

#[tokio::test]
async fn fallback_picks_oldest_active_then_none() {
    let (dir, _) = test_directory().await;

    let oldest = dir
        .create("u1", NewIntegration::new("alienvault", "old", "k-old"))
        .await
        .unwrap();
    let newer = dir
        .create("u1", NewIntegration::new("alienvault", "new", "k-new"))
        .await
        .unwrap();

    let resolved = dir
        .get_default_or_fallback("alienvault", "u1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.integration.id, oldest.id);

    dir.toggle_active(&oldest.id, "u1").await.unwrap();
    let resolved = dir
        .get_default_or_fallback("alienvault", "u1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.integration.id, newer.id);

    dir.toggle_active(&newer.id, "u1").await.unwrap();
    assert!(
        dir.get_default_or_fallback("alienvault", "u1")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn inactive_default_is_skipped() {
    let (dir, _) = test_directory().await;

    let default = dir
        .create("u1", NewIntegration::new("virustotal", "default", "kd").as_default())
        .await
        .unwrap();
    let spare = dir
        .create("u1", NewIntegration::new("virustotal", "spare", "ks"))
        .await
        .unwrap();

    dir.toggle_active(&default.id, "u1").await.unwrap();

    let resolved = dir
        .get_default_or_fallback("virustotal", "u1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.integration.id, spare.id);
    assert_eq!(resolved.api_key, "ks");
}

// ═══════════════════════════════════════════════════════════════════════
//  User scoping
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn other_users_see_not_found() {
    let (dir, _) = test_directory().await;

    let owned = dir
        .create("alice", NewIntegration::new("virustotal", "mine", "secret"))
        .await
        .unwrap();

    assert!(matches!(
        dir.get_by_id(&owned.id, "bob").await,
        Err(VaultError::NotFound { .. })
    ));
    assert!(matches!(
        dir.get_decrypted_api_key(&owned.id, "bob").await,
        Err(VaultError::NotFound { .. })
    ));
    assert!(matches!(
        dir.toggle_active(&owned.id, "bob").await,
        Err(VaultError::NotFound { .. })
    ));
    assert!(matches!(
        dir.update(&owned.id, "bob", IntegrationPatch::default()).await,
        Err(VaultError::NotFound { .. })
    ));
    assert!(matches!(
        dir.delete(&owned.id, "bob").await,
        Err(VaultError::NotFound { .. })
    ));
    assert!(
        dir.get_default_or_fallback("virustotal", "bob")
            .await
            .unwrap()
            .is_none()
    );
    assert!(dir.list("bob", &ListFilter::default()).await.unwrap().is_empty());

    // Still intact for the owner.
    assert_eq!(
        dir.get_decrypted_api_key(&owned.id, "alice").await.unwrap(),
        "secret"
    );
}

#[tokio::test]
async fn delete_removes_integration() {
    let (dir, _) = test_directory().await;

    let created = dir
        .create("u1", NewIntegration::new("virustotal", "main", "k"))
        .await
        .unwrap();
    dir.delete(&created.id, "u1").await.unwrap();

    assert!(matches!(
        dir.get_by_id(&created.id, "u1").await,
        Err(VaultError::NotFound { .. })
    ));
    assert!(matches!(
        dir.delete(&created.id, "u1").await,
        Err(VaultError::NotFound { .. })
    ));
}

#[tokio::test]
async fn deleting_user_cascades_to_integrations() {
    let (dir, db) = test_directory().await;

    let a = dir
        .create("u1", NewIntegration::new("virustotal", "a", "k"))
        .await
        .unwrap();
    dir.create("u1", NewIntegration::new("abuseipdb", "b", "k"))
        .await
        .unwrap();
    let kept = dir
        .create("u2", NewIntegration::new("virustotal", "c", "k"))
        .await
        .unwrap();

    let removed = UserStore::new(db).delete("u1").await.unwrap();
    assert_eq!(removed, 2);

    assert!(matches!(
        dir.get_by_id(&a.id, "u1").await,
        Err(VaultError::NotFound { .. })
    ));
    assert!(dir.get_by_id(&kept.id, "u2").await.is_ok());
}

// ═══════════════════════════════════════════════════════════════════════
//  Listing
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn list_is_newest_first_and_filterable() {
    let (dir, _) = test_directory().await;

    let vt = dir
        .create("u1", NewIntegration::new("virustotal", "Team VT", "k"))
        .await
        .unwrap();
    let abuse = dir
        .create("u1", NewIntegration::new("abuseipdb", "reporting", "k"))
        .await
        .unwrap();
    let otx = dir
        .create("u1", NewIntegration::new("alienvault", "pulses", "k"))
        .await
        .unwrap();
    dir.toggle_active(&abuse.id, "u1").await.unwrap();

    let all = dir.list("u1", &ListFilter::default()).await.unwrap();
    let ids: Vec<_> = all.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, [otx.id.as_str(), abuse.id.as_str(), vt.id.as_str()]);

    let by_provider = ListFilter {
        providers: vec!["virustotal".into(), "alienvault".into()],
        ..ListFilter::default()
    };
    assert_eq!(dir.list("u1", &by_provider).await.unwrap().len(), 2);

    let inactive = ListFilter {
        statuses: vec![ActiveStatus::Inactive],
        ..ListFilter::default()
    };
    let inactive = dir.list("u1", &inactive).await.unwrap();
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].id, abuse.id);

    let search = ListFilter {
        search: Some("team".into()),
        ..ListFilter::default()
    };
    let found = dir.list("u1", &search).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, vt.id);

    let search_provider = ListFilter {
        search: Some("ALIEN".into()),
        ..ListFilter::default()
    };
    assert_eq!(dir.list("u1", &search_provider).await.unwrap().len(), 1);

    let active = dir.list_active("u1").await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|i| i.is_active));
}

#[tokio::test]
async fn decrypted_key_details() {
    let (dir, _) = test_directory().await;

    let created = dir
        .create("u1", NewIntegration::new("alienvault", "otx", "otx-key"))
        .await
        .unwrap();
    let details = dir
        .get_decrypted_api_key_with_details(&created.id, "u1")
        .await
        .unwrap();

    assert_eq!(details.api_key, "otx-key");
    assert_eq!(details.integration_id, created.id);
    assert_eq!(details.provider, "alienvault");
    assert!(!format!("{details:?}").contains("otx-key"));
}

// ═══════════════════════════════════════════════════════════════════════
//  On-disk persistence
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn keys_survive_reopen_with_same_secret() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("vault.db");

    let id = {
        let db = Database::open_and_migrate(path.clone()).await.unwrap();
        let dir = IntegrationDirectory::new(db, Arc::new(Encryptor::from_secret("s3cret").unwrap()));
        dir.create("u1", NewIntegration::new("virustotal", "main", "persisted"))
            .await
            .unwrap()
            .id
    };

    let db = Database::open_and_migrate(path).await.unwrap();
    let dir = IntegrationDirectory::new(db, Arc::new(Encryptor::from_secret("s3cret").unwrap()));
    assert_eq!(dir.get_decrypted_api_key(&id, "u1").await.unwrap(), "persisted");
}

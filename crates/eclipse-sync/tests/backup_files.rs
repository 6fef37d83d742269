//! Integration test: backup files written to disk and read back.

use chrono::{TimeZone, Utc};
use eclipse_core::keys;
use eclipse_core::package::PackageKind;
use eclipse_core::EclipseError;
use eclipse_storage::DirectoryStore;
use eclipse_sync::{export_full, export_space_snapshot, read_backup_file, write_backup_file};
use eclipse_storage::PersistenceAdapter;
use secrecy::SecretString;
use tempfile::TempDir;

async fn seeded_store(tmp: &TempDir) -> DirectoryStore {
    let store = DirectoryStore::new(tmp.path().join("data"));
    store
        .write_all_entries(
            &[
                (
                    keys::SPACES_STATE.to_string(),
                    Some(r#"{"spaces":[{"id":"s1","name":"Main","apps":[]},{"id":"s2","name":"Lab","apps":[]}],"activeSpaceId":"s1","version":1}"#.to_string()),
                ),
                (keys::SPACE_RULES.to_string(), Some(r#"{"s1":{"pin":true},"s2":{"pin":false}}"#.to_string())),
                (keys::LANGUAGE.to_string(), Some("en".to_string())),
            ]
            .into_iter()
            .collect(),
        )
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn zip_backup_roundtrip_through_disk() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp).await;
    let now = Utc.with_ymd_and_hms(2026, 5, 6, 7, 8, 9).unwrap();

    let pkg = export_full(&store, now).await.unwrap();
    let file = write_backup_file(&pkg, None).unwrap();
    assert_eq!(file.file_name, "eclipse-backup-20260506-070809.zip");

    let path = tmp.path().join(&file.file_name);
    std::fs::write(&path, &file.bytes).unwrap();
    let back = read_backup_file(&std::fs::read(&path).unwrap(), None).unwrap();
    assert_eq!(back, pkg);
}

#[tokio::test]
async fn encrypted_backup_needs_password() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp).await;
    let now = Utc.with_ymd_and_hms(2026, 5, 6, 7, 8, 9).unwrap();
    let password = SecretString::from("correct horse".to_string());

    let pkg = export_full(&store, now).await.unwrap();
    let file = write_backup_file(&pkg, Some(&password)).unwrap();
    assert!(file.file_name.ends_with(".enc.json"));

    assert!(matches!(
        read_backup_file(&file.bytes, None),
        Err(EclipseError::PasswordRequired)
    ));
    assert_eq!(read_backup_file(&file.bytes, Some(&password)).unwrap(), pkg);
}

#[tokio::test]
async fn space_snapshot_carries_one_space() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&tmp).await;
    let now = Utc.with_ymd_and_hms(2026, 5, 6, 7, 8, 9).unwrap();

    let snap = export_space_snapshot(&store, "s2", now).await.unwrap();
    assert_eq!(snap.kind, PackageKind::SpaceSnapshot);
    let state = snap.spaces_state();
    assert_eq!(state.spaces.len(), 1);
    assert_eq!(state.spaces[0].name, "Lab");
    assert_eq!(snap.space_rules().keys().collect::<Vec<_>>(), vec!["s2"]);
    assert_eq!(snap.entry(keys::LANGUAGE), None);
}

#[test]
fn plain_json_is_accepted_and_garbage_rejected() {
    let pkg = eclipse_core::BackupPackage::new(PackageKind::FullBackup, 42);
    let json = pkg.to_json().unwrap();
    assert_eq!(read_backup_file(json.as_bytes(), None).unwrap(), pkg);

    assert!(matches!(
        read_backup_file(b"not a backup", None),
        Err(EclipseError::InvalidPackageStructure(_))
    ));
}

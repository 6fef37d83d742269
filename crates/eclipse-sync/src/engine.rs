//! Cloud sync: push the local snapshot to one remote file, pull it back.
//!
//! The remote holds a single [`CloudSyncEnvelope`], optionally encrypted. A
//! pull only touches the sections whose hashes differ from local.

use eclipse_core::ids::IdGenerator;
use eclipse_core::section::SectionSet;
use eclipse_core::{EclipseError, EclipseResult};
use eclipse_storage::{PersistenceAdapter, TransportClient};
use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, info};

use crate::backup::{export_full, import_package, ImportOptions, ImportReport};
use crate::diff::{build_envelope, diff, open_document, restrict_import_scope, CloudSyncEnvelope, SectionHashes};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Path of the sync file under the transport root.
    pub remote_path: String,
    /// Encrypts on push and decrypts on pull when set.
    pub password: Option<SecretString>,
    /// `scope` is the requested scope; pull narrows it to changed sections.
    pub import: ImportOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub remote_path: String,
    pub bytes: usize,
    pub encrypted: bool,
    pub section_hashes: SectionHashes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PullOutcome {
    UpToDate,
    Imported(ImportReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub changed: SectionSet,
    pub local: SectionHashes,
    pub remote: SectionHashes,
}

impl SyncStatus {
    pub fn in_sync(&self) -> bool {
        self.changed.is_empty()
    }
}

pub async fn push(
    transport: &dyn TransportClient,
    adapter: &dyn PersistenceAdapter,
    options: &SyncOptions,
) -> EclipseResult<PushResult> {
    let now = options.import.now;
    let package = export_full(adapter, now).await?;
    let envelope = build_envelope(package, now.timestamp_millis())?;
    let section_hashes = envelope.section_hashes.clone();

    let json = envelope.to_json()?;
    let body = match &options.password {
        Some(password) => eclipse_crypto::encrypt_at(&json, password, now.timestamp_millis())?.to_json()?,
        None => json,
    };
    let bytes = body.len();
    transport.upload(&options.remote_path, body.into_bytes()).await?;

    info!(
        path = %options.remote_path,
        bytes,
        encrypted = options.password.is_some(),
        "pushed snapshot"
    );
    Ok(PushResult {
        remote_path: options.remote_path.clone(),
        bytes,
        encrypted: options.password.is_some(),
        section_hashes,
    })
}

async fn fetch(
    transport: &dyn TransportClient,
    path: &str,
    password: Option<&SecretString>,
) -> EclipseResult<CloudSyncEnvelope> {
    let bytes = transport.download(path).await?;
    let text = String::from_utf8(bytes)
        .map_err(|_| EclipseError::InvalidPackageStructure(format!("{path} is not UTF-8")))?;
    open_document(&text, password)
}

pub async fn pull(
    transport: &dyn TransportClient,
    adapter: &dyn PersistenceAdapter,
    options: &SyncOptions,
    ids: &mut dyn IdGenerator,
) -> EclipseResult<PullOutcome> {
    let remote = fetch(transport, &options.remote_path, options.password.as_ref()).await?;
    let local = export_full(adapter, options.import.now).await?;
    let local_hashes = SectionHashes::compute(&local)?;

    let changed = diff(&local_hashes, &remote.section_hashes);
    let scope = restrict_import_scope(options.import.scope, changed);
    debug!(changed = %changed, requested = %options.import.scope, effective = %scope, "pull diff");
    if scope.is_empty() {
        info!(path = %options.remote_path, "already up to date");
        return Ok(PullOutcome::UpToDate);
    }

    let import = ImportOptions {
        scope,
        ..options.import
    };
    let report = import_package(adapter, &remote.backup, &import, ids).await?;
    info!(path = %options.remote_path, scope = %scope, "pulled snapshot");
    Ok(PullOutcome::Imported(report))
}

pub async fn status(
    transport: &dyn TransportClient,
    adapter: &dyn PersistenceAdapter,
    remote_path: &str,
    password: Option<&SecretString>,
) -> EclipseResult<SyncStatus> {
    let remote = fetch(transport, remote_path, password).await?;
    let local = export_full(adapter, chrono::Utc::now()).await?;
    let local = SectionHashes::compute(&local)?;
    Ok(SyncStatus {
        changed: diff(&local, &remote.section_hashes),
        local,
        remote: remote.section_hashes,
    })
}

//! eclipse-sync: merge, change detection, backup files and cloud sync
//!
//! - `merge`: combine a local and an incoming package under a conflict policy
//! - `diff`: per-section hashes and the cloud sync envelope
//! - `backup`: export, backup files, transactional import
//! - `engine`: push / pull / status against a remote transport

pub mod backup;
pub mod diff;
pub mod engine;
pub mod merge;

pub use backup::{
    export_full, export_space_snapshot, import_package, preview_import, read_backup_file,
    write_backup_file, BackupFile, ImportOptions, ImportReport,
};
pub use diff::{build_envelope, diff, open_document, restrict_import_scope, CloudSyncEnvelope, SectionHashes};
pub use engine::{pull, push, status, PullOutcome, PushResult, SyncOptions, SyncStatus};
pub use merge::{merge_packages, FamilyCounts, MergeOutcome, MergePreview};

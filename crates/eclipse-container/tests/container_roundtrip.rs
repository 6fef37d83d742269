//! Container round-trip properties and rejection of non-archive input.

use chrono::NaiveDate;
use eclipse_container::{decode, decode_entries, encode, encode_at, encode_entries, ContainerEntry};
use eclipse_core::EclipseError;
use proptest::prelude::*;

#[test]
fn single_entry_roundtrip() {
    let doc = r#"{"type":"eclipse-full-backup","exportVersion":"1.0.0"}"#;
    let bytes = encode("backup.json", doc).unwrap();
    let entry = decode(&bytes).unwrap();
    assert_eq!(entry.name, "backup.json");
    assert_eq!(entry.content, doc);
}

#[test]
fn multi_entry_offsets_accumulate() {
    let entries = vec![
        ContainerEntry::new("backup.json", "{\"a\":1}"),
        ContainerEntry::new("notes/readme.txt", "restore with eclipse import"),
        ContainerEntry::new("empty.json", ""),
    ];
    let bytes = encode_entries(&entries).unwrap();
    assert_eq!(decode_entries(&bytes).unwrap(), entries);
    assert_eq!(decode(&bytes).unwrap(), entries[0]);
}

#[test]
fn plain_text_is_not_a_container() {
    let err = decode(b"just some notes, definitely not a zip archive").unwrap_err();
    assert!(matches!(err, EclipseError::InvalidContainer(_)));
    assert!(err.is_container_error());
}

#[test]
fn raw_json_is_not_a_container() {
    let err = decode(br#"{"type":"eclipse-full-backup"}"#).unwrap_err();
    assert!(err.is_container_error());
}

#[test]
fn empty_archive_has_no_document() {
    let bytes = encode_entries(&[]).unwrap();
    assert!(decode_entries(&bytes).unwrap().is_empty());
    assert!(matches!(decode(&bytes), Err(EclipseError::InvalidContainer(_))));
}

proptest! {
    #[test]
    fn roundtrip_any_document(name in "[a-zA-Z0-9_./é-]{1,40}", content in any::<String>()) {
        let modified = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap().and_hms_opt(23, 59, 58).unwrap();
        let bytes = encode_at(&name, &content, modified).unwrap();
        let entry = decode(&bytes).unwrap();
        prop_assert_eq!(entry.name, name);
        prop_assert_eq!(entry.content, content);
    }
}

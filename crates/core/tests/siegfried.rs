//! Tests against a real siegfried installation.
//!
//! They run only when `SIEGFRIED_BINARY` is set (CI installs `sf` and sets
//! it); otherwise each test returns early.

use std::path::PathBuf;

use acacore_core::files::{BaseFile, IdentifyContext, OriginalFile};
use acacore_core::siegfried::Siegfried;
use acacore_core::utils::EncodingMode;

fn siegfried() -> Option<Siegfried> {
    let binary = std::env::var("SIEGFRIED_BINARY").ok()?;
    let signature = std::env::var("SIEGFRIED_SIGNATURE").unwrap_or_else(|_| "default.sig".to_string());
    let home = std::env::var("SIEGFRIED_HOME").ok().map(PathBuf::from);
    Some(Siegfried::new(binary, signature, home))
}

#[tokio::test]
async fn identifies_files_in_input_order() {
    let Some(sf) = siegfried() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("pixel.png");
    let txt = dir.path().join("notes.txt");
    std::fs::write(&png, b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x06\x00\x00\x00")
        .unwrap();
    std::fs::write(&txt, "plain text notes\n").unwrap();

    let results = sf.identify_many(&[png.clone(), txt.clone()]).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, png);
    assert_eq!(results[1].0, txt);

    let single = sf.identify(&png).await.unwrap();
    assert_eq!(single.files.len(), 1);
    assert!(single.files[0].best_match().is_some());
}

#[tokio::test]
async fn original_file_takes_siegfried_match() {
    let Some(sf) = siegfried() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("notes.txt");
    std::fs::write(&txt, "plain text notes\n").unwrap();

    let result = sf.identify(&txt).await.unwrap();
    let base = BaseFile::from_file(&txt, dir.path(), Some(&result.files[0]), None, None, &EncodingMode::Auto).unwrap();
    let file = OriginalFile::from_file(
        &txt,
        dir.path(),
        IdentifyContext::new(Some(&result.files[0]), None, None),
        None,
        None,
        &EncodingMode::Auto,
    )
    .unwrap();

    assert_eq!(file.base.puid, base.puid);
    assert_eq!(file.base.signature, base.signature);
    assert_eq!(file.action, None);
}

#[tokio::test]
async fn bad_signature_file_fails() {
    let Some(mut sf) = siegfried() else {
        return;
    };
    sf.signature = "does-not-exist.sig".to_string();
    let dir = tempfile::tempdir().unwrap();
    assert!(sf.identify(dir.path()).await.is_err());
}

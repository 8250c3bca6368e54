//! Fetching reference files from a local HTTP server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use acacore_core::reference_files::ActionType;
use acacore_reference_files::{FileNames, ReferenceFiles, ReferenceFilesError};
use assert_matches::assert_matches;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ACTIONS: &str = r#"
fmt/18:
  name: Acrobat PDF 1.4
  action: convert
  convert:
    tool: pdf
    output: pdfa
x-fmt/111:
  name: Plain text
  action: ignore
  ignore:
    template: not-preservable
"#;

const MASTER_ACTIONS: &str = r#"
fmt/353:
  name: TIFF
  access:
    tool: image
    output: jpg
  statutory:
    tool: copy
"#;

const SIGNATURES: &str = r#"[
  {"puid": "aca-fmt/2", "signature": "Test format", "bof": "^54455354", "extension": ".tst"}
]"#;

fn respond(path: &str) -> (u16, &'static str) {
    match path {
        "/download/fileformats.yml" => (200, ACTIONS),
        "/download/master_fileformats.yml" => (200, MASTER_ACTIONS),
        "/download/custom_signatures.json" => (200, SIGNATURES),
        "/download/broken.yml" => (200, "fmt/1:\n  name: Broken\n  action: manual\n"),
        _ => (404, "not found"),
    }
}

/// Serve [`respond`] on a random port, counting requests.
async fn serve() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);

            let mut buffer = Vec::new();
            let mut chunk = [0_u8; 1024];
            while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                }
            }

            let request = String::from_utf8_lossy(&buffer);
            let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
            let (status, body) = respond(&path);
            let reason = if status == 200 { "OK" } else { "Not Found" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{address}/download/"), requests)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetches_and_parses_all_files() {
    let (url, _) = serve().await;
    let client = ReferenceFiles::new(url);

    let actions = client.get_actions(true).await.unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions["fmt/18"].action, Some(ActionType::Convert));

    let master = client.get_master_actions(true).await.unwrap();
    assert_eq!(master["fmt/353"].statutory.tool, "copy");

    let signatures = client.get_custom_signatures(true).await.unwrap();
    assert_eq!(signatures.len(), 1);
    assert_eq!(signatures[0].puid, "aca-fmt/2");
}

#[tokio::test]
async fn cache_is_reused_unless_disabled() {
    let (url, requests) = serve().await;
    let client = ReferenceFiles::new(url);

    client.get_actions(true).await.unwrap();
    client.get_actions(true).await.unwrap();
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    client.get_actions(false).await.unwrap();
    assert_eq!(requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_file_is_http_error() {
    let (url, _) = serve().await;
    let client = ReferenceFiles::new(url).with_file_names(FileNames {
        actions: "wrong/path/fileformats.yml".to_string(),
        ..FileNames::default()
    });

    assert_matches!(
        client.get_actions(true).await,
        Err(ReferenceFilesError::Http { status: 404, url }) if url.ends_with("/download/wrong/path/fileformats.yml")
    );
}

#[tokio::test]
async fn invalid_file_is_parse_error() {
    let (url, _) = serve().await;
    let client = ReferenceFiles::new(url).with_file_names(FileNames {
        actions: "broken.yml".to_string(),
        ..FileNames::default()
    });

    assert_matches!(client.get_actions(true).await, Err(ReferenceFilesError::Parse { .. }));
}

use std::time::{Duration, Instant};

use httpmock::prelude::*;
use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use dzgrab::decoder::{TransferOptions, download};
use dzgrab::error::TransferError;

fn options(read_timeout: Duration) -> TransferOptions {
    TransferOptions {
        read_timeout,
        show_progress: false,
    }
}

#[tokio::test]
async fn headers_that_never_arrive_stall_the_download() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/slow");
            then.status(200)
                .body(vec![0u8; 64])
                .delay(Duration::from_secs(6));
        })
        .await;

    let out = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let result = download(
        &Client::new(),
        &server.url("/slow"),
        None,
        &out.path().join("slow.mp3"),
        &options(Duration::from_secs(1)),
    )
    .await;

    assert!(matches!(result, Err(TransferError::Stalled { secs: 1 })));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn body_that_stops_midway_stalls_the_download() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await.unwrap();
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\n")
            .await
            .unwrap();
        socket.write_all(&[1u8; 100]).await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
    });

    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("partial.mp3");
    let started = Instant::now();
    let result = download(
        &Client::new(),
        &format!("http://{addr}/track"),
        None,
        &path,
        &options(Duration::from_secs(1)),
    )
    .await;

    assert!(matches!(result, Err(TransferError::Stalled { secs: 1 })));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(path.exists());
    server.abort();
}

#[tokio::test]
async fn error_status_is_an_http_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        })
        .await;

    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("gone.mp3");
    let result = download(
        &Client::new(),
        &server.url("/gone"),
        None,
        &path,
        &options(Duration::from_secs(5)),
    )
    .await;

    assert!(matches!(result, Err(TransferError::Http(_))));
    assert!(!path.exists());
}

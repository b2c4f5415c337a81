use screenstream_daemon::cli::Args;
use screenstream_daemon::config::DaemonConfig;
use screenstream_daemon::images::image_dir_source;
use screenstream_server::StreamingServer;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use clap::Parser;

#[tokio::test]
async fn test_config_and_images_drive_a_stream() {
    let dir = tempdir().unwrap();
    let frames_dir = dir.path().join("frames");
    std::fs::create_dir(&frames_dir).unwrap();
    let jpeg = [0xFF, 0xD8, 1, 2, 3, 4, 0xFF, 0xD9];
    std::fs::write(frames_dir.join("000.jpg"), jpeg).unwrap();

    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "ip_address = \"127.0.0.1\"\nport = 0\nfps = 120\n").unwrap();

    let mut config = DaemonConfig::load_from(&config_path).unwrap();
    let args = Args::try_parse_from([
        "screenstream-daemon",
        "--image-dir",
        frames_dir.to_str().unwrap(),
    ])
    .unwrap();
    args.apply(&mut config);

    let source = image_dir_source(config.image_dir.as_ref().unwrap()).unwrap();
    let server = StreamingServer::new(source);
    let addr = server.start(config.server_config().unwrap()).await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

    let preamble = "HTTP/1.1 200 OK\nContent-Type: multipart/x-mixed-replace; boundary=--boundary\n";
    let part = "\n--boundary\nContent-Type: image/jpeg\nContent-Length: 8\n\n";
    let mut expected = preamble.as_bytes().to_vec();
    for _ in 0..2 {
        expected.extend_from_slice(part.as_bytes());
        expected.extend_from_slice(&jpeg);
        expected.push(b'\n');
    }

    let mut received = vec![0u8; expected.len()];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, expected);

    server.stop().await;
    assert!(!server.is_running());
}

//! AmiClient against a scripted TCP peer.

use std::sync::Arc;
use std::time::Duration;

use ami_protocol::{ActionRequest, AmiClient, AmiConnection, ClientConfig, Event, ProtocolError};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;

async fn bind() -> (TcpListener, ClientConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = ClientConfig {
        host: "127.0.0.1".to_string(),
        port,
        connect_timeout: Duration::from_secs(2),
        response_timeout: Duration::from_secs(2),
    };
    (listener, config)
}

/// Read one action block and return its headers.
async fn read_action(reader: &mut BufReader<OwnedReadHalf>) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap() == 0 {
            return headers;
        }
        let line = line.trim_end();
        if line.is_empty() {
            return headers;
        }
        let (key, value) = line.split_once(": ").unwrap();
        headers.push((key.to_string(), value.to_string()));
    }
}

fn header<'a>(headers: &'a [(String, String)], key: &str) -> &'a str {
    headers
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap()
}

#[tokio::test]
async fn test_login_and_event_delivery() {
    let (listener, config) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        write_half
            .write_all(b"Asterisk Call Manager/5.0.1\r\n")
            .await
            .unwrap();

        let login = read_action(&mut reader).await;
        assert_eq!(header(&login, "Action"), "Login");
        assert_eq!(header(&login, "Username"), "exporter");
        let action_id = header(&login, "ActionID").to_string();

        let reply = format!(
            "Response: Success\r\nActionID: {}\r\nMessage: Authentication accepted\r\n\r\n\
             Event: FullyBooted\r\nPrivilege: system,all\r\nStatus: Fully Booted\r\n\r\n",
            action_id
        );
        write_half.write_all(reply.as_bytes()).await.unwrap();

        // Keep the socket open until the client hangs up.
        let _ = read_action(&mut reader).await;
    });

    let client = AmiClient::new(config);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    client.add_event_listener(Arc::new(move |e: &Event| sink.lock().push(e.clone())));

    client.connect().await.unwrap();
    assert_eq!(client.banner().as_deref(), Some("5.0.1"));
    assert!(client.is_event_loop_alive());

    let response = client.login("exporter", "secret").await.unwrap().unwrap();
    assert!(response.is_success());
    assert_eq!(response.message(), Some("Authentication accepted"));

    tokio::time::timeout(Duration::from_secs(2), async {
        while events.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(events.lock()[0].name(), "FullyBooted");

    client.disconnect().await;
    assert!(!client.is_event_loop_alive());
    server.await.unwrap();
}

#[tokio::test]
async fn test_non_utf8_event_does_not_stop_reader() {
    let (listener, config) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        write_half
            .write_all(b"Asterisk Call Manager/5.0.1\r\n")
            .await
            .unwrap();
        // Latin-1 caller name followed by a plain event.
        write_half
            .write_all(b"Event: Newchannel\r\nCallerIDName: Ren\xe9\r\n\r\n")
            .await
            .unwrap();
        write_half
            .write_all(b"Event: Hangup\r\nChannel: SIP/100\r\n\r\n")
            .await
            .unwrap();

        let _ = read_action(&mut reader).await;
    });

    let client = AmiClient::new(config);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    client.add_event_listener(Arc::new(move |e: &Event| sink.lock().push(e.clone())));
    client.connect().await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while events.lock().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    {
        let events = events.lock();
        assert_eq!(events[0].name(), "Newchannel");
        assert_eq!(events[0].get("CallerIDName"), Some("Ren\u{FFFD}"));
        assert_eq!(events[1].name(), "Hangup");
        assert_eq!(events[1].get("Channel"), Some("SIP/100"));
    }
    assert!(client.is_event_loop_alive());

    client.disconnect().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_unanswered_action_times_out() {
    let (listener, config) = bind().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        write_half
            .write_all(b"Asterisk Call Manager/2.10.4\r\n")
            .await
            .unwrap();
        loop {
            if read_action(&mut reader).await.is_empty() {
                break;
            }
        }
    });

    let client = AmiClient::new(config);
    client.connect().await.unwrap();

    let response = client
        .send_action(ActionRequest::new("Ping"), Duration::from_millis(100))
        .await
        .unwrap();
    assert!(response.is_none());
}

#[tokio::test]
async fn test_peer_close_stops_event_loop() {
    let (listener, config) = bind().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"Asterisk Call Manager/5.0.1\r\n")
            .await
            .unwrap();
        // Dropping the stream closes the connection.
    });

    let client = AmiClient::new(config);
    client.connect().await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while client.is_event_loop_alive() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let result = client
        .send_action(ActionRequest::new("Ping"), Duration::from_secs(1))
        .await;
    assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
}

#[tokio::test]
async fn test_rejects_foreign_banner() {
    let (listener, config) = bind().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"220 smtp.example.com ESMTP\r\n").await.unwrap();
    });

    let client = AmiClient::new(config);
    let result = client.connect().await;
    assert!(matches!(result, Err(ProtocolError::UnexpectedBanner(_))));
}

#[tokio::test]
async fn test_action_ids_are_unique() {
    let client = AmiClient::new(ClientConfig::default());
    let first = client.next_action_id();
    let second = client.next_action_id();
    assert_ne!(first, second);
}

//! Integration tests for the command client against a local management
//! endpoint.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::codec::Framed;
use zero_core::{AppState, CommandFault, OperatorState, StationState};
use zero_protocol::{ByteCommand, CommandRequest, Multipart, MultipartCodec};
use zerod::{Application, CommandClient, StationRegistry, SystemManager, ZeroAppConfig};

// ============================================================================
// Test Helpers
// ============================================================================

/// What the endpoint does after reading a request.
enum Reply {
    Text(String),
    Hang,
    Drop,
}

/// Identity and request seen by the endpoint.
type Seen = (Bytes, CommandRequest);

/// Serves exactly one request, answering via `respond`.
async fn serve_once<F>(respond: F) -> (String, oneshot::Receiver<Seen>)
where
    F: FnOnce(&CommandRequest) -> Reply + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let (seen_tx, seen_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, MultipartCodec::new());

        let identity = framed.next().await.unwrap().unwrap();
        let message = framed.next().await.unwrap().unwrap();
        let request = CommandRequest::parse(&message).unwrap();

        let reply = respond(&request);
        let _ = seen_tx.send((identity[0].clone(), request));
        match reply {
            Reply::Text(text) => {
                let reply: Multipart = vec![Bytes::from(text)];
                framed.send(reply).await.unwrap();
                // Hold the connection until the client hangs up
                let _ = framed.next().await;
            }
            Reply::Hang => {
                let _ = framed.next().await;
            }
            Reply::Drop => drop(framed),
        }
    });

    (address, seen_rx)
}

fn client(address: String) -> CommandClient {
    CommandClient::new(Some(address), Bytes::from_static(b"secret"))
        .with_identity(Bytes::from_static(b"tester"))
}

// ============================================================================
// Round trips
// ============================================================================

#[tokio::test]
async fn test_general_command_round_trip() {
    let (address, seen) = serve_once(|request| {
        Reply::Text(format!(
            "{}:{}",
            request.name.clone().unwrap_or_default(),
            request.args.join(",")
        ))
    })
    .await;

    let result = client(address).call_command(&["ping", "a", "b"]).await;

    assert!(result.is_ok());
    assert_eq!(result.state, OperatorState::Ok);
    assert_eq!(result.reply(), Some("ping:a,b"));

    let (identity, request) = seen.await.unwrap();
    assert_eq!(&identity[..], b"tester");
    assert_eq!(request.command, ByteCommand::General);
    assert_eq!(request.service_key.as_deref(), Some(&b"secret"[..]));
}

#[tokio::test]
async fn test_byte_command_round_trip() {
    let (address, seen) = serve_once(|_| Reply::Text("ok".to_string())).await;

    assert!(client(address).byte_command(ByteCommand::Ping, &["Order"]).await);

    let (_, request) = seen.await.unwrap();
    assert_eq!(request.command, ByteCommand::Ping);
    assert_eq!(request.name, None);
    assert_eq!(request.args, vec!["Order".to_string()]);
}

// ============================================================================
// Failure mapping
// ============================================================================

#[tokio::test]
async fn test_unreachable_endpoint_is_net_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = client(address).call_command(&["ping"]).await;

    assert_eq!(result.state, OperatorState::NetError);
    assert!(!result.interactive_success);
    assert!(result.fault.is_none());
    assert!(result.transport_error.is_some());
}

#[tokio::test]
async fn test_silent_endpoint_times_out() {
    let (address, _seen) = serve_once(|_| Reply::Hang).await;

    let result = client(address)
        .with_reply_timeout(Duration::from_millis(200))
        .call_command(&["slow"])
        .await;

    assert_eq!(result.state, OperatorState::TimeOut);
    assert!(matches!(result.fault, Some(CommandFault::Timeout { .. })));
}

#[tokio::test]
async fn test_dropped_connection_is_local_exception() {
    let (address, _seen) = serve_once(|_| Reply::Drop).await;

    let result = client(address).call_command(&["ping"]).await;

    assert_eq!(result.state, OperatorState::LocalException);
    assert_eq!(result.fault, Some(CommandFault::Closed));
}

// ============================================================================
// Rejoin over the wire
// ============================================================================

#[tokio::test]
async fn test_rejoin_through_system_manager() {
    let (address, seen) = serve_once(|request| {
        assert_eq!(request.name.as_deref(), Some("host"));
        let batch = json!([
            { "station_name": "Order", "short_name": "ord", "station_state": 1 },
            { "station_name": "Web", "short_name": "web", "station_state": 2 },
        ]);
        Reply::Text(batch.to_string())
    })
    .await;

    let config = ZeroAppConfig::from_toml_str(
        "[zero.station]\nstation_name = \"tester\"\nservice_key = \"secret\"\n",
        Path::new("/tmp/zero"),
        None,
    )
    .unwrap();
    let manager = SystemManager::new(client(address));
    let app = Application::new(config, Arc::new(StationRegistry::new()), Arc::new(manager));

    assert!(app.rejoin().await);
    assert_eq!(app.app_state(), AppState::Run);
    assert_eq!(app.registry().len(), 2);
    assert_eq!(app.registry().get("ORDER").unwrap().name, "Order");
    assert_eq!(app.registry().get("web").unwrap().state, StationState::Pause);

    let (_, request) = seen.await.unwrap();
    assert_eq!(request.args, vec!["*".to_string()]);
}

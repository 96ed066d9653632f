//! Event Delivery Integration Tests
//!
//! Serves the router on a real socket and reads the Server-Sent Events
//! responses as raw HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use restconf_event_streams::application::ports::{ChangeFeed, ModelProvider, NotificationFeed};
use restconf_event_streams::application::services::{
    DataChangeSubscriptionInput, NotificationStreamInput,
};
use restconf_event_streams::domain::event::{ChangeRecord, Datastore};
use restconf_event_streams::domain::model::{DataNode, InstancePath, QName};
use restconf_event_streams::{
    DeliverySettings, EventHub, RestconfState, StaticModelProvider, StreamName, StreamRegistry,
    StreamsService, create_router, load_model_file,
};

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const RESTOCKED_STREAM: &str = "notification-stream/toaster:toasterRestocked";

struct TestServer {
    addr: SocketAddr,
    hub: Arc<EventHub>,
    service: Arc<StreamsService>,
}

async fn setup_test_server() -> TestServer {
    let schema = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/toaster.json");
    let model: Arc<dyn ModelProvider> =
        Arc::new(StaticModelProvider::new(load_model_file(&schema).unwrap()));
    let hub = Arc::new(EventHub::new(Arc::clone(&model)));
    let service = Arc::new(StreamsService::new(
        Arc::new(StreamRegistry::new()),
        model,
        Arc::clone(&hub) as Arc<dyn ChangeFeed>,
        Arc::clone(&hub) as Arc<dyn NotificationFeed>,
    ));
    let settings = DeliverySettings {
        subscriber_buffer: 16,
        keepalive_interval: Duration::from_millis(100),
    };
    let router = create_router(RestconfState::new(Arc::clone(&service), &settings));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer { addr, hub, service }
}

fn restocked_notification(amount: i64) -> DataNode {
    DataNode::container(
        QName::new("toaster", "toasterRestocked"),
        vec![DataNode::leaf(QName::new("toaster", "amountOfBread"), amount)],
    )
}

fn create_restocked_stream(service: &StreamsService) {
    service
        .create_notification_stream(&NotificationStreamInput {
            notifications: Some(vec!["toaster:toasterRestocked".to_string()]),
        })
        .unwrap();
}

/// Open a connection and send `GET uri`.
async fn get(addr: SocketAddr, uri: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request =
        format!("GET {uri} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    stream
}

/// Read into `buf` until it contains `needle`.
async fn read_until(stream: &mut TcpStream, buf: &mut String, needle: &str) {
    let read = async {
        let mut chunk = [0u8; 4096];
        while !buf.contains(needle) {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before {needle:?}: {buf}");
            buf.push_str(&String::from_utf8_lossy(&chunk[..n]));
        }
    };
    let finished = timeout(READ_TIMEOUT, read).await.is_ok();
    assert!(finished, "timed out waiting for {needle:?}: {buf}");
}

async fn wait_for(condition: impl Fn() -> bool) {
    timeout(READ_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn notification_is_delivered_as_sse_event() {
    let server = setup_test_server().await;
    create_restocked_stream(&server.service);

    let mut stream = get(server.addr, &format!("/rests/streams/json/{RESTOCKED_STREAM}")).await;
    let mut buf = String::new();
    read_until(&mut stream, &mut buf, "\r\n\r\n").await;
    assert!(buf.starts_with("HTTP/1.1 200"), "{buf}");
    assert!(buf.contains("text/event-stream"), "{buf}");

    assert_eq!(
        server
            .hub
            .publish_notification(restocked_notification(7), None),
        1
    );
    read_until(&mut stream, &mut buf, "amountOfBread").await;
    assert!(buf.contains("data:"), "{buf}");
    assert!(buf.contains("\"ietf-restconf:notification\""), "{buf}");
    assert!(buf.contains("toaster:toasterRestocked"), "{buf}");

    drop(stream);
    let service = Arc::clone(&server.service);
    wait_for(move || service.list_streams().is_empty()).await;
    assert_eq!(server.hub.stats().notification_listeners, 0);
}

#[tokio::test]
async fn data_change_is_delivered_as_xml() {
    let server = setup_test_server().await;
    let name = server
        .service
        .create_data_change_subscription(&DataChangeSubscriptionInput {
            path: Some("/toaster:toaster/toaster:toasterStatus".to_string()),
            datastore: Some("OPERATIONAL".to_string()),
            scope: None,
        })
        .unwrap()
        .stream_name;

    let mut stream = get(server.addr, &format!("/rests/streams/xml/{name}")).await;
    let mut buf = String::new();
    read_until(&mut stream, &mut buf, "\r\n\r\n").await;
    assert!(buf.starts_with("HTTP/1.1 200"), "{buf}");

    let path = InstancePath::parse("/toaster:toaster/toaster:toasterStatus").unwrap();
    let record = ChangeRecord::updated(
        path,
        None,
        DataNode::leaf(QName::new("toaster", "toasterStatus"), "up"),
    );
    assert_eq!(server.hub.publish_changes(Datastore::Operational, vec![record]), 1);

    read_until(&mut stream, &mut buf, ">up</toasterStatus>").await;
    assert!(buf.contains("data:"), "{buf}");
    assert!(buf.contains("<notification"), "{buf}");
}

#[tokio::test]
async fn second_subscriber_is_refused() {
    let server = setup_test_server().await;
    create_restocked_stream(&server.service);
    let uri = format!("/rests/streams/json/{RESTOCKED_STREAM}");

    let mut first = get(server.addr, &uri).await;
    let mut first_buf = String::new();
    read_until(&mut first, &mut first_buf, "\r\n\r\n").await;
    assert!(first_buf.starts_with("HTTP/1.1 200"), "{first_buf}");

    let mut second = get(server.addr, &uri).await;
    let mut second_buf = String::new();
    read_until(&mut second, &mut second_buf, "in-use").await;
    assert!(second_buf.starts_with("HTTP/1.1 409"), "{second_buf}");

    assert_eq!(server.service.registry().active_count(), 1);
}

#[tokio::test]
async fn removing_the_stream_ends_the_response() {
    let server = setup_test_server().await;
    create_restocked_stream(&server.service);

    let mut stream = get(server.addr, &format!("/rests/streams/json/{RESTOCKED_STREAM}")).await;
    let mut buf = String::new();
    read_until(&mut stream, &mut buf, "\r\n\r\n").await;

    assert!(server.service.remove_stream(&StreamName::new(RESTOCKED_STREAM)));

    let mut rest = Vec::new();
    timeout(READ_TIMEOUT, stream.read_to_end(&mut rest))
        .await
        .expect("response did not end")
        .unwrap();
    assert_eq!(server.hub.publish_notification(restocked_notification(1), None), 0);
}

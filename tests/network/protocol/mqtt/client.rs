use dotenvy::dotenv;
use mqtt5_client_engine::network::application::mqtt::callbacks::{
    ConnectResponse, DisconnectInfo, EventHandler, MessageInfo, PublishResponse,
    SubscribeResponse, UnsubscribeResponse,
};
use mqtt5_client_engine::network::application::mqtt::error::{AsyncOpStatus, DisconnectedReason};
use mqtt5_client_engine::network::application::mqtt::op::connect::{AuthStep, ConnectConfig};
use mqtt5_client_engine::network::application::mqtt::op::publish::PublishConfig;
use mqtt5_client_engine::network::application::mqtt::op::subscribe::{
    SubscribeConfig, SubscribeTopic,
};
use mqtt5_client_engine::network::application::mqtt::op::OpHandle;
use mqtt5_client_engine::network::application::mqtt::packet::QoS;
use mqtt5_client_engine::network::application::mqtt::transport::BytePump;
use mqtt5_client_engine::network::application::mqtt::{Client, ClientConfig};
use mqtt5_client_engine::network::error::Error;
use mqtt5_client_engine::network::{Close, Connection, Read as NetRead, Write as NetWrite};
use std::env;
use std::io::{Read as StdRead, Write as StdWrite};
use std::net::TcpStream;
use std::time::{Duration, Instant};

const SCRATCH: usize = 2048;

struct NetConnection {
    stream: TcpStream,
}

impl NetRead for NetConnection {
    type Error = Error;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(_) => Err(Error::ReadError),
        }
    }
}

impl NetWrite for NetConnection {
    type Error = Error;
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.stream.write(buf).map_err(|_| Error::WriteError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream.flush().map_err(|_| Error::WriteError)
    }
}

impl Close for NetConnection {
    type Error = Error;
    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for NetConnection {}

/// Records the callbacks the engine fires, for the test's driving loop to
/// poll against, and owns the byte pump that shuttles the engine's
/// outbound bytes to the real socket.
#[derive(Default)]
struct RecordingHandler {
    pump: Option<BytePump<NetConnection, SCRATCH>>,
    connected: bool,
    subscribed: bool,
    published: bool,
    received: Option<(heapless::String<256>, heapless::Vec<u8, 256>)>,
}

impl RecordingHandler {
    fn new(conn: NetConnection) -> Self {
        Self {
            pump: Some(BytePump::new(conn)),
            ..Default::default()
        }
    }
}

impl EventHandler for RecordingHandler {
    fn send_bytes(&mut self, buf: &[u8]) {
        if let Some(pump) = self.pump.as_mut() {
            let _ = pump.write_all(buf);
        }
    }

    fn schedule_tick(&mut self, _ms: u32) {}

    fn cancel_tick(&mut self) -> u32 {
        0
    }

    fn broker_disconnected(
        &mut self,
        _reason: DisconnectedReason,
        _info: Option<DisconnectInfo<'_>>,
    ) {
        self.connected = false;
    }

    fn message_received(&mut self, msg: MessageInfo<'_>) {
        let topic = heapless::String::try_from(msg.topic).unwrap_or_default();
        let payload = heapless::Vec::from_slice(msg.payload).unwrap_or_default();
        self.received = Some((topic, payload));
    }

    fn connect_complete(&mut self, status: AsyncOpStatus, _response: Option<ConnectResponse<'_>>) {
        self.connected = status == AsyncOpStatus::Complete;
    }

    fn publish_complete(
        &mut self,
        _handle: OpHandle,
        status: AsyncOpStatus,
        _response: Option<PublishResponse<'_>>,
    ) {
        self.published = status == AsyncOpStatus::Complete;
    }

    fn subscribe_complete(
        &mut self,
        _handle: OpHandle,
        status: AsyncOpStatus,
        _response: Option<SubscribeResponse<'_>>,
    ) {
        self.subscribed = status == AsyncOpStatus::Complete;
    }

    fn unsubscribe_complete(
        &mut self,
        _handle: OpHandle,
        _status: AsyncOpStatus,
        _response: Option<UnsubscribeResponse<'_>>,
    ) {
    }

    fn authenticate(&mut self, _data: Option<&[u8]>) -> AuthStep {
        AuthStep::Disconnect
    }
}

fn test_broker_address() -> String {
    dotenv().ok();
    env::var("TEST_MQTT_ADDRESS").unwrap_or_else(|_| "test.mosquitto.org:1883".to_string())
}

fn connect_stream(address: &str) -> TcpStream {
    let stream = TcpStream::connect(address).expect("failed to connect to broker");
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    stream
}

/// Drives the tick/pump loop until `done` reports true or `timeout`
/// elapses. The engine itself never blocks; the blocking happens in the
/// socket read inside `BytePump::pump`, bounded by the connection's read
/// timeout.
fn drive_until(
    client: &mut Client<RecordingHandler>,
    timeout: Duration,
    mut done: impl FnMut(&Client<RecordingHandler>) -> bool,
) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        client.tick(50);
        let mut pump = client.handler().pump.take();
        if let Some(p) = pump.as_mut() {
            let _ = p.pump(client);
        }
        client.handler().pump = pump;
        if done(client) {
            return;
        }
    }
}

#[test]
fn test_connect_to_public_broker() {
    let address = test_broker_address();
    let conn = NetConnection {
        stream: connect_stream(&address),
    };
    let handler = RecordingHandler::new(conn);
    let mut client = Client::new(handler, ClientConfig::default());

    let mut config = ConnectConfig::default();
    config.client_id = heapless::String::try_from("mqtt5-client-engine-test-12345").unwrap();
    config.keep_alive_ms = 10_000;
    client.connect(config).expect("connect rejected locally");

    drive_until(&mut client, Duration::from_secs(10), |c| c.is_connected());

    assert!(client.is_connected(), "did not receive CONNACK in time");
}

#[test]
fn test_publish_and_subscribe() {
    let address = test_broker_address();
    let conn = NetConnection {
        stream: connect_stream(&address),
    };
    let handler = RecordingHandler::new(conn);
    let mut client = Client::new(handler, ClientConfig::default());

    let mut config = ConnectConfig::default();
    config.client_id = heapless::String::try_from("mqtt5-client-engine-test-67890").unwrap();
    config.keep_alive_ms = 10_000;
    client.connect(config).expect("connect rejected locally");
    drive_until(&mut client, Duration::from_secs(10), |c| c.is_connected());
    assert!(client.is_connected(), "failed to connect");

    let topic = "mqtt5-client-engine/test-topic";
    let payload = b"hello world";

    let sub_topic = SubscribeTopic::new(topic, QoS::AtMostOnce).expect("topic fits");
    client
        .subscribe(SubscribeConfig::single(sub_topic))
        .expect("subscribe rejected locally");
    drive_until(&mut client, Duration::from_secs(10), |c| {
        c.handler().subscribed
    });
    assert!(
        client.handler().subscribed,
        "did not receive SUBACK in time"
    );

    let publish =
        PublishConfig::new(topic, payload, QoS::AtMostOnce).expect("publish config fits");
    client.publish(publish).expect("publish rejected locally");

    drive_until(&mut client, Duration::from_secs(10), |c| {
        c.handler().received.is_some()
    });

    let (recv_topic, recv_payload) = client
        .handler()
        .received
        .as_ref()
        .expect("did not receive the published message in time");
    assert_eq!(recv_topic.as_str(), topic);
    assert_eq!(recv_payload.as_slice(), payload);
}

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use dotenvy::dotenv;
use mqtt5_client_engine::network::application::mqtt::callbacks::{
    ConnectResponse, DisconnectInfo, EventHandler, MessageInfo, PublishResponse,
    SubscribeResponse, UnsubscribeResponse,
};
use mqtt5_client_engine::network::application::mqtt::error::{AsyncOpStatus, DisconnectedReason};
use mqtt5_client_engine::network::application::mqtt::op::OpHandle;
use mqtt5_client_engine::network::application::mqtt::op::connect::{AuthStep, ConnectConfig};
use mqtt5_client_engine::network::application::mqtt::op::publish::PublishConfig;
use mqtt5_client_engine::network::application::mqtt::op::subscribe::{
    SubscribeConfig, SubscribeTopic,
};
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

/// Records the callbacks fired during a benchmark iteration and owns the
/// byte pump that shuttles outbound bytes to the real socket.
#[derive(Default)]
struct RecordingHandler {
    pump: Option<BytePump<NetConnection, SCRATCH>>,
    connected: bool,
    subscribed: bool,
    acked_publishes: u32,
    received_messages: u32,
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

    fn message_received(&mut self, _msg: MessageInfo<'_>) {
        self.received_messages += 1;
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
        if status == AsyncOpStatus::Complete {
            self.acked_publishes += 1;
        }
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

fn broker_address() -> String {
    dotenv().ok();
    env::var("TEST_MQTT_ADDRESS").unwrap_or_else(|_| "test.mosquitto.org:1883".to_string())
}

/// Drives the tick/pump loop until `done` reports true or `timeout`
/// elapses.
fn drive_until(
    client: &mut Client<RecordingHandler>,
    timeout: Duration,
    mut done: impl FnMut(&Client<RecordingHandler>) -> bool,
) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        client.tick(20);
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

fn setup_client(client_id: &str) -> Client<RecordingHandler> {
    let address = broker_address();
    let stream = TcpStream::connect(&address).expect("failed to connect to broker");
    stream
        .set_read_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let conn = NetConnection { stream };
    let handler = RecordingHandler::new(conn);
    let mut client = Client::new(handler, ClientConfig::default());

    let mut config = ConnectConfig::default();
    config.client_id = heapless::String::try_from(client_id).unwrap();
    config.keep_alive_ms = 30_000;
    client.connect(config).expect("connect rejected locally");
    drive_until(&mut client, Duration::from_secs(10), |c| c.is_connected());
    assert!(client.is_connected(), "benchmark setup failed to connect");
    client
}

fn subscribed_client(client_id: &str, topic: &str, qos: QoS) -> Client<RecordingHandler> {
    let mut client = setup_client(client_id);
    let sub_topic = SubscribeTopic::new(topic, qos).expect("topic fits");
    client
        .subscribe(SubscribeConfig::single(sub_topic))
        .expect("subscribe rejected locally");
    drive_until(&mut client, Duration::from_secs(10), |c| {
        c.handler().subscribed
    });
    assert!(
        client.handler().subscribed,
        "benchmark setup failed to subscribe"
    );
    client
}

/// Cost of encoding and handing off a single QoS 0 publish, not counting
/// any round trip to the broker.
pub fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");
    let payload = b"hello from publish";
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("publish", |b| {
        b.iter_batched_ref(
            || setup_client("mqtt5-client-engine-bench-publish"),
            |client| {
                let config = PublishConfig::new(
                    "mqtt5-client-engine/bench-topic",
                    payload,
                    QoS::AtMostOnce,
                )
                .unwrap();
                client.publish(config).expect("publish rejected locally");
            },
            criterion::BatchSize::SmallInput,
        )
    });
    group.finish();
}

/// Cost of receiving a single QoS 0 message already in flight from a
/// prior publish, via the tick/pump loop.
pub fn bench_receive(c: &mut Criterion) {
    let mut group = c.benchmark_group("receive");
    let payload = b"hello from receive";
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("receive", |b| {
        b.iter_batched_ref(
            || {
                let mut client = subscribed_client(
                    "mqtt5-client-engine-bench-receive",
                    "mqtt5-client-engine/bench-topic",
                    QoS::AtMostOnce,
                );
                let config = PublishConfig::new(
                    "mqtt5-client-engine/bench-topic",
                    payload,
                    QoS::AtMostOnce,
                )
                .unwrap();
                client.publish(config).expect("publish rejected locally");
                client
            },
            |client| {
                drive_until(client, Duration::from_secs(5), |c| {
                    c.handler().received_messages > 0
                });
            },
            criterion::BatchSize::SmallInput,
        )
    });
    group.finish();
}

/// 50 QoS 0 publish-then-receive round trips against the same
/// subscription.
pub fn bench_publish_and_receive_qos0(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_and_receive_qos0");
    let payload = b"hello world from bench";
    group.throughput(Throughput::Bytes(payload.len() as u64 * 50));

    group.bench_function("publish_and_receive_qos0", |b| {
        b.iter_batched_ref(
            || {
                subscribed_client(
                    "mqtt5-client-engine-bench-pubrecv-qos0",
                    "mqtt5-client-engine/bench-topic-qos0",
                    QoS::AtMostOnce,
                )
            },
            |client| {
                for _ in 0..50 {
                    let seen_before = client.handler().received_messages;
                    let config = PublishConfig::new(
                        "mqtt5-client-engine/bench-topic-qos0",
                        payload,
                        QoS::AtMostOnce,
                    )
                    .unwrap();
                    client.publish(config).expect("publish rejected locally");
                    drive_until(client, Duration::from_secs(5), |c| {
                        c.handler().received_messages > seen_before
                    });
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
    group.finish();
}

/// 50 QoS 1 publish-then-receive round trips, each waiting for both the
/// PUBACK and the echoed delivery from the subscription.
pub fn bench_publish_and_receive_qos1(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_and_receive_qos1");
    let payload = b"hello world from bench qos1";
    group.throughput(Throughput::Bytes(payload.len() as u64 * 50));

    group.bench_function("publish_and_receive_qos1", |b| {
        b.iter_batched_ref(
            || {
                let mut client = subscribed_client(
                    "mqtt5-client-engine-bench-pubrecv-qos1",
                    "mqtt5-client-engine/bench-topic-qos1",
                    QoS::AtLeastOnce,
                );
                // Warm-up round trip so the connection's congestion state
                // settles before the timed iterations.
                let config = PublishConfig::new(
                    "mqtt5-client-engine/bench-topic-qos1",
                    payload,
                    QoS::AtLeastOnce,
                )
                .unwrap();
                client.publish(config).expect("publish rejected locally");
                drive_until(&mut client, Duration::from_secs(5), |c| {
                    c.handler().received_messages > 0
                });
                client
            },
            |client| {
                for _ in 0..50 {
                    let acked_before = client.handler().acked_publishes;
                    let seen_before = client.handler().received_messages;
                    let config = PublishConfig::new(
                        "mqtt5-client-engine/bench-topic-qos1",
                        payload,
                        QoS::AtLeastOnce,
                    )
                    .unwrap();
                    client.publish(config).expect("publish rejected locally");
                    drive_until(client, Duration::from_secs(5), |c| {
                        c.handler().acked_publishes > acked_before
                            && c.handler().received_messages > seen_before
                    });
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
    group.finish();
}

use criterion::{criterion_group, criterion_main};

mod network;

criterion_group!(
    benches,
    network::application::mqtt::client::bench_publish,
    network::application::mqtt::client::bench_receive,
    network::application::mqtt::client::bench_publish_and_receive_qos0,
    network::application::mqtt::client::bench_publish_and_receive_qos1
);
criterion_main!(benches);

//! The engine core: owns every operation, routes inbound packets against
//! the tagged-union dispatch type, and exposes the public, callback-driven
//! API surface.
//!
//! [`Client`] never touches a socket or a clock. A host feeds it inbound
//! bytes via [`Client::feed_bytes`], drives its timers via [`Client::tick`],
//! and receives outbound bytes and completions through the [`EventHandler`]
//! it was constructed with.

use crate::network::application::mqtt::callbacks::{
    ConnectResponse, DisconnectInfo, EventHandler, MessageInfo, PublishResponse,
    SubscribeResponse, UnsubscribeResponse,
};
use crate::network::application::mqtt::config::{ClientConfig, PublishOrdering};
use crate::network::application::mqtt::error::{AsyncOpStatus, ClientError, DisconnectedReason};
use crate::network::application::mqtt::limits;
use crate::network::application::mqtt::op::connect::{AuthStep, ConnectConfig, ConnectOp};
use crate::network::application::mqtt::op::disconnect::DisconnectConfig;
use crate::network::application::mqtt::op::keep_alive::KeepAliveOp;
use crate::network::application::mqtt::op::publish::{
    PublishConfig, PublishOp, PublishState, TopicAliasPreference,
};
use crate::network::application::mqtt::op::reauth::{ReauthConfig, ReauthOp};
use crate::network::application::mqtt::op::recv::RecvOp;
use crate::network::application::mqtt::op::subscribe::{SubscribeConfig, SubscribeOp};
use crate::network::application::mqtt::op::unsubscribe::{UnsubscribeConfig, UnsubscribeOp};
use crate::network::application::mqtt::op::OpHandle;
use crate::network::application::mqtt::packet::{self, Packet, PacketError, PacketType, QoS};
use crate::network::application::mqtt::properties::PropertyOut;
use crate::network::application::mqtt::reason::ReasonCode;
use crate::network::application::mqtt::session::{
    ClientPersistentState, SessionEphemeralState, SessionState,
};
use crate::network::application::mqtt::timer::{TimerId, TimerManager, TimerPurpose};
use crate::network::application::mqtt::topic_alias::SendAliasTable;
use crate::network::application::mqtt::topic_filter;
use heapless::Vec;

/// A sentinel handle returned for operations that complete synchronously
/// and never occupy a pool slot (QoS 0 publishes).
const SYNC_HANDLE: OpHandle = OpHandle(usize::MAX);

/// Coarse connection lifecycle. Finer-grained state (which operations are
/// in flight) lives on the operations themselves.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// The MQTT v5 protocol engine.
///
/// Single-threaded and cooperative: every public method runs to completion
/// before returning, may invoke [`EventHandler`] callbacks synchronously
/// (including re-entrant calls back into `self`), and never blocks.
pub struct Client<H: EventHandler> {
    handler: H,
    config: ClientConfig,
    state: ClientState,
    session: SessionState,
    persistent: ClientPersistentState,
    ephemeral: SessionEphemeralState,
    timers: TimerManager,
    rx: Vec<u8, { limits::MAX_RX_BUFFER }>,
    api_depth: u8,
    tick_scheduled: bool,
    connect_op: Option<ConnectOp>,
    reauth_op: Option<ReauthOp>,
    keep_alive: Option<KeepAliveOp>,
    session_expiry_timer: Option<TimerId>,
    publishes: Vec<Option<PublishOp>, { limits::MAX_OPS }>,
    publish_order: Vec<usize, { limits::MAX_OPS }>,
    subscribes: Vec<Option<SubscribeOp>, { limits::MAX_OPS }>,
    unsubscribes: Vec<Option<UnsubscribeOp>, { limits::MAX_OPS }>,
    recvs: Vec<Option<RecvOp>, { limits::MAX_OPS }>,
}

impl<H: EventHandler> Client<H> {
    /// Construct a new, disconnected engine around `handler`.
    pub fn new(handler: H, config: ClientConfig) -> Self {
        let mut publishes = Vec::new();
        let mut subscribes = Vec::new();
        let mut unsubscribes = Vec::new();
        let mut recvs = Vec::new();
        for _ in 0..limits::MAX_OPS {
            let _ = publishes.push(None);
            let _ = subscribes.push(None);
            let _ = unsubscribes.push(None);
            let _ = recvs.push(None);
        }
        Self {
            handler,
            config,
            state: ClientState::Disconnected,
            session: SessionState::default(),
            persistent: ClientPersistentState::default(),
            ephemeral: SessionEphemeralState::default(),
            timers: TimerManager::new(),
            rx: Vec::new(),
            api_depth: 0,
            tick_scheduled: false,
            connect_op: None,
            reauth_op: None,
            keep_alive: None,
            session_expiry_timer: None,
            publishes,
            publish_order: Vec::new(),
            subscribes,
            unsubscribes,
            recvs,
        }
    }

    /// Whether a session is currently established.
    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    /// Borrow the host-supplied event handler, e.g. to inspect state a
    /// test double recorded.
    pub fn handler(&mut self) -> &mut H {
        &mut self.handler
    }

    // ---- API guard -----------------------------------------------------
    //
    // Every public entry point (other than `tick`, which fires because the
    // host's scheduled wakeup arrived) is wrapped with `enter_api`/
    // `exit_api`. A re-entrant call from inside a callback finds
    // `api_depth > 0` and skips the bookkeeping, which only needs to run
    // once per outermost call.

    fn enter_api(&mut self) {
        if self.api_depth == 0 && self.tick_scheduled {
            let elapsed = self.handler.cancel_tick();
            self.tick_scheduled = false;
            self.advance_timers(elapsed);
        }
        self.api_depth += 1;
    }

    fn exit_api(&mut self) {
        self.api_depth -= 1;
        if self.api_depth == 0 {
            if let Some(ms) = self.timers.min_remaining() {
                self.handler.schedule_tick(ms);
                self.tick_scheduled = true;
            }
        }
    }

    /// Drive the engine's timers forward by `elapsed_ms`. Called by the
    /// host in response to the `schedule_tick` it was asked to arrange.
    pub fn tick(&mut self, elapsed_ms: u32) {
        self.api_depth += 1;
        self.tick_scheduled = false;
        self.advance_timers(elapsed_ms);
        self.api_depth -= 1;
        if self.api_depth == 0 {
            if let Some(ms) = self.timers.min_remaining() {
                self.handler.schedule_tick(ms);
                self.tick_scheduled = true;
            }
        }
    }

    fn advance_timers(&mut self, ms: u32) {
        self.timers.tick(ms);
        let expired = self.timers.take_expired();
        for (id, purpose) in expired.iter().copied() {
            self.handle_timer_fire(id, purpose);
        }
    }

    /// Feed newly arrived transport bytes to the framer. May decode and
    /// dispatch zero or more complete packets.
    pub fn feed_bytes(&mut self, buf: &[u8]) -> Result<(), ClientError> {
        self.enter_api();
        let result = self.feed_bytes_inner(buf);
        self.exit_api();
        result
    }

    /// Notify the engine that the underlying transport dropped, without a
    /// DISCONNECT packet having arrived first.
    pub fn network_disconnected(&mut self) {
        self.enter_api();
        if matches!(
            self.state,
            ClientState::Connected | ClientState::Connecting | ClientState::Disconnecting
        ) {
            self.teardown_session(AsyncOpStatus::BrokerDisconnected);
            self.state = ClientState::Disconnected;
            self.handler
                .broker_disconnected(DisconnectedReason::NetworkError, None);
        }
        self.persistent.network_disconnected = true;
        self.exit_api();
    }

    /// Issue the singleton CONNECT operation.
    pub fn connect(&mut self, config: ConnectConfig) -> Result<(), ClientError> {
        self.enter_api();
        let result = self.connect_inner(config);
        self.exit_api();
        result
    }

    /// Issue a PUBLISH. Returns a handle usable with [`Client::cancel_publish`]
    /// for QoS>0 publishes; QoS 0 publishes complete before this call
    /// returns and the handle is inert.
    pub fn publish(&mut self, config: PublishConfig) -> Result<OpHandle, ClientError> {
        self.enter_api();
        let result = self.publish_inner(config);
        self.exit_api();
        result
    }

    /// Cancel an in-flight PUBLISH locally, without waiting for the
    /// broker's acknowledgement.
    pub fn cancel_publish(&mut self, handle: OpHandle) -> Result<(), ClientError> {
        self.enter_api();
        let result = self.cancel_publish_inner(handle);
        self.exit_api();
        result
    }

    /// Issue a SUBSCRIBE.
    pub fn subscribe(&mut self, config: SubscribeConfig) -> Result<OpHandle, ClientError> {
        self.enter_api();
        let result = self.subscribe_inner(config);
        self.exit_api();
        result
    }

    /// Cancel an in-flight SUBSCRIBE locally.
    pub fn cancel_subscribe(&mut self, handle: OpHandle) -> Result<(), ClientError> {
        self.enter_api();
        let result = self.cancel_subscribe_inner(handle);
        self.exit_api();
        result
    }

    /// Issue an UNSUBSCRIBE.
    pub fn unsubscribe(&mut self, config: UnsubscribeConfig) -> Result<OpHandle, ClientError> {
        self.enter_api();
        let result = self.unsubscribe_inner(config);
        self.exit_api();
        result
    }

    /// Cancel an in-flight UNSUBSCRIBE locally.
    pub fn cancel_unsubscribe(&mut self, handle: OpHandle) -> Result<(), ClientError> {
        self.enter_api();
        let result = self.cancel_unsubscribe_inner(handle);
        self.exit_api();
        result
    }

    /// Issue DISCONNECT and tear down the session locally.
    pub fn disconnect(&mut self, config: DisconnectConfig) -> Result<(), ClientError> {
        self.enter_api();
        let result = self.disconnect_inner(config);
        self.exit_api();
        result
    }

    /// Issue an explicit re-authentication, only valid while connected with
    /// an authentication method already negotiated.
    pub fn reauth(&mut self, config: ReauthConfig) -> Result<(), ClientError> {
        self.enter_api();
        let result = self.reauth_inner(config);
        self.exit_api();
        result
    }

    // ---- wire plumbing ---------------------------------------------------

    fn send_packet(&mut self, buf: &[u8]) {
        self.handler.send_bytes(buf);
        self.note_sent();
    }

    fn note_sent(&mut self) {
        if let Some(ka) = self.keep_alive.as_ref() {
            let ping_timer = ka.ping_timer;
            let ms = self.session.keep_alive_ms;
            self.timers.rearm(ping_timer, TimerPurpose::KeepAlivePing, ms);
        }
    }

    fn note_received(&mut self) {
        if let Some(ka) = self.keep_alive.as_mut() {
            let recv_timer = ka.recv_timer;
            let ms = self.session.keep_alive_ms;
            self.timers
                .rearm(recv_timer, TimerPurpose::KeepAliveRecv, ms);
            if let Some(resp) = ka.resp_timer.take() {
                self.timers.cancel(resp);
            }
        }
    }

    fn feed_bytes_inner(&mut self, buf: &[u8]) -> Result<(), ClientError> {
        if self.rx.extend_from_slice(buf).is_err() {
            return Err(ClientError::BufferOverflow);
        }
        loop {
            let (fixed, header_len) = match packet::read_fixed_header(&self.rx) {
                Ok(h) => h,
                Err(PacketError::NotEnough) => break,
                Err(PacketError::Malformed) => {
                    self.protocol_error(ReasonCode::MalformedPacket);
                    self.rx.clear();
                    return Err(ClientError::InternalError);
                }
            };
            let total = header_len + fixed.remaining_length;
            if self.rx.len() < total {
                break;
            }

            let mut scratch: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
            if scratch.extend_from_slice(&self.rx[..total]).is_err() {
                self.protocol_error(ReasonCode::PacketTooLarge);
                self.rx.clear();
                return Err(ClientError::BufferOverflow);
            }
            let remaining = self.rx.len() - total;
            self.rx.copy_within(total.., 0);
            self.rx.truncate(remaining);

            let body = &scratch[header_len..total];
            match packet::decode_body(&fixed, body) {
                Ok(pkt) => self.dispatch(pkt),
                Err(_) => {
                    self.protocol_error(ReasonCode::MalformedPacket);
                    return Err(ClientError::InternalError);
                }
            }
            if self.state == ClientState::Disconnected {
                break;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, pkt: Packet<'_>) {
        self.note_received();
        match pkt {
            Packet::ConnAck(body) => self.handle_connack(body),
            Packet::Publish(body) => self.handle_publish(body),
            Packet::PubAck(body) => self.handle_puback(body),
            Packet::PubRec(body) => self.handle_pubrec(body),
            Packet::PubRel(body) => self.handle_pubrel(body),
            Packet::PubComp(body) => self.handle_pubcomp(body),
            Packet::SubAck(body) => self.handle_suback(body),
            Packet::UnsubAck(body) => self.handle_unsuback(body),
            Packet::PingResp => {}
            Packet::Disconnect(body) => self.handle_broker_disconnect(body),
            Packet::Auth(body) => self.handle_auth(body),
        }
    }

    fn protocol_error(&mut self, reason: ReasonCode) {
        let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
        if packet::encode_reason_body(PacketType::Disconnect, reason, &[], &mut out).is_ok() {
            self.handler.send_bytes(&out);
        }
        self.teardown_session(AsyncOpStatus::ProtocolError);
        self.state = ClientState::Disconnected;
    }

    /// Tear down every in-flight operation. Publishes and QoS2 receives
    /// are preserved (their timers suspended, not cancelled) only when the
    /// session has a non-zero expiry and the disconnect wasn't itself a
    /// protocol violation; everything else is always discarded.
    fn teardown_session(&mut self, status: AsyncOpStatus) {
        if let Some(op) = self.connect_op.take() {
            if let Some(t) = op.timer {
                self.timers.cancel(t);
            }
            self.state = ClientState::Disconnected;
            self.handler.connect_complete(status, None);
        }
        if let Some(op) = self.reauth_op.take() {
            if let Some(t) = op.timer {
                self.timers.cancel(t);
            }
            self.handler.reauth_complete(status);
        }
        if let Some(ka) = self.keep_alive.take() {
            self.timers.cancel(ka.ping_timer);
            self.timers.cancel(ka.recv_timer);
            if let Some(r) = ka.resp_timer {
                self.timers.cancel(r);
            }
        }

        for idx in 0..self.subscribes.len() {
            if let Some(op) = self.subscribes[idx].take() {
                if let Some(t) = op.timer {
                    self.timers.cancel(t);
                }
                self.persistent.packet_ids.release(op.packet_id);
                self.handler.subscribe_complete(OpHandle(idx), status, None);
            }
        }
        for idx in 0..self.unsubscribes.len() {
            if let Some(op) = self.unsubscribes[idx].take() {
                if let Some(t) = op.timer {
                    self.timers.cancel(t);
                }
                self.persistent.packet_ids.release(op.packet_id);
                self.handler
                    .unsubscribe_complete(OpHandle(idx), status, None);
            }
        }

        let preserve =
            status != AsyncOpStatus::ProtocolError && self.session.session_expiry_interval_ms > 0;
        if preserve {
            for slot in self.publishes.iter() {
                if let Some(op) = slot.as_ref() {
                    if let Some(t) = op.timer {
                        self.timers.suspend(t);
                    }
                }
            }
            for slot in self.recvs.iter() {
                if let Some(op) = slot.as_ref() {
                    if let Some(t) = op.timer {
                        self.timers.suspend(t);
                    }
                }
            }
            let expiry_ms = self.session.session_expiry_interval_ms;
            self.session_expiry_timer = self.timers.arm(TimerPurpose::SessionExpiry, expiry_ms);
        } else {
            for idx in 0..self.publishes.len() {
                if let Some(op) = self.publishes[idx].take() {
                    if let Some(t) = op.timer {
                        self.timers.cancel(t);
                    }
                    if let Some(pid) = op.packet_id {
                        self.persistent.packet_ids.release(pid);
                    }
                    self.handler.publish_complete(OpHandle(idx), status, None);
                }
            }
            self.publish_order.clear();
            self.persistent.in_flight_outbound = 0;
            for slot in self.recvs.iter_mut() {
                if let Some(op) = slot.take() {
                    if let Some(t) = op.timer {
                        self.timers.cancel(t);
                    }
                }
            }
        }

        self.persistent.network_disconnected = true;
    }

    fn handle_broker_disconnect(&mut self, body: crate::network::application::mqtt::packet::ReasonBody<'_>) {
        let reason_code = body.reason_code;
        let reason_string = body.properties.reason_string;
        self.teardown_session(AsyncOpStatus::BrokerDisconnected);
        self.state = ClientState::Disconnected;
        self.handler.broker_disconnected(
            DisconnectedReason::DisconnectMsg,
            Some(DisconnectInfo {
                reason_code,
                reason_string,
            }),
        );
    }

    // ---- CONNECT ----------------------------------------------------------

    fn connect_inner(&mut self, config: ConnectConfig) -> Result<(), ClientError> {
        if matches!(self.state, ClientState::Connected | ClientState::Connecting) {
            return Err(ClientError::AlreadyConnected);
        }
        if self.state == ClientState::Disconnecting {
            return Err(ClientError::Disconnecting);
        }
        if self.connect_op.is_some() {
            return Err(ClientError::Busy);
        }
        if config.client_id.is_empty() && !config.clean_start {
            return Err(ClientError::BadParam);
        }

        let clean_start =
            config.clean_start || self.persistent.first_connect || config.client_id.is_empty();

        let mut will_props: Vec<PropertyOut<'_>, { limits::MAX_PROPS_OUT }> = Vec::new();
        if let Some(will) = config.will.as_ref() {
            if let Some(v) = will.delay_interval_ms {
                let _ = will_props.push(PropertyOut::WillDelayInterval(v));
            }
            if let Some(v) = will.payload_format_indicator {
                let _ = will_props.push(PropertyOut::PayloadFormatIndicator(v));
            }
            if let Some(v) = will.message_expiry_interval {
                let _ = will_props.push(PropertyOut::MessageExpiryInterval(v));
            }
            if let Some(ct) = will.content_type.as_ref() {
                let _ = will_props.push(PropertyOut::ContentType(ct.as_str()));
            }
            if let Some(rt) = will.response_topic.as_ref() {
                let _ = will_props.push(PropertyOut::ResponseTopic(rt.as_str()));
            }
            if let Some(cd) = will.correlation_data.as_ref() {
                let _ = will_props.push(PropertyOut::CorrelationData(cd.as_slice()));
            }
        }
        let will_params = config.will.as_ref().map(|w| packet::ConnectWillParams {
            qos: w.qos,
            retain: w.retain,
            topic: w.topic.as_str(),
            payload: w.payload.as_slice(),
            properties: &will_props,
        });

        let mut props: Vec<PropertyOut<'_>, { limits::MAX_PROPS_OUT }> = Vec::new();
        if let Some(v) = config.max_packet_size {
            let _ = props.push(PropertyOut::MaximumPacketSize(v));
        }
        let _ = props.push(PropertyOut::ReceiveMaximum(config.receive_maximum));
        if config.topic_alias_maximum > 0 {
            let _ = props.push(PropertyOut::TopicAliasMaximum(config.topic_alias_maximum));
        }
        if config.request_response_information {
            let _ = props.push(PropertyOut::RequestResponseInformation(1));
        }
        if !config.request_problem_information {
            let _ = props.push(PropertyOut::RequestProblemInformation(0));
        }
        if config.session_expiry_interval_ms > 0 {
            let _ = props.push(PropertyOut::SessionExpiryInterval(
                config.session_expiry_interval_ms,
            ));
        }
        if let Some(m) = config.authentication_method.as_ref() {
            let _ = props.push(PropertyOut::AuthenticationMethod(m.as_str()));
        }
        if let Some(d) = config.authentication_data.as_ref() {
            let _ = props.push(PropertyOut::AuthenticationData(d.as_slice()));
        }
        for (k, v) in config.user_properties.iter() {
            let _ = props.push(PropertyOut::UserProperty(k.as_str(), v.as_str()));
        }

        let params = packet::ConnectParams {
            clean_start,
            keep_alive: (config.keep_alive_ms / 1000).min(u16::MAX as u32) as u16,
            client_id: config.client_id.as_str(),
            will: will_params,
            username: config.username.as_deref(),
            password: config.password.as_deref(),
            properties: &props,
        };

        let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
        if packet::encode_connect(&params, &mut out).is_err() {
            return Err(ClientError::BufferOverflow);
        }

        self.persistent.network_disconnected = false;
        self.state = ClientState::Connecting;
        self.handler.send_bytes(&out);

        let timeout = config
            .response_timeout_ms
            .unwrap_or(self.config.default_response_timeout_ms);
        let mut op = ConnectOp::new(config);
        op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
        self.connect_op = Some(op);
        Ok(())
    }

    fn handle_connack(&mut self, body: crate::network::application::mqtt::packet::ConnAckBody<'_>) {
        let Some(op) = self.connect_op.take() else {
            self.protocol_error(ReasonCode::ProtocolError);
            return;
        };
        if let Some(t) = op.timer {
            self.timers.cancel(t);
        }

        if !body.reason_code.is_success() {
            self.state = ClientState::Disconnected;
            let response = ConnectResponse {
                reason_code: body.reason_code,
                session_present: false,
                assigned_client_id: None,
                reason_string: body.properties.reason_string,
            };
            self.handler
                .connect_complete(AsyncOpStatus::Complete, Some(response));
            return;
        }

        if let Some(t) = self.session_expiry_timer.take() {
            self.timers.cancel(t);
        }

        let remote_recv_max = body.properties.receive_maximum.unwrap_or(65_535);
        let remote_topic_alias_max = body.properties.topic_alias_maximum.unwrap_or(0);

        self.session = SessionState {
            max_qos: body
                .properties
                .maximum_qos
                .and_then(QoS::from_u8)
                .unwrap_or(QoS::ExactlyOnce),
            retain_available: body.properties.retain_available.map_or(true, |v| v != 0),
            wildcard_subscription_available: body
                .properties
                .wildcard_subscription_available
                .map_or(true, |v| v != 0),
            subscription_identifier_available: body
                .properties
                .subscription_identifier_available
                .map_or(true, |v| v != 0),
            shared_subscription_available: body
                .properties
                .shared_subscription_available
                .map_or(true, |v| v != 0),
            send_maximum: remote_recv_max,
            recv_maximum: op.config.receive_maximum,
            max_send_packet_size: body.properties.maximum_packet_size,
            max_recv_packet_size: op.config.max_packet_size,
            send_topic_alias_maximum: remote_topic_alias_max,
            recv_topic_alias_maximum: op.config.topic_alias_maximum,
            keep_alive_ms: body
                .properties
                .server_keep_alive
                .map(|s| s as u32 * 1000)
                .unwrap_or(op.config.keep_alive_ms),
            session_expiry_interval_ms: body
                .properties
                .session_expiry_interval
                .unwrap_or(op.config.session_expiry_interval_ms),
            authentication_method: op.config.authentication_method.clone(),
            problem_information_allowed: op.config.request_problem_information,
        };

        // Topic alias mappings are scoped to the network connection, not
        // the session: they never survive a reconnect even when the
        // broker reports `session_present=true`.
        if body.session_present {
            self.persistent.send_aliases = SendAliasTable::new(remote_topic_alias_max);
        } else {
            self.persistent
                .reset_for_new_session(remote_topic_alias_max);
            self.ephemeral.clear();
            for slot in self.publishes.iter_mut() {
                *slot = None;
            }
            self.publish_order.clear();
            for slot in self.recvs.iter_mut() {
                *slot = None;
            }
        }
        self.persistent.first_connect = false;
        self.state = ClientState::Connected;

        let ping_timer = self
            .timers
            .arm(TimerPurpose::KeepAlivePing, self.session.keep_alive_ms);
        let recv_timer = self
            .timers
            .arm(TimerPurpose::KeepAliveRecv, self.session.keep_alive_ms);
        if let (Some(p), Some(r)) = (ping_timer, recv_timer) {
            self.keep_alive = Some(KeepAliveOp::new(p, r));
        }

        let response = ConnectResponse {
            reason_code: body.reason_code,
            session_present: body.session_present,
            assigned_client_id: body.properties.assigned_client_identifier,
            reason_string: body.properties.reason_string,
        };
        self.handler
            .connect_complete(AsyncOpStatus::Complete, Some(response));

        if body.session_present {
            self.resume_after_reconnect();
        }
        self.try_advance_sends();
    }

    fn resume_after_reconnect(&mut self) {
        for idx in 0..self.publishes.len() {
            let Some(state) = self.publishes[idx].as_ref().map(|op| op.state) else {
                continue;
            };
            match state {
                PublishState::WaitPuback | PublishState::WaitPubrec => {
                    if let Some(op) = self.publishes[idx].as_mut() {
                        op.dup = true;
                        op.alias_in_use = None;
                    }
                    self.resend_publish(idx);
                }
                PublishState::WaitPubcomp => {
                    let pid = self.publishes[idx].as_ref().unwrap().packet_id.unwrap();
                    let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
                    let _ = packet::encode_puback_like(
                        PacketType::PubRel,
                        pid,
                        ReasonCode::Success,
                        &[],
                        &mut out,
                    );
                    self.send_packet(&out);
                    if let Some(op) = self.publishes[idx].as_mut() {
                        let timeout = op
                            .config
                            .response_timeout_ms
                            .unwrap_or(self.config.default_response_timeout_ms);
                        op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
                    }
                }
                PublishState::Paused => {}
            }
        }
        for idx in 0..self.recvs.len() {
            if let Some(op) = self.recvs[idx].as_mut() {
                let timeout = self.config.default_response_timeout_ms;
                op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
            }
        }
    }

    // ---- PUBLISH (outbound) ------------------------------------------------

    fn maybe_register_alias(&mut self, config: &PublishConfig) {
        if config.topic_alias_preference == TopicAliasPreference::ForceTopicOnly {
            return;
        }
        if self.persistent.send_aliases.find(config.topic.as_str()).is_some() {
            return;
        }
        if self.persistent.send_aliases.max_alias() == 0 {
            return;
        }
        let low_qos_required = if config.qos == QoS::AtMostOnce { 1 } else { 0 };
        let _ = self
            .persistent
            .send_aliases
            .register(config.topic.as_str(), low_qos_required);
    }

    fn encode_publish_wire(
        &self,
        op: &PublishOp,
    ) -> Option<(Vec<u8, { limits::MAX_PACKET }>, Option<u16>)> {
        let mut props: Vec<PropertyOut<'_>, { limits::MAX_PROPS_OUT }> = Vec::new();
        if let Some(v) = op.config.payload_format_indicator {
            let _ = props.push(PropertyOut::PayloadFormatIndicator(v));
        }
        if let Some(v) = op.config.message_expiry_interval {
            let _ = props.push(PropertyOut::MessageExpiryInterval(v));
        }
        if let Some(ct) = op.config.content_type.as_ref() {
            let _ = props.push(PropertyOut::ContentType(ct.as_str()));
        }
        if let Some(rt) = op.config.response_topic.as_ref() {
            let _ = props.push(PropertyOut::ResponseTopic(rt.as_str()));
        }
        if let Some(cd) = op.config.correlation_data.as_ref() {
            let _ = props.push(PropertyOut::CorrelationData(cd.as_slice()));
        }
        for (k, v) in op.config.user_properties.iter() {
            let _ = props.push(PropertyOut::UserProperty(k.as_str(), v.as_str()));
        }

        let mut topic_name = op.config.topic.as_str();
        let mut alias: Option<u16> = None;
        if op.config.topic_alias_preference != TopicAliasPreference::ForceTopicOnly {
            alias = self.persistent.send_aliases.find(op.config.topic.as_str());
            match alias {
                Some(a) => {
                    let send_topic_too = match op.config.topic_alias_preference {
                        TopicAliasPreference::ForceAliasOnly => false,
                        TopicAliasPreference::ForceTopicWithAlias => true,
                        TopicAliasPreference::UseAliasIfAvailable => {
                            self.persistent.send_aliases.is_pending(a)
                        }
                        TopicAliasPreference::ForceTopicOnly => true,
                    };
                    if !send_topic_too {
                        topic_name = "";
                    }
                    let _ = props.push(PropertyOut::TopicAlias(a));
                }
                None => {
                    if matches!(
                        op.config.topic_alias_preference,
                        TopicAliasPreference::ForceAliasOnly
                            | TopicAliasPreference::ForceTopicWithAlias
                    ) {
                        return None;
                    }
                }
            }
        }

        let params = packet::PublishParams {
            dup: op.dup,
            qos: op.config.qos,
            retain: op.config.retain,
            topic_name,
            packet_id: op.packet_id,
            properties: &props,
            payload: op.config.payload.as_slice(),
        };
        let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
        packet::encode_publish(&params, &mut out).ok()?;
        Some((out, alias))
    }

    fn publish_inner(&mut self, config: PublishConfig) -> Result<OpHandle, ClientError> {
        if self.state != ClientState::Connected {
            return Err(ClientError::NotConnected);
        }
        if self.config.verification.outgoing_topic_format
            && !topic_filter::validate_topic_name(config.topic.as_str())
        {
            return Err(ClientError::BadParam);
        }
        if config.qos.as_u8() > self.session.max_qos.as_u8() {
            return Err(ClientError::NotSupported);
        }
        if config.retain && !self.session.retain_available {
            return Err(ClientError::NotSupported);
        }
        if matches!(
            config.topic_alias_preference,
            TopicAliasPreference::ForceAliasOnly | TopicAliasPreference::ForceTopicWithAlias
        ) && self.persistent.send_aliases.find(config.topic.as_str()).is_none()
        {
            return Err(ClientError::BadParam);
        }

        if config.qos == QoS::AtMostOnce {
            self.maybe_register_alias(&config);
            let op = PublishOp::new(config);
            let encoded = self.encode_publish_wire(&op);
            let (status, reason) = match encoded {
                Some((buf, alias)) => {
                    self.send_packet(&buf);
                    if let Some(a) = alias {
                        if self.persistent.send_aliases.is_pending(a) {
                            self.persistent.send_aliases.confirm_registration(a);
                        }
                    }
                    (AsyncOpStatus::Complete, ReasonCode::Success)
                }
                None => (AsyncOpStatus::InternalError, ReasonCode::UnspecifiedError),
            };
            let response = PublishResponse {
                reason_code: reason,
                reason_string: None,
            };
            self.handler
                .publish_complete(SYNC_HANDLE, status, Some(response));
            return Ok(SYNC_HANDLE);
        }

        let Some(idx) = self.publishes.iter().position(Option::is_none) else {
            return Err(ClientError::OutOfMemory);
        };
        self.maybe_register_alias(&config);
        self.publishes[idx] = Some(PublishOp::new(config));
        let _ = self.publish_order.push(idx);
        self.try_advance_sends();
        Ok(OpHandle(idx))
    }

    fn cancel_publish_inner(&mut self, handle: OpHandle) -> Result<(), ClientError> {
        let idx = handle.0;
        let Some(slot) = self.publishes.get_mut(idx) else {
            return Err(ClientError::BadParam);
        };
        let Some(op) = slot.take() else {
            return Err(ClientError::BadParam);
        };
        if let Some(t) = op.timer {
            self.timers.cancel(t);
        }
        if let Some(pid) = op.packet_id {
            self.persistent.packet_ids.release(pid);
            if op.state != PublishState::Paused {
                self.persistent.in_flight_outbound =
                    self.persistent.in_flight_outbound.saturating_sub(1);
            }
        }
        if let Some(pos) = self.publish_order.iter().position(|&i| i == idx) {
            self.publish_order.remove(pos);
        }
        self.handler
            .publish_complete(handle, AsyncOpStatus::Aborted, None);
        self.try_advance_sends();
        Ok(())
    }

    fn try_advance_sends(&mut self) {
        loop {
            let limit = self.session.send_maximum as usize;
            if limit != 0 && self.persistent.in_flight_outbound >= limit {
                break;
            }
            let order = self.publish_order.clone();
            let mut next_idx = None;
            for (pos, &idx) in order.iter().enumerate() {
                let Some(op) = self.publishes[idx].as_ref() else {
                    continue;
                };
                if op.state != PublishState::Paused {
                    continue;
                }
                let current_qos = op.config.qos;
                let blocked = order[..pos].iter().any(|&j| {
                    self.publishes[j].as_ref().is_some_and(|o| {
                        o.state == PublishState::Paused
                            && (self.config.publish_ordering == PublishOrdering::Full
                                || o.config.qos == current_qos)
                    })
                });
                if !blocked {
                    next_idx = Some(idx);
                    break;
                }
            }
            let Some(idx) = next_idx else { break };
            self.start_send(idx);
        }
    }

    fn start_send(&mut self, idx: usize) {
        let qos = self.publishes[idx].as_ref().unwrap().config.qos;
        let Some(pid) = self.persistent.packet_ids.allocate() else {
            return;
        };
        if let Some(op) = self.publishes[idx].as_mut() {
            op.packet_id = Some(pid);
        }
        self.persistent.in_flight_outbound += 1;

        let encoded = {
            let op = self.publishes[idx].as_ref().unwrap();
            self.encode_publish_wire(op)
        };
        let Some((buf, alias)) = encoded else {
            self.complete_publish(
                idx,
                AsyncOpStatus::InternalError,
                ReasonCode::UnspecifiedError,
                None,
            );
            return;
        };

        self.send_packet(&buf);
        if let Some(op) = self.publishes[idx].as_mut() {
            op.alias_in_use = alias;
            op.state = match qos {
                QoS::AtLeastOnce => PublishState::WaitPuback,
                QoS::ExactlyOnce => PublishState::WaitPubrec,
                QoS::AtMostOnce => unreachable!("QoS0 never enters the publish pool"),
            };
        }
        if let Some(a) = alias {
            if self.persistent.send_aliases.is_pending(a) {
                self.persistent.send_aliases.confirm_registration(a);
            }
        }
        let timeout = self.publishes[idx]
            .as_ref()
            .unwrap()
            .config
            .response_timeout_ms
            .unwrap_or(self.config.default_response_timeout_ms);
        if let Some(op) = self.publishes[idx].as_mut() {
            op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
        }
    }

    fn resend_publish(&mut self, idx: usize) {
        let encoded = {
            let op = self.publishes[idx].as_ref().unwrap();
            self.encode_publish_wire(op)
        };
        let Some((buf, alias)) = encoded else {
            self.complete_publish(
                idx,
                AsyncOpStatus::InternalError,
                ReasonCode::UnspecifiedError,
                None,
            );
            return;
        };
        self.send_packet(&buf);
        if let Some(op) = self.publishes[idx].as_mut() {
            op.alias_in_use = alias;
        }
        let timeout = self.publishes[idx]
            .as_ref()
            .unwrap()
            .config
            .response_timeout_ms
            .unwrap_or(self.config.default_response_timeout_ms);
        if let Some(op) = self.publishes[idx].as_mut() {
            op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
        }
    }

    fn complete_publish(
        &mut self,
        idx: usize,
        status: AsyncOpStatus,
        reason: ReasonCode,
        reason_string: Option<&str>,
    ) {
        let Some(op) = self.publishes[idx].take() else {
            return;
        };
        if let Some(t) = op.timer {
            self.timers.cancel(t);
        }
        if let Some(pid) = op.packet_id {
            self.persistent.packet_ids.release(pid);
            self.persistent.in_flight_outbound =
                self.persistent.in_flight_outbound.saturating_sub(1);
        }
        if let Some(pos) = self.publish_order.iter().position(|&i| i == idx) {
            self.publish_order.remove(pos);
        }
        let response = PublishResponse {
            reason_code: reason,
            reason_string,
        };
        self.handler
            .publish_complete(OpHandle(idx), status, Some(response));
    }

    fn find_publish_by_id(&self, packet_id: u16, state: PublishState) -> Option<usize> {
        self.publishes.iter().position(|slot| {
            matches!(slot, Some(op) if op.packet_id == Some(packet_id) && op.state == state)
        })
    }

    /// Resend (with DUP set) every still-unacknowledged publish queued
    /// before `acked_idx`, correcting for a broker that acknowledged
    /// publishes out of their send order.
    fn force_resend_preceding(&mut self, acked_idx: usize) {
        let order = self.publish_order.clone();
        let Some(pos) = order.iter().position(|&i| i == acked_idx) else {
            return;
        };
        for &idx in order[..pos].iter() {
            let needs_resend = matches!(
                self.publishes[idx].as_ref().map(|op| op.state),
                Some(PublishState::WaitPuback) | Some(PublishState::WaitPubrec)
            );
            if !needs_resend {
                continue;
            }
            if let Some(op) = self.publishes[idx].as_mut() {
                op.dup = true;
                op.attempts_made = op.attempts_made.saturating_add(1);
            }
            self.resend_publish(idx);
        }
    }

    fn handle_puback(&mut self, body: crate::network::application::mqtt::packet::PubAckLikeBody<'_>) {
        let Some(idx) = self.find_publish_by_id(body.packet_id, PublishState::WaitPuback) else {
            return;
        };
        self.force_resend_preceding(idx);
        let reason_string = body.properties.reason_string.map(|_| ());
        let _ = reason_string;
        self.complete_publish(idx, AsyncOpStatus::Complete, body.reason_code, None);
        self.try_advance_sends();
    }

    fn handle_pubrec(&mut self, body: crate::network::application::mqtt::packet::PubAckLikeBody<'_>) {
        let Some(idx) = self.find_publish_by_id(body.packet_id, PublishState::WaitPubrec) else {
            return;
        };
        self.force_resend_preceding(idx);
        if !body.reason_code.is_success() {
            self.complete_publish(idx, AsyncOpStatus::Complete, body.reason_code, None);
            self.try_advance_sends();
            return;
        }
        let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
        let _ = packet::encode_puback_like(
            PacketType::PubRel,
            body.packet_id,
            ReasonCode::Success,
            &[],
            &mut out,
        );
        self.send_packet(&out);
        if let Some(op) = self.publishes[idx].as_mut() {
            op.state = PublishState::WaitPubcomp;
            let timeout = op
                .config
                .response_timeout_ms
                .unwrap_or(self.config.default_response_timeout_ms);
            op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
        }
    }

    fn handle_pubcomp(&mut self, body: crate::network::application::mqtt::packet::PubAckLikeBody<'_>) {
        let Some(idx) = self.find_publish_by_id(body.packet_id, PublishState::WaitPubcomp) else {
            return;
        };
        self.complete_publish(idx, AsyncOpStatus::Complete, body.reason_code, None);
        self.try_advance_sends();
    }

    // ---- PUBLISH (inbound) -------------------------------------------------

    fn handle_publish(&mut self, body: crate::network::application::mqtt::packet::PublishBody<'_>) {
        let resolved_topic: heapless::String<{ limits::MAX_TOPIC }>;
        let topic: &str = if !body.topic_name.is_empty() {
            if let Some(alias) = body.properties.topic_alias {
                if !self.ephemeral.recv_aliases.register(alias, body.topic_name) {
                    self.protocol_error(ReasonCode::TopicAliasInvalid);
                    return;
                }
            }
            body.topic_name
        } else if let Some(alias) = body.properties.topic_alias {
            match self.ephemeral.recv_aliases.resolve(alias) {
                Some(t) => {
                    resolved_topic = heapless::String::try_from(t).unwrap_or_default();
                    resolved_topic.as_str()
                }
                None => {
                    self.protocol_error(ReasonCode::TopicAliasInvalid);
                    return;
                }
            }
        } else {
            self.protocol_error(ReasonCode::ProtocolError);
            return;
        };

        if self.config.verification.incoming_topic_format && !topic_filter::validate_topic_name(topic) {
            self.protocol_error(ReasonCode::TopicNameInvalid);
            return;
        }
        if body.qos.as_u8() > self.session.max_qos.as_u8() {
            self.protocol_error(ReasonCode::QosNotSupported);
            return;
        }

        let authorized = !self.config.verification.incoming_subscription_membership
            || self
                .ephemeral
                .subscription_filters
                .iter()
                .any(|f| topic_filter::matches(f.as_str(), topic));

        if !authorized {
            // The broker delivered a message outside our subscription set.
            // Reject it for that packet id without tearing down the
            // session; a QoS 0 message has no packet id to reject against,
            // so it is simply dropped.
            match body.qos {
                QoS::AtMostOnce => return,
                QoS::AtLeastOnce => {
                    let Some(pid) = body.packet_id else {
                        self.protocol_error(ReasonCode::ProtocolError);
                        return;
                    };
                    let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
                    let _ = packet::encode_puback_like(
                        PacketType::PubAck,
                        pid,
                        ReasonCode::NotAuthorized,
                        &[],
                        &mut out,
                    );
                    self.send_packet(&out);
                    return;
                }
                QoS::ExactlyOnce => {
                    let Some(pid) = body.packet_id else {
                        self.protocol_error(ReasonCode::ProtocolError);
                        return;
                    };
                    let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
                    let _ = packet::encode_puback_like(
                        PacketType::PubRec,
                        pid,
                        ReasonCode::NotAuthorized,
                        &[],
                        &mut out,
                    );
                    self.send_packet(&out);
                    return;
                }
            }
        }

        let msg = MessageInfo {
            topic,
            payload: body.payload,
            qos: body.qos,
            retain: body.retain,
            content_type: body.properties.content_type,
            response_topic: body.properties.response_topic,
            correlation_data: body.properties.correlation_data,
            payload_format_indicator: body.properties.payload_format_indicator,
            message_expiry_interval: body.properties.message_expiry_interval,
            subscription_identifiers: &body.properties.subscription_identifiers,
        };

        match body.qos {
            QoS::AtMostOnce => {
                self.handler.message_received(msg);
            }
            QoS::AtLeastOnce => {
                self.handler.message_received(msg);
                let Some(pid) = body.packet_id else {
                    self.protocol_error(ReasonCode::ProtocolError);
                    return;
                };
                let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
                let _ = packet::encode_puback_like(
                    PacketType::PubAck,
                    pid,
                    ReasonCode::Success,
                    &[],
                    &mut out,
                );
                self.send_packet(&out);
            }
            QoS::ExactlyOnce => {
                let Some(pid) = body.packet_id else {
                    self.protocol_error(ReasonCode::ProtocolError);
                    return;
                };
                let already_tracked = self
                    .recvs
                    .iter()
                    .any(|s| matches!(s, Some(op) if op.packet_id == pid));
                if !already_tracked {
                    let Some(idx) = self.recvs.iter().position(Option::is_none) else {
                        self.protocol_error(ReasonCode::ReceiveMaximumExceeded);
                        return;
                    };
                    self.handler.message_received(msg);
                    let timeout = self.config.default_response_timeout_ms;
                    let mut op = RecvOp::new(pid);
                    op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
                    self.recvs[idx] = Some(op);
                }
                let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
                let _ = packet::encode_puback_like(
                    PacketType::PubRec,
                    pid,
                    ReasonCode::Success,
                    &[],
                    &mut out,
                );
                self.send_packet(&out);
            }
        }
    }

    fn handle_pubrel(&mut self, body: crate::network::application::mqtt::packet::PubAckLikeBody<'_>) {
        if let Some(idx) = self
            .recvs
            .iter()
            .position(|s| matches!(s, Some(op) if op.packet_id == body.packet_id))
        {
            if let Some(op) = self.recvs[idx].take() {
                if let Some(t) = op.timer {
                    self.timers.cancel(t);
                }
            }
        }
        let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
        let _ = packet::encode_puback_like(
            PacketType::PubComp,
            body.packet_id,
            ReasonCode::Success,
            &[],
            &mut out,
        );
        self.send_packet(&out);
    }

    // ---- SUBSCRIBE / UNSUBSCRIBE --------------------------------------------

    fn subscribe_inner(&mut self, config: SubscribeConfig) -> Result<OpHandle, ClientError> {
        if self.state != ClientState::Connected {
            return Err(ClientError::NotConnected);
        }
        if config.topics.is_empty() {
            return Err(ClientError::BadParam);
        }
        for topic in config.topics.iter() {
            if !topic_filter::validate_topic_filter(topic.filter.as_str()) {
                return Err(ClientError::BadParam);
            }
            if topic.max_qos.as_u8() > self.session.max_qos.as_u8() {
                return Err(ClientError::NotSupported);
            }
            let parsed = topic_filter::parse_filter(topic.filter.as_str());
            if parsed.share_group.is_some() && !self.session.shared_subscription_available {
                return Err(ClientError::NotSupported);
            }
            if parsed.filter.contains(['+', '#']) && !self.session.wildcard_subscription_available
            {
                return Err(ClientError::NotSupported);
            }
        }
        if config.subscription_identifier.is_some() && !self.session.subscription_identifier_available
        {
            return Err(ClientError::NotSupported);
        }

        let Some(idx) = self.subscribes.iter().position(Option::is_none) else {
            return Err(ClientError::OutOfMemory);
        };
        let Some(pid) = self.persistent.packet_ids.allocate() else {
            return Err(ClientError::OutOfMemory);
        };

        let mut props: Vec<PropertyOut<'_>, { limits::MAX_PROPS_OUT }> = Vec::new();
        if let Some(id) = config.subscription_identifier {
            let _ = props.push(PropertyOut::SubscriptionIdentifier(id));
        }
        for (k, v) in config.user_properties.iter() {
            let _ = props.push(PropertyOut::UserProperty(k.as_str(), v.as_str()));
        }

        let mut entries: Vec<
            packet::SubscribeEntry<'_>,
            { limits::MAX_TOPICS_PER_REQUEST },
        > = Vec::new();
        for topic in config.topics.iter() {
            let _ = entries.push(packet::SubscribeEntry {
                filter: topic.filter.as_str(),
                options: crate::network::application::mqtt::packet::SubscribeOptions {
                    qos: topic.max_qos,
                    no_local: topic.no_local,
                    retain_as_published: topic.retain_as_published,
                    retain_handling: topic.retain_handling,
                },
            });
        }

        let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
        if packet::encode_subscribe(pid, &props, &entries, &mut out).is_err() {
            self.persistent.packet_ids.release(pid);
            return Err(ClientError::BufferOverflow);
        }
        self.send_packet(&out);

        let timeout = config
            .response_timeout_ms
            .unwrap_or(self.config.default_response_timeout_ms);
        let mut op = SubscribeOp::new(config, pid);
        op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
        self.subscribes[idx] = Some(op);
        Ok(OpHandle(idx))
    }

    fn cancel_subscribe_inner(&mut self, handle: OpHandle) -> Result<(), ClientError> {
        let idx = handle.0;
        let Some(slot) = self.subscribes.get_mut(idx) else {
            return Err(ClientError::BadParam);
        };
        let Some(op) = slot.take() else {
            return Err(ClientError::BadParam);
        };
        if let Some(t) = op.timer {
            self.timers.cancel(t);
        }
        self.persistent.packet_ids.release(op.packet_id);
        self.handler
            .subscribe_complete(handle, AsyncOpStatus::Aborted, None);
        Ok(())
    }

    fn handle_suback(&mut self, body: crate::network::application::mqtt::packet::SubAckBody<'_>) {
        let Some(idx) = self
            .subscribes
            .iter()
            .position(|s| matches!(s, Some(op) if op.packet_id == body.packet_id))
        else {
            return;
        };
        let Some(op) = self.subscribes[idx].take() else {
            return;
        };
        if let Some(t) = op.timer {
            self.timers.cancel(t);
        }
        self.persistent.packet_ids.release(op.packet_id);

        for (topic, reason) in op.config.topics.iter().zip(body.reason_codes.iter()) {
            if reason.is_success() {
                let parsed = topic_filter::parse_filter(topic.filter.as_str());
                self.ephemeral.add_filter(parsed.filter);
            }
        }

        let response = SubscribeResponse {
            reason_codes: body.reason_codes,
            reason_string: body.properties.reason_string,
        };
        self.handler
            .subscribe_complete(OpHandle(idx), AsyncOpStatus::Complete, Some(response));
    }

    fn unsubscribe_inner(&mut self, config: UnsubscribeConfig) -> Result<OpHandle, ClientError> {
        if self.state != ClientState::Connected {
            return Err(ClientError::NotConnected);
        }
        if config.filters.is_empty() {
            return Err(ClientError::BadParam);
        }

        let Some(idx) = self.unsubscribes.iter().position(Option::is_none) else {
            return Err(ClientError::OutOfMemory);
        };
        let Some(pid) = self.persistent.packet_ids.allocate() else {
            return Err(ClientError::OutOfMemory);
        };

        let mut props: Vec<PropertyOut<'_>, { limits::MAX_PROPS_OUT }> = Vec::new();
        for (k, v) in config.user_properties.iter() {
            let _ = props.push(PropertyOut::UserProperty(k.as_str(), v.as_str()));
        }
        let mut filters: Vec<&str, { limits::MAX_TOPICS_PER_REQUEST }> = Vec::new();
        for f in config.filters.iter() {
            let _ = filters.push(f.as_str());
        }

        let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
        if packet::encode_unsubscribe(pid, &props, &filters, &mut out).is_err() {
            self.persistent.packet_ids.release(pid);
            return Err(ClientError::BufferOverflow);
        }
        self.send_packet(&out);

        let timeout = config
            .response_timeout_ms
            .unwrap_or(self.config.default_response_timeout_ms);
        let mut op = UnsubscribeOp::new(config, pid);
        op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
        self.unsubscribes[idx] = Some(op);
        Ok(OpHandle(idx))
    }

    fn cancel_unsubscribe_inner(&mut self, handle: OpHandle) -> Result<(), ClientError> {
        let idx = handle.0;
        let Some(slot) = self.unsubscribes.get_mut(idx) else {
            return Err(ClientError::BadParam);
        };
        let Some(op) = slot.take() else {
            return Err(ClientError::BadParam);
        };
        if let Some(t) = op.timer {
            self.timers.cancel(t);
        }
        self.persistent.packet_ids.release(op.packet_id);
        self.handler
            .unsubscribe_complete(handle, AsyncOpStatus::Aborted, None);
        Ok(())
    }

    fn handle_unsuback(&mut self, body: crate::network::application::mqtt::packet::UnsubAckBody<'_>) {
        let Some(idx) = self
            .unsubscribes
            .iter()
            .position(|s| matches!(s, Some(op) if op.packet_id == body.packet_id))
        else {
            return;
        };
        let Some(op) = self.unsubscribes[idx].take() else {
            return;
        };
        if let Some(t) = op.timer {
            self.timers.cancel(t);
        }
        self.persistent.packet_ids.release(op.packet_id);

        for (filter, reason) in op.config.filters.iter().zip(body.reason_codes.iter()) {
            if reason.is_success() {
                let parsed = topic_filter::parse_filter(filter.as_str());
                self.ephemeral.remove_filter(parsed.filter);
            }
        }

        let response = UnsubscribeResponse {
            reason_codes: body.reason_codes,
            reason_string: body.properties.reason_string,
        };
        self.handler
            .unsubscribe_complete(OpHandle(idx), AsyncOpStatus::Complete, Some(response));
    }

    // ---- DISCONNECT ---------------------------------------------------------

    fn disconnect_inner(&mut self, config: DisconnectConfig) -> Result<(), ClientError> {
        if !matches!(self.state, ClientState::Connected | ClientState::Connecting) {
            return Err(ClientError::NotConnected);
        }
        if let Some(ms) = config.session_expiry_interval_ms {
            if ms > 0 && self.session.session_expiry_interval_ms == 0 {
                return Err(ClientError::BadParam);
            }
        }

        self.state = ClientState::Disconnecting;

        let mut props: Vec<PropertyOut<'_>, { limits::MAX_PROPS_OUT }> = Vec::new();
        if let Some(ms) = config.session_expiry_interval_ms {
            let _ = props.push(PropertyOut::SessionExpiryInterval(ms));
        }
        if let Some(s) = config.reason_string.as_ref() {
            let _ = props.push(PropertyOut::ReasonString(s.as_str()));
        }

        let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
        if packet::encode_reason_body(PacketType::Disconnect, config.reason_code, &props, &mut out)
            .is_ok()
        {
            self.handler.send_bytes(&out);
        }

        self.teardown_session(AsyncOpStatus::Aborted);
        self.state = ClientState::Disconnected;
        Ok(())
    }

    // ---- AUTH / REAUTH --------------------------------------------------------

    fn reauth_inner(&mut self, config: ReauthConfig) -> Result<(), ClientError> {
        if self.state != ClientState::Connected {
            return Err(ClientError::NotConnected);
        }
        if self.session.authentication_method.is_none() {
            return Err(ClientError::NotAuthenticated);
        }
        if self.reauth_op.is_some() {
            return Err(ClientError::Busy);
        }

        let method = self.session.authentication_method.clone().unwrap();
        let mut props: Vec<PropertyOut<'_>, { limits::MAX_PROPS_OUT }> = Vec::new();
        let _ = props.push(PropertyOut::AuthenticationMethod(method.as_str()));
        let _ = props.push(PropertyOut::AuthenticationData(
            config.authentication_data.as_slice(),
        ));

        let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
        if packet::encode_reason_body(
            PacketType::Auth,
            ReasonCode::ReAuthenticate,
            &props,
            &mut out,
        )
        .is_err()
        {
            return Err(ClientError::BufferOverflow);
        }
        self.handler.send_bytes(&out);

        let timeout = config
            .response_timeout_ms
            .unwrap_or(self.config.default_response_timeout_ms);
        let mut op = ReauthOp::new(config);
        op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
        self.reauth_op = Some(op);
        Ok(())
    }

    fn handle_auth(&mut self, body: crate::network::application::mqtt::packet::ReasonBody<'_>) {
        if self.connect_op.is_none() && self.reauth_op.is_none() {
            self.protocol_error(ReasonCode::ProtocolError);
            return;
        }

        match body.reason_code {
            ReasonCode::ContinueAuthentication => {
                let step = self.handler.authenticate(body.properties.authentication_data);
                match step {
                    AuthStep::Continue(data) => {
                        let method = self.session.authentication_method.clone();
                        let method = method.or_else(|| {
                            self.connect_op
                                .as_ref()
                                .and_then(|op| op.config.authentication_method.clone())
                        });
                        let Some(method) = method else {
                            self.protocol_error(ReasonCode::ProtocolError);
                            return;
                        };
                        let mut props: Vec<PropertyOut<'_>, { limits::MAX_PROPS_OUT }> =
                            Vec::new();
                        let _ = props.push(PropertyOut::AuthenticationMethod(method.as_str()));
                        let _ = props.push(PropertyOut::AuthenticationData(data.as_slice()));
                        let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
                        if packet::encode_reason_body(
                            PacketType::Auth,
                            ReasonCode::ContinueAuthentication,
                            &props,
                            &mut out,
                        )
                        .is_ok()
                        {
                            self.handler.send_bytes(&out);
                        }
                        let timeout = self.config.default_response_timeout_ms;
                        if let Some(op) = self.connect_op.as_mut() {
                            op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
                        } else if let Some(op) = self.reauth_op.as_mut() {
                            op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
                        }
                    }
                    AuthStep::Disconnect => {
                        self.protocol_error(ReasonCode::NotAuthorized);
                    }
                }
            }
            ReasonCode::Success => {
                if let Some(op) = self.reauth_op.take() {
                    if let Some(t) = op.timer {
                        self.timers.cancel(t);
                    }
                    self.handler.reauth_complete(AsyncOpStatus::Complete);
                } else {
                    self.protocol_error(ReasonCode::ProtocolError);
                }
            }
            _ => {
                self.protocol_error(ReasonCode::ProtocolError);
            }
        }
    }

    // ---- timers ---------------------------------------------------------------

    fn handle_timer_fire(&mut self, id: TimerId, purpose: TimerPurpose) {
        match purpose {
            TimerPurpose::OpResponse => self.handle_op_response_timeout(id),
            TimerPurpose::KeepAlivePing => self.handle_ping_due(),
            TimerPurpose::KeepAliveRecv => self.handle_recv_silence(),
            TimerPurpose::KeepAliveResponse => self.handle_ping_unanswered(),
            TimerPurpose::SessionExpiry => self.handle_session_expired(),
        }
    }

    fn handle_op_response_timeout(&mut self, id: TimerId) {
        if self.connect_op.as_ref().is_some_and(|op| op.timer == Some(id)) {
            self.connect_op = None;
            self.state = ClientState::Disconnected;
            self.handler.connect_complete(AsyncOpStatus::Timeout, None);
            return;
        }
        if self.reauth_op.as_ref().is_some_and(|op| op.timer == Some(id)) {
            self.reauth_op = None;
            self.handler.reauth_complete(AsyncOpStatus::Timeout);
            return;
        }
        if let Some(idx) = self
            .subscribes
            .iter()
            .position(|s| matches!(s, Some(op) if op.timer == Some(id)))
        {
            if let Some(op) = self.subscribes[idx].take() {
                self.persistent.packet_ids.release(op.packet_id);
            }
            self.handler
                .subscribe_complete(OpHandle(idx), AsyncOpStatus::Timeout, None);
            return;
        }
        if let Some(idx) = self
            .unsubscribes
            .iter()
            .position(|s| matches!(s, Some(op) if op.timer == Some(id)))
        {
            if let Some(op) = self.unsubscribes[idx].take() {
                self.persistent.packet_ids.release(op.packet_id);
            }
            self.handler
                .unsubscribe_complete(OpHandle(idx), AsyncOpStatus::Timeout, None);
            return;
        }
        if let Some(idx) = self
            .recvs
            .iter()
            .position(|s| matches!(s, Some(op) if op.timer == Some(id)))
        {
            // The broker never sent PUBREL. The message was already
            // delivered to the host, so no completion callback is owed;
            // just stop tracking it for dedup.
            self.recvs[idx] = None;
            return;
        }
        if let Some(idx) = self
            .publishes
            .iter()
            .position(|s| matches!(s, Some(op) if op.timer == Some(id)))
        {
            self.handle_publish_timeout(idx);
        }
    }

    fn handle_publish_timeout(&mut self, idx: usize) {
        let (attempts_made, limit) = {
            let op = self.publishes[idx].as_ref().unwrap();
            (
                op.attempts_made,
                op.config
                    .resend_attempts
                    .unwrap_or(self.config.default_publish_resend_attempts),
            )
        };
        if attempts_made >= limit {
            self.complete_publish(idx, AsyncOpStatus::Timeout, ReasonCode::UnspecifiedError, None);
            self.try_advance_sends();
            return;
        }
        let state = self.publishes[idx].as_ref().unwrap().state;
        if let Some(op) = self.publishes[idx].as_mut() {
            op.attempts_made += 1;
            op.dup = true;
        }
        match state {
            PublishState::WaitPuback | PublishState::WaitPubrec => self.resend_publish(idx),
            PublishState::WaitPubcomp => {
                let pid = self.publishes[idx].as_ref().unwrap().packet_id.unwrap();
                let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
                let _ = packet::encode_puback_like(
                    PacketType::PubRel,
                    pid,
                    ReasonCode::Success,
                    &[],
                    &mut out,
                );
                self.send_packet(&out);
                if let Some(op) = self.publishes[idx].as_mut() {
                    let timeout = op
                        .config
                        .response_timeout_ms
                        .unwrap_or(self.config.default_response_timeout_ms);
                    op.timer = self.timers.arm(TimerPurpose::OpResponse, timeout);
                }
            }
            PublishState::Paused => {}
        }
    }

    fn handle_ping_due(&mut self) {
        if self.keep_alive.is_none() {
            return;
        }
        if self.keep_alive.as_ref().unwrap().resp_timer.is_some() {
            return;
        }
        let mut out: Vec<u8, { limits::MAX_PACKET }> = Vec::new();
        let _ = packet::encode_ping(PacketType::PingReq, &mut out);
        self.send_packet(&out);

        let ms = self.session.keep_alive_ms;
        let timeout = self.config.default_response_timeout_ms;
        let new_ping = self.timers.arm(TimerPurpose::KeepAlivePing, ms);
        let resp = self.timers.arm(TimerPurpose::KeepAliveResponse, timeout);
        if let Some(ka) = self.keep_alive.as_mut() {
            if let Some(p) = new_ping {
                ka.ping_timer = p;
            }
            ka.resp_timer = resp;
        }
    }

    fn handle_recv_silence(&mut self) {
        if self.keep_alive.is_none() {
            return;
        }
        let ms = self.session.keep_alive_ms;
        let new_recv = self.timers.arm(TimerPurpose::KeepAliveRecv, ms);
        if let Some(ka) = self.keep_alive.as_mut() {
            if let Some(r) = new_recv {
                ka.recv_timer = r;
            }
        }
        self.handle_ping_due();
    }

    fn handle_ping_unanswered(&mut self) {
        self.teardown_session(AsyncOpStatus::BrokerDisconnected);
        self.state = ClientState::Disconnected;
        self.handler
            .broker_disconnected(DisconnectedReason::NoBrokerResponse, None);
    }

    fn handle_session_expired(&mut self) {
        for idx in 0..self.publishes.len() {
            if let Some(op) = self.publishes[idx].take() {
                if let Some(t) = op.timer {
                    self.timers.cancel(t);
                }
                if let Some(pid) = op.packet_id {
                    self.persistent.packet_ids.release(pid);
                }
                self.handler
                    .publish_complete(OpHandle(idx), AsyncOpStatus::BrokerDisconnected, None);
            }
        }
        self.publish_order.clear();
        self.persistent.in_flight_outbound = 0;
        for slot in self.recvs.iter_mut() {
            *slot = None;
        }
        self.ephemeral.clear();
        self.session_expiry_timer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::application::mqtt::op::publish::PublishConfig;
    use heapless::Vec as HVec;

    #[derive(Default)]
    struct RecordingHandler {
        sent: HVec<HVec<u8, 256>, 32>,
        scheduled_ms: Option<u32>,
        connect_statuses: HVec<AsyncOpStatus, 8>,
        publish_statuses: HVec<AsyncOpStatus, 8>,
        messages: HVec<(HVec<u8, 256>, HVec<u8, 256>), 8>,
        disconnects: u8,
    }

    impl EventHandler for RecordingHandler {
        fn send_bytes(&mut self, buf: &[u8]) {
            let _ = self.sent.push(HVec::from_slice(buf).unwrap_or_default());
        }
        fn schedule_tick(&mut self, ms: u32) {
            self.scheduled_ms = Some(ms);
        }
        fn cancel_tick(&mut self) -> u32 {
            self.scheduled_ms = None;
            0
        }
        fn broker_disconnected(&mut self, _reason: DisconnectedReason, _info: Option<DisconnectInfo<'_>>) {
            self.disconnects += 1;
        }
        fn message_received(&mut self, msg: MessageInfo<'_>) {
            let _ = self.messages.push((
                HVec::from_slice(msg.topic.as_bytes()).unwrap_or_default(),
                HVec::from_slice(msg.payload).unwrap_or_default(),
            ));
        }
        fn connect_complete(&mut self, status: AsyncOpStatus, _response: Option<ConnectResponse<'_>>) {
            let _ = self.connect_statuses.push(status);
        }
        fn publish_complete(
            &mut self,
            _handle: OpHandle,
            status: AsyncOpStatus,
            _response: Option<PublishResponse<'_>>,
        ) {
            let _ = self.publish_statuses.push(status);
        }
        fn subscribe_complete(
            &mut self,
            _handle: OpHandle,
            _status: AsyncOpStatus,
            _response: Option<SubscribeResponse<'_>>,
        ) {
        }
        fn unsubscribe_complete(
            &mut self,
            _handle: OpHandle,
            _status: AsyncOpStatus,
            _response: Option<UnsubscribeResponse<'_>>,
        ) {
        }
    }

    fn connack_bytes(session_present: bool) -> HVec<u8, 64> {
        let mut out: HVec<u8, 64> = HVec::new();
        let flags = if session_present { 0x01 } else { 0x00 };
        out.push(0x20).unwrap();
        out.push(3).unwrap();
        out.push(flags).unwrap();
        out.push(ReasonCode::Success.as_u8()).unwrap();
        out.push(0).unwrap();
        out
    }

    #[test]
    fn connect_sends_connect_packet_and_arms_timer() {
        let mut client = Client::new(RecordingHandler::default(), ClientConfig::default());
        let mut config = ConnectConfig::default();
        config.client_id = heapless::String::try_from("device-1").unwrap();
        client.connect(config).unwrap();
        assert_eq!(client.handler().sent.len(), 1);
        assert_eq!(client.state, ClientState::Connecting);
    }

    #[test]
    fn connack_success_establishes_session() {
        let mut client = Client::new(RecordingHandler::default(), ClientConfig::default());
        let mut config = ConnectConfig::default();
        config.client_id = heapless::String::try_from("device-1").unwrap();
        client.connect(config).unwrap();

        let bytes = connack_bytes(false);
        client.feed_bytes(&bytes).unwrap();

        assert!(client.is_connected());
        assert_eq!(client.handler().connect_statuses.len(), 1);
        assert_eq!(client.handler().connect_statuses[0], AsyncOpStatus::Complete);
    }

    #[test]
    fn qos0_publish_completes_synchronously() {
        let mut client = Client::new(RecordingHandler::default(), ClientConfig::default());
        let mut config = ConnectConfig::default();
        config.client_id = heapless::String::try_from("device-1").unwrap();
        client.connect(config).unwrap();
        client.feed_bytes(&connack_bytes(false)).unwrap();

        let pub_config = PublishConfig::new("sensors/temp", b"21.5", QoS::AtMostOnce).unwrap();
        let handle = client.publish(pub_config).unwrap();
        assert_eq!(handle, SYNC_HANDLE);
        assert_eq!(client.handler().publish_statuses.len(), 1);
        assert_eq!(
            client.handler().publish_statuses[0],
            AsyncOpStatus::Complete
        );
    }

    #[test]
    fn qos1_publish_pauses_until_window_available() {
        let mut client = Client::new(RecordingHandler::default(), ClientConfig::default());
        let mut config = ConnectConfig::default();
        config.client_id = heapless::String::try_from("device-1").unwrap();
        client.connect(config).unwrap();
        client.feed_bytes(&connack_bytes(false)).unwrap();

        let pub_config = PublishConfig::new("sensors/temp", b"21.5", QoS::AtLeastOnce).unwrap();
        let handle = client.publish(pub_config).unwrap();
        assert_ne!(handle, SYNC_HANDLE);
        // One CONNECT, one PUBLISH should have been sent by now.
        assert_eq!(client.handler().sent.len(), 2);
    }

    #[test]
    fn publish_before_connect_is_rejected() {
        let mut client = Client::new(RecordingHandler::default(), ClientConfig::default());
        let pub_config = PublishConfig::new("sensors/temp", b"21.5", QoS::AtMostOnce).unwrap();
        let err = client.publish(pub_config).unwrap_err();
        assert_eq!(err, ClientError::NotConnected);
    }

    #[test]
    fn double_connect_is_rejected() {
        let mut client = Client::new(RecordingHandler::default(), ClientConfig::default());
        let mut config = ConnectConfig::default();
        config.client_id = heapless::String::try_from("device-1").unwrap();
        client.connect(config.clone()).unwrap();
        let err = client.connect(config).unwrap_err();
        assert_eq!(err, ClientError::Busy);
    }

    fn connected_client() -> Client<RecordingHandler> {
        let mut client = Client::new(RecordingHandler::default(), ClientConfig::default());
        let mut config = ConnectConfig::default();
        config.client_id = heapless::String::try_from("device-1").unwrap();
        client.connect(config).unwrap();
        client.feed_bytes(&connack_bytes(false)).unwrap();
        client
    }

    fn encode_test_publish(qos: QoS, packet_id: Option<u16>, topic: &str) -> HVec<u8, 128> {
        let params = packet::PublishParams {
            dup: false,
            qos,
            retain: false,
            topic_name: topic,
            packet_id,
            properties: &[],
            payload: b"payload",
        };
        let mut out: HVec<u8, 128> = HVec::new();
        packet::encode_publish(&params, &mut out).unwrap();
        out
    }

    #[test]
    fn unauthorized_qos0_publish_is_dropped_silently() {
        let mut client = connected_client();
        let publish = encode_test_publish(QoS::AtMostOnce, None, "sensors/temp");
        client.feed_bytes(&publish).unwrap();
        assert!(client.handler().messages.is_empty());
        assert!(client.is_connected());
        // Only the CONNECT was sent; no DISCONNECT, no PUBACK-like reply.
        assert_eq!(client.handler().sent.len(), 1);
    }

    #[test]
    fn unauthorized_qos1_publish_gets_puback_not_authorized() {
        let mut client = connected_client();
        let publish = encode_test_publish(QoS::AtLeastOnce, Some(7), "sensors/temp");
        client.feed_bytes(&publish).unwrap();
        assert!(client.handler().messages.is_empty());
        assert!(client.is_connected());
        assert_eq!(client.handler().sent.len(), 2);
        let puback = &client.handler().sent[1];
        assert_eq!(puback[0] >> 4, PacketType::PubAck as u8);
        let reason_code_byte = puback[4];
        assert_eq!(reason_code_byte, ReasonCode::NotAuthorized.as_u8());
    }

    #[test]
    fn unauthorized_qos2_publish_gets_pubrec_not_authorized_and_no_recv_op() {
        let mut client = connected_client();
        let publish = encode_test_publish(QoS::ExactlyOnce, Some(7), "sensors/temp");
        client.feed_bytes(&publish).unwrap();
        assert!(client.handler().messages.is_empty());
        assert!(client.is_connected());
        assert_eq!(client.handler().sent.len(), 2);
        let pubrec = &client.handler().sent[1];
        assert_eq!(pubrec[0] >> 4, PacketType::PubRec as u8);
        assert_eq!(pubrec[4], ReasonCode::NotAuthorized.as_u8());
        assert!(client.recvs.iter().all(Option::is_none));
    }

    #[test]
    fn publish_above_negotiated_max_qos_is_a_protocol_error() {
        let mut client = connected_client();
        client.session.max_qos = QoS::AtMostOnce;
        client.ephemeral.subscription_filters.push(heapless::String::try_from("sensors/temp").unwrap()).unwrap();
        let publish = encode_test_publish(QoS::AtLeastOnce, Some(7), "sensors/temp");
        client.feed_bytes(&publish).unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.handler().disconnects, 0);
    }
}

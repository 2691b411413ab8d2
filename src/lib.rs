//! # mqtt5-client-engine
//!
//! A client-side implementation of the MQTT version 5 messaging protocol.
//! This library is designed for embedded systems and supports `no_std`
//! environments, but runs equally well on a desktop-class host.
//!
//! ## Scope
//!
//! The crate implements the **protocol engine**: the session state machine,
//! operation scheduler, packet-identifier allocator, topic-alias tables,
//! QoS 1/2 in-flight tracker with retry and reorder rules, the timer
//! manager, and the incoming-packet framer/dispatcher. It speaks bytes in
//! and bytes out; it never opens a socket, never implements TLS, and never
//! reads the wall clock. The host feeds inbound bytes via
//! [`network::application::mqtt::Client::feed_bytes`] and drives time via
//! [`network::application::mqtt::Client::tick`]; the engine emits outbound
//! bytes and scheduling requests through the
//! [`network::application::mqtt::EventHandler`] trait.
//!
//! Byte-stream transport (sockets, TLS), broker implementations, and
//! persistent session storage are explicitly out of scope; see the module
//! docs on [`network::application::mqtt`] for the full picture.
//!
//! ## Optional Features
//!
//! - `std`: enable `std`-only convenience trait impls (default: disabled)
//! - `defmt`: enable [`defmt::Format`] impls on the public enums for
//!   embedded logging

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![doc(html_root_url = "https://shishir-dey.github.io/libiot/")]

/// Network abstraction layer: host-facing transport traits and the MQTT v5
/// protocol engine.
///
/// This module contains the transport-adapter traits (`Read`, `Write`,
/// `Close`, `Connection`) that a host may use to bridge a concrete
/// byte-stream transport into the engine, plus the MQTT v5 client engine
/// itself under [`network::application::mqtt`].
pub mod network;

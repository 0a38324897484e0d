//! Event Outbox - Reliable event delivery from a transactional store
//!
//! This crate implements the transactional outbox pattern: a business change
//! and its event log entry commit in one local transaction, a background
//! publisher later delivers the event to the broker, tracks the outcome and
//! escalates persistent failures to operators through failed message chains.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

//! Turnstile - Fixed-Window Admission Control
//!
//! This crate decides, per incoming HTTP request, whether to admit or reject
//! it based on a request-rate budget tied to the caller's address or API
//! credential. Counting and block state live in a counter store, either
//! in-process or shared across replicas through Redis.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod storage;
pub mod telemetry;

//! Windowguard - Fixed-Window Rate Limiting
//!
//! This crate implements an in-process, fixed-window rate limiter keyed by
//! caller-chosen identifiers, named limiter policies, a background sweep of
//! expired windows, and a small HTTP service exposing check and reset.
//! Counters live in process memory and are not shared between instances.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;

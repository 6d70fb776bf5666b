//! # fencepost-server
//!
//! HTTP server library for the fencepost attendance tracker.
//!
//! This library provides the API handlers and state management for fencepost.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;

//! Voice Bridge - voice assistant gateway for FHEM home automation
//!
//! This library provides the core functionality of the bridge:
//! - Smart-home directives (discovery, control, state reports) in two
//!   protocol generations
//! - A conversational skill with German phrasing and sessions
//! - Token introspection and allow-lists for application and client ids
//! - A device registry fed by the hub
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               Voice assistant cloud                  │
//! │   Smart Home v2  │  Smart Home v3  │  Custom skill   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ HTTPS POST
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Voice Bridge                        │
//! │   Auth gate  │  Directive router  │  Intent engine   │
//! │              Device registry                         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               FHEM hub(s)                            │
//! │   Readings  │  set / setreading commands             │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod backend;
pub mod bridge;
pub mod config;
pub mod daemon;
pub mod error;
pub mod intent;
pub mod normalize;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod security;

pub use bridge::Bridge;
pub use config::Config;
pub use daemon::{Daemon, slot_types};
pub use error::{Error, Result};
pub use registry::{Device, DeviceRegistry, SharedRegistry};

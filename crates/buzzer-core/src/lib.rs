//! # buzzer-core
//!
//! Shared library for hosts that drive a wireless game-show buzzer network
//! through its gateway device.  It holds the binary wire format, the record
//! and command catalog, and the key-binding tables.
//!
//! The crate has no dependency on an async runtime, on USB or BLE stacks, or
//! on any OS API.  Transports live in `buzzer-host`.
//!
//! # Architecture overview (for beginners)
//!
//! Buzzers talk to each other over a proprietary radio link.  One gateway
//! node is plugged into the host by USB (or reached over Bluetooth LE) and
//! exposes the state of every buzzer it can hear as a *peer table*.  The host
//! reads that table, shows it, and sends *commands* (buzz, change color,
//! rebind key, ...) that the gateway forwards to a single peer or to all of
//! them.
//!
//! - **`protocol`** – How bytes are laid out.  Records are described by
//!   static schemas ([`protocol::schema`]) and decoded into typed structs
//!   ([`protocol::records`]).  Commands are built by
//!   [`protocol::commands`].
//!
//! - **`keymap`** – Turns the HID key code a buzzer types into text like
//!   `Ctrl+Shift+A`, and back.

pub mod keymap;
pub mod protocol;

pub use protocol::mac::MacAddress;
pub use protocol::records::{GameConfig, GameSettings, KeyConfig, NodeInfo, PeerRecord};
pub use protocol::schema::CodecError;
pub use protocol::{PeerCommand, EXPECTED_DEVICE_VERSION};

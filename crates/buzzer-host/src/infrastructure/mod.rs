//! Infrastructure layer for the host application.
//!
//! Contains OS-facing adapters: the USB and BLE transports and file-system
//! storage for the configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `buzzer_core`, but the application layer only sees it through the
//! `BuzzerTransport` trait (tests excepted).

pub mod storage;
pub mod transport;

//! # rcw-server: Remote CW Keying Server
//!
//! Accepts one remote operator client over TCP and keys a transmitter
//! through a serial port's RTS or DTR line, replaying each key event at
//! the millisecond the client stamped on it.
//!
//! The keying engine and event loop live in `rcw-core`; this crate adds
//! the TOML configuration, command line and process plumbing (logging,
//! Ctrl-C, reload on SIGHUP).

pub mod config;

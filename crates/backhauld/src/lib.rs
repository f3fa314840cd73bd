//! Backhaul monitor daemon.
//!
//! Wraps the [`backhaul_monitor`] core with the pieces a deployed process
//! needs: settings loading, the blocking HTTP reflector client, the
//! control API and a test reflector server. Exposed as a library so the
//! integration tests can drive each piece without a subprocess.

pub mod control;
pub mod http_client;
pub mod reflector;
pub mod settings;

//! Error types for the client.
//!
//! Startup failures (connection, registry, missing globals, the first
//! buffer) are fatal and bubble up to `main`; steady-state resize
//! allocation failures are handled locally in the session and never
//! reach this enum.

use thiserror::Error;

use crate::render::ColorParseError;
use crate::shm::AllocationError;

/// Everything that can take the client down.
#[derive(Debug, Error)]
pub enum MarqueeError {
    /// The Wayland socket could not be reached.
    #[error("failed to connect to the Wayland display: {0}")]
    Connection(#[from] wayland_client::ConnectError),

    /// The initial registry round trip failed.
    #[error("registry round trip failed: {0}")]
    Registry(#[from] wayland_client::globals::GlobalError),

    /// The compositor does not advertise an interface we cannot run without.
    #[error("compositor does not support {0}")]
    MissingGlobal(&'static str),

    /// Creating or mapping shared memory for the first frame failed.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// I/O failure on the event channel.
    #[error("event dispatch failed: {0}")]
    Dispatch(#[from] wayland_client::DispatchError),

    /// A color in the configuration does not parse.
    #[error("invalid configuration: {0}")]
    Config(#[from] ColorParseError),
}

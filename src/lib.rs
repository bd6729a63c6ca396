mod constants;
mod types;
mod controller;

pub mod config;
pub mod error;
pub mod input;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::{Directory, Settings};
pub use controller::{ControllerOptions, ControllerState, FrameSink, MotionController, TimerId};
pub use error::{ConfigError, InputError, ProtocolError, TransportError};
pub use protocol::{Command, Frame};
pub use session::{ControlEvent, Session, SessionReport, SessionStats};
pub use transport::{LoopbackTransport, SerialTransport, Transport};
pub use types::{Address, Axis, DiagonalMode, Direction, PanDirection, Speed, TiltDirection};

// Re-export commonly used items
pub use constants::{DEFAULT_BAUD_RATE, MAX_SPEED, MIN_SPEED, REPEAT_INTERVAL_MS};

/// Install the `tracing` subscriber. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()?;

    Ok(())
}

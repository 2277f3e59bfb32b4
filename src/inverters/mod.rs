//! Telemetry clients for inverter monitoring platforms

pub mod enphase;

pub use enphase::{AuthorizationCodeSource, EnphaseClient, LiveReading, StdinCodeSource};

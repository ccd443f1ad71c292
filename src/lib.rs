//! NetScout probe engine
//!
//! A catalog of network diagnostic probes ([`probes`]) built on a shared
//! bounded-parallelism runner ([`runner`]), a host telemetry sampler with a
//! stateful rate calculator ([`collectors`]) and a latency quality
//! aggregator ([`quality`]).

pub mod collectors;
pub mod config;
pub mod errors;
pub mod probes;
pub mod quality;
pub mod runner;

pub use errors::ProbeError;

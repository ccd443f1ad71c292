//! Host telemetry: snapshot model, parsers, the sampler and its broadcaster

pub mod broadcaster;
pub mod neighbors;
pub mod sampler;
pub mod snapshot;
pub mod system;

use async_trait::async_trait;

pub use broadcaster::{BroadcastHandle, TelemetryBroadcaster};
pub use neighbors::{NeighborEntry, NeighborState};
pub use sampler::{SharedSampler, TelemetrySampler};
pub use snapshot::TelemetrySnapshot;

/// Anything that can produce a telemetry snapshot on demand
#[async_trait]
pub trait SnapshotSource: Send {
    async fn snapshot(&mut self) -> TelemetrySnapshot;
}

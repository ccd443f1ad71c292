pub mod commands;
pub mod probe_commands;
pub mod telemetry_commands;

pub use commands::Cli;
pub use probe_commands::ProbeCommandHandler;
pub use telemetry_commands::TelemetryCommandHandler;

//! `sk-gateway` — the binary wiring C1-C7 together and owning the command
//! surface (§6). Exposed as a library too so `tests/` can exercise the
//! wiring without going through `main`.

pub mod commands;
pub mod sink;
pub mod wiring;

pub use sink::GatewaySink;
pub use wiring::{Core, GatewayJobExecutor, GatewayReminderDeliverer};

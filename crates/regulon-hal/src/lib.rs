//! `regulon-hal` – actuator driver contract.
//!
//! Controllers never talk to relay hardware directly; they hold an
//! `Arc<dyn RelayDriver>` and issue on/off/duty commands through it. Drivers
//! for real hardware live outside this workspace; this crate defines the
//! contract plus an in-process simulation bank so the full stack runs in
//! headless tests and CI without any physical hardware.
//!
//! # Modules
//!
//! - [`driver`] – [`RelayDriver`][driver::RelayDriver]: the shared driver
//!   trait, the [`RelayOn`][driver::RelayOn] command payload, and
//!   [`RelayState`][driver::RelayState].
//! - [`sim`] – [`SimRelayBank`][sim::SimRelayBank]: a recording simulator
//!   that tracks relay states and keeps a command log for assertions.

pub mod driver;
pub mod sim;

pub use driver::{RelayDriver, RelayOn, RelayState};
pub use sim::{RelayCommand, SimRelayBank};

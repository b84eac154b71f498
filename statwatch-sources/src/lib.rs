//! # statwatch-sources
//!
//! Metric sources backed by `sysinfo`, and the modules that wire them to
//! widgets and notifications.
//!
//! | Module            | Readers                          | Notifications              |
//! |-------------------|----------------------------------|----------------------------|
//! | [`CpuModule`]     | `load`, `processes` (popup only) | `totalUsage`               |
//! | [`RamModule`]     | `usage`                          | `totalUsage`, `free`       |
//! | [`DiskModule`]    | `usage`                          | `usage`                    |
//! | [`NetworkModule`] | `usage`                          | `interface`                |
//!
//! Notification levels are read from the store under
//! `<Module>_notifications_<id>`, e.g. `RAM_notifications_free = "0.1"`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use statwatch_kit::{MemoryStore, ModuleContext, Settings};
//! use statwatch_sources::{CpuModule, NetworkModule, Wiring};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load(None)?;
//!     let ctx = ModuleContext::current(settings.open_store()?)?;
//!     let wiring = Wiring::from_settings(ctx, &settings);
//!
//!     let cpu = CpuModule::new(wiring.config_for(&settings, CpuModule::default_config()), &wiring)?;
//!     let net = NetworkModule::new(NetworkModule::default_config(), &wiring, None)?;
//!
//!     for module in [cpu.module(), net.module()] {
//!         module.listen();
//!         module.mount();
//!     }
//!
//!     tokio::signal::ctrl_c().await?;
//!     cpu.module().terminate();
//!     net.module().terminate();
//!     Ok(())
//! }
//! ```

mod cpu;
mod disk;
mod error;
mod memory;
mod network;
mod wiring;

pub use cpu::{CpuModule, CpuSource, TopProcessesSource, DEFAULT_TOP_PROCESSES};
pub use disk::{DiskModule, DiskSource, DEFAULT_MOUNT_POINT};
pub use error::{Result, SourceError};
pub use memory::{MemorySource, RamModule};
pub use network::{NetworkModule, NetworkSource};
pub use wiring::Wiring;

/// Whole percent of a ratio, for notification text.
pub(crate) fn percent(ratio: f64) -> i64 {
    (ratio * 100.0) as i64
}

//! # statwatch-types
//!
//! Plain data shared between statwatch metric readers and the things that
//! consume their output (widgets, popups, notification rules).
//!
//! Nothing in here polls, locks or renders. Readers produce the value structs
//! ([`CpuLoad`], [`MemoryUsage`], ...); module glue converts them into a
//! [`MetricPayload`], the only shape a widget ever sees.
//!
//! ## Features
//!
//! - `serde`: derive `Serialize`/`Deserialize` for every type, used to persist
//!   the last reader value between runs.
//!
//! ## Example
//!
//! ```rust
//! use statwatch_types::{MemoryUsage, MetricPayload, SwapUsage, WidgetKind};
//!
//! let usage = MemoryUsage {
//!     total: 16 * 1024,
//!     used: 12 * 1024,
//!     free: 4 * 1024,
//!     app: 8 * 1024,
//!     wired: 3 * 1024,
//!     compressed: 1024,
//!     swap: SwapUsage::default(),
//! };
//!
//! let payload = MetricPayload::Percentage(usage.usage());
//! assert!(WidgetKind::Mini.accepts(&payload));
//! assert_eq!(usage.usage(), 0.75);
//! ```

mod payload;
mod values;
mod widget;

pub use payload::*;
pub use values::*;
pub use widget::*;

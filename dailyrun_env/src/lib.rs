//! Daily Run Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the daily run
//! engine to run in both **Production** (system clock, OS entropy) and
//! **Simulation** (virtual clock, seeded RNG) environments.
//!
//! # Core Concept: The Day Boundary
//!
//! Every temporal grouping in the engine is anchored to the UTC calendar
//! date reported by the context:
//! - Time (`now()`, `today()`)
//! - Randomness (`fresh_seed()`)
//!
//! By deriving all entropy from a single 64-bit seed in simulation, any
//! ranking bug becomes reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use dailyrun_env::{RunContext, SystemContext, week_start};
//!
//! let ctx = SystemContext::shared();
//! let today = ctx.today();
//! let window = week_start(today)..=today;
//! ```

mod clock;
mod context;
mod types;
mod error;
mod system_impl;

pub use clock::{format_day, parse_day, utc_day, week_start};
pub use context::RunContext;
pub use types::{ActorId, PlayerId};
pub use error::EnvError;
pub use system_impl::SystemContext;

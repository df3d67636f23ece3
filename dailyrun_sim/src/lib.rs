//! Daily Run Deterministic Simulation Testing (DST) Harness
//!
//! This crate runs the whole engine under a controlled environment and
//! checks it against a reference model.
//!
//! # Core Principle: One Seed Drives Everything
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only when a scenario moves it
//! - **Seeds**: Day seeds come from a ChaCha8 stream keyed by the master seed
//! - **Players**: Names and submissions are drawn from derived streams
//!
//! Thread interleaving is the one thing left free: callers run on a
//! multi-thread tokio runtime so the store's atomic operations are
//! exercised for real.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ tokio runtime (spawn_blocking callers)                │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │            │            │                           │
//! │  ┌────▼────┐  ┌────▼────┐  ┌────▼────┐                      │
//! │  │ Caller  │  │ Caller  │  │ Caller  │   ...                │
//! │  └────┬────┘  └────┬────┘  └────┬────┘                      │
//! │       └────────────┼────────────┘                           │
//! │             DailyRunService<SimContext>                     │
//! │                    │                                        │
//! │  ┌─────────────────▼─────────────────┐                      │
//! │  │              Oracle                │                      │
//! │  │  (expected runs, boards, counts)   │                      │
//! │  └────────────────────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dailyrun_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 50).run(ScenarioId::ScoreStorm);
//! assert!(result.passed);
//! ```

mod context;
mod oracle;
mod players;
mod runner;
pub mod exporter;
pub mod scenarios;

pub use context::SimContext;
pub use oracle::{ExpectedRun, ExpectedStanding, Oracle};
pub use players::DeterministicNameProvider;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, SimError};
pub use exporter::{LeaderboardSnapshot, SimExport};
pub use scenarios::{ScenarioId, StoreKind};

//! Discrete choice microsimulation for the U-Engine ecosystem.
//!
//! Evaluates utility specifications over chooser × alternative interaction
//! datasets, simulates multinomial logit choices, and schedules joint tour
//! time windows against per-person timetables.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `Table`, `UtilitySpec`, `Window`,
//!   `AlternativeSet`, `TourGroup`, `SchedulingOutcome`
//! - **`expression`**: Sandboxed utility expression language and design
//!   matrix evaluation
//! - **`interaction`**: Chooser × alternative dataset builder, sampling,
//!   skim joins
//! - **`mnl`**: Multinomial logit probabilities and Monte Carlo choice
//! - **`timetable`**: Per-person free/occupied period store
//! - **`scheduler`**: Joint tour scheduling with chunking and
//!   conflict-free waves
//! - **`simulate`**: One-call choice simulation without a timetable
//! - **`validation`**: Tour group integrity checks
//!
//! # Logging
//!
//! Emits `tracing` events; installing a subscriber is the caller's job.
//!
//! # References
//!
//! - Train (2009), "Discrete Choice Methods with Simulation"
//! - Ben-Akiva & Lerman (1985), "Discrete Choice Analysis"

pub mod config;
pub mod error;
pub mod expression;
pub mod interaction;
pub mod mnl;
pub mod models;
pub mod scheduler;
pub mod simulate;
pub mod timetable;
pub mod validation;

pub use config::ChoiceConfig;
pub use error::{ChoiceError, EvalStage, Result};

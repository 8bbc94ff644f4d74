//! Joint time-window scheduling.
//!
//! Drives window choice for groups of choosers that share participants.
//! Groups are resolved one choice and one commit at a time per person, in
//! caller order within each group-size partition, so two groups touching
//! the same person can never race on the timetable.
//!
//! # Memory
//!
//! Groups are processed in chunks bounded by `ChoiceConfig::chunk_size`
//! interaction rows; each chunk is committed before the next is built.
//!
//! # Concurrency
//!
//! Single-threaded. The timetable is borrowed mutably for the whole call;
//! parallelizing waves would need per-person locking.
//!
//! # References
//!
//! - Bradley, Bowman & Griesenbeck (2010), "SACOG's activity-based travel
//!   demand simulation model", Journal of Choice Modelling 3(1)
//! - Vovsha, Petersen & Donnelly (2004), "Model for allocation of
//!   maintenance activities to household members", TRR 1894

mod chunk;
mod joint;

pub use joint::JointTourScheduler;

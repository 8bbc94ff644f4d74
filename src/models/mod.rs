//! Choice domain models.
//!
//! Provides the data types shared by the expression evaluator, the
//! interaction builder, the timetable, and the scheduler.
//!
//! # Domain Mappings
//!
//! | u-choice | Travel demand | Staff rostering | Clinic booking |
//! |----------|---------------|-----------------|----------------|
//! | Table (choosers) | Tours | Shifts to fill | Appointments |
//! | AlternativeSet | Departure/return windows | Shift slots | Visit slots |
//! | TourGroup | Household joint tour | Crew | Patient + escort |
//! | UtilitySpec | Mode/time-of-day model | Preference model | Slot preference |

mod group;
mod spec;
mod table;
mod window;

pub use group::{PersonId, SchedulingOutcome, TourChoice, TourGroup, UnscheduledGroup};
pub use spec::{SpecTerm, UtilitySpec, RAW_SCOPE_MARKER};
pub use table::{Column, Table};
pub use window::{AlternativeSet, Window};

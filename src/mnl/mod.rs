//! Multinomial logit simulation.
//!
//! - **`simulate`**: Block-wise probabilities and inverse-CDF choice
//! - **`random`**: Reproducible per-chooser random streams

mod random;
mod simulate;

pub use random::{Purpose, RandomChannels};
pub use simulate::{
    make_choices, probabilities, simulate, ChoiceBlocks, MnlOutcome, UTIL_CLAMP,
};

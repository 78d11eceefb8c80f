//! Password authentication

mod scram;

pub use scram::{ScramClient, ScramError, ScramState, MECHANISM as SCRAM_MECHANISM};

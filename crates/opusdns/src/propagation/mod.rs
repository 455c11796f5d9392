//! DNS propagation checks
//!
//! A record counts as propagated once the configured quorum of resolvers
//! returns the expected TXT value within the same polling round.

mod lookup;
mod verifier;

pub use lookup::{HickoryTxtLookup, LookupError, TxtLookup};
pub use verifier::{
    quorum_met, strip_quotes, to_absolute, PollOutcome, PropagationReport, PropagationVerifier,
};

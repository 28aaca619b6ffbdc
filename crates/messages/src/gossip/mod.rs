//! Round messages broadcast to every pulsar in the roster.
//!
//! Commit and reveal drive the round; the vector and pulse announcements
//! are sent after a round finalizes so peers can cross-check the result.

mod commit;
mod pulse;
mod reveal;
mod vector;

pub use commit::EntropySignaturePayload;
pub use pulse::PulsePayload;
pub use reveal::EntropyPayload;
pub use vector::VectorPayload;

//! Pattern playback.
//!
//! Translates pattern iterations into sound events, submits them to the
//! device, tracks them until they finish and loops the whole thing.

pub mod registry;
pub mod scheduler;
pub mod translator;
pub mod transport;

pub use registry::{ActiveSource, Registry, SourceKey, VoiceKind};
pub use scheduler::{release_envelope, schedule_event, SoundEvent};
pub use translator::{translate, Translation};
pub(crate) use transport::deadline_after;
pub use transport::{IterationReport, PendingTimer, TimerId, Transport, TransportState};

// State module - report assembly
// Per-test recorders, phase resolution, and session-wide aggregation

pub mod aggregator;
pub mod collection;
pub mod envelope;
pub mod phases;
pub mod recorder;
pub mod wire;

pub use aggregator::Aggregator;
pub use collection::{CollectFail, CollectionFailures};
pub use envelope::{CaseEnvelope, CaseSink, ModuleInfo};
pub use phases::{CapturedSection, Phase, PhaseAction, PhaseOutcome, PhaseReport, PhaseTracker};
pub use recorder::{OpenNode, Recorder, StepOutcome, Verdict};
pub use wire::{EnvelopeWriter, WireRecord, read_records};

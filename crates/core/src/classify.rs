//! Table-driven classification of native provider/writer status codes
//!
//! Providers and writers report failures as 32-bit status codes. This module
//! owns the single mapping from that code space onto the closed
//! [`FailureKind`] union, refined by the phase the set was in when the code
//! was observed. Centralizing the mapping keeps call sites from re-deriving
//! semantics from the native surface: supporting a new code means adding a
//! table row here.

use crate::error::FailureKind;
use crate::set_types::Phase;
use once_cell::sync::Lazy;
use std::fmt;
use std::ops::RangeInclusive;

/// Raw status code reported by a provider or writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeStatus(pub u32);

impl NativeStatus {
    /// The requestor called a method out of sequence ("busy")
    pub const BAD_STATE: NativeStatus = NativeStatus(0x8004_2301);
    /// A provider with this id is already registered
    pub const PROVIDER_ALREADY_REGISTERED: NativeStatus = NativeStatus(0x8004_2303);
    /// No provider is registered under the requested id
    pub const PROVIDER_NOT_REGISTERED: NativeStatus = NativeStatus(0x8004_2304);
    /// The provider vetoed the operation
    pub const PROVIDER_VETO: NativeStatus = NativeStatus(0x8004_2306);
    /// The provider is busy servicing another request
    pub const PROVIDER_IN_USE: NativeStatus = NativeStatus(0x8004_2307);
    /// The referenced object does not exist
    pub const OBJECT_NOT_FOUND: NativeStatus = NativeStatus(0x8004_2308);
    /// The volume is not supported for snapshots
    pub const VOLUME_NOT_SUPPORTED: NativeStatus = NativeStatus(0x8004_230C);
    /// The object being created already exists
    pub const OBJECT_ALREADY_EXISTS: NativeStatus = NativeStatus(0x8004_230D);
    /// The provider failed in an unforeseen way
    pub const UNEXPECTED_PROVIDER_ERROR: NativeStatus = NativeStatus(0x8004_230F);
    /// The per-set volume cap was exceeded
    pub const MAX_VOLUMES_REACHED: NativeStatus = NativeStatus(0x8004_2312);
    /// Flushing writes did not finish in time
    pub const FLUSH_WRITES_TIMEOUT: NativeStatus = NativeStatus(0x8004_2313);
    /// Holding writes did not finish in time
    pub const HOLD_WRITES_TIMEOUT: NativeStatus = NativeStatus(0x8004_2314);
    /// A writer failed in an unforeseen way
    pub const UNEXPECTED_WRITER_ERROR: NativeStatus = NativeStatus(0x8004_2315);
    /// Another snapshot set is already being created ("busy")
    pub const SNAPSHOT_SET_IN_PROGRESS: NativeStatus = NativeStatus(0x8004_2316);
    /// The per-volume snapshot cap was exceeded
    pub const MAX_SNAPSHOTS_REACHED: NativeStatus = NativeStatus(0x8004_2317);
    /// The writer infrastructure is not operating correctly
    pub const WRITER_INFRASTRUCTURE: NativeStatus = NativeStatus(0x8004_2318);
    /// A writer did not respond to an event
    pub const WRITER_NOT_RESPONDING: NativeStatus = NativeStatus(0x8004_2319);
    /// Insufficient storage-area space for the requested diff area
    pub const INSUFFICIENT_STORAGE: NativeStatus = NativeStatus(0x8004_231F);
    /// A writer produced an inconsistent snapshot
    pub const WRITER_INCONSISTENT: NativeStatus = NativeStatus(0x8004_23F0);
    /// A writer ran out of resources while handling the event
    pub const WRITER_OUT_OF_RESOURCES: NativeStatus = NativeStatus(0x8004_23F1);
    /// A writer timed out handling the freeze/thaw window
    pub const WRITER_TIMED_OUT: NativeStatus = NativeStatus(0x8004_23F2);
    /// A writer failed in a way worth retrying
    pub const WRITER_RETRYABLE: NativeStatus = NativeStatus(0x8004_23F3);
    /// A writer failed in a way not worth retrying
    pub const WRITER_NONRETRYABLE: NativeStatus = NativeStatus(0x8004_23F4);

    /// The raw 32-bit code
    pub fn code(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NativeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Classification target, before the reason string is attached.
///
/// `Busy` is the phase-sensitive bucket: resolved against the observing
/// phase in [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    ProviderNotRegistered,
    WriterTimeout,
    WriterInfrastructure,
    InsufficientStorage,
    AlreadyExists,
    Busy,
    Unexpected,
}

/// One classification rule: a code range and its target bucket.
///
/// First match wins, so narrow rows precede the broad range rows.
struct Rule {
    codes: RangeInclusive<u32>,
    target: Target,
}

impl Rule {
    const fn single(status: NativeStatus, target: Target) -> Self {
        Rule {
            codes: status.0..=status.0,
            target,
        }
    }

    const fn range(lo: u32, hi: u32, target: Target) -> Self {
        Rule {
            codes: lo..=hi,
            target,
        }
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::single(NativeStatus::PROVIDER_NOT_REGISTERED, Target::ProviderNotRegistered),
        Rule::single(NativeStatus::BAD_STATE, Target::Busy),
        Rule::single(NativeStatus::SNAPSHOT_SET_IN_PROGRESS, Target::Busy),
        Rule::single(NativeStatus::INSUFFICIENT_STORAGE, Target::InsufficientStorage),
        Rule::single(NativeStatus::OBJECT_ALREADY_EXISTS, Target::AlreadyExists),
        Rule::single(NativeStatus::PROVIDER_ALREADY_REGISTERED, Target::AlreadyExists),
        Rule::single(NativeStatus::FLUSH_WRITES_TIMEOUT, Target::WriterTimeout),
        Rule::single(NativeStatus::HOLD_WRITES_TIMEOUT, Target::WriterTimeout),
        Rule::single(NativeStatus::WRITER_NOT_RESPONDING, Target::WriterTimeout),
        Rule::single(NativeStatus::WRITER_INFRASTRUCTURE, Target::WriterInfrastructure),
        // Writer event-handling failures occupy their own code block. The
        // timeout and explicitly-retryable codes are retried; the rest of
        // the block is an infrastructure-grade failure.
        Rule::single(NativeStatus::WRITER_TIMED_OUT, Target::WriterTimeout),
        Rule::single(NativeStatus::WRITER_RETRYABLE, Target::WriterTimeout),
        Rule::range(0x8004_23F0, 0x8004_23FF, Target::WriterInfrastructure),
        // Everything else in the snapshot facility's code block is fatal
        // but carries no recovery semantics of its own.
        Rule::range(0x8004_2300, 0x8004_233F, Target::Unexpected),
    ]
});

/// Short description of a known native code, used in reason strings.
fn describe(status: NativeStatus) -> &'static str {
    match status {
        NativeStatus::BAD_STATE => "caller is in a bad state for this request",
        NativeStatus::PROVIDER_ALREADY_REGISTERED => "provider is already registered",
        NativeStatus::PROVIDER_NOT_REGISTERED => "no provider registered under the requested id",
        NativeStatus::PROVIDER_VETO => "provider vetoed the operation",
        NativeStatus::PROVIDER_IN_USE => "provider is busy servicing another request",
        NativeStatus::OBJECT_NOT_FOUND => "referenced object does not exist",
        NativeStatus::VOLUME_NOT_SUPPORTED => "volume is not supported for snapshots",
        NativeStatus::OBJECT_ALREADY_EXISTS => "object already exists",
        NativeStatus::UNEXPECTED_PROVIDER_ERROR => "provider failed unexpectedly",
        NativeStatus::MAX_VOLUMES_REACHED => "maximum number of volumes per set reached",
        NativeStatus::FLUSH_WRITES_TIMEOUT => "flushing writes timed out",
        NativeStatus::HOLD_WRITES_TIMEOUT => "holding writes timed out",
        NativeStatus::UNEXPECTED_WRITER_ERROR => "writer failed unexpectedly",
        NativeStatus::SNAPSHOT_SET_IN_PROGRESS => "another snapshot set is in progress",
        NativeStatus::MAX_SNAPSHOTS_REACHED => "maximum number of snapshots reached",
        NativeStatus::WRITER_INFRASTRUCTURE => "writer infrastructure is not operating correctly",
        NativeStatus::WRITER_NOT_RESPONDING => "writer did not respond to the event",
        NativeStatus::INSUFFICIENT_STORAGE => "insufficient space on the storage-area volume",
        NativeStatus::WRITER_INCONSISTENT => "writer reported an inconsistent snapshot",
        NativeStatus::WRITER_OUT_OF_RESOURCES => "writer ran out of resources",
        NativeStatus::WRITER_TIMED_OUT => "writer timed out during the freeze window",
        NativeStatus::WRITER_RETRYABLE => "writer reported a transient failure",
        NativeStatus::WRITER_NONRETRYABLE => "writer reported a permanent failure",
        _ => "unrecognized native status",
    }
}

/// Classify a native status code observed in `phase`.
///
/// The mapping is table-driven; the only phase-sensitive rows are the
/// "busy" codes: a busy signal received before `Prepared` means the caller
/// sequenced its requests wrong, while a busy signal after the set is
/// prepared points at something genuinely unexpected underneath.
pub fn classify(status: NativeStatus, phase: Phase) -> FailureKind {
    let reason = format!("{} ({})", describe(status), status);
    let target = RULES
        .iter()
        .find(|rule| rule.codes.contains(&status.0))
        .map(|rule| rule.target)
        .unwrap_or(Target::Unexpected);

    match target {
        Target::ProviderNotRegistered => FailureKind::ProviderNotRegistered { reason },
        Target::WriterTimeout => FailureKind::WriterTimeout { reason },
        Target::WriterInfrastructure => FailureKind::WriterInfrastructureFailure { reason },
        Target::InsufficientStorage => FailureKind::InsufficientStorage { reason },
        Target::AlreadyExists => FailureKind::ObjectAlreadyExists { reason },
        Target::Busy => {
            if phase.has_reached(Phase::Prepared) {
                FailureKind::Unexpected { reason }
            } else {
                FailureKind::InvalidSequence { reason }
            }
        }
        Target::Unexpected => FailureKind::Unexpected { reason },
    }
}

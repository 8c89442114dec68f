use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which submission path an operation arrived through.
///
/// The kind selects the queue an operation travels on and whether the
/// dispatcher hands a completion marker back through a result channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Caller blocks until the operation finishes or its wait budget runs out.
    Sync,
    /// Caller is acknowledged immediately and polls status afterwards.
    Async,
}

impl OperationKind {
    /// Lowercase label used in logs and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work submitted by a client.
///
/// Identity is the caller-supplied `id`. Uniqueness is enforced when the
/// operation is admitted, not by the queues that carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Caller-supplied identifier.
    pub id: String,
    /// Submission path.
    pub kind: OperationKind,
    /// Arbitrary structured request body.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Accepted shapes of a queue record.
///
/// Records written by this crate nest the body under `payload`. Producers
/// that write `{"id": ..., <body fields>}` flat, without a `kind`, are read
/// too: everything other than `id` and `kind` becomes the payload.
#[derive(Deserialize)]
struct QueueRecord {
    id: String,
    /// Validated, then superseded by the queue the record came from.
    #[allow(dead_code)]
    #[serde(default)]
    kind: Option<OperationKind>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl Operation {
    /// Builds an operation of the given kind.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: OperationKind, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
        }
    }

    /// Serializes the operation into its queue record form.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn to_record(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a record popped from the `queue` of the given kind.
    ///
    /// The queue decides the kind. A `kind` field, when present, must still
    /// name a valid kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not a JSON object with a string `id`.
    pub fn from_record(record: &str, queue: OperationKind) -> serde_json::Result<Self> {
        let QueueRecord {
            id, payload, rest, ..
        } = serde_json::from_str(record)?;
        Ok(Self {
            id,
            kind: queue,
            payload: payload.unwrap_or(serde_json::Value::Object(rest)),
        })
    }
}

/// Lifecycle state of an operation as seen through the status store.
///
/// Valid transitions for one id: `Unknown -> Pending -> Completed | Failed`.
/// `Unknown` is never written; it is how an absent record reads back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    /// No status record exists.
    Unknown,
    /// Admitted and queued or executing.
    Pending,
    /// Execution finished successfully.
    Completed,
    /// Execution returned an error or panicked.
    Failed,
}

impl OperationStatus {
    /// Text stored under `operation-status:{id}` and returned by the status endpoint.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Pending => "Pending",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Position in the lifecycle. Terminal states share the last rank.
    fn rank(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Pending => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    ///
    /// Re-asserting the same state is allowed (the dispatcher re-marks an
    /// admitted operation `Pending` when it starts executing it).
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self == next || (!self.is_terminal() && next.rank() > self.rank())
    }

    /// Reads an optional stored value, mapping absence to `Unknown`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseStatusError`] if the stored text is not a known state.
    pub fn from_stored(value: Option<&str>) -> Result<Self, ParseStatusError> {
        value.map_or(Ok(Self::Unknown), str::parse)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised operation status: {0:?}")]
pub struct ParseStatusError(pub String);

impl FromStr for OperationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unknown" => Ok(Self::Unknown),
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

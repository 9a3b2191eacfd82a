//! Domain model (identifiers, artifacts, lifecycle state, events, errors).

pub mod artifact;
pub mod errors;
pub mod events;
pub mod id_range;
pub mod ids;
pub mod record;
pub mod state;

pub use self::artifact::{ARTIFACT_EXTENSION, Artifact, GenerationRequest};
pub use self::errors::{CertError, ErrorKind};
pub use self::events::{StatusEvent, TerminalStatus};
pub use self::id_range::{IdRange, next_id};
pub use self::ids::{DownloadToken, Identifier};
pub use self::record::{Record, RecordView, validate_search_term};
pub use self::state::{EnsureStatus, GenerationState, TaskEntry};

//! Domain model (IDs, jobs, messages, actions, outcomes, errors, stats).

pub mod action;
pub mod actor;
pub mod errors;
pub mod ids;
pub mod job;
pub mod message;
pub mod outcome;
pub mod stats;

pub use action::{Action, ActionKind, MAX_POST_CHARS, ParseError, post_length};
pub use actor::{Actor, ActorDirectory, ActorId, DirectoryError, SocialCredentials};
pub use errors::{BlobError, IntegrationError, JobError, ProviderError, ValidationError};
pub use ids::{BlobId, IdParseError, JobId};
pub use job::{Job, NewJob};
pub use message::{Message, Role};
pub use outcome::{ActionOutcome, Artifact, OutcomeKind};
pub use stats::{Counters, Scope, StatKey, StatsSnapshot};

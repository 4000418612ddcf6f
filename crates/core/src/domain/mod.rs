// Domain Layer - Pure business logic and entities

pub mod agent;
pub mod error;
pub mod log_record;
pub mod repo;
pub mod signature;

// Re-exports
pub use agent::{ActivityState, AgentProcess, Pid, SandboxFlags, WrapperState};
pub use error::DomainError;
pub use log_record::{LifecycleKind, LogKind, ProcessLifecycleEvent, ProcessSnapshot};
pub use repo::{
    repo_id_for, DiscoveryError, GitObservation, RepoHealth, RepoId, RepoStatus, SpecialStates,
};
pub use signature::{AgentSignature, Matcher, MatcherKind, SignatureSet, SignatureSpec};

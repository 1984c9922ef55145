pub mod config;
pub mod decision;
pub mod documents;
pub mod error;
pub mod extract;
pub mod merge;
pub mod notify;
pub mod parser;
pub mod record;
pub mod runner;
pub mod storage;
pub mod storage_postgres;
pub mod summary;

// Re-export commonly used types
pub use config::EngineConfig;
pub use decision::{Decision, DecisionEngine, ReopenPolicy};
pub use documents::{
    DocumentClassifier, DocumentStatus, PatternClassifier, RequirementRules, RequirementsLookup,
    track,
};
pub use error::{ClaimError, Result};
#[cfg(feature = "rig")]
pub use extract::RigExtractor;
pub use extract::{DocumentKind, DocumentRef, Extractor};
pub use merge::{ClaimDraft, merge};
pub use notify::{LogNotifier, Notifier, TerminalNotification};
pub use parser::{Confidence, ParsedExtraction, parse_extraction};
pub use record::{
    ClaimDetails, ClaimDocuments, ClaimRecord, ClaimStatus, ClaimVersion, DamageSeverity,
    VersionSummary,
};
pub use runner::{
    ClaimRunner, Clock, FixedClock, SystemClock, Upload, UploadOutcome, UploadWarning,
};
pub use storage::{ClaimRepository, InMemoryClaimRepository};
pub use storage_postgres::PostgresClaimRepository;

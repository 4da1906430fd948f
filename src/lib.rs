pub mod clock;
pub mod config;
pub mod dictionary;
pub mod document;
pub mod error;
pub mod matcher;
pub mod rewrite;
pub mod scheduler;
pub mod segmenter;
pub mod session;
pub mod state;

// Re-export main types for convenient access
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::SessionConfig;
pub use dictionary::DictionaryEntry;
pub use error::SessionError;
pub use matcher::{Match, Trie};
pub use segmenter::{SentenceSegmenter, SentenceSpan};

// Re-export the host document model
pub use document::{Document, ElementKind, MarkerView, NodeKey, NodeKind, SelectionPoint, SpanNode};

// Re-export the session driver
pub use rewrite::{RewriteOutcome, StaleReason};
pub use scheduler::{DelayPolicy, Delivery, Scheduler};
pub use session::{ProcessMode, Session, TickReport, Trigger};
pub use state::{ReplacementRecord, SentenceId};

//! Domain types shared by the conversion pipeline and the CLI.
//!
//! Everything in this crate is pure: no filesystem access, no process
//! invocation. The pipeline crate threads these values through its stages.

pub mod error;
pub mod naming;
pub mod ordering;
pub mod scanner;
pub mod session;

pub use error::{ModelError, Result};
pub use naming::{TaskId, canonical_event_log_path, event_log_file_name};
pub use ordering::RunOrderOutcome;
pub use scanner::{Correction, ManufacturerProfile, ReferenceTable, ScannerTags};
pub use session::{Modality, SubjectSession};

//! Text Patcher: deterministic, ordered text edits against a single file
//!
//! Loads one UTF-8 file in full, applies an ordered list of patch operations
//! in memory, and writes the result back atomically.
//!
//! # Architecture
//!
//! Both kinds of [`PatchOperation`] compile down to a single primitive:
//! a byte-span splice on a [`SourceDocument`]. Content-anchored edits
//! (`WholeTextReplace`) find their spans by exact substring match;
//! position-anchored edits (`LineRangeReplace`) find them by line index.
//!
//! # Safety
//!
//! - Line terminators are never normalized
//! - Atomic file writes (tempfile + fsync + rename)
//! - A fatal error aborts the run before anything is written
//! - Every operation reports whether it applied, so no-ops are visible
//!
//! # Example
//!
//! ```no_run
//! use text_patcher::{PatchOperation, SourceDocument};
//!
//! let mut doc = SourceDocument::load("lib/pages/registration_page.dart")?;
//! let op = PatchOperation::replace("return true;", "return canProceed;");
//!
//! let result = op.apply(&mut doc)?;
//! println!("{result}");
//! doc.save("lib/pages/registration_page.dart")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod document;
pub mod edit;
pub mod fuzzy;

// Re-exports
pub use config::{
    apply_operations, load_from_path, load_from_str, patch_file, run_patch_set,
    ApplicationError, ConfigError, PatchReport, PatchSet, RunOptions,
};
pub use document::{DocumentError, LineEnding, SourceDocument};
pub use edit::{
    apply_line_range_replace, apply_whole_text_replace, LineGuard, Occurrence, PatchError,
    PatchOperation, PatchResult,
};
pub use fuzzy::NearMiss;

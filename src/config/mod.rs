pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_operations, patch_file, resolve_target, run_patch_set, ApplicationError, PatchReport,
    RunOptions,
};
pub use loader::{load_from_json_str, load_from_path, load_from_str, ConfigError};
pub use schema::{
    Guard, HashAlgorithm, Metadata, Operation, PatchDefinition, PatchSet, ValidationError,
    ValidationIssue,
};

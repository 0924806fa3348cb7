/*!
 * Remote job lifecycle management.
 *
 * This module owns the submit -> poll -> retry -> fetch path for every batch:
 *
 * - `models`: Job records, state machine states, and run reporting types
 * - `manager`: The concurrent job runner with admission control
 */

// Re-export main types for easier usage
pub use self::manager::JobRunner;
pub use self::models::{Job, JobReport, JobState, TranslatedResult};

// Submodules
pub mod manager;
pub mod models;

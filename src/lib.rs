//! smartorg - rule-driven file organization
//!
//! Scans a folder, routes each file through an ordered list of rules whose
//! destination templates use tags such as `{Year}`, `{Month}` or `{Size_Tier}`,
//! and copies or moves the files into the resulting folders. Every run can be
//! previewed first and undone afterwards.

pub mod cli;
pub mod config;
pub mod executor;
pub mod file_category;
pub mod output;
pub mod planner;
pub mod rule;
pub mod scan;
pub mod tags;
pub mod template;
pub mod undo;

pub use config::{CompiledFilters, CompiledSettings, ConfigError, Settings};
pub use executor::{ConflictPolicy, ExecuteOptions, ExecutionReport, Executor, Outcome};
pub use file_category::{Category, FileMapper};
pub use planner::{OperationKind, Plan, PlannedOperation, Planner};
pub use rule::{Profile, Rule};
pub use scan::{FileRecord, Scanner};
pub use tags::{SizeTiers, Tag};
pub use template::Template;
pub use undo::{UndoManager, UndoReport};

pub use cli::{Command, RunStatus, run};

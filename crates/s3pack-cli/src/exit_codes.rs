//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.
//! Code 2 is left to clap for usage errors.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Not found - chart version, index or object does not exist
pub const NOT_FOUND: i32 = 3;

/// Conflict - object already exists or index kept changing
pub const CONFLICT: i32 = 4;

/// Chart error - invalid chart archive or Chart.yaml
pub const CHART_ERROR: i32 = 5;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 6;

/// Artifact deleted but index not updated; needs manual repair
pub const RECONCILE_REQUIRED: i32 = 7;

/// Data error - remote index is not a valid document (sysexits EX_DATAERR)
pub const DATA_ERROR: i32 = 65;

/// Object store unreachable or refused the request (sysexits EX_UNAVAILABLE)
pub const UNAVAILABLE: i32 = 69;

/// Configuration error - unknown repository or bad config (sysexits EX_CONFIG)
pub const CONFIG_ERROR: i32 = 78;

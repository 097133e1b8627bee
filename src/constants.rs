//! # System Constants
//!
//! Reason codes, task directory names, and operational defaults shared by the
//! classifier, sequencer, and fixup orchestrator.

/// Reason codes attached to classification results
pub mod reason_codes {
    /// Object exists on the target
    pub const PRESENT_ON_TARGET: &str = "PRESENT_ON_TARGET";
    /// Object is absent from the target and can be created
    pub const MISSING_ON_TARGET: &str = "MISSING_ON_TARGET";
    /// Object depends (transitively) on an unsupported object
    pub const DEPENDS_ON_UNSUPPORTED: &str = "DEPENDS_ON_UNSUPPORTED";
    /// Unsupported type-conversion root whose conversion is done on the target
    pub const TYPE_CONVERTED: &str = "TYPE_CONVERTED";
    /// Unsupported type-conversion root still awaiting conversion
    pub const TYPE_CONVERSION_PENDING: &str = "TYPE_CONVERSION_PENDING";
    /// Object maps to more than one target through remap rules
    pub const REMAP_CONFLICT: &str = "REMAP_CONFLICT";
}

/// Subdirectory names in the remediation task tree
pub mod task_dirs {
    pub const GRANTS: &str = "grants";
    pub const TABLE_ALTER: &str = "table_alter";
    /// Default name of the archive directory for completed tasks
    pub const DONE: &str = "done";
    /// Extension of remediation scripts
    pub const SCRIPT_EXTENSION: &str = "sql";
}

/// Operational defaults
pub mod system {
    pub const DEFAULT_MAX_ROUNDS: u32 = 3;
    pub const DEFAULT_MAX_WORKERS: usize = 4;
    pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 300;
    pub const DEFAULT_DIAGNOSTIC_MAX_LEN: usize = 500;
    pub const ENV_VAR: &str = "FIXUP_ENV";
    pub const CONFIG_PATH_ENV_VAR: &str = "FIXUP_CONFIG_PATH";
    pub const ENV_PREFIX: &str = "FIXUP";
}

//! Exit codes for the cg-core CLI.
//!
//! Exit codes communicate the outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0: Success
//! - 10-19: User/input errors (recoverable by fixing arguments, config, or data)
//! - 20-29: Internal errors (bugs, should be reported)

use cg_common::{Error, ErrorCategory};

/// Exit codes for cg-core operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Ok = 0,

    // ========================================================================
    // User / Input Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Invalid configuration or impossible model dimensions
    ConfigError = 11,

    /// Missing or malformed input data
    DataError = 12,

    /// Covariance factorisation failed or the sampler misbehaved
    NumericError = 13,

    /// Traces or reports could not be written
    PersistenceError = 14,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Ok
    }

    /// Check if this exit code is a user/input error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Ok => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::DataError => "ERR_DATA",
            ExitCode::NumericError => "ERR_NUMERIC",
            ExitCode::PersistenceError => "ERR_PERSISTENCE",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Exit code for a pipeline error, by category.
    pub fn for_error(err: &Error) -> ExitCode {
        match err.category() {
            ErrorCategory::Configuration => ExitCode::ConfigError,
            ErrorCategory::DataQuality => ExitCode::DataError,
            ErrorCategory::NumericInstability => ExitCode::NumericError,
            ErrorCategory::Persistence => ExitCode::PersistenceError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ExitCode::Ok.as_i32(), 0);
        assert_eq!(ExitCode::ArgsError.as_i32(), 10);
        assert_eq!(ExitCode::ConfigError.as_i32(), 11);
        assert_eq!(ExitCode::DataError.as_i32(), 12);
        assert_eq!(ExitCode::NumericError.as_i32(), 13);
        assert_eq!(ExitCode::PersistenceError.as_i32(), 14);
        assert_eq!(ExitCode::InternalError.as_i32(), 20);
    }

    #[test]
    fn error_categories_map_to_codes() {
        assert_eq!(
            ExitCode::for_error(&Error::NoReferencePoints),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::for_error(&Error::data_quality("population", "negative")),
            ExitCode::DataError
        );
        assert_eq!(
            ExitCode::for_error(&Error::NotPositiveDefinite("3x3".into())),
            ExitCode::NumericError
        );
        assert!(ExitCode::ConfigError.is_user_error());
        assert!(ExitCode::InternalError.is_internal_error());
        assert!(ExitCode::Ok.is_success());
    }

    #[test]
    fn display_includes_name_and_number() {
        assert_eq!(ExitCode::DataError.to_string(), "ERR_DATA (12)");
    }
}

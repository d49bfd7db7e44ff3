//! Structured core error taxonomy.
//!
//! A single enum carries both a diagnostic message and a stable numeric
//! status code (§6/§7) rather than a mutable "current error" string slot
//! and ad hoc formatting at every call site.

use thiserror::Error;

/// Numeric status codes returned by every core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    Generic = -1,
    File = -2,
    Model = -3,
    Memory = -4,
    Input = -5,
}

/// The kinds of failure a core operation can report.
///
/// Each variant carries an owned diagnostic string rather than formatting
/// one lazily at the print site, so the context's "last error" slot is just
/// `Option<CiraError>`.
#[derive(Debug, Error, Clone)]
pub enum CiraError {
    #[error("{0}")]
    Input(String),
    #[error("{0}")]
    File(String),
    #[error("{0}")]
    Model(String),
    #[error("{0}")]
    Memory(String),
    #[error("{0}")]
    Generic(String),
}

impl CiraError {
    pub fn status(&self) -> StatusCode {
        match self {
            CiraError::Input(_) => StatusCode::Input,
            CiraError::File(_) => StatusCode::File,
            CiraError::Model(_) => StatusCode::Model,
            CiraError::Memory(_) => StatusCode::Memory,
            CiraError::Generic(_) => StatusCode::Generic,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CiraError::Input(m)
            | CiraError::File(m)
            | CiraError::Model(m)
            | CiraError::Memory(m)
            | CiraError::Generic(m) => m,
        }
    }
}

pub type CiraResult<T> = Result<T, CiraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_contract() {
        assert_eq!(StatusCode::Ok as i32, 0);
        assert_eq!(StatusCode::Generic as i32, -1);
        assert_eq!(StatusCode::File as i32, -2);
        assert_eq!(StatusCode::Model as i32, -3);
        assert_eq!(StatusCode::Memory as i32, -4);
        assert_eq!(StatusCode::Input as i32, -5);
    }

    #[test]
    fn variant_reports_its_status() {
        assert_eq!(
            CiraError::Input("bad".into()).status(),
            StatusCode::Input
        );
        assert_eq!(
            CiraError::Model("no backend".into()).status(),
            StatusCode::Model
        );
    }
}

//! Composite face ids.
//!
//! A stored face is keyed by `"{reg_no}_{name}"`. The registration number is
//! everything before the first underscore; the name is the rest, so names
//! may themselves contain underscores.

use std::fmt;

const SEPARATOR: char = '_';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceId {
    pub reg_no: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FaceIdError {
    #[error("face id {0:?} has no '_' separator")]
    MissingSeparator(String),
    #[error("registration number must not be empty or contain '_'")]
    InvalidRegNo,
    #[error("name must not be empty")]
    EmptyName,
}

impl FaceId {
    /// Build an id from its parts.
    ///
    /// The registration number may not contain the separator, otherwise the
    /// id would not parse back to the same parts.
    pub fn new(reg_no: impl Into<String>, name: impl Into<String>) -> Result<Self, FaceIdError> {
        let reg_no = reg_no.into();
        let name = name.into();
        if reg_no.is_empty() || reg_no.contains(SEPARATOR) {
            return Err(FaceIdError::InvalidRegNo);
        }
        if name.is_empty() {
            return Err(FaceIdError::EmptyName);
        }
        Ok(Self { reg_no, name })
    }

    /// Split a stored id on its first underscore.
    pub fn parse(id: &str) -> Result<Self, FaceIdError> {
        let (reg_no, name) = id
            .split_once(SEPARATOR)
            .ok_or_else(|| FaceIdError::MissingSeparator(id.to_string()))?;
        Ok(Self {
            reg_no: reg_no.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.reg_no, self.name)
    }
}

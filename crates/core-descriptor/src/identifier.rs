//! Identifier validation shared by plug-in ids, extension point ids, and
//! extension ids: non-empty, printable ASCII, at most 63 bytes.

const MAX_LEN: usize = 63;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier must not be empty")]
    Empty,
    #[error("identifier {0:?} exceeds {MAX_LEN} bytes")]
    TooLong(String),
    #[error("identifier {0:?} contains a non-printable-ASCII byte")]
    NotPrintableAscii(String),
}

pub fn validate_identifier(id: &str) -> Result<(), IdentifierError> {
    if id.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if id.len() > MAX_LEN {
        return Err(IdentifierError::TooLong(id.to_string()));
    }
    if !id.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        return Err(IdentifierError::NotPrintableAscii(id.to_string()));
    }
    Ok(())
}

use std::fmt;

/// Stable integer status codes, part of the external ABI (spec.md §6/§7).
///
/// These numbers must never be renumbered: `0` success, `2` codec error on a
/// block, `3` input file open failure, `5` output file open failure. `9` is
/// this crate's single addition for the malformed-input family that spec.md
/// §7 describes but never assigns a code to in §6; 1 and 4 stay unassigned,
/// reserved the way spec.md says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    CodecError = 2,
    InputOpenError = 3,
    OutputOpenError = 5,
    Malformed = 9,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Malformed input: unknown data/compression type, shape/block-shape
/// inconsistency, truncated file, non-monotonic offsets, ROI outside image.
#[derive(Debug)]
pub struct MalformedError(pub String);

impl fmt::Display for MalformedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed KLB input: {}", self.0)
    }
}
impl std::error::Error for MalformedError {}

/// A compressor or decompressor rejected a block.
#[derive(Debug)]
pub struct CodecError(pub String);

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "codec error: {}", self.0)
    }
}
impl std::error::Error for CodecError {}

/// The input file could not be opened for reading.
#[derive(Debug)]
pub struct InputOpenError(pub std::io::Error);

impl fmt::Display for InputOpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to open input file: {}", self.0)
    }
}
impl std::error::Error for InputOpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// The output file could not be created, or a write/seek against it failed.
#[derive(Debug)]
pub struct OutputOpenError(pub std::io::Error);

impl fmt::Display for OutputOpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to write output file: {}", self.0)
    }
}
impl std::error::Error for OutputOpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Resolve the stable status code an `anyhow::Error` corresponds to, by
/// downcasting to the marker error types above. Unrecognized errors (e.g. a
/// bug surfacing a bare `io::Error` that was never wrapped) map to the
/// generic malformed/IO code rather than panicking, since this is consulted
/// at the program's outermost boundary.
pub fn status_code(err: &anyhow::Error) -> Status {
    if err.downcast_ref::<CodecError>().is_some() {
        Status::CodecError
    } else if err.downcast_ref::<InputOpenError>().is_some() {
        Status::InputOpenError
    } else if err.downcast_ref::<OutputOpenError>().is_some() {
        Status::OutputOpenError
    } else {
        Status::Malformed
    }
}

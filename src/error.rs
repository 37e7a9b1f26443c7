//! Runtime error and exception definitions

use std::{fmt, io};

use thiserror::Error;

/// Exception kinds recognized by the virtual machine.
///
/// Instruction handlers raise these; the dispatcher catches them at
/// instruction granularity and enters the throw/unwind flow. A kind that
/// unwinds past the outermost frame terminates the run as
/// [`VmError::Uncaught`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[non_exhaustive]
pub enum Exception {
    /// A null reference was dereferenced.
    NullPointer = 0x01,
    /// An isolation, structural or type-confusion check failed.
    Security = 0x02,
    /// A reference array store with an assignment-incompatible source.
    ArrayStore = 0x03,
    /// An array access with a negative or out-of-range index.
    ArrayIndexOutOfBounds = 0x04,
    /// A non-array index was out of range.
    IndexOutOfBounds = 0x05,
    /// An array was created with a negative length.
    NegativeArraySize = 0x06,
    /// A `checkcast` against an incompatible target type.
    ClassCast = 0x07,
    /// Division or remainder with a zero divisor.
    Arithmetic = 0x08,
    /// A push beyond the operand-stack limit or frame area.
    StackOverflow = 0x09,
    /// A pop below the operand-stack base.
    StackUnderflow = 0x0a,
    /// A structural inconsistency in executed bytecode.
    Runtime = 0x0b,
    /// The persistent store failed.
    Io = 0x0c,
    /// A stubbed native service was invoked.
    NotYetImplemented = 0x0d,
    /// An allocation exceeded the live-object registry capacity.
    FullMemory = 0x0e,
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl From<io::Error> for Exception {
    fn from(_: io::Error) -> Self {
        Self::Io
    }
}

impl From<Exception> for io::Error {
    fn from(e: Exception) -> Self {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

/// Run-terminating interpreter error variants.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum VmError {
    /// An exception unwound past the outermost frame.
    #[error("uncaught exception: {0}")]
    Uncaught(Exception),
    /// The requested package id has no installed image.
    #[error("package {0} is not installed")]
    PackageNotFound(u8),
    /// The entry-point coordinates did not resolve to a method.
    #[error("entry point does not resolve to a method")]
    InvalidEntryPoint,
}

impl VmError {
    /// Return the uncaught exception kind, if applicable.
    pub const fn exception(&self) -> Option<Exception> {
        match self {
            Self::Uncaught(e) => Some(*e),
            _ => None,
        }
    }
}

impl From<Exception> for VmError {
    fn from(e: Exception) -> Self {
        Self::Uncaught(e)
    }
}

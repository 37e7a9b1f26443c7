//! The `impdep1` native-call contract.
//!
//! `impdep1` pops a 16-bit identifier and invokes the host function of
//! that identifier with the current execution context. The identifiers
//! are named here; their bodies are stubs that fail with
//! not-yet-implemented when called.

use tracing::debug;

use super::Interpreter;
use crate::error::Exception;
use crate::storage::Store;

/// Host-function identifiers reachable through `impdep1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
#[allow(missing_docs)]
pub enum NativeId {
    ArrayCopy = 0x00,
    ArrayCopyNonAtomic = 0x01,
    ArrayFill = 0x02,
    ArrayFillNonAtomic = 0x03,
    ArrayCompare = 0x04,
    ArrayFind = 0x05,
    BeginTransaction = 0x06,
    CommitTransaction = 0x07,
    AbortTransaction = 0x08,
    TransactionDepth = 0x09,
    UnusedCommitCapacity = 0x0a,
    MaxCommitCapacity = 0x0b,
    MakeTransientBooleanArray = 0x0c,
    MakeTransientByteArray = 0x0d,
    MakeTransientShortArray = 0x0e,
    MakeTransientIntArray = 0x0f,
    MakeTransientObjectArray = 0x10,
    MakeGlobalArray = 0x11,
    SelectingApplet = 0x12,
    GetAid = 0x13,
    IsAppletActive = 0x14,
    PreviousContextAid = 0x15,
    AvailableMemory = 0x16,
    ShareableInterfaceObject = 0x17,
    AssignedChannel = 0x18,
    IsObjectDeletionSupported = 0x19,
    RequestObjectDeletion = 0x1a,
    IsTransient = 0x1b,
    AssertIntegrity = 0x1c,
    IsIntegritySensitive = 0x1d,
    IsIntegritySensitiveArraysSupported = 0x1e,
    MakeIntegritySensitiveArray = 0x1f,
    ClearArray = 0x20,
}

impl TryFrom<u16> for NativeId {
    type Error = Exception;

    fn try_from(id: u16) -> Result<Self, Exception> {
        use NativeId::*;

        const TABLE: [NativeId; 33] = [
            ArrayCopy,
            ArrayCopyNonAtomic,
            ArrayFill,
            ArrayFillNonAtomic,
            ArrayCompare,
            ArrayFind,
            BeginTransaction,
            CommitTransaction,
            AbortTransaction,
            TransactionDepth,
            UnusedCommitCapacity,
            MaxCommitCapacity,
            MakeTransientBooleanArray,
            MakeTransientByteArray,
            MakeTransientShortArray,
            MakeTransientIntArray,
            MakeTransientObjectArray,
            MakeGlobalArray,
            SelectingApplet,
            GetAid,
            IsAppletActive,
            PreviousContextAid,
            AvailableMemory,
            ShareableInterfaceObject,
            AssignedChannel,
            IsObjectDeletionSupported,
            RequestObjectDeletion,
            IsTransient,
            AssertIntegrity,
            IsIntegritySensitive,
            IsIntegritySensitiveArraysSupported,
            MakeIntegritySensitiveArray,
            ClearArray,
        ];

        TABLE
            .get(id as usize)
            .copied()
            .ok_or(Exception::Security)
    }
}

impl<S> Interpreter<S>
where
    S: Store,
{
    /// `impdep1`: pop the host-function identifier and dispatch.
    pub(super) fn impdep1(&mut self) -> Result<(), Exception> {
        let id = self.stack.pop_short()? as u16;
        let native = NativeId::try_from(id)?;

        debug!(?native, "native call");
        self.native_call(native)
    }

    fn native_call(&mut self, _native: NativeId) -> Result<(), Exception> {
        // every host function of the contract is a stub
        Err(Exception::NotYetImplemented)
    }
}

//! VM runtime context definitions

use crate::consts::{AppletId, PackageId};
use crate::error::Exception;

/// Execution context of one applet invocation.
///
/// The owning applet (the *security context*) is fixed for the lifetime of
/// the context; the executing-package stack changes on every invoke and
/// return that crosses a package boundary. The top of the stack is the
/// package whose bytecode the program counter points into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    applet: AppletId,
    packages: Vec<PackageId>,
}

impl CallContext {
    /// Create a context for an applet invocation starting in `package`.
    pub fn new(applet: AppletId, package: PackageId) -> Self {
        Self {
            applet,
            packages: vec![package],
        }
    }

    /// The owning applet id; the firewall key.
    pub const fn applet(&self) -> AppletId {
        self.applet
    }

    /// The currently executing package id.
    pub fn current_package(&self) -> Result<PackageId, Exception> {
        self.packages.last().copied().ok_or(Exception::Security)
    }

    /// Record a cross-package invoke.
    pub fn push_package(&mut self, package: PackageId) {
        self.packages.push(package);
    }

    /// Record the matching return.
    pub fn pop_package(&mut self) -> Result<(), Exception> {
        self.packages.pop().map(|_| ()).ok_or(Exception::Security)
    }

    /// Depth of the executing-package stack.
    pub fn package_depth(&self) -> usize {
        self.packages.len()
    }
}

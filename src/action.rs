/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::Deserialize;
use serde::Serialize;
use syscalls::Errno;

/// `SECCOMP_RET_USER_NOTIF` is not exposed by the `libc` crate yet.
pub(crate) const SECCOMP_RET_USER_NOTIF: u32 = 0x7fc0_0000;

/// The action taken when a rule matches a syscall (or, for the default
/// action, when no rule matches).
///
/// The kernel consumes an action as a 32-bit word with the kind in the high
/// bits and a 16-bit datum in the low bits. The datum only means something
/// for [`Action::Errno`], [`Action::Trace`], and [`Action::Notify`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Allows the syscall to be executed.
    Allow,

    /// Prevents the syscall from being executed and the kernel will kill the
    /// calling thread with `SIGSYS`.
    KillThread,

    /// Prevents the syscall from being executed and the kernel will kill the
    /// calling process with `SIGSYS`.
    KillProcess,

    /// Disallows the syscall and raises a catchable `SIGSYS` in the calling
    /// thread.
    Trap,

    /// Same as [`Action::Allow`] but logs the call.
    Log,

    /// Returns the given error number instead of executing the syscall.
    Errno(u16),

    /// If the thread is being ptraced and the tracing process specified
    /// `PTRACE_O_TRACESECCOMP`, notifies the tracer via
    /// `PTRACE_EVENT_SECCOMP` carrying the given value. Without a tracer the
    /// syscall fails with `ENOSYS`.
    Trace(u16),

    /// Forwards the syscall to a user-space supervisor attached to the
    /// listener descriptor. Without a supervisor the syscall fails with
    /// `ENOSYS`.
    Notify(u16),
}

impl From<Action> for u32 {
    fn from(action: Action) -> u32 {
        match action {
            Action::Allow => libc::SECCOMP_RET_ALLOW,
            Action::KillThread => libc::SECCOMP_RET_KILL_THREAD,
            Action::KillProcess => libc::SECCOMP_RET_KILL_PROCESS,
            Action::Trap => libc::SECCOMP_RET_TRAP,
            Action::Log => libc::SECCOMP_RET_LOG,
            Action::Errno(x) => libc::SECCOMP_RET_ERRNO | (u32::from(x) & libc::SECCOMP_RET_DATA),
            Action::Trace(x) => libc::SECCOMP_RET_TRACE | (u32::from(x) & libc::SECCOMP_RET_DATA),
            Action::Notify(x) => SECCOMP_RET_USER_NOTIF | (u32::from(x) & libc::SECCOMP_RET_DATA),
        }
    }
}

impl Action {
    /// The kind constant without the datum. This is what the kernel's
    /// action-availability probe expects.
    pub(crate) fn kind_word(self) -> u32 {
        match self {
            Action::Allow => libc::SECCOMP_RET_ALLOW,
            Action::KillThread => libc::SECCOMP_RET_KILL_THREAD,
            Action::KillProcess => libc::SECCOMP_RET_KILL_PROCESS,
            Action::Trap => libc::SECCOMP_RET_TRAP,
            Action::Log => libc::SECCOMP_RET_LOG,
            Action::Errno(_) => libc::SECCOMP_RET_ERRNO,
            Action::Trace(_) => libc::SECCOMP_RET_TRACE,
            Action::Notify(_) => SECCOMP_RET_USER_NOTIF,
        }
    }
}

impl From<Errno> for Action {
    /// Converts an errno into the action that makes the syscall fail with it.
    fn from(err: Errno) -> Self {
        Action::Errno(err.into_raw() as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words() {
        assert_eq!(u32::from(Action::KillThread), 0);
        assert_eq!(u32::from(Action::KillProcess), 0x8000_0000);
        assert_eq!(u32::from(Action::Allow), 0x7fff_0000);
        assert_eq!(u32::from(Action::Log), 0x7ffc_0000);
        assert_eq!(u32::from(Action::Trap), 0x0003_0000);
    }

    #[test]
    fn words_carry_the_datum() {
        assert_eq!(u32::from(Action::Errno(0x42)), 0x0005_0042);
        assert_eq!(u32::from(Action::Trace(0x42)), 0x7ff0_0042);
        assert_eq!(u32::from(Action::Notify(7)), 0x7fc0_0007);
        assert_eq!(u32::from(Action::from(Errno::EPERM)), 0x0005_0001);
    }

    #[test]
    fn kind_word_strips_the_datum() {
        assert_eq!(Action::Errno(0x42).kind_word(), 0x0005_0000);
        assert_eq!(Action::Trace(1).kind_word(), 0x7ff0_0000);
        assert_eq!(Action::Notify(1).kind_word(), 0x7fc0_0000);
        assert_eq!(Action::Allow.kind_word(), u32::from(Action::Allow));
    }
}

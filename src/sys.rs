/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Raw wrappers around `seccomp(2)` and the `prctl(2)` bit it depends on.
//! This is deliberately a very thin layer; everything here maps one-to-one
//! onto a kernel operation.

use syscalls::Errno;

/// Defined in `/include/uapi/linux/seccomp.h`.
#[allow(missing_docs)]
pub const SECCOMP_SET_MODE_STRICT: u32 = 0;
#[allow(missing_docs)]
pub const SECCOMP_SET_MODE_FILTER: u32 = 1;
#[allow(missing_docs)]
pub const SECCOMP_GET_ACTION_AVAIL: u32 = 2;
#[allow(missing_docs)]
pub const SECCOMP_GET_NOTIF_SIZES: u32 = 3;

/// The record the kernel hands a filter for every syscall. Offsets into
/// this layout are what the generated `Load` instructions read.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(C)]
pub struct seccomp_data {
    /// The syscall number.
    pub nr: i32,

    /// The syscall convention as an `AUDIT_ARCH_*` value.
    pub arch: u32,

    /// The instruction pointer at the time of the syscall.
    pub instruction_pointer: u64,

    /// Up to 6 syscall arguments, always stored as 64-bit values regardless
    /// of the architecture.
    pub args: [u64; 6],
}

/// Sizes of the user-space notification structures, as reported by the
/// running kernel. See [`notif_sizes`].
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[repr(C)]
pub struct seccomp_notif_sizes {
    /// Size of the notification structure.
    pub seccomp_notif: u16,

    /// Size of the notification response structure.
    pub seccomp_notif_resp: u16,

    /// Size of [`seccomp_data`].
    pub seccomp_data: u16,
}

pub(crate) fn seccomp(op: u32, flags: u32, args: *mut libc::c_void) -> Result<i64, Errno> {
    Errno::result(unsafe { libc::syscall(libc::SYS_seccomp, op, flags, args) })
}

/// Probes whether the running kernel accepts the given action kind word.
///
/// The kernel treats unknown actions as kill-process, so a filter built
/// with an action the kernel does not know would not do what the caller
/// asked; compilation refuses it up front instead.
pub fn action_available(kind: u32) -> bool {
    let mut action = kind;
    seccomp(
        SECCOMP_GET_ACTION_AVAIL,
        0,
        &mut action as *mut u32 as *mut libc::c_void,
    )
    .is_ok()
}

/// Queries the sizes of the user-space notification structures.
///
/// Exposed for callers that pass the listener descriptor to a supervisor;
/// nothing in this crate consumes the result.
pub fn notif_sizes() -> Result<seccomp_notif_sizes, Errno> {
    let mut sizes = seccomp_notif_sizes::default();
    seccomp(
        SECCOMP_GET_NOTIF_SIZES,
        0,
        &mut sizes as *mut seccomp_notif_sizes as *mut libc::c_void,
    )?;
    Ok(sizes)
}

/// Sets the no-new-privs bit on the current thread.
///
/// Installing a filter as an unprivileged process requires this, and the
/// bit cannot be cleared again. It is inherited across `fork` and `clone`.
pub fn no_new_privs() -> Result<(), Errno> {
    Errno::result(unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) }).map(drop)
}

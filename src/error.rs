/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Error handling.

use syscalls::Errno;
use thiserror::Error;

use crate::bpf::AssembleError;

/// An error from compiling or installing a filter.
///
/// Every error is terminal for the call that produced it: compilation
/// returns either a complete program or nothing, and installation either
/// takes effect or leaves the thread unchanged (except possibly for the
/// no-new-privs bit, which is harmless to leave set).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The running kernel does not recognize a requested action kind.
    #[error("action '{0}' unavailable")]
    ActionUnavailable(u32),

    /// The symbolic instruction stream could not be lowered to wire format.
    #[error(transparent)]
    Assembly(#[from] AssembleError),

    /// A kernel call failed.
    #[error(transparent)]
    Kernel(#[from] Errno),
}

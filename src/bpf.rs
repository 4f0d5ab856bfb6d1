/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The seccomp-BPF instruction layer.
//!
//! The code generator in this crate works on [`Instr`], a symbolic form
//! where jumps carry relative skip counts. [`assemble`] lowers that stream
//! into the kernel's `sock_filter` wire format, and [`Program`] holds the
//! lowered words and knows how to hand them to `seccomp(2)`.
//!
//! Seccomp-BPF is a subset of classic BPF: jumps only go forward (so
//! programs always terminate), there are no calls, and the machine only
//! operates on 32-bit words read out of [`crate::sys::seccomp_data`].

#![allow(non_snake_case)]

pub use libc::sock_filter;
use syscalls::Errno;
use thiserror::Error;

use crate::arch::Arch;
use crate::fd::Fd;
use crate::sys;

// See: /include/uapi/linux/bpf_common.h

// Instruction classes
#[allow(missing_docs)]
pub const BPF_LD: u16 = 0x00;
#[allow(missing_docs)]
pub const BPF_JMP: u16 = 0x05;
#[allow(missing_docs)]
pub const BPF_RET: u16 = 0x06;

// ld/ldx fields
#[allow(missing_docs)]
pub const BPF_W: u16 = 0x00;
#[allow(missing_docs)]
pub const BPF_ABS: u16 = 0x20;

// jmp fields
#[allow(missing_docs)]
pub const BPF_JA: u16 = 0x00;
#[allow(missing_docs)]
pub const BPF_JEQ: u16 = 0x10;
#[allow(missing_docs)]
pub const BPF_K: u16 = 0x00;

/// Maximum number of instructions in a single filter.
pub const BPF_MAXINSNS: usize = 4096;

/// Offset of `seccomp_data::nr` in bytes.
const SECCOMP_DATA_OFFSET_NR: u32 = 0;

/// Offset of `seccomp_data::arch` in bytes.
const SECCOMP_DATA_OFFSET_ARCH: u32 = 4;

/// Offset of `seccomp_data::instruction_pointer` in bytes.
const SECCOMP_DATA_OFFSET_IP: u32 = 8;

/// Offset of `seccomp_data::args` in bytes.
const SECCOMP_DATA_OFFSET_ARGS: u32 = 16;

// See: /include/uapi/linux/filter.h
#[allow(missing_docs)]
pub const fn BPF_STMT(code: u16, k: u32) -> sock_filter {
    sock_filter {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

/// A BPF jump instruction. `jt` and `jf` are the number of instructions
/// skipped when the comparison against `k` is true or false.
pub const fn BPF_JUMP(code: u16, k: u32, jt: u8, jf: u8) -> sock_filter {
    sock_filter { code, jt, jf, k }
}

bitflags::bitflags! {
    /// Flags for `SECCOMP_SET_MODE_FILTER`. See `seccomp(2)`.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
    pub struct FilterFlags: u32 {
        /// Synchronize all threads of the process to the same filter tree.
        const TSYNC = 1 << 0;
        /// Log all non-allow actions.
        const LOG = 1 << 1;
        /// Disable speculative store bypass mitigation.
        const SPEC_ALLOW = 1 << 2;
        /// Return a user-space notification listener descriptor.
        const NEW_LISTENER = 1 << 3;
        /// Like `TSYNC`, but fail with `ESRCH` instead of a thread id.
        const TSYNC_ESRCH = 1 << 4;
        /// Put the notifying thread in a killable state once the
        /// notification is received by the listener.
        const WAIT_KILLABLE_RECV = 1 << 5;
    }
}

/// A field of [`crate::sys::seccomp_data`] addressable by a [`Instr::Load`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Field {
    /// The syscall number.
    Nr,
    /// The audit architecture identifier.
    Arch,
    /// The instruction pointer.
    InstructionPointer,
    /// One of the six syscall arguments.
    Arg(usize),
}

/// Builds the 32-bit absolute load for one half of a `seccomp_data` field.
///
/// `high_half` selects the most significant 32 bits of a 64-bit field; for
/// the 32-bit `nr` and `arch` fields it is ignored. The half that sits at
/// the field's base offset depends on the target's endianness.
pub fn load_data_field(field: Field, high_half: bool, arch: Arch) -> Instr {
    let (offset, high_half) = match field {
        Field::Nr => (SECCOMP_DATA_OFFSET_NR, false),
        Field::Arch => (SECCOMP_DATA_OFFSET_ARCH, false),
        Field::InstructionPointer => (SECCOMP_DATA_OFFSET_IP, high_half),
        Field::Arg(i) => {
            debug_assert!(i < 6);
            (SECCOMP_DATA_OFFSET_ARGS + 8 * i as u32, high_half)
        }
    };
    if arch.is_little_endian() == high_half {
        Instr::Load(offset + 4)
    } else {
        Instr::Load(offset)
    }
}

/// The comparison performed by [`Instr::JumpIf`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cond {
    /// Jump `skip_true` when the accumulator equals the operand.
    Equal,
    /// Jump `skip_true` when the accumulator differs from the operand.
    NotEqual,
}

/// A symbolic seccomp-BPF instruction.
///
/// This is the form the code generator emits: skip counts are plain
/// integers relative to the following instruction, and the not-equal
/// comparison has not yet been rewritten into the kernel's equal-only
/// conditional.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Instr {
    /// 32-bit absolute load from `seccomp_data` into the accumulator.
    Load(u32),

    /// Conditional forward jump comparing the accumulator against `val`.
    JumpIf {
        /// The comparison to perform.
        cond: Cond,
        /// The constant operand.
        val: u32,
        /// Instructions skipped when the comparison holds.
        skip_true: u32,
        /// Instructions skipped when it does not.
        skip_false: u32,
    },

    /// Unconditional forward jump.
    Jump(u32),

    /// Terminates the filter, returning the given decision word.
    Ret(u32),
}

/// An error lowering symbolic instructions to wire format.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum AssembleError {
    /// A conditional skip count does not fit the 8-bit field of
    /// `sock_filter`.
    #[error("jump of {skip} at instruction {index} exceeds the 8-bit skip range")]
    SkipOutOfRange {
        /// Index of the offending instruction.
        index: usize,
        /// The skip count that did not fit.
        skip: u32,
    },
}

fn skip8(index: usize, skip: u32) -> Result<u8, AssembleError> {
    u8::try_from(skip).map_err(|_| AssembleError::SkipOutOfRange { index, skip })
}

/// Lowers a symbolic instruction stream into wire-format words.
///
/// `NotEqual` conditionals become a `JEQ` with the true and false skip
/// slots swapped. Conditional skips beyond 255 cannot be encoded and are
/// reported as an error; unconditional jumps carry a full 32-bit count.
pub fn assemble(instructions: &[Instr]) -> Result<Vec<sock_filter>, AssembleError> {
    let mut program = Vec::with_capacity(instructions.len());
    for (index, instr) in instructions.iter().enumerate() {
        program.push(match *instr {
            Instr::Load(offset) => BPF_STMT(BPF_LD + BPF_W + BPF_ABS, offset),
            Instr::JumpIf {
                cond,
                val,
                skip_true,
                skip_false,
            } => {
                let jt = skip8(index, skip_true)?;
                let jf = skip8(index, skip_false)?;
                match cond {
                    Cond::Equal => BPF_JUMP(BPF_JMP + BPF_JEQ + BPF_K, val, jt, jf),
                    Cond::NotEqual => BPF_JUMP(BPF_JMP + BPF_JEQ + BPF_K, val, jf, jt),
                }
            }
            Instr::Jump(skip) => BPF_STMT(BPF_JMP + BPF_JA, skip),
            Instr::Ret(val) => BPF_STMT(BPF_RET + BPF_K, val),
        });
    }
    Ok(program)
}

/// Seccomp-BPF program byte code.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Program {
    // The limit is BPF_MAXINSNS instructions, so a static array would work.
    // A Vec keeps appending infallible; the size is checked once at install.
    filter: Vec<sock_filter>,
}

impl Program {
    /// Creates a new, empty program. Empty programs are not valid and will
    /// fail to load.
    pub const fn new() -> Self {
        Self { filter: Vec::new() }
    }

    /// Appends a single instruction.
    pub fn push(&mut self, instruction: sock_filter) {
        self.filter.push(instruction);
    }

    /// Returns the number of instructions.
    pub fn len(&self) -> usize {
        self.filter.len()
    }

    /// Returns true if the program is empty.
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
    }

    /// Installs the program on the current thread via
    /// `SECCOMP_SET_MODE_FILTER`.
    ///
    /// Returns the raw value of the `seccomp(2)` call: the listener
    /// descriptor when [`FilterFlags::NEW_LISTENER`] is set, zero
    /// otherwise. The no-new-privs bit must already be set unless the
    /// caller has `CAP_SYS_ADMIN`.
    pub fn install(&self, flags: FilterFlags) -> Result<i32, Errno> {
        let len = self.filter.len();

        if len == 0 || len > BPF_MAXINSNS {
            return Err(Errno::EINVAL);
        }

        let prog = libc::sock_fprog {
            // Note: the length fits `u16` because of the check above.
            len: len as u16,
            filter: self.filter.as_ptr() as *mut _,
        };

        let value = sys::seccomp(
            sys::SECCOMP_SET_MODE_FILTER,
            flags.bits(),
            &prog as *const libc::sock_fprog as *mut libc::c_void,
        )?;

        Ok(value as i32)
    }

    /// Loads the program into the current thread.
    ///
    /// Once loaded, a filter can never be removed. Loading more filters
    /// chains them; every filter in the chain runs for every syscall and
    /// the most restrictive action wins.
    pub fn load(&self) -> Result<(), Errno> {
        self.install(FilterFlags::empty())?;
        Ok(())
    }

    /// Same as [`Program::load`] but requests a user-space notification
    /// listener. Meant to be used with `seccomp_unotify(2)`.
    pub fn load_and_listen(&self) -> Result<Fd, Errno> {
        let fd = self.install(FilterFlags::NEW_LISTENER)?;
        Ok(Fd::new(fd))
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<sock_filter>> for Program {
    fn from(filter: Vec<sock_filter>) -> Self {
        Self { filter }
    }
}

impl Extend<sock_filter> for Program {
    fn extend<T: IntoIterator<Item = sock_filter>>(&mut self, iter: T) {
        self.filter.extend(iter)
    }
}

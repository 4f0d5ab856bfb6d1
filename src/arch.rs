/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The table of filterable architectures.
//!
//! Every compiled filter targets exactly one architecture. The kernel hands
//! the filter an `AUDIT_ARCH_*` identifier with each syscall, and the
//! prologue emitted by [`crate::Policy::compile`] kills the process when it
//! does not match the target. The identifier also encodes the two properties
//! the code generator cares about: whether registers are 64 bits wide and
//! which endianness the `seccomp_data` halves are stored in.

use serde::Deserialize;
use serde::Serialize;

// These are defined in `/include/uapi/linux/elf-em.h`.
const EM_SPARC: u32 = 2;
const EM_386: u32 = 3;
const EM_MIPS: u32 = 8;
const EM_PPC: u32 = 20;
const EM_PPC64: u32 = 21;
const EM_S390: u32 = 22;
const EM_ARM: u32 = 40;
const EM_SPARCV9: u32 = 43;
const EM_X86_64: u32 = 62;
const EM_AARCH64: u32 = 183;
const EM_RISCV: u32 = 243;
const EM_LOONGARCH: u32 = 258;

// These are defined in `/include/uapi/linux/audit.h`.
const __AUDIT_ARCH_64BIT: u32 = 0x8000_0000;
const __AUDIT_ARCH_LE: u32 = 0x4000_0000;
const __AUDIT_ARCH_CONVENTION_MIPS64_N32: u32 = 0x2000_0000;

// These are defined in `/include/uapi/linux/audit.h`.
#[allow(missing_docs)]
pub const AUDIT_ARCH_X86: u32 = EM_386 | __AUDIT_ARCH_LE;
#[allow(missing_docs)]
pub const AUDIT_ARCH_X86_64: u32 = EM_X86_64 | __AUDIT_ARCH_64BIT | __AUDIT_ARCH_LE;
#[allow(missing_docs)]
pub const AUDIT_ARCH_ARM: u32 = EM_ARM | __AUDIT_ARCH_LE;
#[allow(missing_docs)]
pub const AUDIT_ARCH_ARMEB: u32 = EM_ARM;
#[allow(missing_docs)]
pub const AUDIT_ARCH_AARCH64: u32 = EM_AARCH64 | __AUDIT_ARCH_64BIT | __AUDIT_ARCH_LE;
#[allow(missing_docs)]
pub const AUDIT_ARCH_AARCH64BE: u32 = EM_AARCH64 | __AUDIT_ARCH_64BIT;
#[allow(missing_docs)]
pub const AUDIT_ARCH_LOONGARCH64: u32 = EM_LOONGARCH | __AUDIT_ARCH_64BIT | __AUDIT_ARCH_LE;
#[allow(missing_docs)]
pub const AUDIT_ARCH_MIPS: u32 = EM_MIPS;
#[allow(missing_docs)]
pub const AUDIT_ARCH_MIPSEL: u32 = EM_MIPS | __AUDIT_ARCH_LE;
#[allow(missing_docs)]
pub const AUDIT_ARCH_MIPS64: u32 = EM_MIPS | __AUDIT_ARCH_64BIT;
#[allow(missing_docs)]
pub const AUDIT_ARCH_MIPSEL64: u32 = EM_MIPS | __AUDIT_ARCH_64BIT | __AUDIT_ARCH_LE;
#[allow(missing_docs)]
pub const AUDIT_ARCH_MIPS64N32: u32 =
    EM_MIPS | __AUDIT_ARCH_64BIT | __AUDIT_ARCH_CONVENTION_MIPS64_N32;
#[allow(missing_docs)]
pub const AUDIT_ARCH_MIPSEL64N32: u32 =
    EM_MIPS | __AUDIT_ARCH_64BIT | __AUDIT_ARCH_LE | __AUDIT_ARCH_CONVENTION_MIPS64_N32;
#[allow(missing_docs)]
pub const AUDIT_ARCH_PPC: u32 = EM_PPC;
#[allow(missing_docs)]
pub const AUDIT_ARCH_PPC64: u32 = EM_PPC64 | __AUDIT_ARCH_64BIT;
#[allow(missing_docs)]
pub const AUDIT_ARCH_PPC64LE: u32 = EM_PPC64 | __AUDIT_ARCH_64BIT | __AUDIT_ARCH_LE;
#[allow(missing_docs)]
pub const AUDIT_ARCH_RISCV32: u32 = EM_RISCV | __AUDIT_ARCH_LE;
#[allow(missing_docs)]
pub const AUDIT_ARCH_RISCV64: u32 = EM_RISCV | __AUDIT_ARCH_64BIT | __AUDIT_ARCH_LE;
#[allow(missing_docs)]
pub const AUDIT_ARCH_S390: u32 = EM_S390;
#[allow(missing_docs)]
pub const AUDIT_ARCH_S390X: u32 = EM_S390 | __AUDIT_ARCH_64BIT;
#[allow(missing_docs)]
pub const AUDIT_ARCH_SPARC: u32 = EM_SPARC;
#[allow(missing_docs)]
pub const AUDIT_ARCH_SPARC64: u32 = EM_SPARCV9 | __AUDIT_ARCH_64BIT;

/// The target architecture of a filter.
///
/// The discriminant of each variant is the kernel's audit identifier for
/// that architecture, so converting to the value the prologue compares
/// against is a cast.
#[allow(non_camel_case_types, missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Arch {
    x86 = AUDIT_ARCH_X86,
    x86_64 = AUDIT_ARCH_X86_64,
    arm = AUDIT_ARCH_ARM,
    armeb = AUDIT_ARCH_ARMEB,
    aarch64 = AUDIT_ARCH_AARCH64,
    aarch64be = AUDIT_ARCH_AARCH64BE,
    loongarch64 = AUDIT_ARCH_LOONGARCH64,
    mips = AUDIT_ARCH_MIPS,
    mipsel = AUDIT_ARCH_MIPSEL,
    mips64 = AUDIT_ARCH_MIPS64,
    mipsel64 = AUDIT_ARCH_MIPSEL64,
    mips64n32 = AUDIT_ARCH_MIPS64N32,
    mipsel64n32 = AUDIT_ARCH_MIPSEL64N32,
    powerpc = AUDIT_ARCH_PPC,
    powerpc64 = AUDIT_ARCH_PPC64,
    powerpc64le = AUDIT_ARCH_PPC64LE,
    riscv32 = AUDIT_ARCH_RISCV32,
    riscv64 = AUDIT_ARCH_RISCV64,
    s390 = AUDIT_ARCH_S390,
    s390x = AUDIT_ARCH_S390X,
    sparc = AUDIT_ARCH_SPARC,
    sparc64 = AUDIT_ARCH_SPARC64,
}

impl Arch {
    #![allow(missing_docs)]

    #[cfg(target_arch = "x86")]
    pub const CURRENT: Arch = Self::x86;

    #[cfg(target_arch = "x86_64")]
    pub const CURRENT: Arch = Self::x86_64;

    #[cfg(target_arch = "arm")]
    pub const CURRENT: Arch = Self::arm;

    #[cfg(target_arch = "aarch64")]
    pub const CURRENT: Arch = Self::aarch64;

    #[cfg(target_arch = "loongarch64")]
    pub const CURRENT: Arch = Self::loongarch64;

    #[cfg(target_arch = "mips")]
    pub const CURRENT: Arch = Self::mips;

    #[cfg(target_arch = "mips64")]
    pub const CURRENT: Arch = Self::mips64;

    #[cfg(target_arch = "powerpc")]
    pub const CURRENT: Arch = Self::powerpc;

    #[cfg(target_arch = "powerpc64")]
    pub const CURRENT: Arch = Self::powerpc64;

    #[cfg(target_arch = "riscv64")]
    pub const CURRENT: Arch = Self::riscv64;

    #[cfg(target_arch = "s390x")]
    pub const CURRENT: Arch = Self::s390x;

    #[cfg(target_arch = "sparc64")]
    pub const CURRENT: Arch = Self::sparc64;

    /// Returns the kernel audit identifier the prologue compares against.
    pub const fn audit_arch(self) -> u32 {
        self as u32
    }

    /// Returns true if the kernel considers this architecture 64 bits wide.
    /// Syscall arguments then need two 32-bit loads per comparison.
    pub const fn is_64bit(self) -> bool {
        self as u32 & __AUDIT_ARCH_64BIT != 0
    }

    /// Returns true if the kernel considers this architecture little endian.
    /// This selects which half of a 64-bit `seccomp_data` field sits at the
    /// field's base offset.
    pub const fn is_little_endian(self) -> bool {
        self as u32 & __AUDIT_ARCH_LE != 0
    }
}

impl Default for Arch {
    fn default() -> Self {
        Self::CURRENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_values() {
        assert_eq!(Arch::x86.audit_arch(), 0x4000_0003);
        assert_eq!(Arch::x86_64.audit_arch(), 0xc000_003e);
        assert_eq!(Arch::aarch64.audit_arch(), 0xc000_00b7);
        assert_eq!(Arch::aarch64be.audit_arch(), 0x8000_00b7);
        assert_eq!(Arch::s390x.audit_arch(), 0x8000_0016);
    }

    #[test]
    fn width_and_endianness() {
        assert!(!Arch::x86.is_64bit());
        assert!(Arch::x86.is_little_endian());
        assert!(Arch::x86_64.is_64bit());
        assert!(Arch::x86_64.is_little_endian());
        assert!(Arch::s390x.is_64bit());
        assert!(!Arch::s390x.is_little_endian());
        assert!(!Arch::armeb.is_little_endian());
        assert!(!Arch::armeb.is_64bit());
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Syscall-call patterns and the relations the normalizer is built on.
//!
//! A [`Pattern`] describes a set of syscall invocations: a syscall number
//! plus an equality matcher for each of the six argument registers. Two
//! patterns [`match`][Pattern::matches] when some invocation satisfies
//! both. Matching is symmetric and reflexive but *not* transitive:
//! `(nr=1, arg0=1)` and `(nr=1, arg0=2)` both match `(nr=1, *)` without
//! matching each other. The normalizer leans on this relation heavily, so
//! both predicates work on plain copies and never allocate.

use serde::Deserialize;
use serde::Serialize;
use syscalls::Sysno;

use crate::arch::Arch;
use crate::bpf::load_data_field;
use crate::bpf::Cond;
use crate::bpf::Field;
use crate::bpf::Instr;

/// A matcher for a single syscall argument.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arg {
    /// Matches any value.
    #[default]
    Any,

    /// Matches only a bit-for-bit equal value, over the full register
    /// width of the target.
    Eq(u64),
}

impl Arg {
    /// Returns true for the wildcard matcher.
    pub const fn is_any(self) -> bool {
        matches!(self, Arg::Any)
    }
}

/// The smallest unit of a filter: one syscall number together with a
/// matcher for each of its six arguments.
///
/// The kernel ABI always materializes six argument slots, so the arity is
/// fixed; positions the caller does not care about stay [`Arg::Any`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern {
    /// The syscall number to match.
    pub nr: u32,

    /// The six argument matchers.
    pub args: [Arg; 6],
}

impl Pattern {
    /// A pattern matching every invocation of the given syscall number.
    pub const fn new(nr: u32) -> Self {
        Self {
            nr,
            args: [Arg::Any; 6],
        }
    }

    /// A pattern with explicit argument matchers.
    pub const fn with_args(nr: u32, args: [Arg; 6]) -> Self {
        Self { nr, args }
    }

    /// Constrains one argument position to an exact value.
    pub fn arg(mut self, index: usize, value: u64) -> Self {
        self.args[index] = Arg::Eq(value);
        self
    }

    /// Tells whether the two patterns can describe the same call: the
    /// numbers agree and every argument position is wildcard on either
    /// side or equal on both.
    pub fn matches(&self, other: &Pattern) -> bool {
        if self.nr != other.nr {
            return false;
        }
        self.args.iter().zip(&other.args).all(|(a, b)| match (a, b) {
            (Arg::Any, _) | (_, Arg::Any) => true,
            (Arg::Eq(x), Arg::Eq(y)) => x == y,
        })
    }

    /// Tells whether `self` is at least as specific as `other`: no
    /// position of `self` is wildcard where `other` is concrete.
    ///
    /// Only meaningful when [`Pattern::matches`] holds; the result for
    /// non-matching patterns carries no meaning.
    pub fn is_more_precise(&self, other: &Pattern) -> bool {
        self.args
            .iter()
            .zip(&other.args)
            .all(|(a, b)| !(a.is_any() && !b.is_any()))
    }

    /// Emits the test block for this pattern, built back to front.
    ///
    /// `d_match` is the distance from the end of the block to the rule's
    /// decision return; `d_nomiss` the distance to the start of whatever
    /// follows the rule. A fully successful predicate falls through (or
    /// jumps) to the decision, any failed test skips to `d_nomiss`.
    ///
    /// The last argument block built carries a trailing reload of the
    /// syscall number and the jump covering `d_match`; while that pair is
    /// being placed, `d_nomiss` is bumped by 2 so the argument tests skip
    /// over it.
    pub(crate) fn emit(&self, mut d_match: u32, mut d_nomiss: u32, arch: Arch) -> Vec<Instr> {
        if d_match == d_nomiss {
            return Vec::new();
        }
        let mut instructions: Vec<Instr> = Vec::new();
        for (i, arg) in self.args.iter().enumerate() {
            let Arg::Eq(value) = *arg else { continue };
            let closing_block = instructions.is_empty();
            let mut block = vec![load_data_field(Field::Arg(i), false, arch)];
            if closing_block {
                d_nomiss += 2;
            }
            if arch.is_64bit() {
                block.push(Instr::JumpIf {
                    cond: Cond::NotEqual,
                    val: value as u32,
                    skip_true: d_nomiss + 2,
                    skip_false: 0,
                });
                block.push(load_data_field(Field::Arg(i), true, arch));
                block.push(Instr::JumpIf {
                    cond: Cond::NotEqual,
                    val: (value >> 32) as u32,
                    skip_true: d_nomiss,
                    skip_false: 0,
                });
            } else {
                block.push(Instr::JumpIf {
                    cond: Cond::NotEqual,
                    val: value as u32,
                    skip_true: d_nomiss,
                    skip_false: 0,
                });
            }
            if closing_block {
                d_nomiss -= 2;
                block.push(load_data_field(Field::Nr, false, arch));
                block.push(Instr::Jump(d_match));
            }
            d_match += block.len() as u32;
            d_nomiss += block.len() as u32;
            block.append(&mut instructions);
            instructions = block;
        }

        // Lead with the syscall-number check.
        if instructions.is_empty() {
            // Every argument was a wildcard.
            instructions.push(Instr::JumpIf {
                cond: Cond::Equal,
                val: self.nr,
                skip_true: d_match,
                skip_false: d_nomiss,
            });
        } else {
            instructions.insert(
                0,
                Instr::JumpIf {
                    cond: Cond::NotEqual,
                    val: self.nr,
                    skip_true: d_nomiss,
                    skip_false: 0,
                },
            );
        }

        instructions
    }
}

impl From<Sysno> for Pattern {
    fn from(sysno: Sysno) -> Self {
        Self::new(sysno.id() as u32)
    }
}

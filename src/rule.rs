/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::Deserialize;
use serde::Serialize;
use tracing::trace;

use crate::action::Action;
use crate::arch::Arch;
use crate::bpf::Instr;
use crate::pattern::Pattern;

/// One element of a filter: a set of patterns sharing an action.
///
/// A rule with no patterns is inert and emits nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// The patterns this rule matches.
    pub patterns: Vec<Pattern>,

    /// The action taken when one of them matches.
    pub action: Action,
}

impl Rule {
    /// Creates an empty rule with the given action.
    pub fn new(action: Action) -> Self {
        Self {
            patterns: Vec::new(),
            action,
        }
    }

    /// Adds a pattern. Accepts anything convertible into a [`Pattern`],
    /// e.g. a [`syscalls::Sysno`].
    pub fn syscall(mut self, pattern: impl Into<Pattern>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Drops every pattern that strictly refines a coarser sibling,
    /// keeping the coarsest representative of each overlap chain.
    ///
    /// Only the first matching representative is consulted, so when
    /// matching is non-transitive the insertion order decides which
    /// representative survives. That is deliberate: the caller's order
    /// picks the winner within an overlap cluster.
    pub(crate) fn keep_least_precise(&mut self) {
        let mut kept: Vec<Pattern> = Vec::new();
        'next: for pattern in &self.patterns {
            for candidate in kept.iter_mut() {
                if pattern.matches(candidate) {
                    if candidate.is_more_precise(pattern) {
                        trace!(?candidate, keeping = ?pattern, "dropping refined pattern");
                        *candidate = *pattern;
                    }
                    continue 'next;
                }
            }
            kept.push(*pattern);
        }
        self.patterns = kept;
    }

    /// Emits the instruction block for this rule.
    ///
    /// Built back to front: the decision return goes in first and every
    /// pattern block is prepended in turn, tracking how far the return has
    /// drifted. The pattern adjacent to the return falls through into it
    /// and skips one instruction on a miss; every other pattern misses
    /// into the block below it.
    pub(crate) fn emit(&self, arch: Arch) -> Vec<Instr> {
        if self.patterns.is_empty() {
            return Vec::new();
        }
        let mut distance_to_decision: u32 = 0;
        let mut instructions = vec![Instr::Ret(u32::from(self.action))];
        for pattern in &self.patterns {
            let distance_to_next = if distance_to_decision == 0 { 1 } else { 0 };
            let mut block = pattern.emit(distance_to_decision, distance_to_next, arch);
            distance_to_decision += block.len() as u32;
            block.append(&mut instructions);
            instructions = block;
        }
        instructions
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The filter itself: an ordered rule list, its normalizer, and the
//! compiler that turns it into a loadable program.

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::action::Action;
use crate::arch::Arch;
use crate::bpf::assemble;
use crate::bpf::load_data_field;
use crate::bpf::Cond;
use crate::bpf::Field;
use crate::bpf::FilterFlags;
use crate::bpf::Instr;
use crate::bpf::Program;
use crate::error::Error;
use crate::fd::Fd;
use crate::rule::Rule;
use crate::sys;

/// A full seccomp filter: an ordered sequence of rules, the action applied
/// when none of them matches, and the architecture the program targets.
///
/// The kernel evaluates rules first-match-wins, so overlapping patterns
/// under different actions are order-sensitive; [`Policy::optimize`]
/// rewrites the sequence so that more precise patterns are consulted
/// before coarser ones and redundant patterns disappear.
///
/// A process running under a different architecture than [`Policy::arch`]
/// is killed by the compiled program's prologue, unconditionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// The rules, in evaluation order.
    pub rules: Vec<Rule>,

    /// The action applied when no rule matches.
    pub default_action: Action,

    /// The architecture the program targets.
    pub arch: Arch,
}

impl Policy {
    /// Creates a policy with no rules.
    pub fn new(arch: Arch, default_action: Action) -> Self {
        Self {
            rules: Vec::new(),
            default_action,
            arch,
        }
    }

    /// Appends a rule.
    pub fn rule(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Folds every rule into the first rule carrying the same action, so
    /// each distinct action appears at most once. First-occurrence order
    /// is preserved.
    fn merge_duplicate_actions(&mut self) {
        let rules = std::mem::take(&mut self.rules);
        let mut merged: Vec<Rule> = Vec::new();
        'next: for rule in rules {
            for candidate in merged.iter_mut() {
                if candidate.action == rule.action {
                    candidate.patterns.extend(rule.patterns);
                    continue 'next;
                }
            }
            merged.push(rule);
        }
        self.rules = merged;
    }

    /// Folds adjacent rules carrying the same action into one. Unlike
    /// [`Policy::merge_duplicate_actions`] this only merges neighbors and
    /// therefore keeps the ordering established by the split pass.
    fn merge_consecutive_duplicate_actions(&mut self) {
        let rules = std::mem::take(&mut self.rules);
        let mut merged: Vec<Rule> = Vec::new();
        for rule in rules {
            match merged.last_mut() {
                Some(last) if last.action == rule.action => {
                    last.patterns.extend(rule.patterns);
                }
                _ => merged.push(rule),
            }
        }
        self.rules = merged;
    }

    /// Moves every pattern that would be shadowed by a coarser or
    /// incomparable pattern of a later rule into a singleton rule placed
    /// behind its competitors.
    ///
    /// Runs to a fixed point: each extraction restarts the scan, and the
    /// cursor only advances past a rule once a scan finds nothing left to
    /// extract from it. A pattern strictly more precise than everything it
    /// matches already wins under first-match-wins and stays put. The
    /// extracted singleton is appended when `best` reaches the end of the
    /// list and inserted at index `best` otherwise, which can leave an
    /// unrelated rule between the singleton and its last competitor;
    /// downstream passes rely on this exact placement.
    fn split_order_rules(&mut self) {
        let mut last_ordered = 0;
        'scan: loop {
            while last_ordered < self.rules.len() {
                for i in 0..self.rules[last_ordered].patterns.len() {
                    let pattern = self.rules[last_ordered].patterns[i];
                    let mut best = 0;
                    for (j, other) in self.rules[last_ordered..].iter().enumerate() {
                        for competitor in &other.patterns {
                            if pattern.matches(competitor) && !pattern.is_more_precise(competitor) {
                                best = j + 1;
                            }
                        }
                    }
                    if best != 0 {
                        self.rules[last_ordered].patterns.remove(i);
                        let singleton = Rule {
                            patterns: vec![pattern],
                            action: self.rules[last_ordered].action,
                        };
                        if best == self.rules.len() {
                            self.rules.push(singleton);
                        } else {
                            self.rules.insert(best, singleton);
                        }
                        continue 'scan;
                    }
                }
                last_ordered += 1;
            }
            break;
        }
    }

    /// Normalizes the rule list.
    ///
    /// Equal-action rules are merged, conflicts between overlapping
    /// patterns of different actions are resolved by reordering, and
    /// within each rule only the coarsest representative of every overlap
    /// chain survives. The result evaluates every call to the same action
    /// as the original under first-match-wins, with precision deciding
    /// between overlapping rules.
    ///
    /// Optimizing an already-optimized policy is a no-op.
    pub fn optimize(&mut self) {
        self.merge_duplicate_actions();
        self.split_order_rules();
        self.merge_consecutive_duplicate_actions();

        for rule in &mut self.rules {
            rule.keep_least_precise();
        }

        debug!(rules = self.rules.len(), "normalized policy");
    }

    /// Compiles the policy into a loadable program.
    ///
    /// Fails with [`Error::ActionUnavailable`] when the running kernel
    /// does not recognize the default action or any rule action, and with
    /// [`Error::Assembly`] when a relative jump does not fit the wire
    /// format. On success the returned program is complete; there is no
    /// partial output.
    pub fn compile(&self) -> Result<Program, Error> {
        if !sys::action_available(self.default_action.kind_word()) {
            return Err(Error::ActionUnavailable(self.default_action.kind_word()));
        }
        for rule in &self.rules {
            if !sys::action_available(rule.action.kind_word()) {
                return Err(Error::ActionUnavailable(rule.action.kind_word()));
            }
        }

        let mut instructions = vec![
            load_data_field(Field::Arch, false, self.arch),
            Instr::JumpIf {
                cond: Cond::Equal,
                val: self.arch.audit_arch(),
                skip_true: 1,
                skip_false: 0,
            },
            Instr::Ret(libc::SECCOMP_RET_KILL_PROCESS),
            load_data_field(Field::Nr, false, self.arch),
        ];
        for rule in &self.rules {
            instructions.extend(rule.emit(self.arch));
        }
        instructions.push(Instr::Ret(u32::from(self.default_action)));

        debug!(instructions = instructions.len(), "compiled policy");

        let program = assemble(&instructions)?;
        Ok(Program::from(program))
    }

    /// Compiles the policy and installs it on the current thread.
    ///
    /// Sets the no-new-privs bit first; when any rule action is
    /// [`Action::Notify`] the filter is installed with
    /// [`FilterFlags::NEW_LISTENER`] and the listener descriptor is
    /// returned. Closing it is the caller's business (dropping the [`Fd`]
    /// closes it).
    ///
    /// Kernel state touched here is per-thread and irrevocable: the filter
    /// persists for the thread's lifetime and no-new-privs is inherited
    /// across `fork` and `clone`. Callers should pin themselves to one OS
    /// thread and install before spawning anything that must stay
    /// unfiltered.
    pub fn install(&self) -> Result<Option<Fd>, Error> {
        sys::no_new_privs()?;

        let mut flags = FilterFlags::empty();
        if self
            .rules
            .iter()
            .any(|rule| matches!(rule.action, Action::Notify(_)))
        {
            flags |= FilterFlags::NEW_LISTENER;
        }

        let program = self.compile()?;
        let value = program.install(flags)?;

        debug!(?flags, "installed policy");

        if flags.contains(FilterFlags::NEW_LISTENER) {
            Ok(Some(Fd::new(value)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpf::BPF_ABS;
    use crate::bpf::BPF_JEQ;
    use crate::bpf::BPF_JMP;
    use crate::bpf::BPF_JUMP;
    use crate::bpf::BPF_K;
    use crate::bpf::BPF_LD;
    use crate::bpf::BPF_RET;
    use crate::bpf::BPF_STMT;
    use crate::bpf::BPF_W;
    use crate::pattern::Pattern;

    fn bucket(action: Action, patterns: Vec<Pattern>) -> Rule {
        Rule { patterns, action }
    }

    fn policy(rules: Vec<Rule>) -> Policy {
        Policy {
            rules,
            default_action: Action::KillThread,
            arch: Arch::x86,
        }
    }

    #[test]
    fn merge_folds_every_duplicate_action() {
        let mut policy = policy(vec![
            bucket(
                Action::KillThread,
                vec![Pattern::new(0), Pattern::new(1)],
            ),
            bucket(Action::KillThread, vec![Pattern::new(2)]),
            bucket(Action::Allow, vec![]),
            bucket(Action::KillThread, vec![Pattern::new(3)]),
        ]);

        policy.merge_duplicate_actions();

        assert_eq!(
            policy.rules,
            vec![
                bucket(
                    Action::KillThread,
                    vec![
                        Pattern::new(0),
                        Pattern::new(1),
                        Pattern::new(2),
                        Pattern::new(3),
                    ],
                ),
                bucket(Action::Allow, vec![]),
            ]
        );
    }

    #[test]
    fn consecutive_merge_only_touches_neighbors() {
        let mut policy = policy(vec![
            bucket(
                Action::KillThread,
                vec![Pattern::new(0), Pattern::new(1)],
            ),
            bucket(Action::KillThread, vec![Pattern::new(2)]),
            bucket(Action::Allow, vec![]),
            bucket(Action::KillThread, vec![Pattern::new(3)]),
        ]);

        policy.merge_consecutive_duplicate_actions();

        assert_eq!(
            policy.rules,
            vec![
                bucket(
                    Action::KillThread,
                    vec![Pattern::new(0), Pattern::new(1), Pattern::new(2)],
                ),
                bucket(Action::Allow, vec![]),
                bucket(Action::KillThread, vec![Pattern::new(3)]),
            ]
        );
    }

    #[test]
    fn split_moves_shadowed_patterns_behind_their_competitors() {
        // Rule 0 holds a pattern shadowed by a finer Allow pattern and one
        // shadowed by a finer Errno pattern; each must move behind the rule
        // that refines it, in its own singleton rule.
        let mut policy = policy(vec![
            bucket(
                Action::KillThread,
                vec![
                    Pattern::new(1).arg(0, 0),
                    Pattern::new(2),
                    Pattern::new(3),
                ],
            ),
            bucket(Action::Allow, vec![Pattern::new(1).arg(0, 0).arg(1, 1)]),
            bucket(
                Action::Errno(0),
                vec![Pattern::new(1), Pattern::new(3).arg(0, 0)],
            ),
        ]);

        policy.split_order_rules();

        assert_eq!(
            policy.rules,
            vec![
                bucket(Action::KillThread, vec![Pattern::new(2)]),
                bucket(Action::Allow, vec![Pattern::new(1).arg(0, 0).arg(1, 1)]),
                bucket(Action::KillThread, vec![Pattern::new(1).arg(0, 0)]),
                bucket(
                    Action::Errno(0),
                    vec![Pattern::new(1), Pattern::new(3).arg(0, 0)],
                ),
                bucket(Action::KillThread, vec![Pattern::new(3)]),
            ]
        );
    }

    #[test]
    fn split_leaves_an_empty_policy_alone() {
        let mut empty = policy(vec![]);
        empty.split_order_rules();
        assert_eq!(empty.rules, vec![]);
    }

    #[test]
    fn optimize_keeps_an_already_ordered_policy() {
        let zeroes = Pattern::with_args(0, [crate::Arg::Eq(0); 6]);
        let half = Pattern::new(0).arg(2, 0).arg(3, 0).arg(4, 0).arg(5, 0);
        let coarse = Pattern::new(0);

        let ordered = vec![
            bucket(Action::KillThread, vec![zeroes]),
            bucket(Action::KillProcess, vec![half]),
            bucket(Action::KillThread, vec![coarse]),
        ];

        let mut policy = policy(ordered.clone());
        policy.optimize();
        assert_eq!(policy.rules, ordered);
    }

    #[test]
    fn optimize_is_idempotent() {
        let mut policy = policy(vec![
            bucket(
                Action::KillThread,
                vec![Pattern::new(1).arg(0, 0), Pattern::new(2), Pattern::new(3)],
            ),
            bucket(Action::Allow, vec![Pattern::new(1).arg(0, 0).arg(1, 1)]),
            bucket(
                Action::Errno(0),
                vec![Pattern::new(1), Pattern::new(3).arg(0, 0)],
            ),
            bucket(Action::Allow, vec![Pattern::new(4), Pattern::new(4).arg(0, 1)]),
        ]);

        policy.optimize();
        let once = policy.clone();
        policy.optimize();
        assert_eq!(policy, once);
    }

    #[test]
    fn optimize_post_conditions() {
        let mut policy = policy(vec![
            bucket(
                Action::KillThread,
                vec![Pattern::new(1).arg(0, 0), Pattern::new(2), Pattern::new(3)],
            ),
            bucket(Action::Allow, vec![Pattern::new(1).arg(0, 0).arg(1, 1)]),
            bucket(
                Action::Errno(0),
                vec![Pattern::new(1), Pattern::new(3).arg(0, 0)],
            ),
        ]);

        policy.optimize();

        // Adjacent rules carry distinct actions.
        for pair in policy.rules.windows(2) {
            assert_ne!(pair[0].action, pair[1].action);
        }

        // An earlier pattern matching a later one under a different action
        // is at least as precise as it.
        for (i, earlier) in policy.rules.iter().enumerate() {
            for later in &policy.rules[i + 1..] {
                if earlier.action == later.action {
                    continue;
                }
                for p in &earlier.patterns {
                    for q in &later.patterns {
                        if p.matches(q) {
                            assert!(p.is_more_precise(q), "{p:?} shadows finer {q:?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn compile_emits_prologue_and_default_return() {
        let policy = Policy::new(Arch::x86, Action::Allow);

        let program = match policy.compile() {
            Ok(program) => program,
            // The availability probe needs a kernel with seccomp.
            Err(_) => return,
        };

        let mut expected = Program::new();
        expected.extend([
            BPF_STMT(BPF_LD + BPF_W + BPF_ABS, 4),
            BPF_JUMP(BPF_JMP + BPF_JEQ + BPF_K, 0x4000_0003, 1, 0),
            BPF_STMT(BPF_RET + BPF_K, 0x8000_0000),
            BPF_STMT(BPF_LD + BPF_W + BPF_ABS, 0),
            BPF_STMT(BPF_RET + BPF_K, 0x7fff_0000),
        ]);

        assert_eq!(program.len(), 5);
        assert_eq!(program, expected);
    }

    #[test]
    fn compile_skips_inert_rules() {
        let mut with_inert_rule = Policy::new(Arch::x86, Action::Allow);
        with_inert_rule.rule(Rule::new(Action::KillThread));

        let empty = Policy::new(Arch::x86, Action::Allow);

        match (with_inert_rule.compile(), empty.compile()) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            _ => {}
        }
    }

    #[test]
    fn compile_emits_rule_bodies_between_prologue_and_epilogue() {
        let mut policy = Policy::new(Arch::x86, Action::Allow);
        policy.rule(Rule::new(Action::KillThread).syscall(Pattern::new(2)));

        let program = match policy.compile() {
            Ok(program) => program,
            Err(_) => return,
        };

        let mut expected = Program::new();
        expected.extend([
            BPF_STMT(BPF_LD + BPF_W + BPF_ABS, 4),
            BPF_JUMP(BPF_JMP + BPF_JEQ + BPF_K, 0x4000_0003, 1, 0),
            BPF_STMT(BPF_RET + BPF_K, 0x8000_0000),
            BPF_STMT(BPF_LD + BPF_W + BPF_ABS, 0),
            BPF_JUMP(BPF_JMP + BPF_JEQ + BPF_K, 2, 0, 1),
            BPF_STMT(BPF_RET + BPF_K, 0),
            BPF_STMT(BPF_RET + BPF_K, 0x7fff_0000),
        ]);

        assert_eq!(program, expected);
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Builds, normalizes, and compiles [`seccomp`][seccomp] filters. This is a
//! pure Rust implementation and does not require libseccomp.
//!
//! # Seccomp Background
//!
//! [`seccomp(2)`][seccomp] installs a small program that the kernel runs
//! for every syscall a thread makes. The program is written in
//! `seccomp-bpf`, a subset of classic BPF byte code: it can only read the
//! syscall number, architecture, instruction pointer, and arguments out of
//! a fixed record, can only jump forward, and must end by returning an
//! action word that tells the kernel what to do with the syscall. Filters
//! can never be removed once installed, only stacked.
//!
//! [seccomp]: https://man7.org/linux/man-pages/man2/seccomp.2.html
//!
//! # Usage
//!
//! Rather than writing byte code by hand, describe the filter as a
//! [`Policy`]: an ordered list of [`Rule`]s, each mapping one or more
//! syscall-call [`Pattern`]s to an [`Action`], plus a default action and a
//! target [`Arch`]. [`Policy::optimize`] resolves conflicts between
//! overlapping patterns (the kernel evaluates first-match-wins, so a more
//! precise pattern must be consulted before a coarser one that would
//! shadow it) and drops redundant patterns. [`Policy::compile`] turns the
//! rule list into a [`Program`], and [`Policy::install`] loads it on the
//! current thread:
//!
//! ```no_run
//! use seccomp_sieve::Action;
//! use seccomp_sieve::Arch;
//! use seccomp_sieve::Pattern;
//! use seccomp_sieve::Policy;
//! use seccomp_sieve::Rule;
//! use seccomp_sieve::Sysno;
//!
//! let mut policy = Policy::new(Arch::CURRENT, Action::Allow);
//! policy.rule(
//!     Rule::new(Action::Errno(libc::EPERM as u16))
//!         .syscall(Sysno::socket)
//!         // Deny opening files for read-write.
//!         .syscall(Pattern::from(Sysno::openat).arg(2, libc::O_RDWR as u64)),
//! );
//!
//! policy.optimize();
//! policy.install().expect("failed to install filter");
//! ```
//!
//! A mismatched architecture kills the process: the compiled program's
//! prologue compares the kernel-reported audit architecture against
//! [`Policy::arch`] before anything else runs.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod action;
mod arch;
pub mod bpf;
mod error;
mod fd;
mod pattern;
mod policy;
mod rule;
pub mod sys;

pub use action::Action;
pub use arch::Arch;
pub use bpf::FilterFlags;
pub use bpf::Program;
pub use error::Error;
pub use fd::Fd;
pub use pattern::Arg;
pub use pattern::Pattern;
pub use policy::Policy;
pub use rule::Rule;
// Re-export the syscall numbering and errno types since they appear in the
// public API.
pub use syscalls::Errno;
pub use syscalls::Sysno;

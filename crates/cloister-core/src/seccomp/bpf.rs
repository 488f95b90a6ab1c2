//! Classic BPF program construction for seccomp.
//!
//! Programs produced here match a single field of `struct seccomp_data`,
//! the syscall number:
//!
//! ```text
//! [0]        ld  [nr]
//! [2i+1]     jeq #syscall_i, jt 0, jf 1
//! [2i+2]     ret #per_syscall_action
//! [2n+1]     ret #default_action
//! ```
//!
//! A match falls through to the `ret` right after the comparison; a mismatch
//! skips it and moves to the next comparison.

use std::fmt;

use cloister_common::error::{CloisterError, Result};

// BPF instruction classes
const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;

// ld/ldx fields
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;

// alu/jmp fields
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

/// `offsetof(struct seccomp_data, nr)`.
pub const SECCOMP_DATA_NR_OFFSET: u32 = 0;

/// Return value killing the whole process with `SIGSYS`.
pub const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
/// Return value letting the syscall run.
pub const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

/// One BPF instruction, laid out as `struct sock_filter`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SockFilter {
    /// Opcode.
    pub code: u16,
    /// Jump offset when the condition holds.
    pub jt: u8,
    /// Jump offset when the condition does not hold.
    pub jf: u8,
    /// Generic operand.
    pub k: u32,
}

impl SockFilter {
    /// Non-jumping instruction.
    #[inline]
    pub const fn stmt(code: u16, k: u32) -> Self {
        Self {
            code,
            jt: 0,
            jf: 0,
            k,
        }
    }

    /// Conditional jump.
    #[inline]
    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }

    /// `ld [nr]`
    pub const fn load_syscall_nr() -> Self {
        Self::stmt(BPF_LD | BPF_W | BPF_ABS, SECCOMP_DATA_NR_OFFSET)
    }

    /// `jeq #nr, jt 0, jf 1`
    pub const fn syscall_eq(nr: u32) -> Self {
        Self::jump(BPF_JMP | BPF_JEQ | BPF_K, nr, 0, 1)
    }

    /// `ret #action`
    pub const fn ret(action: FilterAction) -> Self {
        Self::stmt(BPF_RET | BPF_K, action.ret_value())
    }
}

/// `struct sock_fprog`, handed to `prctl(PR_SET_SECCOMP)`.
#[repr(C)]
#[derive(Debug)]
pub struct SockFprog {
    /// Number of instructions.
    pub len: u16,
    /// First instruction.
    pub filter: *const SockFilter,
}

/// What the filter does with a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterAction {
    /// Let the syscall run.
    Allow,
    /// Kill the process with `SIGSYS`.
    KillProcess,
}

impl FilterAction {
    /// Value returned from the BPF program.
    pub const fn ret_value(self) -> u32 {
        match self {
            Self::Allow => SECCOMP_RET_ALLOW,
            Self::KillProcess => SECCOMP_RET_KILL_PROCESS,
        }
    }
}

impl fmt::Display for FilterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "ALLOW"),
            Self::KillProcess => write!(f, "KILL_PROCESS"),
        }
    }
}

/// A compiled filter program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpfProgram {
    instructions: Vec<SockFilter>,
}

impl BpfProgram {
    /// Compiles `syscalls` into a program returning `per_syscall` for each
    /// listed number and `default` for everything else.
    ///
    /// The program holds `2 * syscalls.len() + 2` instructions.
    ///
    /// # Errors
    ///
    /// Returns [`CloisterError::Filter`] when the program would exceed
    /// `max_instructions` or a syscall number does not fit in 32 bits.
    pub fn compile(
        syscalls: &[i64],
        per_syscall: FilterAction,
        default: FilterAction,
        max_instructions: usize,
    ) -> Result<Self> {
        let needed = syscalls
            .len()
            .checked_mul(2)
            .and_then(|n| n.checked_add(2))
            .ok_or_else(|| CloisterError::Filter {
                message: "syscall list length overflows".into(),
            })?;
        if needed > max_instructions {
            return Err(CloisterError::Filter {
                message: format!(
                    "{} syscalls need {needed} instructions, limit is {max_instructions}",
                    syscalls.len()
                ),
            });
        }

        let mut instructions = Vec::with_capacity(needed);
        instructions.push(SockFilter::load_syscall_nr());
        for &nr in syscalls {
            let nr = u32::try_from(nr).map_err(|_| CloisterError::Filter {
                message: format!("syscall number {nr} is out of range"),
            })?;
            instructions.push(SockFilter::syscall_eq(nr));
            instructions.push(SockFilter::ret(per_syscall));
        }
        instructions.push(SockFilter::ret(default));

        tracing::debug!(
            syscalls = syscalls.len(),
            instructions = instructions.len(),
            %per_syscall,
            %default,
            "compiled seccomp program"
        );
        Ok(Self { instructions })
    }

    /// Program length in instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Always false for compiled programs, which hold at least two instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The instructions, in execution order.
    pub fn instructions(&self) -> &[SockFilter] {
        &self.instructions
    }

    /// Builds the `sock_fprog` view of this program.
    ///
    /// The returned value borrows the instruction buffer through a raw
    /// pointer; it must not outlive `self`.
    ///
    /// # Errors
    ///
    /// Returns [`CloisterError::Filter`] if the program is longer than
    /// `u16::MAX` instructions.
    pub fn as_fprog(&self) -> Result<SockFprog> {
        let len = u16::try_from(self.instructions.len()).map_err(|_| CloisterError::Filter {
            message: format!("program of {} instructions is too long", self.len()),
        })?;
        Ok(SockFprog {
            len,
            filter: self.instructions.as_ptr(),
        })
    }
}

impl fmt::Display for BpfProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, insn) in self.instructions.iter().enumerate() {
            let op = insn.code;
            if op == BPF_LD | BPF_W | BPF_ABS {
                writeln!(f, "{pc:04}: ld  [{}]", insn.k)?;
            } else if op == BPF_JMP | BPF_JEQ | BPF_K {
                writeln!(f, "{pc:04}: jeq #{}, jt {}, jf {}", insn.k, insn.jt, insn.jf)?;
            } else if op == BPF_RET | BPF_K {
                let name = match insn.k {
                    SECCOMP_RET_ALLOW => "ALLOW",
                    SECCOMP_RET_KILL_PROCESS => "KILL_PROCESS",
                    _ => "?",
                };
                writeln!(f, "{pc:04}: ret #{name}")?;
            } else {
                writeln!(f, "{pc:04}: .word {op:#06x} {} {} {:#x}", insn.jt, insn.jf, insn.k)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 1024;

    #[test]
    fn length_is_two_per_syscall_plus_two() {
        for n in [0usize, 1, 3, 17, 511] {
            let list: Vec<i64> = (0..n as i64).collect();
            let prog =
                BpfProgram::compile(&list, FilterAction::Allow, FilterAction::KillProcess, LIMIT)
                    .unwrap();
            assert_eq!(prog.len(), 2 * n + 2);
            assert_eq!(prog.instructions()[0], SockFilter::load_syscall_nr());
        }
    }

    #[test]
    fn first_instruction_loads_nr_at_offset_zero() {
        let prog =
            BpfProgram::compile(&[0], FilterAction::Allow, FilterAction::KillProcess, LIMIT)
                .unwrap();
        let first = prog.instructions()[0];
        assert_eq!(first.code, 0x20);
        assert_eq!(first.k, 0);
    }

    #[test]
    fn comparisons_fall_through_to_action() {
        let prog = BpfProgram::compile(
            &[0, 1, 60],
            FilterAction::Allow,
            FilterAction::KillProcess,
            LIMIT,
        )
        .unwrap();
        let insns = prog.instructions();
        for (i, nr) in [0u32, 1, 60].into_iter().enumerate() {
            let cmp = insns[2 * i + 1];
            assert_eq!(cmp.code, 0x15);
            assert_eq!((cmp.k, cmp.jt, cmp.jf), (nr, 0, 1));
            assert_eq!(insns[2 * i + 2].code, 0x06);
            assert_eq!(insns[2 * i + 2].k, SECCOMP_RET_ALLOW);
        }
        assert_eq!(insns[insns.len() - 1].k, SECCOMP_RET_KILL_PROCESS);
    }

    #[test]
    fn deny_mode_inverts_actions() {
        let prog =
            BpfProgram::compile(&[101], FilterAction::KillProcess, FilterAction::Allow, LIMIT)
                .unwrap();
        let insns = prog.instructions();
        assert_eq!(insns[2].k, SECCOMP_RET_KILL_PROCESS);
        assert_eq!(insns[3].k, SECCOMP_RET_ALLOW);
    }

    #[test]
    fn over_budget_fails_cleanly() {
        let list: Vec<i64> = (0..512).collect();
        let err = BpfProgram::compile(&list, FilterAction::Allow, FilterAction::KillProcess, LIMIT)
            .unwrap_err();
        assert!(matches!(err, CloisterError::Filter { .. }));
    }

    #[test]
    fn largest_list_within_budget_fits_exactly() {
        let list: Vec<i64> = (0..511).collect();
        let prog =
            BpfProgram::compile(&list, FilterAction::Allow, FilterAction::KillProcess, LIMIT)
                .unwrap();
        assert_eq!(prog.len(), LIMIT);
    }

    #[test]
    fn negative_syscall_is_rejected() {
        let err = BpfProgram::compile(&[-1], FilterAction::Allow, FilterAction::KillProcess, LIMIT)
            .unwrap_err();
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn fprog_points_at_instructions() {
        let prog =
            BpfProgram::compile(&[0, 1], FilterAction::Allow, FilterAction::KillProcess, LIMIT)
                .unwrap();
        let fprog = prog.as_fprog().unwrap();
        assert_eq!(usize::from(fprog.len), prog.len());
        assert_eq!(fprog.filter, prog.instructions().as_ptr());
    }

    #[test]
    fn display_disassembles() {
        let prog =
            BpfProgram::compile(&[39], FilterAction::KillProcess, FilterAction::Allow, LIMIT)
                .unwrap();
        let text = prog.to_string();
        assert_eq!(
            text,
            "0000: ld  [0]\n0001: jeq #39, jt 0, jf 1\n0002: ret #KILL_PROCESS\n0003: ret #ALLOW\n"
        );
    }
}

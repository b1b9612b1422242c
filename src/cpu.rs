//! Per-core state: the task-state segment, the (modeled) interrupt flag
//! with nestable scoped disable, and the active-address-space register.
//!
//! Switching to a process must update the task state and the active
//! directory as one unit: a timer interrupt between the two would observe
//! a core whose privilege-transition stack belongs to one process and
//! whose address space belongs to another. `without_interrupts` makes the
//! pairing a scoped critical section.

use crate::config::{KERNEL_STACK_SIZE, NCPU};
use crate::mm::address::PhysPageNum;
use crate::mm::memory_set::kernel_space;
use crate::task::Process;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use log::*;
use spin::{Mutex, MutexGuard};

/// Kernel data segment selector (GDT slot 2, RPL 0).
pub const SEG_KDATA: u16 = 2 << 3;
/// I/O map base past the TSS limit: all user port I/O faults.
pub const IOMB_NONE: u16 = 0xFFFF;

/// Task-state segment fields the switch maintains: where the CPU lands
/// on a user-to-kernel privilege transition, and the I/O permission map.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TaskState {
    /// Kernel stack pointer loaded on privilege transition.
    pub esp0: usize,
    /// Stack segment selector paired with `esp0`.
    pub ss0: u16,
    /// I/O map base offset.
    pub iomb: u16,
}

pub struct Cpu {
    pub ts: TaskState,
    /// Directory frame of the active address space, if paging is up.
    current_root: Option<PhysPageNum>,
    /// Modeled interrupt-enable flag for this core.
    intr_on: bool,
    /// Nesting depth of scoped interrupt-disable sections.
    intr_off_depth: usize,
    /// Interrupt state before the outermost disable, restored on exit.
    intr_was_on: bool,
}

lazy_static! {
    static ref CPUS: Vec<Mutex<Cpu>> = (0..NCPU).map(|_| Mutex::new(Cpu::new())).collect();
}

/// This core's slot. The caller names the core; topology discovery hands
/// out the ids.
pub fn cpu(cpu_id: usize) -> MutexGuard<'static, Cpu> {
    CPUS[cpu_id].lock()
}

impl Cpu {
    fn new() -> Self {
        Self {
            ts: TaskState {
                esp0: 0,
                ss0: SEG_KDATA,
                iomb: IOMB_NONE,
            },
            current_root: None,
            intr_on: true,
            intr_off_depth: 0,
            intr_was_on: false,
        }
    }

    /// Run `f` with interrupts off on this core. Nestable: only the
    /// outermost scope records and restores the prior interrupt state,
    /// and the closure shape makes skipping the restore impossible.
    pub fn without_interrupts<R>(&mut self, f: impl FnOnce(&mut Cpu) -> R) -> R {
        self.push_interrupt_off();
        let r = f(self);
        self.pop_interrupt_off();
        r
    }

    fn push_interrupt_off(&mut self) {
        let was_on = self.intr_on;
        self.intr_on = false;
        if self.intr_off_depth == 0 {
            self.intr_was_on = was_on;
        }
        self.intr_off_depth += 1;
    }

    fn pop_interrupt_off(&mut self) {
        assert!(!self.intr_on, "interrupts on inside a disabled section");
        assert!(self.intr_off_depth > 0, "unbalanced interrupt restore");
        self.intr_off_depth -= 1;
        if self.intr_off_depth == 0 && self.intr_was_on {
            self.intr_on = true;
        }
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.intr_on
    }

    /// Directory frame currently loaded on this core.
    pub fn current_root(&self) -> Option<PhysPageNum> {
        self.current_root
    }

    fn load_root(&mut self, root: PhysPageNum) {
        self.current_root = Some(root);
    }
}

/// Load the shared kernel-only address space on this core — used during
/// bootstrap and whenever the core has no process to run.
pub fn install_kernel_space(cpu_id: usize) {
    let mut cpu = cpu(cpu_id);
    cpu.load_root(kernel_space().root());
    trace!("cpu{}: kernel space active", cpu_id);
}

/// Switch this core's task state and address space to `process`, as one
/// interrupt-atomic unit.
///
/// # Panics
/// The process must have a kernel stack and an address space; a process
/// without either cannot take a trap safely, and continuing would hand
/// the CPU a garbage kernel stack pointer.
pub fn install_process_space(cpu_id: usize, process: &Process) {
    let kstack = process.kstack.expect("switch to process with no kernel stack");
    let space = process
        .space
        .as_ref()
        .expect("switch to process with no address space");

    let mut cpu = cpu(cpu_id);
    cpu.without_interrupts(|cpu| {
        cpu.ts = TaskState {
            esp0: kstack + KERNEL_STACK_SIZE,
            ss0: SEG_KDATA,
            // Forbid port I/O from user mode.
            iomb: IOMB_NONE,
        };
        cpu.load_root(space.root());
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn kernel_space_installs_on_any_core() {
        let _guard = test_support::serial();
        install_kernel_space(0);
        install_kernel_space(3);
        assert_eq!(cpu(0).current_root(), Some(kernel_space().root()));
        assert_eq!(cpu(3).current_root(), Some(kernel_space().root()));
    }

    #[test]
    fn process_switch_updates_task_state_and_root() {
        let _guard = test_support::serial();
        let process = Process::new().unwrap();
        install_process_space(1, &process);

        {
            let cpu = cpu(1);
            assert_eq!(cpu.current_root(), Some(process.space.as_ref().unwrap().root()));
            assert_eq!(cpu.ts.esp0, process.kstack.unwrap() + KERNEL_STACK_SIZE);
            assert_eq!(cpu.ts.ss0, SEG_KDATA);
            assert_eq!(cpu.ts.iomb, IOMB_NONE);
            // Back out of the critical section with interrupts restored.
            assert!(cpu.interrupts_enabled());
        }

        install_kernel_space(1);
        process.exit();
    }

    #[test]
    fn interrupt_scopes_nest_and_restore() {
        let _guard = test_support::serial();
        let mut cpu = cpu(2);
        assert!(cpu.interrupts_enabled());
        cpu.without_interrupts(|cpu| {
            assert!(!cpu.interrupts_enabled());
            cpu.without_interrupts(|cpu| {
                assert!(!cpu.interrupts_enabled());
            });
            // Inner exit must not re-enable inside the outer scope.
            assert!(!cpu.interrupts_enabled());
        });
        assert!(cpu.interrupts_enabled());
    }

    #[test]
    #[should_panic(expected = "no address space")]
    fn switch_without_space_is_fatal() {
        let _guard = test_support::serial();
        let mut process = Process::new().unwrap();
        process.space.take().unwrap().destroy();
        install_process_space(0, &process);
    }

    #[test]
    #[should_panic(expected = "no kernel stack")]
    fn switch_without_kstack_is_fatal() {
        let _guard = test_support::serial();
        let mut process = Process::new().unwrap();
        process.kstack = None;
        install_process_space(0, &process);
    }
}

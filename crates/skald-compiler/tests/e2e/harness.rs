//! Shared plumbing for the scenario modules: build a module from the tree
//! constructors, compile it, execute the emitted text on the reference
//! machine, and read results back through the program's global table.

use skald_ast::{build, Statement};
use skald_compiler::{CompileOptions, Compiler, Program};

use super::machine::Machine;

/// A compiled program together with the machine it ran (or will run) on.
pub struct Run {
    pub program: Program,
    pub vm: Machine,
}

impl Run {
    /// Value-array offset of a named global.
    pub fn offset(&self, name: &str) -> i64 {
        self.program
            .globals
            .iter()
            .find(|g| g.name == name)
            .unwrap_or_else(|| panic!("no global named '{name}'"))
            .offset as i64
    }

    /// Final value of a top-level variable.
    pub fn slot(&self, name: &str) -> i64 {
        self.vm.mem(self.offset(name))
    }

    /// Follow a top-level variable holding a heap string pointer.
    pub fn string(&self, name: &str) -> String {
        self.vm.string_at(self.slot(name))
    }
}

pub fn compile(statements: Vec<Statement>) -> Program {
    compile_with(CompileOptions::default(), statements)
}

pub fn compile_with(options: CompileOptions, statements: Vec<Statement>) -> Program {
    Compiler::new(options)
        .compile(&[build::module("e2e.sk", statements)])
        .expect("compilation aborted")
}

/// Load a program into a fresh machine without running it. A linked-heap
/// header loads first, the way the engine would.
pub fn boot(program: Program) -> Run {
    let mut vm = Machine::new();
    if let Some(header) = &program.header {
        vm.load(header);
    }
    vm.load(&program.code);
    Run { program, vm }
}

pub fn run(statements: Vec<Statement>) -> Run {
    run_with(CompileOptions::default(), statements)
}

pub fn run_with(options: CompileOptions, statements: Vec<Statement>) -> Run {
    let program = compile_with(options, statements);
    assert!(
        !program.has_errors(),
        "unexpected diagnostics: {:#?}",
        program.reports
    );
    let mut r = boot(program);
    r.vm.run_main();
    r
}

/// Like [`run`], but with the world seeded (engine collections, the rand
/// value) between load and execution.
pub fn run_seeded(seed: impl FnOnce(&mut Machine), statements: Vec<Statement>) -> Run {
    let program = compile(statements);
    assert!(
        !program.has_errors(),
        "unexpected diagnostics: {:#?}",
        program.reports
    );
    let mut r = boot(program);
    seed(&mut r.vm);
    r.vm.run_main();
    r
}

/// Compile, run, and check the final value of one global.
pub fn expect_slot(statements: Vec<Statement>, name: &str, expected: i64) {
    let r = run(statements);
    assert_eq!(r.slot(name), expected, "final value of '{name}'");
}

/// Compile, run, and check the text behind one global's string pointer.
pub fn expect_string(statements: Vec<Statement>, name: &str, expected: &str) {
    let r = run(statements);
    assert_eq!(r.string(name), expected, "final text of '{name}'");
}

//! Compiler lowering Skald scripts onto the world VM's register language.
//!
//! The target machine is a flat array of numeric cells driven by named
//! `state` blocks: no call stack, no pointers, no types, and control flow
//! limited to structured conditionals, one loop form, and a program-counter
//! read. Everything a typed, class-based language needs on top of that is
//! invented here at compile time: object and array layout, a value stack
//! with frames, argument-register calling, entity instance wiring, and a
//! paged heap whose allocator and collector are emitted once into every
//! program.
//!
//! [`Compiler`] is the whole surface: feed it parsed [`Module`]s, get back
//! a [`Program`] holding the assembled text plus per-file diagnostics.
//! Recoverable problems never abort a compile; see [`diag`] for the policy.
//!
//! ```
//! use skald_ast::build;
//! use skald_compiler::{CompileOptions, Compiler};
//!
//! let module = build::module(
//!     "main.sk",
//!     vec![build::expr(build::call("out", vec![build::int(7)]))],
//! );
//! let program = Compiler::new(CompileOptions::default())
//!     .compile(&[module])
//!     .unwrap();
//! assert!(program.code.contains("state main {"));
//! ```

pub mod catalog;
pub mod diag;
pub mod emit;
pub mod error;
mod frames;
pub mod heap;
pub mod layout;
mod lower;
pub mod natives;
pub mod options;
pub mod symbols;

pub use catalog::default_catalog;
pub use diag::{Category, Diagnostic, FileReport, Severity};
pub use error::{CompileError, CompileResult};
pub use natives::NativeCatalog;
pub use options::{CompileOptions, HeapMode, LibraryFragment};

use serde::{Deserialize, Serialize};
use skald_ast::Module;
use tracing::debug;

use crate::emit::{CodeSink, Reg, INSTMAP, MEM};
use crate::frames::MAX_SAVED_ARGS;
use crate::heap::{render_runtime, RuntimeConfig, RUNTIME_HEADER_NAME};
use crate::lower::Lowerer;

/// Entity index space the instance map covers.
const INSTMAP_SIZE: u32 = 1024;

/// One named global's place in the value array, reported for embedder
/// tooling; slot 0 is reserved so no block address reads as null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSlot {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// A finished compilation.
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    /// The assembled program text, ready for the VM loader.
    pub code: String,
    /// Runtime text split out under [`HeapMode::Linked`]; the program then
    /// carries a `linked` reference in its place.
    pub header: Option<String>,
    /// Per-module diagnostics, in compilation order.
    pub reports: Vec<FileReport>,
    /// Global slot assignments, in declaration order.
    pub globals: Vec<GlobalSlot>,
}

impl Program {
    /// Whether any module reported an error. The code is still complete;
    /// accepting it anyway is the embedder's call.
    pub fn has_errors(&self) -> bool {
        self.reports.iter().any(FileReport::has_errors)
    }
}

/// Main compiler entry point.
pub struct Compiler {
    options: CompileOptions,
    catalog: &'static NativeCatalog,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            catalog: default_catalog(),
        }
    }

    /// Swap in the native catalog of a modified engine build.
    pub fn with_catalog(mut self, catalog: &'static NativeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Compile `modules` into one program. Modules share a symbol table and
    /// global space, in order, so includes compile before their includers.
    pub fn compile(&self, modules: &[Module]) -> CompileResult<Program> {
        for fragment in &self.options.fragments {
            if fragment.text.is_none() {
                return Err(CompileError::MissingFragment {
                    name: fragment.name.clone(),
                });
            }
        }

        let mut lowerer = Lowerer::new(self.options.inline_comments, self.catalog);
        let mut reports = Vec::with_capacity(modules.len());
        for module in modules {
            reports.push(lowerer.lower_module(module));
        }
        let pieces = lowerer.finish();

        if pieces.globals_size > self.options.stack_size {
            return Err(CompileError::StackTooSmall {
                needed: pieces.globals_size,
                configured: self.options.stack_size,
            });
        }

        let cfg = RuntimeConfig {
            stack_size: self.options.stack_size,
            heap_pages: self.options.heap_pages,
            max_args: pieces.max_args,
        };

        let mut sink = CodeSink::new(self.options.inline_comments);

        // Declarations: registers, the value array, the instance map when
        // some class carries per-instance state, then interned quotes.
        for reg in Reg::specials() {
            sink.line(format!("var {reg} 0"));
        }
        // The runtime's save templates touch r0..r{MAX-1} unconditionally,
        // so at least that many argument cells exist in every program.
        let args = u32::from(pieces.max_args.max(MAX_SAVED_ARGS));
        for n in 0..args {
            sink.line(format!("var r{n} 0"));
        }
        sink.line(format!("array {} {}", MEM, cfg.mem_size()));
        if pieces.needs_instmap {
            sink.line(format!("array {} {}", INSTMAP, INSTMAP_SIZE));
        }
        pieces.quotes.render(&mut sink);

        let header = match self.options.heap {
            HeapMode::Inline => {
                render_runtime(&mut sink, &cfg);
                None
            }
            HeapMode::Linked => {
                sink.line(format!("linked {RUNTIME_HEADER_NAME}"));
                let mut header = CodeSink::new(false);
                render_runtime(&mut header, &cfg);
                Some(header.finish())
            }
        };

        for fragment in &self.options.fragments {
            if let Some(text) = &fragment.text {
                sink.raw(text);
            }
        }

        for state in &pieces.states {
            sink.raw(state);
        }

        sink.open("state main");
        sink.set(Reg::FrameBase, 0);
        sink.set(Reg::StackTop, i64::from(pieces.globals_size));
        for line in &pieces.startup {
            sink.line(line);
        }
        sink.raw(&pieces.main_body);
        sink.close();

        debug!(
            modules = modules.len(),
            states = pieces.states.len(),
            globals = pieces.globals_size,
            max_args = pieces.max_args,
            "assembled program"
        );

        Ok(Program {
            code: sink.finish(),
            header,
            reports,
            globals: pieces.globals,
        })
    }
}

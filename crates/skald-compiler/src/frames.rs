//! Calling convention and frame protocol
//!
//! The target has no native call stack, so frames are carved out of the
//! value stack by emitted code. A frame is: saved caller `rbp`, then one
//! slot per declared local, then whatever construct registers the body
//! clobbers. Arguments never touch the stack on the way in; they travel in
//! `r0..rN`, and each call site saves exactly its own argument registers
//! around the call through the emitted `pushr*`/`popr*` states. `rt` is
//! caller-saved the same way: a site holding a live expression temporary
//! pushes it before the save and pops it after the restore.
//!
//! Construct registers are saved only when a pre-scan of the body says the
//! corresponding construct occurs. A leaf function that never loops,
//! switches, or returns early pays two stack slots total.

use rustc_hash::FxHashMap;

use skald_ast::{ElseClause, Expression, Statement};

use crate::emit::{CodeSink, Reg};
use crate::symbols::ValueKind;

/// Largest single-count register save template the runtime emits.
pub const MAX_SAVED_ARGS: u8 = 12;

/// Which construct registers a function body touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clobbers {
    /// `rlf`/`rlc`
    pub loops: bool,
    /// `rsb`/`rsi`
    pub switches: bool,
    /// `rff`
    pub returns: bool,
}

impl Clobbers {
    fn merge(&mut self, other: Clobbers) {
        self.loops |= other.loops;
        self.switches |= other.switches;
        self.returns |= other.returns;
    }
}

/// Walk a body and report which construct registers it will clobber.
/// Descends into nested blocks and callback arguments; does not descend
/// into nested declarations (those get their own frames).
pub fn scan_clobbers(stmts: &[Statement]) -> Clobbers {
    let mut c = Clobbers::default();
    for s in stmts {
        scan_stmt(s, &mut c);
    }
    c
}

fn scan_stmt(s: &Statement, c: &mut Clobbers) {
    match s {
        Statement::While(w) => {
            c.loops = true;
            scan_expr(&w.condition, c);
            c.merge(scan_clobbers(&w.body.statements));
        }
        Statement::Switch(sw) => {
            c.switches = true;
            scan_expr(&sw.discriminant, c);
            for case in &sw.cases {
                if let Some(test) = &case.test {
                    scan_expr(test, c);
                }
                c.merge(scan_clobbers(&case.consequent));
            }
        }
        Statement::Return(_) => c.returns = true,
        Statement::If(i) => {
            scan_expr(&i.condition, c);
            c.merge(scan_clobbers(&i.then_branch.statements));
            let mut els = i.else_branch.as_ref();
            while let Some(clause) = els {
                match clause {
                    ElseClause::Block(b) => {
                        c.merge(scan_clobbers(&b.statements));
                        els = None;
                    }
                    ElseClause::If(nested) => {
                        scan_expr(&nested.condition, c);
                        c.merge(scan_clobbers(&nested.then_branch.statements));
                        els = nested.else_branch.as_ref();
                    }
                }
            }
        }
        Statement::Expression(e) => scan_expr(&e.expression, c),
        Statement::Variable(v) => {
            if let Some(init) = &v.initializer {
                scan_expr(init, c);
            }
        }
        Statement::Break(_) => {}
        // Nested declarations are lowered as their own states.
        Statement::Function(_) | Statement::Class(_) | Statement::Enum(_) => {}
    }
}

fn scan_expr(e: &Expression, c: &mut Clobbers) {
    match e {
        Expression::Callback(cb) => c.merge(scan_clobbers(&cb.body.statements)),
        Expression::Unary(u) => scan_expr(&u.operand, c),
        Expression::Binary(b) => {
            scan_expr(&b.left, c);
            scan_expr(&b.right, c);
        }
        Expression::Logical(l) => {
            scan_expr(&l.left, c);
            scan_expr(&l.right, c);
        }
        Expression::Assignment(a) => {
            scan_expr(&a.left, c);
            scan_expr(&a.right, c);
        }
        Expression::Call(call) => {
            scan_expr(&call.callee, c);
            for a in &call.arguments {
                scan_expr(a, c);
            }
        }
        Expression::Member(m) => scan_expr(&m.object, c),
        Expression::Index(i) => {
            scan_expr(&i.object, c);
            scan_expr(&i.index, c);
        }
        Expression::Array(a) => {
            for el in &a.elements {
                scan_expr(el, c);
            }
        }
        Expression::NewArray(n) => scan_expr(&n.length, c),
        Expression::Object(o) => {
            for p in &o.properties {
                scan_expr(&p.value, c);
            }
        }
        Expression::IntLiteral(_)
        | Expression::StringLiteral(_)
        | Expression::BooleanLiteral(_)
        | Expression::Identifier(_) => {}
    }
}

/// Everything the lowerer tracks about the function currently being
/// emitted.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    /// Emitted state name.
    pub state: String,
    /// Parameter name to argument register index and kind. The implicit
    /// `this` of methods is not in here; see `this`.
    pub params: FxHashMap<String, (u8, ValueKind)>,
    /// Argument count, implicit `this` included.
    pub arity: u8,
    /// Register index carrying the instance pointer, for methods.
    pub this: Option<u8>,
    /// Frame-local slots, pre-counted before the prologue is emitted.
    pub locals: u32,
    pub clobbers: Clobbers,
    pub returns: ValueKind,
}

impl FrameInfo {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            params: FxHashMap::default(),
            arity: 0,
            this: None,
            locals: 0,
            clobbers: Clobbers::default(),
            returns: ValueKind::Number,
        }
    }

    pub fn param(&self, name: &str) -> Option<(u8, ValueKind)> {
        self.params.get(name).copied()
    }
}

/// Open a frame: save the caller's base, claim local slots, save clobbered
/// construct registers.
pub fn emit_prologue(sink: &mut CodeSink, frame: &FrameInfo) {
    sink.push(Reg::FrameBase);
    sink.set(Reg::FrameBase, Reg::StackTop);
    if frame.locals > 0 {
        sink.rr("add", Reg::StackTop, frame.locals as i64);
    }
    if frame.clobbers.returns {
        sink.push(Reg::ExitFlag);
        sink.set(Reg::ExitFlag, 0);
    }
    if frame.clobbers.loops {
        sink.push(Reg::LoopFlag);
        sink.push(Reg::LoopCount);
    }
    if frame.clobbers.switches {
        sink.push(Reg::SwitchBase);
        sink.push(Reg::SwitchIdx);
    }
}

/// Mirror of [`emit_prologue`], in reverse order.
pub fn emit_epilogue(sink: &mut CodeSink, frame: &FrameInfo) {
    if frame.clobbers.switches {
        sink.pop(Reg::SwitchIdx);
        sink.pop(Reg::SwitchBase);
    }
    if frame.clobbers.loops {
        sink.pop(Reg::LoopCount);
        sink.pop(Reg::LoopFlag);
    }
    if frame.clobbers.returns {
        sink.pop(Reg::ExitFlag);
    }
    if frame.locals > 0 {
        sink.rr("sub", Reg::StackTop, frame.locals as i64);
    }
    sink.pop(Reg::FrameBase);
}

/// Save the caller's own argument registers before a call repacks them.
/// `count` is the caller's arity, not the callee's.
pub fn emit_save_args(sink: &mut CodeSink, count: u8) {
    if count == 0 {
        return;
    }
    if count <= MAX_SAVED_ARGS {
        sink.call(&format!("pushr{count}"));
    } else {
        sink.call("pushall");
    }
}

pub fn emit_restore_args(sink: &mut CodeSink, count: u8) {
    if count == 0 {
        return;
    }
    if count <= MAX_SAVED_ARGS {
        sink.call(&format!("popr{count}"));
    } else {
        sink.call("popall");
    }
}

//! Lowering context.
//!
//! One [`Lowerer`] runs through all modules of a compilation in a single
//! pass: declarations define symbols and claim storage the moment they are
//! seen, expressions emit code immediately after. There is no separate
//! resolution phase; a name used before its declaration is simply an
//! unresolved reference, which matches how the target loader treats its own
//! symbol space.
//!
//! The lowerer owns one [`CodeSink`] at a time. Module-level statements fall
//! into the main state's body; functions, methods, and handlers swap a fresh
//! sink in via [`Lowerer::capture_into`] and push the finished state onto
//! `states`. Metadata slot initialization goes to `startup`, which the final
//! assembly places at the top of `main` so row labels are readable before any
//! user code runs.

mod expr;
mod stmt;

use rustc_hash::FxHashMap;
use tracing::debug;

use skald_ast::{
    Expression, Module, Statement, Type, TypeAnnotation, VariableDecl, VariableKind,
};

use crate::diag::{Category, DiagnosticSink, FileReport};
use crate::emit::{CodeSink, QuoteTable, Reg};
use crate::frames::{emit_restore_args, emit_save_args, FrameInfo};
use crate::layout::{ElemKind, FieldKind, Layout, LayoutEngine};
use crate::natives::{Collection, NativeCatalog};
use crate::symbols::{Symbol, SymbolKind, SymbolTable, ValueKind};
use crate::GlobalSlot;

/// Whether the statements just lowered can leave the construct early. The
/// block walker wraps everything after a may-exit statement in flag guards,
/// so code after a conditional `break` or `return` only runs when neither
/// flag is up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Exits {
    pub breaks: bool,
    pub returns: bool,
}

impl Exits {
    pub fn union(self, other: Exits) -> Exits {
        Exits {
            breaks: self.breaks || other.breaks,
            returns: self.returns || other.returns,
        }
    }

    pub fn any(&self) -> bool {
        self.breaks || self.returns
    }
}

/// What the innermost breakable construct is.
#[derive(Debug, Clone, Copy)]
pub(crate) enum BreakCtx {
    Loop,
    /// `exit` is the case index a break steers the dispatcher to.
    Switch { exit: i64 },
}

/// Everything the final assembly needs out of a finished lowering run.
#[derive(Debug)]
pub(crate) struct Pieces {
    pub states: Vec<String>,
    pub startup: Vec<String>,
    pub main_body: String,
    pub quotes: QuoteTable,
    pub globals: Vec<GlobalSlot>,
    /// One past the last global slot; `rsp` starts here.
    pub globals_size: u32,
    /// Widest argument register the program touches.
    pub max_args: u8,
    pub needs_instmap: bool,
}

pub(crate) struct Lowerer {
    catalog: &'static NativeCatalog,
    comments: bool,
    pub symbols: SymbolTable,
    pub layouts: LayoutEngine,
    pub quotes: QuoteTable,
    pub diags: DiagnosticSink,
    /// Active sink; the main body unless a state capture is in progress.
    pub sink: CodeSink,
    states: Vec<String>,
    startup: Vec<String>,
    globals: Vec<GlobalSlot>,
    /// Frame of the function, method, or handler currently being lowered.
    frame: Option<FrameInfo>,
    /// Class whose member bodies are being lowered, for member resolution.
    cur_class: Option<String>,
    /// Typed view of the current frame's parameters. Each symbol's offset
    /// is the argument register index; shaped parameters carry children so
    /// chains can walk through them.
    param_syms: FxHashMap<String, Symbol>,
    /// How many `rt` reservations are live. Zero means `rt` is free and a
    /// reservation needs no save.
    tmp_depth: u32,
    /// Early exits emitted by callback blocks inside the expression being
    /// lowered. Callbacks inline into the enclosing frame, so their breaks
    /// and returns belong to the statement carrying the call.
    pending_exits: Exits,
    break_stack: Vec<BreakCtx>,
    loop_nest: u32,
    switch_nest: u32,
    /// Next free absolute global slot. Slot 0 stays reserved so no stack
    /// block ever sits at address zero, where it would read as a null
    /// pointer.
    global_cursor: u32,
    /// Next free frame-local slot, relative to `rbp`.
    local_cursor: u32,
    max_args: u8,
    needs_instmap: bool,
}

impl Lowerer {
    pub fn new(comments: bool, catalog: &'static NativeCatalog) -> Lowerer {
        let reserved = Collection::all()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        Lowerer {
            catalog,
            comments,
            symbols: SymbolTable::new(reserved),
            layouts: LayoutEngine::new(),
            quotes: QuoteTable::new(),
            diags: DiagnosticSink::new(),
            sink: CodeSink::new(comments),
            states: Vec::new(),
            startup: Vec::new(),
            globals: Vec::new(),
            frame: None,
            cur_class: None,
            param_syms: FxHashMap::default(),
            tmp_depth: 0,
            pending_exits: Exits::default(),
            break_stack: Vec::new(),
            loop_nest: 0,
            switch_nest: 0,
            global_cursor: 1,
            local_cursor: 0,
            max_args: 0,
            needs_instmap: false,
        }
    }

    /// Lower one module into the running program. Modules share the symbol
    /// table and global space; diagnostics are reported per file.
    pub fn lower_module(&mut self, module: &Module) -> FileReport {
        debug!(file = %module.file, statements = module.statements.len(), "lowering module");
        self.diags.set_file(&module.file);
        for stmt in &module.statements {
            self.lower_module_stmt(stmt);
        }
        self.diags.flush()
    }

    pub fn finish(self) -> Pieces {
        Pieces {
            states: self.states,
            startup: self.startup,
            main_body: self.sink.finish(),
            quotes: self.quotes,
            globals: self.globals,
            globals_size: self.global_cursor,
            max_args: self.max_args,
            needs_instmap: self.needs_instmap,
        }
    }

    fn lower_module_stmt(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Function(f) => self.lower_function_decl(f),
            Statement::Class(c) => self.lower_class_decl(c),
            Statement::Enum(e) => self.lower_enum_decl(e),
            // Everything else, declarations included, runs in main's body.
            other => {
                let exits = self.lower_stmt(other, false);
                if exits.returns {
                    self.diags.error(
                        Category::GrammarRestriction,
                        other.span().line,
                        "return is only valid inside a function or method",
                    );
                }
            }
        }
    }

    // ====================================================================
    // Sink and register plumbing
    // ====================================================================

    /// Run `f` with a fresh sink and hand back what it emitted. The main
    /// sink is untouched; nested captures (a method containing a callback)
    /// stack naturally.
    pub(crate) fn capture_into<T>(&mut self, f: impl FnOnce(&mut Lowerer) -> T) -> (String, T) {
        let saved = std::mem::replace(&mut self.sink, CodeSink::new(self.comments));
        let out = f(self);
        let captured = std::mem::replace(&mut self.sink, saved);
        (captured.finish(), out)
    }

    pub(crate) fn push_state(&mut self, text: String) {
        self.states.push(text);
    }

    pub(crate) fn push_startup(&mut self, line: String) {
        self.startup.push(line);
    }

    /// Reserve the expression temporary. When an enclosing expression is
    /// already holding `rt`, its value goes to the stack first; the matching
    /// [`Lowerer::release_tmp`] brings it back. Returns whether a save was
    /// emitted.
    pub(crate) fn reserve_tmp(&mut self) -> bool {
        let saved = self.tmp_depth > 0;
        if saved {
            self.sink.push(Reg::Tmp);
        }
        self.tmp_depth += 1;
        saved
    }

    pub(crate) fn release_tmp(&mut self, saved: bool) {
        debug_assert!(self.tmp_depth > 0);
        self.tmp_depth -= 1;
        if saved {
            self.sink.pop(Reg::Tmp);
        }
    }

    /// Whether `rt` can be claimed without a spill. Statement-level code is
    /// almost always free; the exception is a statement inside a callback
    /// block that was captured under a live temporary.
    pub(crate) fn tmp_free(&self) -> bool {
        self.tmp_depth == 0
    }

    /// Arity of the frame being lowered; main takes no arguments.
    pub(crate) fn cur_arity(&self) -> u8 {
        self.frame.as_ref().map(|f| f.arity).unwrap_or(0)
    }

    pub(crate) fn frame(&self) -> Option<&FrameInfo> {
        self.frame.as_ref()
    }

    pub(crate) fn set_frame(&mut self, frame: Option<FrameInfo>) -> Option<FrameInfo> {
        std::mem::replace(&mut self.frame, frame)
    }

    pub(crate) fn cur_class(&self) -> Option<&str> {
        self.cur_class.as_deref()
    }

    pub(crate) fn set_cur_class(&mut self, class: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.cur_class, class)
    }

    pub(crate) fn set_param_syms(
        &mut self,
        syms: FxHashMap<String, Symbol>,
    ) -> FxHashMap<String, Symbol> {
        std::mem::replace(&mut self.param_syms, syms)
    }

    pub(crate) fn param_sym(&self, name: &str) -> Option<&Symbol> {
        self.param_syms.get(name)
    }

    pub(crate) fn note_args(&mut self, count: u8) {
        self.max_args = self.max_args.max(count);
    }

    pub(crate) fn catalog(&self) -> &'static NativeCatalog {
        self.catalog
    }

    pub(crate) fn note_exits(&mut self, exits: Exits) {
        self.pending_exits = self.pending_exits.union(exits);
    }

    pub(crate) fn take_exits(&mut self) -> Exits {
        std::mem::take(&mut self.pending_exits)
    }

    pub(crate) fn break_ctx(&self) -> Option<BreakCtx> {
        self.break_stack.last().copied()
    }

    pub(crate) fn push_break_ctx(&mut self, ctx: BreakCtx) {
        self.break_stack.push(ctx);
    }

    pub(crate) fn pop_break_ctx(&mut self) {
        self.break_stack.pop();
    }

    pub(crate) fn enter_loop(&mut self) -> bool {
        let save = self.loop_nest > 0;
        self.loop_nest += 1;
        save
    }

    pub(crate) fn leave_loop(&mut self) {
        self.loop_nest -= 1;
    }

    pub(crate) fn enter_switch(&mut self) -> bool {
        let save = self.switch_nest > 0;
        self.switch_nest += 1;
        save
    }

    pub(crate) fn leave_switch(&mut self) {
        self.switch_nest -= 1;
    }

    pub(crate) fn mark_needs_instmap(&mut self) {
        self.needs_instmap = true;
    }

    /// Claim `size` global slots and record them for embedders.
    pub(crate) fn claim_globals(&mut self, name: &str, size: u32) -> u32 {
        let offset = self.global_cursor;
        self.global_cursor += size;
        self.globals.push(GlobalSlot {
            name: name.to_string(),
            offset,
            size,
        });
        offset
    }

    /// Claim an anonymous global slot (metadata rows).
    pub(crate) fn claim_hidden_global(&mut self) -> u32 {
        let offset = self.global_cursor;
        self.global_cursor += 1;
        offset
    }

    pub(crate) fn reset_local_cursor(&mut self) {
        self.local_cursor = 0;
    }

    pub(crate) fn claim_locals(&mut self, size: u32) -> u32 {
        let offset = self.local_cursor;
        self.local_cursor += size;
        offset
    }

    /// Wrap a runtime state invocation in the caller's own argument save.
    /// `pack` loads the callee's arguments after the save, so it is free to
    /// overwrite `r0..`.
    pub(crate) fn runtime_call(&mut self, state: &str, pack: impl FnOnce(&mut CodeSink)) {
        let m = self.cur_arity();
        emit_save_args(&mut self.sink, m);
        pack(&mut self.sink);
        self.sink.call(state);
        emit_restore_args(&mut self.sink, m);
        self.note_args(2.max(m));
    }

    // ====================================================================
    // Declaration sizing
    // ====================================================================

    /// Frame slots a declaration claims. Must agree exactly with how
    /// `lower_var_decl` lays the declaration out, because the prologue's
    /// `rsp` bump is computed from these before any body code is emitted.
    pub(crate) fn decl_slots(&mut self, v: &VariableDecl) -> u32 {
        if v.kind == VariableKind::Const {
            if let Some(init) = &v.initializer {
                if self.fold_const(init).is_some() {
                    return 0;
                }
            }
        }
        match v.type_annotation.as_ref().map(|a| &a.ty) {
            None | Some(Type::Primitive(_)) => 1,
            Some(Type::Named(n)) => {
                if Collection::from_type_name(n).is_some() || !self.layouts.has_shape(n) {
                    1
                } else if stack_shape_init(v) {
                    self.layouts.size_of(n).unwrap_or(1)
                } else {
                    1
                }
            }
            Some(Type::Array(elem)) => match declared_count(v) {
                Some(n) => 1 + n * self.elem_slot_size(elem),
                None => 1,
            },
        }
    }

    /// Slots one element of a declared array occupies.
    pub(crate) fn elem_slot_size(&mut self, elem: &TypeAnnotation) -> u32 {
        match &elem.ty {
            Type::Named(n) if Collection::from_type_name(n).is_none() => {
                self.layouts.size_of(n).unwrap_or(1)
            }
            _ => 1,
        }
    }

    /// Sum the local slots a body will claim, recursing into nested blocks.
    /// Branches do not share slots; every declaration in the body gets its
    /// own offset for the lifetime of the frame.
    pub(crate) fn plan_frame(&mut self, stmts: &[Statement]) -> u32 {
        let mut total = 0u32;
        for stmt in stmts {
            total += match stmt {
                Statement::Variable(v) => self.decl_slots(v),
                Statement::If(i) => {
                    let mut n = self.plan_frame(&i.then_branch.statements);
                    let mut else_branch = i.else_branch.as_ref();
                    while let Some(clause) = else_branch {
                        match clause {
                            skald_ast::ElseClause::Block(b) => {
                                n += self.plan_frame(&b.statements);
                                else_branch = None;
                            }
                            skald_ast::ElseClause::If(chain) => {
                                n += self.plan_frame(&chain.then_branch.statements);
                                else_branch = chain.else_branch.as_ref();
                            }
                        }
                    }
                    n
                }
                Statement::While(w) => self.plan_frame(&w.body.statements),
                Statement::Switch(s) => s
                    .cases
                    .iter()
                    .map(|c| self.plan_frame(&c.consequent))
                    .sum(),
                Statement::Expression(e) => self.plan_expr_frame(&e.expression),
                _ => 0,
            };
        }
        total
    }

    /// Callback blocks inline into the enclosing frame, so their
    /// declarations count too.
    fn plan_expr_frame(&mut self, expr: &Expression) -> u32 {
        match expr {
            Expression::Call(c) => {
                let mut n = self.plan_expr_frame(&c.callee);
                for a in &c.arguments {
                    n += self.plan_expr_frame(a);
                }
                n
            }
            Expression::Callback(cb) => self.plan_frame(&cb.body.statements),
            Expression::Assignment(a) => {
                self.plan_expr_frame(&a.left) + self.plan_expr_frame(&a.right)
            }
            Expression::Binary(b) => self.plan_expr_frame(&b.left) + self.plan_expr_frame(&b.right),
            Expression::Logical(l) => {
                self.plan_expr_frame(&l.left) + self.plan_expr_frame(&l.right)
            }
            Expression::Unary(u) => self.plan_expr_frame(&u.operand),
            Expression::Member(m) => self.plan_expr_frame(&m.object),
            Expression::Index(i) => {
                self.plan_expr_frame(&i.object) + self.plan_expr_frame(&i.index)
            }
            Expression::Array(a) => a.elements.iter().map(|e| self.plan_expr_frame(e)).sum(),
            Expression::Object(o) => o
                .properties
                .iter()
                .map(|p| self.plan_expr_frame(&p.value))
                .sum(),
            Expression::NewArray(n) => self.plan_expr_frame(&n.length),
            Expression::IntLiteral(_)
            | Expression::StringLiteral(_)
            | Expression::BooleanLiteral(_)
            | Expression::Identifier(_) => 0,
        }
    }

    // ====================================================================
    // Symbol shaping
    // ====================================================================

    /// Member map of a shape: one symbol per field, offsets parent-relative,
    /// plus the shape's methods when the shape comes from a class.
    pub(crate) fn shape_children(&mut self, shape: &str) -> FxHashMap<String, Symbol> {
        let layout = match self.layouts.layout_of(shape) {
            Some(l) => l.clone(),
            None => return FxHashMap::default(),
        };
        let mut children = self.children_from_layout(&layout);
        if let Some(class) = self.symbols.resolve(shape) {
            if class.kind == SymbolKind::Class {
                let methods: Vec<Symbol> = class
                    .children
                    .values()
                    .filter(|c| c.kind == SymbolKind::Function)
                    .cloned()
                    .collect();
                for m in methods {
                    children.insert(m.name.clone(), m);
                }
            }
        }
        children
    }

    pub(crate) fn children_from_layout(&mut self, layout: &Layout) -> FxHashMap<String, Symbol> {
        let mut children = FxHashMap::default();
        for field in &layout.fields {
            let mut sym = match &field.kind {
                FieldKind::Scalar(kind) => scalar_symbol(&field.name, *kind),
                FieldKind::Object {
                    shape, block_size, ..
                } => {
                    // The head slot holds a pointer to the appended block;
                    // chains deref through it like any heap value.
                    let mut s = Symbol::new(field.name.clone(), SymbolKind::Object)
                        .sized(*block_size, 0)
                        .on_heap();
                    s.children = self.shape_children(shape);
                    s
                }
                FieldKind::Array {
                    elem,
                    count,
                    elem_size,
                } => {
                    let mut s = Symbol::new(field.name.clone(), SymbolKind::Array)
                        .sized(1 + count * elem_size, *count);
                    match elem {
                        ElemKind::Scalar(k) => s.returns = *k,
                        ElemKind::Shape(shape) => {
                            s.returns = ValueKind::Object;
                            s.children = self.shape_children(shape);
                        }
                    }
                    s
                }
            };
            sym.offset = field.offset as i32;
            sym.readonly = field.readonly;
            children.insert(field.name.clone(), sym);
        }
        children
    }

    // ====================================================================
    // Static analysis
    // ====================================================================

    /// Fold an expression to a compile-time integer, if it is one.
    pub(crate) fn fold_const(&self, expr: &Expression) -> Option<i64> {
        match expr {
            Expression::IntLiteral(l) => Some(l.value),
            Expression::BooleanLiteral(b) => Some(if b.value { 1 } else { 0 }),
            Expression::Unary(u) if u.operator == skald_ast::UnaryOperator::Minus => {
                self.fold_const(&u.operand).map(|v| -v)
            }
            Expression::Identifier(id) => {
                let sym = self.symbols.resolve(&id.name)?;
                sym.literal
            }
            Expression::Member(_) => self.static_symbol_of(expr).and_then(|s| s.literal),
            _ => None,
        }
    }

    /// Metadata label an expression names, for LABEL-typed native arguments
    /// and constructor row references.
    pub(crate) fn fold_label(&self, expr: &Expression) -> Option<String> {
        let sym = self.static_symbol_of(expr)?;
        if sym.kind == SymbolKind::Pointer {
            sym.target
        } else {
            None
        }
    }

    /// Resolve an expression to a declared symbol without emitting code.
    /// Clones, so chains through children stay borrow-free.
    pub(crate) fn static_symbol_of(&self, expr: &Expression) -> Option<Symbol> {
        match expr {
            Expression::Identifier(id) => {
                if id.name == "this" {
                    let class = self.cur_class.as_deref()?;
                    return self.symbols.resolve(class).cloned();
                }
                if let Some(sym) = self.param_syms.get(&id.name) {
                    return Some(sym.clone());
                }
                match self.symbols.resolve_split(&id.name) {
                    Some((sym, from_module)) => {
                        if from_module {
                            if let Some(member) = self.class_member(&id.name) {
                                return Some(member);
                            }
                        }
                        Some(sym.clone())
                    }
                    None => self.class_member(&id.name),
                }
            }
            Expression::Member(m) => {
                let parent = self.static_symbol_of(&m.object)?;
                parent.children.get(&m.property.name).cloned()
            }
            Expression::Index(ix) => {
                let parent = self.static_symbol_of(&ix.object)?;
                if parent.kind != SymbolKind::Array {
                    return None;
                }
                // Pseudo-symbol for one element.
                let mut elem = Symbol::new(
                    parent.name.clone(),
                    match parent.returns {
                        ValueKind::Object => SymbolKind::Object,
                        ValueKind::Str => SymbolKind::String,
                        _ => SymbolKind::Number,
                    },
                );
                elem.returns = parent.returns;
                elem.children = parent.children;
                if parent.returns == ValueKind::Str {
                    elem.heap = true;
                }
                Some(elem)
            }
            _ => None,
        }
    }

    fn class_member(&self, name: &str) -> Option<Symbol> {
        let class = self.cur_class.as_deref()?;
        self.frame.as_ref()?.this?;
        self.symbols
            .resolve(class)
            .and_then(|c| c.children.get(name))
            .cloned()
    }

    /// Best-effort kind of an expression without lowering it. Drives the
    /// concat-versus-arithmetic split for `+`, owner restriction on method
    /// calls, and shape diagnostics; wrong guesses degrade to warnings, not
    /// bad code.
    pub(crate) fn peek_kind(&self, expr: &Expression) -> ValueKind {
        match expr {
            Expression::IntLiteral(_) | Expression::BooleanLiteral(_) => ValueKind::Number,
            Expression::StringLiteral(_) => ValueKind::Str,
            Expression::Array(_) | Expression::NewArray(_) => ValueKind::Array,
            Expression::Object(_) => ValueKind::Object,
            Expression::Callback(_) => ValueKind::Number,
            Expression::Unary(_) => ValueKind::Number,
            Expression::Identifier(id) => {
                if id.name == "this" {
                    return ValueKind::Object;
                }
                match self.static_symbol_of(expr) {
                    Some(sym) => sym.value_kind(),
                    None if id.name == "self" => ValueKind::Handle(Collection::Actor),
                    None => match Collection::from_name(&id.name) {
                        Some(c) if c.is_singleton() => ValueKind::Handle(c),
                        _ => ValueKind::Number,
                    },
                }
            }
            Expression::Member(m) => {
                match self.peek_kind(&m.object) {
                    ValueKind::Handle(c) => {
                        return self
                            .catalog
                            .field(c, &m.property.name)
                            .map(|f| f.kind())
                            .unwrap_or(ValueKind::Number);
                    }
                    _ => {}
                }
                self.static_symbol_of(expr)
                    .map(|s| s.value_kind())
                    .unwrap_or(ValueKind::Number)
            }
            Expression::Index(ix) => {
                if let Expression::Identifier(id) = ix.object.as_ref() {
                    if let Some(c) = Collection::from_name(&id.name) {
                        if self.symbols.is_reserved(&id.name) {
                            return ValueKind::Handle(c);
                        }
                    }
                }
                match self.peek_kind(&ix.object) {
                    ValueKind::Str => ValueKind::Number,
                    ValueKind::Handle(_) => ValueKind::Number,
                    _ => self
                        .static_symbol_of(&ix.object)
                        .map(|s| s.returns)
                        .unwrap_or(ValueKind::Number),
                }
            }
            Expression::Binary(b) => {
                if b.operator == skald_ast::BinaryOperator::Add {
                    let l = self.peek_kind(&b.left);
                    let r = self.peek_kind(&b.right);
                    if l == ValueKind::Str
                        || r == ValueKind::Str
                        || l == ValueKind::Quote
                        || r == ValueKind::Quote
                    {
                        return ValueKind::Str;
                    }
                }
                ValueKind::Number
            }
            Expression::Logical(_) => ValueKind::Number,
            Expression::Assignment(a) => match a.operator {
                skald_ast::AssignmentOperator::Assign => self.peek_kind(&a.right),
                _ => self.peek_kind(&a.left),
            },
            Expression::Call(c) => self.peek_call_kind(c),
        }
    }

    fn peek_call_kind(&self, call: &skald_ast::CallExpression) -> ValueKind {
        match call.callee.as_ref() {
            Expression::Identifier(id) => {
                if let Some(sym) = self.symbols.resolve(&id.name) {
                    if sym.kind == SymbolKind::Function {
                        return sym.returns;
                    }
                }
                self.catalog
                    .resolve_call(&id.name, None)
                    .and_then(|b| b.returns)
                    .unwrap_or(ValueKind::Number)
            }
            Expression::Member(m) => {
                if let Some(parent) = self.static_symbol_of(&m.object) {
                    if let Some(method) = parent.children.get(&m.property.name) {
                        if method.kind == SymbolKind::Function {
                            return method.returns;
                        }
                    }
                }
                let owner = self.peek_kind(&m.object);
                self.catalog
                    .resolve_call(&m.property.name, Some(owner))
                    .and_then(|b| b.returns)
                    .unwrap_or(ValueKind::Number)
            }
            _ => ValueKind::Number,
        }
    }
}

/// A shape-typed declaration lays out on the stack only when it is
/// initialized structurally (or not at all).
pub(crate) fn stack_shape_init(v: &VariableDecl) -> bool {
    matches!(&v.initializer, None | Some(Expression::Object(_)))
}

/// Compile-time element count from the declaration's initializer.
pub(crate) fn declared_count(v: &VariableDecl) -> Option<u32> {
    match &v.initializer {
        Some(Expression::Array(a)) => Some(a.elements.len() as u32),
        Some(Expression::NewArray(n)) => n.length.as_int().map(|v| v.max(0) as u32),
        None => None,
        _ => None,
    }
}

fn scalar_symbol(name: &str, kind: ValueKind) -> Symbol {
    match kind {
        ValueKind::Str => Symbol::new(name, SymbolKind::String).on_heap(),
        ValueKind::Quote => Symbol::new(name, SymbolKind::String),
        ValueKind::Handle(c) => {
            let mut s = Symbol::new(name, SymbolKind::Pointer);
            s.native_pointer = Some(c);
            s
        }
        ValueKind::Array => Symbol::new(name, SymbolKind::Array).on_heap(),
        ValueKind::Object => Symbol::new(name, SymbolKind::Object).on_heap(),
        ValueKind::Number => Symbol::new(name, SymbolKind::Number),
    }
}

//! Statement and declaration lowering.
//!
//! The target gives us three control primitives: structured guard blocks,
//! `whilen` loops, and the `getpc`/`jump` pair. Everything the source
//! language can say maps onto those. `if`/`else` go straight to guards;
//! loops re-check their condition at the bottom of the block; `break` and
//! `return` raise the construct flags (`rlf`, `rff`) and the block walker
//! wraps whatever follows a may-exit statement in flag guards so control
//! falls out structurally. Only `switch` uses a real jump: the dispatcher
//! records its own address with `getpc` and a `break` steers the selector
//! to the exit index before jumping back to it.
//!
//! Declarations claim storage the moment they are seen. Module-level
//! variables take absolute slots (slot 0 stays reserved), frame locals take
//! `rbp`-relative slots pre-counted by [`Lowerer::plan_frame`]. Functions,
//! methods, and handlers each capture into their own state; classes also
//! push their metadata rows and the startup writes that make row labels
//! readable as values.

use rustc_hash::{FxHashMap, FxHashSet};

use skald_ast::{
    ActionDecl, AiDecl, BinaryOperator, BlockStatement, BreakStatement, ClassDecl, ClassMember,
    ConstructorDecl, ElseClause, EnumDecl, Expression, FieldDecl, FunctionDecl, HandlerDecl,
    IfStatement, LogicalOperator, MethodDecl, MoveDecl, ObjectExpression, Parameter,
    PrimitiveType, ReturnStatement, Statement, SwitchStatement, Type, TypeAnnotation,
    UnaryOperator, VariableDecl, VariableKind, WhileStatement,
};

use crate::diag::Category;
use crate::emit::{Reg, INSTMAP, MEM, QUOTE_CAPACITY};
use crate::frames::{emit_epilogue, emit_prologue, scan_clobbers, FrameInfo};
use crate::layout::{ElemKind, FieldKind, Layout, ShapeField};
use crate::natives::Collection;
use crate::symbols::{ScopeKind, Symbol, SymbolKind, ValueKind};

use super::expr::kinds_clash;
use super::{declared_count, scalar_symbol, stack_shape_init, BreakCtx, Exits, Lowerer};

/// The closed condition grammar. Comparisons become guard heads directly;
/// a bare name is true at one or more, a bare call above zero; the only
/// permitted negation is of an `||` pair. Everything else is rejected
/// rather than guessed at.
enum CondShape<'a> {
    /// `l <op> r` with a native guard op.
    Cmp(&'static str, &'a Expression, &'a Expression),
    And(&'a Expression, &'a Expression),
    Or(&'a Expression, &'a Expression),
    /// `!(a || b)`
    NorPair(&'a Expression, &'a Expression),
    /// Bare identifier, member, or element read.
    Name(&'a Expression),
    /// Bare call.
    CallValue(&'a Expression),
}

fn parse_cond(e: &Expression) -> Option<CondShape<'_>> {
    match e {
        Expression::Binary(b) => {
            let op = match b.operator {
                BinaryOperator::Equal => "ife",
                BinaryOperator::NotEqual => "ifn",
                BinaryOperator::LessThan => "ifl",
                BinaryOperator::LessEqual => "ifle",
                BinaryOperator::GreaterThan => "ifg",
                BinaryOperator::GreaterEqual => "ifge",
                _ => return None,
            };
            Some(CondShape::Cmp(op, &b.left, &b.right))
        }
        Expression::Logical(l) => match l.operator {
            LogicalOperator::And => Some(CondShape::And(&l.left, &l.right)),
            LogicalOperator::Or => Some(CondShape::Or(&l.left, &l.right)),
        },
        Expression::Unary(u) if u.operator == UnaryOperator::Not => match u.operand.as_ref() {
            Expression::Logical(l) if l.operator == LogicalOperator::Or => {
                Some(CondShape::NorPair(&l.left, &l.right))
            }
            _ => None,
        },
        Expression::Identifier(_) | Expression::Member(_) | Expression::Index(_) => {
            Some(CondShape::Name(e))
        }
        Expression::Call(_) => Some(CondShape::CallValue(e)),
        _ => None,
    }
}

/// Where a declared block lives: an absolute slot, or a register holding
/// its base address plus a displacement.
enum BlockBase {
    Abs(i64),
    Reg(Reg, i64),
}

impl BlockBase {
    fn advanced(&self, disp: i64) -> BlockBase {
        match self {
            BlockBase::Abs(a) => BlockBase::Abs(a + disp),
            BlockBase::Reg(r, d) => BlockBase::Reg(*r, d + disp),
        }
    }
}

impl Lowerer {
    /// Lower a run of statements. After a statement that can exit early,
    /// the rest of the run is wrapped in flag guards so a raised `rlf` or
    /// `rff` skips straight to the end of the construct.
    pub(crate) fn lower_stmts(&mut self, stmts: &[Statement], tail: bool) -> Exits {
        let (first, rest) = match stmts.split_first() {
            Some(pair) => pair,
            None => return Exits::default(),
        };
        let exits = self.lower_stmt(first, tail && rest.is_empty());
        if rest.is_empty() {
            return exits;
        }
        if !exits.any() {
            return exits.union(self.lower_stmts(rest, tail));
        }
        if exits.returns {
            self.sink.open("ife rff 0");
        }
        if exits.breaks {
            self.sink.open("ife rlf 0");
        }
        let rest_exits = self.lower_stmts(rest, tail);
        if exits.breaks {
            self.sink.close();
        }
        if exits.returns {
            self.sink.close();
        }
        exits.union(rest_exits)
    }

    /// Lower one statement. `is_tail` marks the final statement of a
    /// function body, where a `return` can skip raising `rff` because the
    /// epilogue follows immediately.
    pub(crate) fn lower_stmt(&mut self, stmt: &Statement, is_tail: bool) -> Exits {
        match stmt {
            Statement::Variable(v) => {
                self.lower_var_decl(v);
                self.take_exits()
            }
            Statement::Expression(e) => {
                self.lower_expr(&e.expression, Reg::Acc);
                self.take_exits()
            }
            Statement::If(i) => self.lower_if(i, is_tail),
            Statement::While(w) => self.lower_while(w),
            Statement::Switch(s) => self.lower_switch(s),
            Statement::Break(b) => self.lower_break(b),
            Statement::Return(r) => self.lower_return(r, is_tail),
            Statement::Function(f) => {
                self.diags.error(
                    Category::GrammarRestriction,
                    f.span.line,
                    format!("function '{}' must be declared at module level", f.name.name),
                );
                Exits::default()
            }
            Statement::Class(c) => {
                self.diags.error(
                    Category::GrammarRestriction,
                    c.span.line,
                    format!("class '{}' must be declared at module level", c.name.name),
                );
                Exits::default()
            }
            Statement::Enum(e) => {
                self.diags.error(
                    Category::GrammarRestriction,
                    e.span.line,
                    format!("enum '{}' must be declared at module level", e.name.name),
                );
                Exits::default()
            }
        }
    }

    fn lower_block(&mut self, block: &BlockStatement, tail: bool) -> Exits {
        self.symbols.push_scope(ScopeKind::Block);
        let exits = self.lower_stmts(&block.statements, tail);
        self.symbols.pop_scope();
        exits
    }

    // ====================================================================
    // Conditions
    // ====================================================================

    /// Reduce a condition to a 0/1 flag in `ra`. `&&` and `||` short
    /// circuit through guard blocks: the right side only evaluates when
    /// the left side hasn't already decided the answer.
    fn lower_cond_flag(&mut self, cond: &Expression, line: u32) {
        match parse_cond(cond) {
            Some(CondShape::Cmp(op, l, r)) => {
                let saved = self.reserve_tmp();
                self.lower_expr(l, Reg::Acc);
                self.sink.set(Reg::Tmp, Reg::Acc);
                self.lower_expr(r, Reg::Acc);
                self.sink.set(Reg::Addr, 0);
                self.sink.open(format!("{} rt ra", op));
                self.sink.set(Reg::Addr, 1);
                self.sink.close();
                self.sink.set(Reg::Acc, Reg::Addr);
                self.release_tmp(saved);
            }
            Some(CondShape::And(l, r)) => {
                self.lower_cond_flag(l, line);
                self.sink.open("ife ra 1");
                self.lower_cond_flag(r, line);
                self.sink.close();
            }
            Some(CondShape::Or(l, r)) => {
                self.lower_cond_flag(l, line);
                self.sink.open("ife ra 0");
                self.lower_cond_flag(r, line);
                self.sink.close();
            }
            Some(CondShape::NorPair(l, r)) => {
                self.lower_cond_flag(l, line);
                self.sink.open("ife ra 0");
                self.lower_cond_flag(r, line);
                self.sink.close();
                self.sink.rr("bxor", Reg::Acc, 1);
            }
            Some(CondShape::Name(e)) => {
                self.lower_expr(e, Reg::Acc);
                self.sink.set(Reg::Addr, 0);
                self.sink.open("ifge ra 1");
                self.sink.set(Reg::Addr, 1);
                self.sink.close();
                self.sink.set(Reg::Acc, Reg::Addr);
            }
            Some(CondShape::CallValue(e)) => {
                self.lower_expr(e, Reg::Acc);
                self.sink.set(Reg::Addr, 0);
                self.sink.open("ifg ra 0");
                self.sink.set(Reg::Addr, 1);
                self.sink.close();
                self.sink.set(Reg::Acc, Reg::Addr);
            }
            None => {
                self.diags.error(
                    Category::GrammarRestriction,
                    line,
                    "not a valid condition; use a comparison, a name, a call, \
                     or combine those with && and ||",
                );
                self.sink.set(Reg::Acc, 0);
            }
        }
    }

    // ====================================================================
    // Control flow
    // ====================================================================

    fn lower_if(&mut self, i: &IfStatement, is_tail: bool) -> Exits {
        let line = i.span.line;
        match parse_cond(&i.condition) {
            // A bare comparison guards the block directly. Needs `rt` held
            // across both operands without a spill, so fall back to the
            // flag form on the rare statement that runs under a live
            // temporary (a callback body captured mid-expression).
            Some(CondShape::Cmp(op, l, r)) if self.tmp_free() => {
                let saved = self.reserve_tmp();
                self.lower_expr(l, Reg::Acc);
                self.sink.set(Reg::Tmp, Reg::Acc);
                self.lower_expr(r, Reg::Acc);
                self.sink.open(format!("{} rt ra", op));
                self.release_tmp(saved);
                self.lower_branches(i, is_tail)
            }
            Some(CondShape::Name(e)) => {
                self.lower_expr(e, Reg::Acc);
                self.sink.open("ifge ra 1");
                self.lower_branches(i, is_tail)
            }
            Some(CondShape::CallValue(e)) => {
                self.lower_expr(e, Reg::Acc);
                self.sink.open("ifg ra 0");
                self.lower_branches(i, is_tail)
            }
            _ => {
                self.lower_cond_flag(&i.condition, line);
                self.sink.open("ife ra 1");
                self.lower_branches(i, is_tail)
            }
        }
    }

    /// Branches of an `if` whose guard is already open.
    fn lower_branches(&mut self, i: &IfStatement, is_tail: bool) -> Exits {
        let cond_exits = self.take_exits();
        let mut exits = self.lower_block(&i.then_branch, is_tail);
        match &i.else_branch {
            Some(ElseClause::Block(b)) => {
                self.sink.close_else();
                exits = exits.union(self.lower_block(b, is_tail));
                self.sink.close();
            }
            Some(ElseClause::If(chain)) => {
                self.sink.close_else();
                exits = exits.union(self.lower_if(chain, is_tail));
                self.sink.close();
            }
            None => self.sink.close(),
        }
        cond_exits.union(exits)
    }

    /// `while` re-checks its condition at the bottom of the `whilen`
    /// block. A raised `rlf` or `rff` forces the next check to zero, so
    /// the loop exits through its own head with no jump.
    fn lower_while(&mut self, w: &WhileStatement) -> Exits {
        let line = w.span.line;
        self.sink.comment("while");
        let need_save = self.enter_loop();
        if need_save {
            self.sink.push(Reg::LoopFlag);
            self.sink.push(Reg::LoopCount);
        }
        self.sink.set(Reg::LoopFlag, 0);
        self.sink.set(Reg::LoopCount, 0);
        self.lower_cond_flag(&w.condition, line);
        self.sink.open("whilen ra 0");
        self.push_break_ctx(BreakCtx::Loop);
        let body = self.lower_block(&w.body, false);
        self.pop_break_ctx();
        if body.any() {
            if body.breaks && body.returns {
                self.sink.set(Reg::Addr, 0);
                self.sink.open("ife rlf 1");
                self.sink.set(Reg::Addr, 1);
                self.sink.close();
                self.sink.open("ife rff 1");
                self.sink.set(Reg::Addr, 1);
                self.sink.close();
                self.sink.open("ife rx 1");
            } else if body.breaks {
                self.sink.open("ife rlf 1");
            } else {
                self.sink.open("ife rff 1");
            }
            self.sink.set(Reg::Acc, 0);
            self.sink.close_else();
            self.sink.rr("add", Reg::LoopCount, 1);
            self.lower_cond_flag(&w.condition, line);
            self.sink.close();
        } else {
            self.sink.rr("add", Reg::LoopCount, 1);
            self.lower_cond_flag(&w.condition, line);
        }
        self.sink.close();
        self.leave_loop();
        if need_save {
            self.sink.pop(Reg::LoopCount);
            self.sink.pop(Reg::LoopFlag);
        }
        let cond_exits = self.take_exits();
        Exits {
            breaks: false,
            returns: body.returns || cond_exits.returns,
        }
    }

    /// Switch dispatch. The selector walks the case tests once, mapping
    /// the match to `case index + 2`; `getpc rsb` then anchors the
    /// dispatcher and each case body runs under an `ife rsi n` guard.
    /// Falling off a body steps the selector to the next case; `break`
    /// steers it to the exit index and jumps back to the anchor, where no
    /// guard matches any more.
    fn lower_switch(&mut self, s: &SwitchStatement) -> Exits {
        self.sink.comment("switch");
        let exit = s.cases.len() as i64 + 2;
        self.lower_expr(&s.discriminant, Reg::Acc);
        let mut pending = self.take_exits();
        let need_save = self.enter_switch();
        if need_save {
            self.sink.push(Reg::SwitchBase);
            self.sink.push(Reg::SwitchIdx);
        }
        let saved = self.reserve_tmp();
        self.sink.set(Reg::Tmp, Reg::Acc);
        self.sink.set(Reg::SwitchIdx, 1);
        let mut default_at: Option<i64> = None;
        for (k, case) in s.cases.iter().enumerate() {
            let target = k as i64 + 2;
            match &case.test {
                Some(test) => {
                    self.sink.open("ife rsi 1");
                    self.lower_expr(test, Reg::Acc);
                    pending = pending.union(self.take_exits());
                    self.sink.open("ife rt ra");
                    self.sink.set(Reg::SwitchIdx, target);
                    self.sink.close();
                    self.sink.close();
                }
                None => {
                    if default_at.is_some() {
                        self.diags.error(
                            Category::GrammarRestriction,
                            case.span.line,
                            "switch takes a single default case",
                        );
                    } else {
                        default_at = Some(target);
                    }
                }
            }
        }
        self.sink.open("ife rsi 1");
        self.sink.set(Reg::SwitchIdx, default_at.unwrap_or(exit));
        self.sink.close();
        self.release_tmp(saved);
        self.sink.line("getpc rsb");
        let mut returns = false;
        for (k, case) in s.cases.iter().enumerate() {
            let target = k as i64 + 2;
            self.sink.open(format!("ife rsi {}", target));
            self.push_break_ctx(BreakCtx::Switch { exit });
            self.symbols.push_scope(ScopeKind::Block);
            let exits = self.lower_stmts(&case.consequent, false);
            self.symbols.pop_scope();
            self.pop_break_ctx();
            self.sink.set(Reg::SwitchIdx, target + 1);
            if exits.returns {
                returns = true;
                self.sink.open("ife rff 1");
                self.sink.set(Reg::SwitchIdx, exit);
                self.sink.close();
            }
            self.sink.close();
        }
        self.leave_switch();
        if need_save {
            self.sink.pop(Reg::SwitchIdx);
            self.sink.pop(Reg::SwitchBase);
        }
        Exits {
            breaks: false,
            returns: returns || pending.returns,
        }
    }

    fn lower_break(&mut self, b: &BreakStatement) -> Exits {
        match self.break_ctx() {
            Some(BreakCtx::Loop) => {
                self.sink.set(Reg::LoopFlag, 1);
                Exits {
                    breaks: true,
                    returns: false,
                }
            }
            Some(BreakCtx::Switch { exit }) => {
                self.sink.set(Reg::SwitchIdx, exit);
                self.sink.line("jump rsb");
                Exits::default()
            }
            None => {
                self.diags.error(
                    Category::GrammarRestriction,
                    b.span.line,
                    "break outside a loop or switch",
                );
                Exits::default()
            }
        }
    }

    fn lower_return(&mut self, r: &ReturnStatement, is_tail: bool) -> Exits {
        let declared = self.frame().map(|f| f.returns);
        match &r.value {
            Some(v) => {
                let got = self.lower_expr(v, Reg::Ret);
                if let Some(want) = declared {
                    if kinds_clash(want, got) {
                        self.diags.warning(
                            Category::ShapeMismatch,
                            r.span.line,
                            format!(
                                "returning a {} from a function declared to return a {}",
                                got.describe(),
                                want.describe()
                            ),
                        );
                    }
                }
            }
            None => self.sink.set(Reg::Ret, 0),
        }
        if !is_tail {
            self.sink.set(Reg::ExitFlag, 1);
        }
        let pending = self.take_exits();
        Exits {
            breaks: pending.breaks,
            returns: true,
        }
    }

    // ====================================================================
    // Variable declarations
    // ====================================================================

    fn lower_var_decl(&mut self, v: &VariableDecl) {
        let line = v.span.line;
        let name = v.name.name.clone();
        let at_module = self.symbols.at_module_level();
        let readonly = v.kind == VariableKind::Const;
        if self.sink.comments_enabled() {
            self.sink.comment(format!(
                "{} {}",
                if readonly { "const" } else { "var" },
                name
            ));
        }

        // A const that folds costs nothing at runtime; anything else keeps
        // its slot and just refuses stores.
        if readonly {
            if let Some(init) = &v.initializer {
                if let Some(value) = self.fold_const(init) {
                    self.define_or_diag(Symbol::constant(&name, value), line);
                    return;
                }
            }
        }

        match v.type_annotation.as_ref().map(|a| &a.ty) {
            Some(Type::Primitive(PrimitiveType::Quote)) => {
                self.lower_quote_decl(v, &name, at_module, readonly, line);
            }
            Some(Type::Primitive(PrimitiveType::String)) => {
                let template = Symbol::new(&name, SymbolKind::String).on_heap();
                self.lower_slot_decl(v, &name, at_module, readonly, Some(ValueKind::Str), template, line);
            }
            Some(Type::Primitive(_)) => {
                let template = Symbol::new(&name, SymbolKind::Number);
                self.lower_slot_decl(v, &name, at_module, readonly, Some(ValueKind::Number), template, line);
            }
            Some(Type::Named(n)) => {
                if let Some(c) = Collection::from_type_name(n) {
                    let mut template = Symbol::new(&name, SymbolKind::Pointer);
                    template.native_pointer = Some(c);
                    self.lower_slot_decl(
                        v,
                        &name,
                        at_module,
                        readonly,
                        Some(ValueKind::Handle(c)),
                        template,
                        line,
                    );
                } else if !self.layouts.has_shape(n) {
                    self.diags.error(
                        Category::UnresolvedReference,
                        line,
                        format!("unknown type '{}'", n),
                    );
                    let template = Symbol::new(&name, SymbolKind::Number);
                    self.lower_slot_decl(v, &name, at_module, readonly, None, template, line);
                } else if stack_shape_init(v) {
                    self.lower_stack_shape_decl(v, &name, n, at_module, readonly, line);
                } else {
                    // Initialized from a call or another value: the block
                    // lives wherever that value says, we hold a pointer.
                    let size = self.layouts.size_of(n).unwrap_or(1);
                    let mut template =
                        Symbol::new(&name, SymbolKind::Object).sized(size, 0).on_heap();
                    template.children = self.shape_children(n);
                    self.lower_slot_decl(
                        v,
                        &name,
                        at_module,
                        readonly,
                        Some(ValueKind::Object),
                        template,
                        line,
                    );
                }
            }
            Some(Type::Array(elem)) => match declared_count(v) {
                Some(count) => {
                    self.lower_stack_array_decl(v, &name, elem, count, at_module, readonly, line);
                }
                None => {
                    let mut template = Symbol::new(&name, SymbolKind::Array).on_heap();
                    template.returns = self.layouts.annotation_kind(elem);
                    if let Type::Named(n) = &elem.ty {
                        if self.layouts.has_shape(n) {
                            template.children = self.shape_children(n);
                        }
                    }
                    self.lower_slot_decl(
                        v,
                        &name,
                        at_module,
                        readonly,
                        Some(ValueKind::Array),
                        template,
                        line,
                    );
                }
            },
            None => self.lower_untyped_decl(v, &name, at_module, readonly, line),
        }
    }

    /// Untyped declarations take their shape from the initializer.
    fn lower_untyped_decl(
        &mut self,
        v: &VariableDecl,
        name: &str,
        at_module: bool,
        readonly: bool,
        line: u32,
    ) {
        match &v.initializer {
            Some(Expression::Object(o)) => {
                // Anonymous shape: one slot per property, in writing order.
                let mut children = FxHashMap::default();
                for (i, p) in o.properties.iter().enumerate() {
                    let kind = self.peek_kind(&p.value);
                    let mut child = scalar_symbol(&p.key.name, kind);
                    child.offset = i as i32;
                    if children.insert(p.key.name.clone(), child).is_some() {
                        self.diags.warning(
                            Category::GrammarRestriction,
                            p.span.line,
                            format!("duplicate key '{}'", p.key.name),
                        );
                    }
                }
                let mut template = Symbol::new(name, SymbolKind::Object).on_heap();
                template.children = children;
                self.lower_slot_decl(v, name, at_module, readonly, None, template, line);
            }
            Some(init) => {
                let template = match self.peek_kind(init) {
                    ValueKind::Str => Symbol::new(name, SymbolKind::String).on_heap(),
                    ValueKind::Quote => Symbol::new(name, SymbolKind::String),
                    ValueKind::Array => {
                        let mut t = Symbol::new(name, SymbolKind::Array).on_heap();
                        t.returns = match init {
                            Expression::Array(a) => a
                                .elements
                                .first()
                                .map(|e| self.peek_kind(e))
                                .unwrap_or(ValueKind::Number),
                            _ => ValueKind::Number,
                        };
                        t
                    }
                    ValueKind::Object => Symbol::new(name, SymbolKind::Object).on_heap(),
                    ValueKind::Handle(c) => {
                        let mut t = Symbol::new(name, SymbolKind::Pointer);
                        t.native_pointer = Some(c);
                        t
                    }
                    ValueKind::Number => Symbol::new(name, SymbolKind::Number),
                };
                self.lower_slot_decl(v, name, at_module, readonly, None, template, line);
            }
            None => {
                let template = Symbol::new(name, SymbolKind::Number);
                self.lower_slot_decl(v, name, at_module, readonly, None, template, line);
            }
        }
    }

    /// Shared path for every one-slot declaration: claim the slot, lower
    /// the initializer into it (or zero a frame local), define the symbol.
    #[allow(clippy::too_many_arguments)]
    fn lower_slot_decl(
        &mut self,
        v: &VariableDecl,
        name: &str,
        at_module: bool,
        readonly: bool,
        declared: Option<ValueKind>,
        template: Symbol,
        line: u32,
    ) {
        let (offset, global) = if at_module {
            (self.claim_globals(name, 1), true)
        } else {
            (self.claim_locals(1), false)
        };
        match &v.initializer {
            Some(init) => {
                let got = self.lower_expr(init, Reg::Acc);
                if let Some(want) = declared {
                    if kinds_clash(want, got) {
                        self.diags.warning(
                            Category::ShapeMismatch,
                            line,
                            format!(
                                "'{}' is declared as a {} but initialized with a {}",
                                name,
                                want.describe(),
                                got.describe()
                            ),
                        );
                    }
                }
                self.store_acc_slot(offset, global);
            }
            None => {
                // Frame slots carry whatever the previous frame left there.
                if !global {
                    self.store_imm_slot(offset, false, 0);
                }
            }
        }
        let mut sym = template.at_offset(offset as i32);
        sym.global = global;
        sym.readonly = readonly;
        self.define_or_diag(sym, line);
    }

    fn lower_quote_decl(
        &mut self,
        v: &VariableDecl,
        name: &str,
        at_module: bool,
        readonly: bool,
        line: u32,
    ) {
        let (offset, global) = if at_module {
            (self.claim_globals(name, 1), true)
        } else {
            (self.claim_locals(1), false)
        };
        let mut id = 0i64;
        match &v.initializer {
            Some(Expression::StringLiteral(s)) => {
                let q = self.quotes.intern(&s.value);
                if q.truncated {
                    self.diags.warning(
                        Category::CapacityViolation,
                        line,
                        format!(
                            "text for '{}' is longer than {} characters and was cut",
                            name, QUOTE_CAPACITY
                        ),
                    );
                }
                id = q.id as i64;
            }
            Some(other) => {
                self.diags.error(
                    Category::GrammarRestriction,
                    other.span().line,
                    "quote variables take a string literal",
                );
            }
            None => {}
        }
        if id != 0 {
            self.store_imm_slot(offset, global, id);
        } else if !global {
            self.store_imm_slot(offset, false, 0);
        }
        let mut sym = Symbol::new(name, SymbolKind::String).at_offset(offset as i32);
        sym.global = global;
        sym.readonly = readonly;
        self.define_or_diag(sym, line);
    }

    /// A shape declared with a structural initializer (or none) lays out
    /// directly in flat memory: zeroed, headers and inner-block pointers
    /// wired, class defaults applied, then any literal fields stored.
    fn lower_stack_shape_decl(
        &mut self,
        v: &VariableDecl,
        name: &str,
        shape: &str,
        at_module: bool,
        readonly: bool,
        line: u32,
    ) {
        let layout = match self.layouts.layout_of(shape) {
            Some(l) => l.clone(),
            None => return,
        };
        let (offset, global) = if at_module {
            (self.claim_globals(name, layout.size), true)
        } else {
            (self.claim_locals(layout.size), false)
        };
        let base = if global {
            BlockBase::Abs(offset as i64)
        } else {
            BlockBase::Reg(Reg::FrameBase, offset as i64)
        };
        if !global {
            self.zero_frame_slots(offset, layout.size);
        }
        self.wire_block(&layout, &base);
        if let Some(Expression::Object(o)) = &v.initializer {
            self.store_shape_literal(o, &layout, &base);
        }
        let mut sym = Symbol::new(name, SymbolKind::Object)
            .sized(layout.size, 0)
            .at_offset(offset as i32);
        sym.children = self.shape_children(shape);
        sym.global = global;
        sym.readonly = readonly;
        self.define_or_diag(sym, line);
    }

    /// An array with a compile-time length is a length-prefixed block in
    /// place, elements inline.
    #[allow(clippy::too_many_arguments)]
    fn lower_stack_array_decl(
        &mut self,
        v: &VariableDecl,
        name: &str,
        elem: &TypeAnnotation,
        count: u32,
        at_module: bool,
        readonly: bool,
        line: u32,
    ) {
        let elem_size = self.elem_slot_size(elem);
        let size = 1 + count * elem_size;
        let (offset, global) = if at_module {
            (self.claim_globals(name, size), true)
        } else {
            (self.claim_locals(size), false)
        };
        let base = if global {
            BlockBase::Abs(offset as i64)
        } else {
            BlockBase::Reg(Reg::FrameBase, offset as i64)
        };
        if !global {
            self.zero_frame_slots(offset, size);
        }
        self.store_block_imm(&base, 0, count as i64);

        let shaped = matches!(&elem.ty, Type::Named(n) if self.layouts.has_shape(n));
        if shaped {
            if let Type::Named(n) = &elem.ty {
                if let Some(inner) = self.layouts.layout_of(n).cloned() {
                    for i in 0..count {
                        self.wire_block(&inner, &base.advanced((1 + i * elem_size) as i64));
                    }
                }
            }
            if let Some(Expression::Array(a)) = &v.initializer {
                if !a.elements.is_empty() {
                    self.diags.error(
                        Category::GrammarRestriction,
                        a.span.line,
                        "arrays of blocks cannot take element initializers",
                    );
                }
            }
        } else if let Some(Expression::Array(a)) = &v.initializer {
            for (i, e) in a.elements.iter().enumerate() {
                self.lower_expr(e, Reg::Acc);
                self.store_block_acc(&base, (1 + i as u32 * elem_size) as i64);
            }
        }

        let mut sym = Symbol::new(name, SymbolKind::Array)
            .sized(size, count)
            .at_offset(offset as i32);
        sym.returns = self.layouts.annotation_kind(elem);
        if shaped {
            if let Type::Named(n) = &elem.ty {
                sym.children = self.shape_children(n);
            }
        }
        sym.global = global;
        sym.readonly = readonly;
        self.define_or_diag(sym, line);
    }

    fn define_or_diag(&mut self, sym: Symbol, line: u32) {
        if let Err(e) = self.symbols.define(sym) {
            self.diags
                .error(Category::GrammarRestriction, line, e.to_string());
        }
    }

    // ====================================================================
    // Slot and block stores
    // ====================================================================

    fn store_acc_slot(&mut self, offset: u32, global: bool) {
        if global {
            self.sink.seta(MEM, offset as i64, Reg::Acc);
        } else {
            self.sink.set(Reg::Addr, Reg::FrameBase);
            if offset > 0 {
                self.sink.rr("add", Reg::Addr, offset as i64);
            }
            self.sink.seta(MEM, Reg::Addr, Reg::Acc);
        }
    }

    fn store_imm_slot(&mut self, offset: u32, global: bool, value: i64) {
        if global {
            self.sink.seta(MEM, offset as i64, value);
        } else {
            self.sink.set(Reg::Addr, Reg::FrameBase);
            if offset > 0 {
                self.sink.rr("add", Reg::Addr, offset as i64);
            }
            self.sink.seta(MEM, Reg::Addr, value);
        }
    }

    fn zero_frame_slots(&mut self, offset: u32, size: u32) {
        if size == 0 {
            return;
        }
        if size <= 3 {
            for i in 0..size {
                self.store_imm_slot(offset + i, false, 0);
            }
            return;
        }
        let saved = self.reserve_tmp();
        self.sink.set(Reg::Addr, Reg::FrameBase);
        if offset > 0 {
            self.sink.rr("add", Reg::Addr, offset as i64);
        }
        self.sink.set(Reg::Tmp, Reg::Addr);
        self.sink.rr("add", Reg::Tmp, size as i64);
        self.sink.open("whilen rx rt");
        self.sink.seta(MEM, Reg::Addr, 0);
        self.sink.rr("add", Reg::Addr, 1);
        self.sink.close();
        self.release_tmp(saved);
    }

    /// Zero `size` slots starting at the address in `base`.
    fn zero_reg_block(&mut self, base: Reg, size: u32) {
        if size == 0 {
            return;
        }
        let saved = self.reserve_tmp();
        self.sink.set(Reg::Tmp, base);
        self.sink.rr("add", Reg::Tmp, size as i64);
        self.sink.set(Reg::Addr, base);
        self.sink.open("whilen rx rt");
        self.sink.seta(MEM, Reg::Addr, 0);
        self.sink.rr("add", Reg::Addr, 1);
        self.sink.close();
        self.release_tmp(saved);
    }

    fn store_block_imm(&mut self, base: &BlockBase, slot: i64, value: i64) {
        match base {
            BlockBase::Abs(a) => self.sink.seta(MEM, a + slot, value),
            BlockBase::Reg(r, d) => {
                self.sink.set(Reg::Addr, *r);
                let disp = d + slot;
                if disp != 0 {
                    self.sink.rr("add", Reg::Addr, disp);
                }
                self.sink.seta(MEM, Reg::Addr, value);
            }
        }
    }

    /// Store the accumulator into a block slot. The value must already be
    /// in `ra`; the address computes afterwards so the value expression is
    /// free to clobber `rx`.
    fn store_block_acc(&mut self, base: &BlockBase, slot: i64) {
        match base {
            BlockBase::Abs(a) => self.sink.seta(MEM, a + slot, Reg::Acc),
            BlockBase::Reg(r, d) => {
                self.sink.set(Reg::Addr, *r);
                let disp = d + slot;
                if disp != 0 {
                    self.sink.rr("add", Reg::Addr, disp);
                }
                self.sink.seta(MEM, Reg::Addr, Reg::Acc);
            }
        }
    }

    /// Write a block's own address arithmetic into one of its slots: the
    /// pointer a nested block's head slot holds.
    fn store_block_addr(&mut self, base: &BlockBase, slot: i64, target: i64) {
        match base {
            BlockBase::Abs(a) => self.sink.seta(MEM, a + slot, a + target),
            BlockBase::Reg(r, d) => {
                self.sink.set(Reg::Addr, *r);
                let td = d + target;
                if td != 0 {
                    self.sink.rr("add", Reg::Addr, td);
                }
                self.sink.set(Reg::Acc, Reg::Addr);
                self.sink.set(Reg::Addr, *r);
                let sd = d + slot;
                if sd != 0 {
                    self.sink.rr("add", Reg::Addr, sd);
                }
                self.sink.seta(MEM, Reg::Addr, Reg::Acc);
            }
        }
    }

    /// Make a freshly zeroed block usable: array length headers, nested
    /// block pointers, and the shape's literal defaults, recursively.
    fn wire_block(&mut self, layout: &Layout, base: &BlockBase) {
        for field in &layout.fields {
            match &field.kind {
                FieldKind::Scalar(_) => {
                    if let Some(value) = self.field_default(&layout.shape, &field.name) {
                        if value != 0 {
                            self.store_block_imm(base, field.offset as i64, value);
                        }
                    }
                }
                FieldKind::Object {
                    shape,
                    block_offset,
                    ..
                } => {
                    self.store_block_addr(base, field.offset as i64, *block_offset as i64);
                    if let Some(inner) = self.layouts.layout_of(shape).cloned() {
                        self.wire_block(&inner, &base.advanced(*block_offset as i64));
                    }
                }
                FieldKind::Array {
                    elem,
                    count,
                    elem_size,
                } => {
                    self.store_block_imm(base, field.offset as i64, *count as i64);
                    if let ElemKind::Shape(shape) = elem {
                        if let Some(inner) = self.layouts.layout_of(shape).cloned() {
                            for i in 0..*count {
                                let at = field.offset + 1 + i * elem_size;
                                self.wire_block(&inner, &base.advanced(at as i64));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Literal default of a scalar field, recorded on the class symbol
    /// when the class was declared.
    fn field_default(&self, shape: &str, field: &str) -> Option<i64> {
        self.symbols
            .resolve(shape)
            .and_then(|class| class.children.get(field))
            .and_then(|child| child.literal)
    }

    /// Store an object literal's properties into an in-place block.
    fn store_shape_literal(&mut self, obj: &ObjectExpression, layout: &Layout, base: &BlockBase) {
        for p in &obj.properties {
            let field = match layout.field(&p.key.name) {
                Some(f) => f.clone(),
                None => {
                    self.diags.warning(
                        Category::UnresolvedReference,
                        p.span.line,
                        format!("'{}' has no field '{}'", layout.shape, p.key.name),
                    );
                    continue;
                }
            };
            match &field.kind {
                FieldKind::Scalar(_) => {
                    self.lower_expr(&p.value, Reg::Acc);
                    self.store_block_acc(base, field.offset as i64);
                }
                FieldKind::Object {
                    shape,
                    block_offset,
                    ..
                } => match &p.value {
                    Expression::Object(inner) => {
                        if let Some(il) = self.layouts.layout_of(shape).cloned() {
                            self.store_shape_literal(inner, &il, &base.advanced(*block_offset as i64));
                        }
                    }
                    other => {
                        self.diags.warning(
                            Category::ShapeMismatch,
                            other.span().line,
                            format!("field '{}' is an inline block and only takes a literal", p.key.name),
                        );
                    }
                },
                FieldKind::Array {
                    elem,
                    count,
                    elem_size,
                } => match (&p.value, elem) {
                    (Expression::Array(a), ElemKind::Scalar(_)) => {
                        if a.elements.len() as u32 != *count {
                            self.diags.warning(
                                Category::ShapeMismatch,
                                a.span.line,
                                format!(
                                    "'{}' holds {} element(s), literal has {}",
                                    p.key.name,
                                    count,
                                    a.elements.len()
                                ),
                            );
                        }
                        let elems: Vec<&Expression> =
                            a.elements.iter().take(*count as usize).collect();
                        for (i, e) in elems.into_iter().enumerate() {
                            self.lower_expr(e, Reg::Acc);
                            self.store_block_acc(
                                base,
                                (field.offset + 1 + i as u32 * elem_size) as i64,
                            );
                        }
                    }
                    (Expression::Array(a), ElemKind::Shape(_)) => {
                        if !a.elements.is_empty() {
                            self.diags.error(
                                Category::GrammarRestriction,
                                a.span.line,
                                "arrays of blocks cannot take element initializers",
                            );
                        }
                    }
                    (other, _) => {
                        self.diags.warning(
                            Category::ShapeMismatch,
                            other.span().line,
                            format!("field '{}' takes an array literal", p.key.name),
                        );
                    }
                },
            }
        }
    }

    // ====================================================================
    // Functions
    // ====================================================================

    pub(crate) fn lower_function_decl(&mut self, f: &FunctionDecl) {
        let line = f.span.line;
        let name = &f.name.name;
        let state = format!("fn_{}", name);
        let returns = f
            .return_type
            .as_ref()
            .map(|a| self.layouts.annotation_kind(a))
            .unwrap_or(ValueKind::Number);
        let arity = f.params.len() as u8;
        let sym = Symbol::function(name, returns)
            .sized(0, arity as u32)
            .with_target(state.clone());
        if let Err(e) = self.symbols.define_global(sym) {
            self.diags
                .error(Category::GrammarRestriction, line, e.to_string());
        }

        let mut frame = FrameInfo::new(state);
        let mut param_syms = FxHashMap::default();
        for (i, p) in f.params.iter().enumerate() {
            let kind = p
                .type_annotation
                .as_ref()
                .map(|a| self.layouts.annotation_kind(a))
                .unwrap_or(ValueKind::Number);
            frame.params.insert(p.name.name.clone(), (i as u8, kind));
            param_syms.insert(p.name.name.clone(), self.param_symbol(p, i as u8));
        }
        frame.arity = arity;
        frame.locals = self.plan_frame(&f.body.statements);
        frame.clobbers = scan_clobbers(&f.body.statements);
        frame.returns = returns;
        self.emit_frame_body(frame, param_syms, None, &f.body, true, |_| {});
    }

    /// Typed view of one parameter for chain resolution. The offset is the
    /// argument register index; the register already holds pointers for
    /// aggregate parameters, so none of these are heap symbols.
    fn param_symbol(&mut self, p: &Parameter, index: u8) -> Symbol {
        let name = &p.name.name;
        let mut sym = match p.type_annotation.as_ref().map(|a| &a.ty) {
            Some(Type::Named(n)) => {
                if let Some(c) = Collection::from_type_name(n) {
                    let mut s = Symbol::new(name, SymbolKind::Pointer);
                    s.native_pointer = Some(c);
                    s
                } else if self.layouts.has_shape(n) {
                    let size = self.layouts.size_of(n).unwrap_or(1);
                    let mut s = Symbol::new(name, SymbolKind::Object).sized(size, 0);
                    s.children = self.shape_children(n);
                    s
                } else {
                    Symbol::new(name, SymbolKind::Number)
                }
            }
            Some(Type::Array(elem)) => {
                let elem_size = self.elem_slot_size(elem);
                let mut s = Symbol::new(name, SymbolKind::Array).sized(elem_size + 1, 1);
                s.returns = self.layouts.annotation_kind(elem);
                if let Type::Named(n) = &elem.ty {
                    if self.layouts.has_shape(n) {
                        s.children = self.shape_children(n);
                    }
                }
                s
            }
            Some(Type::Primitive(PrimitiveType::String)) => {
                Symbol::new(name, SymbolKind::String).on_heap()
            }
            Some(Type::Primitive(PrimitiveType::Quote)) => Symbol::new(name, SymbolKind::String),
            _ => Symbol::new(name, SymbolKind::Number),
        };
        sym.offset = index as i32;
        sym
    }

    /// Capture one frame's state: prologue, body, epilogue, all inside a
    /// `state` block pushed onto the program. `preamble` runs between the
    /// prologue and the body (the handler's instance setup).
    fn emit_frame_body(
        &mut self,
        frame: FrameInfo,
        param_syms: FxHashMap<String, Symbol>,
        class: Option<String>,
        body: &BlockStatement,
        set_ret: bool,
        preamble: impl FnOnce(&mut Lowerer),
    ) {
        let arity = frame.arity;
        let saved_frame = self.set_frame(Some(frame.clone()));
        let saved_params = self.set_param_syms(param_syms);
        let saved_class = self.set_cur_class(class);
        self.reset_local_cursor();
        let (text, _) = self.capture_into(|lw| {
            lw.sink.open(format!("state {}", frame.state));
            emit_prologue(&mut lw.sink, &frame);
            if set_ret {
                lw.sink.set(Reg::Ret, 0);
            }
            preamble(lw);
            lw.symbols.push_scope(ScopeKind::Function);
            lw.lower_stmts(&body.statements, true);
            lw.symbols.pop_scope();
            emit_epilogue(&mut lw.sink, &frame);
            lw.sink.close();
        });
        self.push_state(text);
        self.set_frame(saved_frame);
        self.set_param_syms(saved_params);
        self.set_cur_class(saved_class);
        self.note_args(arity);
    }

    // ====================================================================
    // Classes
    // ====================================================================

    pub(crate) fn lower_class_decl(&mut self, c: &ClassDecl) {
        let class_name = c.name.name.clone();
        let line = c.span.line;

        let mut fields: Vec<&FieldDecl> = Vec::new();
        let mut methods: Vec<&MethodDecl> = Vec::new();
        let mut handlers: Vec<&HandlerDecl> = Vec::new();
        let mut ctor: Option<&ConstructorDecl> = None;
        let mut actions: Vec<&ActionDecl> = Vec::new();
        let mut moves: Vec<&MoveDecl> = Vec::new();
        let mut ais: Vec<&AiDecl> = Vec::new();
        for member in &c.members {
            match member {
                ClassMember::Field(f) => fields.push(f),
                ClassMember::Method(m) => methods.push(m),
                ClassMember::Constructor(k) => {
                    if ctor.is_some() {
                        self.diags.error(
                            Category::GrammarRestriction,
                            k.span.line,
                            "a class takes a single constructor",
                        );
                    } else {
                        ctor = Some(k);
                    }
                }
                ClassMember::Handler(h) => handlers.push(h),
                ClassMember::Action(a) => actions.push(a),
                ClassMember::Move(m) => moves.push(m),
                ClassMember::Ai(ai) => ais.push(ai),
            }
        }

        // Shape first, so methods and later declarations can lay it out.
        let shape_fields: Vec<ShapeField> = fields
            .iter()
            .map(|f| ShapeField {
                name: f.name.name.clone(),
                annotation: f.type_annotation.clone(),
                declared_count: field_count(f),
                readonly: f.readonly,
            })
            .collect();
        self.layouts.register_shape(&class_name, shape_fields);
        let layout = match self.layouts.layout_of(&class_name) {
            Some(l) => l.clone(),
            None => return,
        };
        for issue in self.layouts.take_issues() {
            self.diags.warning(
                Category::GrammarRestriction,
                line,
                format!(
                    "array field '{}.{}' needs a literal length and was laid out empty",
                    issue.shape, issue.field
                ),
            );
        }

        let mut sym = Symbol::new(&class_name, SymbolKind::Class).sized(layout.size, 0);
        sym.children = self.children_from_layout(&layout);
        self.collect_field_defaults(&fields, &mut sym);

        let action_names: FxHashSet<&str> =
            actions.iter().map(|a| a.name.name.as_str()).collect();
        let move_names: FxHashSet<&str> = moves.iter().map(|m| m.name.name.as_str()).collect();

        for a in &actions {
            let label = format!("{}_{}", class_name, a.name.name);
            self.push_state(render_row("action", &label, &a.values));
            self.add_row_symbol(&mut sym, &a.name.name, &label, a.span.line);
        }
        for m in &moves {
            let label = format!("{}_{}", class_name, m.name.name);
            self.push_state(render_row("move", &label, &m.values));
            self.add_row_symbol(&mut sym, &m.name.name, &label, m.span.line);
        }
        for ai in &ais {
            if !action_names.contains(ai.action.name.as_str()) {
                self.diags.error(
                    Category::UnresolvedReference,
                    ai.span.line,
                    format!("ai '{}' names unknown action '{}'", ai.name.name, ai.action.name),
                );
                continue;
            }
            if !move_names.contains(ai.movement.name.as_str()) {
                self.diags.error(
                    Category::UnresolvedReference,
                    ai.span.line,
                    format!("ai '{}' names unknown move '{}'", ai.name.name, ai.movement.name),
                );
                continue;
            }
            let label = format!("{}_{}", class_name, ai.name.name);
            self.push_state(format!(
                "ai {} {}_{} {}_{} {}",
                label, class_name, ai.action.name, class_name, ai.movement.name, ai.flags
            ));
            self.add_row_symbol(&mut sym, &ai.name.name, &label, ai.span.line);
        }

        for m in &methods {
            let returns = m
                .return_type
                .as_ref()
                .map(|a| self.layouts.annotation_kind(a))
                .unwrap_or(ValueKind::Number);
            let msym = Symbol::function(&m.name.name, returns)
                .sized(0, m.params.len() as u32)
                .with_target(format!("{}_{}", class_name, m.name.name));
            if sym.children.insert(m.name.name.clone(), msym).is_some() {
                self.diags.warning(
                    Category::GrammarRestriction,
                    m.span.line,
                    format!("'{}' is declared more than once in this class", m.name.name),
                );
            }
        }

        if let Some(k) = ctor {
            if let Some(row) = self.parse_entity_row(&class_name, k, &action_names, &move_names) {
                self.push_state(row);
            }
        } else if let Some(h) = handlers.first() {
            self.diags.error(
                Category::GrammarRestriction,
                h.span.line,
                format!(
                    "'{}' handles events but has no constructor to declare it as an entity",
                    class_name
                ),
            );
        }

        if let Err(e) = self.symbols.define_global(sym) {
            self.diags
                .error(Category::GrammarRestriction, line, e.to_string());
        }

        for m in &methods {
            self.lower_method(&class_name, m);
        }
        if ctor.is_some() {
            for h in &handlers {
                self.lower_handler(&class_name, h, &layout);
                self.push_state(format!(
                    "handler {} {} {}_on_{}",
                    class_name, h.event.name, class_name, h.event.name
                ));
            }
        }
    }

    /// Record foldable scalar defaults on the class symbol's children and
    /// reject everything the wiring pass can't reproduce.
    fn collect_field_defaults(&mut self, fields: &[&FieldDecl], sym: &mut Symbol) {
        for f in fields {
            let init = match &f.initializer {
                Some(init) => init,
                None => continue,
            };
            match init {
                Expression::Array(a) => {
                    let any_nonzero = a
                        .elements
                        .iter()
                        .any(|e| self.fold_const(e).map_or(true, |v| v != 0));
                    if any_nonzero {
                        self.diags.warning(
                            Category::GrammarRestriction,
                            f.span.line,
                            format!(
                                "element defaults on '{}' are not applied; set them in a spawn handler",
                                f.name.name
                            ),
                        );
                    }
                }
                Expression::NewArray(_) => {}
                Expression::Object(_) => {
                    self.diags.warning(
                        Category::GrammarRestriction,
                        f.span.line,
                        format!(
                            "'{}' takes its shape's own defaults; a literal here is ignored",
                            f.name.name
                        ),
                    );
                }
                other => match self.fold_const(other) {
                    Some(value) => {
                        if let Some(child) = sym.children.get_mut(&f.name.name) {
                            child.literal = Some(value);
                        }
                    }
                    None => {
                        self.diags.error(
                            Category::GrammarRestriction,
                            f.span.line,
                            format!(
                                "default for '{}' must be a compile-time value",
                                f.name.name
                            ),
                        );
                    }
                },
            }
        }
    }

    /// A metadata row gets a hidden global slot so the row is usable as a
    /// value; the label itself stays usable as a label. The slot loads at
    /// startup, before any user code runs.
    fn add_row_symbol(&mut self, class_sym: &mut Symbol, name: &str, label: &str, line: u32) {
        let slot = self.claim_hidden_global();
        self.push_startup(format!("set ra {}", label));
        self.push_startup(format!("seta mem {} ra", slot));
        let mut row = Symbol::new(name, SymbolKind::Pointer)
            .at_offset(slot as i32)
            .with_target(label);
        row.global = true;
        row.readonly = true;
        if class_sym.children.insert(name.to_string(), row).is_some() {
            self.diags.warning(
                Category::GrammarRestriction,
                line,
                format!("'{}' is declared more than once in this class", name),
            );
        }
    }

    /// The constructor's single `base(...)` call carries the entity row:
    /// tag, enemy flag, strength, and optional starting action and move.
    /// Anything else in the body is warned about and skipped.
    fn parse_entity_row(
        &mut self,
        class: &str,
        k: &ConstructorDecl,
        actions: &FxHashSet<&str>,
        moves: &FxHashSet<&str>,
    ) -> Option<String> {
        let mut base_call = None;
        for stmt in &k.body.statements {
            if base_call.is_none() {
                if let Statement::Expression(e) = stmt {
                    if let Expression::Call(call) = &e.expression {
                        if matches!(call.callee.as_ref(),
                            Expression::Identifier(id) if id.name == "base")
                        {
                            base_call = Some(call);
                            continue;
                        }
                    }
                }
            }
            self.diags.warning(
                Category::GrammarRestriction,
                stmt.span().line,
                "constructor bodies hold a single base(...) call; \
                 this statement is skipped",
            );
        }
        let call = match base_call {
            Some(call) => call,
            None => {
                self.diags.warning(
                    Category::GrammarRestriction,
                    k.span.line,
                    format!("'{}' has no base(...) call; no entity row emitted", class),
                );
                return None;
            }
        };
        let line = k.span.line;
        let mut args = call.arguments.iter();

        let tag = match args.next().and_then(|e| self.fold_const(e)) {
            Some(v) => v,
            None => {
                self.diags.error(
                    Category::GrammarRestriction,
                    line,
                    "base() needs a compile-time tag as its first argument",
                );
                return None;
            }
        };
        let enemy = match args.next() {
            Some(e) => match self.fold_const(e) {
                Some(v) => i64::from(v != 0),
                None => {
                    self.diags.error(
                        Category::GrammarRestriction,
                        line,
                        "the enemy flag must be a compile-time value",
                    );
                    0
                }
            },
            None => 0,
        };
        let strength = match args.next() {
            Some(e) => match self.fold_const(e) {
                Some(v) => v,
                None => {
                    self.diags.error(
                        Category::GrammarRestriction,
                        line,
                        "strength must be a compile-time value",
                    );
                    0
                }
            },
            None => 0,
        };
        let action = match args.next() {
            Some(e) => match row_ref(e, actions) {
                Some(n) => Some(format!("{}_{}", class, n)),
                None => {
                    self.diags.error(
                        Category::UnresolvedReference,
                        line,
                        "the fourth base() argument names one of the class's actions",
                    );
                    None
                }
            },
            None => None,
        };
        let movement = match args.next() {
            Some(e) => match row_ref(e, moves) {
                Some(n) => Some(format!("{}_{}", class, n)),
                None => {
                    self.diags.error(
                        Category::UnresolvedReference,
                        line,
                        "the fifth base() argument names one of the class's moves",
                    );
                    None
                }
            },
            None => None,
        };
        if args.next().is_some() {
            self.diags.warning(
                Category::GrammarRestriction,
                line,
                "base() takes at most five arguments",
            );
        }

        let mut row = format!("entity {} {} {} {}", class, tag, enemy, strength);
        if let Some(a) = &action {
            row.push(' ');
            row.push_str(a);
            if let Some(m) = &movement {
                row.push(' ');
                row.push_str(m);
            }
        }
        Some(row)
    }

    fn lower_method(&mut self, class: &str, m: &MethodDecl) {
        let state = format!("{}_{}", class, m.name.name);
        let nparams = m.params.len() as u8;
        let mut frame = FrameInfo::new(state);
        let mut param_syms = FxHashMap::default();
        for (i, p) in m.params.iter().enumerate() {
            let kind = p
                .type_annotation
                .as_ref()
                .map(|a| self.layouts.annotation_kind(a))
                .unwrap_or(ValueKind::Number);
            frame.params.insert(p.name.name.clone(), (i as u8, kind));
            param_syms.insert(p.name.name.clone(), self.param_symbol(p, i as u8));
        }
        // The instance pointer rides in the register after the last
        // declared parameter.
        frame.arity = nparams + 1;
        frame.this = Some(nparams);
        frame.locals = self.plan_frame(&m.body.statements);
        frame.clobbers = scan_clobbers(&m.body.statements);
        frame.returns = m
            .return_type
            .as_ref()
            .map(|a| self.layouts.annotation_kind(a))
            .unwrap_or(ValueKind::Number);
        self.emit_frame_body(frame, param_syms, Some(class.to_string()), &m.body, true, |_| {});
    }

    /// Event handlers run with the dispatched entity's index in the
    /// engine's `self` var. The instance block is found (or allocated on
    /// first dispatch) through the entity-to-instance map and handed to
    /// the body as `this` in `r0`.
    fn lower_handler(&mut self, class: &str, h: &HandlerDecl, layout: &Layout) {
        let state = format!("{}_on_{}", class, h.event.name);
        let mut frame = FrameInfo::new(state);
        frame.arity = 1;
        frame.this = Some(0);
        frame.locals = self.plan_frame(&h.body.statements);
        frame.clobbers = scan_clobbers(&h.body.statements);
        let size = layout.size;
        let layout = layout.clone();
        self.emit_frame_body(
            frame,
            FxHashMap::default(),
            Some(class.to_string()),
            &h.body,
            false,
            move |lw| {
                if size == 0 {
                    lw.sink.set(Reg::Arg(0), 0);
                    return;
                }
                lw.mark_needs_instmap();
                lw.sink.geta(Reg::Addr, INSTMAP, "self");
                lw.sink.open("ife rx 0");
                lw.sink.set(Reg::Arg(0), size as i64);
                lw.sink.set(Reg::Arg(1), 1);
                lw.sink.call("gcalloc");
                lw.note_args(2);
                lw.zero_reg_block(Reg::Ret, size);
                lw.wire_block(&layout, &BlockBase::Reg(Reg::Ret, 0));
                lw.sink.seta(INSTMAP, "self", Reg::Ret);
                lw.sink.close();
                lw.sink.geta(Reg::Arg(0), INSTMAP, "self");
            },
        );
    }

    // ====================================================================
    // Enums
    // ====================================================================

    pub(crate) fn lower_enum_decl(&mut self, e: &EnumDecl) {
        let mut sym = Symbol::new(&e.name.name, SymbolKind::Enum);
        let mut next = 0i64;
        for v in &e.variants {
            let value = v.value.unwrap_or(next);
            next = value + 1;
            let variant = Symbol::constant(&v.name.name, value);
            if sym.children.insert(v.name.name.clone(), variant).is_some() {
                self.diags.warning(
                    Category::GrammarRestriction,
                    v.span.line,
                    format!("duplicate variant '{}'", v.name.name),
                );
            }
        }
        if let Err(err) = self.symbols.define_global(sym) {
            self.diags
                .error(Category::GrammarRestriction, e.span.line, err.to_string());
        }
    }
}

/// Compile-time element count of a field declaration.
fn field_count(f: &FieldDecl) -> Option<u32> {
    match &f.initializer {
        Some(Expression::Array(a)) => Some(a.elements.len() as u32),
        Some(Expression::NewArray(n)) => n.length.as_int().map(|v| v.max(0) as u32),
        _ => None,
    }
}

fn render_row(kind: &str, label: &str, values: &[i64]) -> String {
    let mut out = format!("{} {}", kind, label);
    for v in values {
        out.push(' ');
        out.push_str(&v.to_string());
    }
    out
}

fn row_ref<'a>(e: &'a Expression, declared: &FxHashSet<&str>) -> Option<&'a str> {
    match e {
        Expression::Identifier(id) if declared.contains(id.name.as_str()) => Some(&id.name),
        _ => None,
    }
}

//! Expression lowering.
//!
//! Every expression lowers into a destination register, almost always the
//! accumulator. Composite expressions hold their left value in `rt` under
//! the reservation discipline ([`Lowerer::reserve_tmp`]): the first holder
//! takes the register for free, nested holders spill it to the value stack
//! and restore it on release, so arbitrarily deep trees cost stack traffic
//! only where they actually overlap.
//!
//! Member and index chains resolve through a compile-time cursor that stays
//! symbolic (absolute slot, frame slot, register plus displacement) as long
//! as it can and materializes into `rx` only when an address genuinely has
//! to exist at runtime. Collection handles leave the flat-memory world: the
//! cursor switches to an entity index and field access goes through the
//! catalog's parallel-array templates.

use rustc_hash::FxHashMap;

use skald_ast::{
    AssignmentExpression, BinaryOperator, CallExpression, Expression, Identifier, UnaryOperator,
};

use crate::diag::Category;
use crate::emit::{Operand, Reg, MEM};
use crate::frames::{emit_restore_args, emit_save_args};
use crate::natives::{Binding, Collection, FieldTemplate, ResolvedCall, Template};
use crate::symbols::{Symbol, SymbolKind, ValueKind};

use super::Lowerer;

/// Address-in-progress while a chain resolves. Displacements stay symbolic
/// until a step forces them into `rx`.
#[derive(Debug, Clone)]
enum Cursor {
    /// Absolute flat-memory slot.
    Abs(i64),
    /// `rbp`-relative frame slot.
    Frame(i64),
    /// A register holding the value itself.
    InReg(Reg),
    /// Memory at register plus displacement.
    RegRel(Reg, i64),
    /// Address computed into `rx`, plus a pending displacement.
    Rx(i64),
    /// Folded compile-time value.
    Folded(i64),
    /// A pure name space (class, enum, function name); only members of it
    /// mean anything.
    Namespace,
    /// A world collection awaiting its subscript.
    CollectionBase(Collection),
    /// One entity: collection plus index operand text. The index text is
    /// never `ra`, so parked values can be popped without clobbering it.
    Entity { c: Collection, index: String },
    /// A native field of an entity, not yet read or written.
    NativeField { field: FieldTemplate, index: String },
    /// Re-based subscript in progress (`sector.walls`): the base index of
    /// the target collection is live in `rx`.
    OverrideBase { target: Collection },
}

/// What the walker knows about the value a chain prefix denotes.
struct Chain {
    cursor: Cursor,
    kind: ValueKind,
    readonly: bool,
    /// The cursor addresses a slot holding a heap pointer; the next
    /// navigation step dereferences through it.
    heap: bool,
    children: FxHashMap<String, Symbol>,
    elem_size: u32,
    elem_kind: ValueKind,
}

impl Chain {
    fn value(cursor: Cursor, kind: ValueKind) -> Chain {
        Chain {
            cursor,
            kind,
            readonly: false,
            heap: false,
            children: FxHashMap::default(),
            elem_size: 1,
            elem_kind: ValueKind::Number,
        }
    }

    /// The cursor addresses a stack block whose value is its own address.
    fn is_block(&self) -> bool {
        !self.heap
            && matches!(self.kind, ValueKind::Object | ValueKind::Array)
            && matches!(
                self.cursor,
                Cursor::Abs(_) | Cursor::Frame(_) | Cursor::RegRel(..) | Cursor::Rx(_)
            )
    }
}

/// A resolved assignable location. `Indirect` slots live in `rx` and must
/// be consumed before anything else computes an address.
#[derive(Debug)]
pub(crate) enum Slot {
    Reg(Reg),
    Abs(i64),
    Frame(i64),
    Indirect,
    Native { field: FieldTemplate, index: String },
}

#[derive(Debug)]
pub(crate) struct Place {
    pub slot: Slot,
    pub kind: ValueKind,
    pub readonly: bool,
}

impl Lowerer {
    /// Lower `e` into `dest`, returning the kind of value produced. `dest`
    /// is any register except `rt` and `rx`, which belong to the lowering
    /// machinery itself.
    pub(crate) fn lower_expr(&mut self, e: &Expression, dest: Reg) -> ValueKind {
        debug_assert!(!matches!(dest, Reg::Tmp | Reg::Addr));
        match e {
            Expression::IntLiteral(l) => {
                self.sink.set(dest, l.value);
                ValueKind::Number
            }
            Expression::BooleanLiteral(b) => {
                self.sink.set(dest, if b.value { 1 } else { 0 });
                ValueKind::Number
            }
            Expression::StringLiteral(s) => self.lower_string_literal(&s.value, dest),
            Expression::Identifier(_) | Expression::Member(_) | Expression::Index(_) => {
                let line = e.span().line;
                match self.walk_chain(e) {
                    Some(chain) => self.read_chain(chain, dest, line),
                    None => {
                        self.sink.set(dest, 0);
                        ValueKind::Number
                    }
                }
            }
            Expression::Array(a) => self.lower_array_literal(&a.elements, dest),
            Expression::Object(o) => self.lower_object_literal(o, dest),
            Expression::NewArray(n) => self.lower_new_array(&n.length, dest),
            Expression::Unary(u) => self.lower_unary(u.operator, &u.operand, dest, u.span.line),
            Expression::Binary(b) => self.lower_binary(b, dest),
            Expression::Logical(l) => {
                self.diags.error(
                    Category::GrammarRestriction,
                    l.span.line,
                    "logical operators are only valid inside conditions",
                );
                self.sink.set(dest, 0);
                ValueKind::Number
            }
            Expression::Assignment(a) => self.lower_assignment(a, dest),
            Expression::Call(c) => self.lower_call(c, dest),
            Expression::Callback(cb) => {
                self.diags.error(
                    Category::GrammarRestriction,
                    cb.span.line,
                    "callback blocks are only valid as native call arguments",
                );
                self.sink.set(dest, 0);
                ValueKind::Number
            }
        }
    }

    // ====================================================================
    // Scalars
    // ====================================================================

    fn lower_unary(
        &mut self,
        op: UnaryOperator,
        operand: &Expression,
        dest: Reg,
        line: u32,
    ) -> ValueKind {
        match op {
            UnaryOperator::Minus => {
                if let Some(v) = self.fold_const(operand) {
                    self.sink.set(dest, -v);
                    return ValueKind::Number;
                }
                let saved = self.reserve_tmp();
                self.lower_expr(operand, Reg::Acc);
                self.sink.set(Reg::Tmp, 0);
                self.sink.rr("sub", Reg::Tmp, Reg::Acc);
                self.sink.set(dest, Reg::Tmp);
                self.release_tmp(saved);
                ValueKind::Number
            }
            UnaryOperator::Not => {
                self.diags.error(
                    Category::GrammarRestriction,
                    line,
                    "negation is only valid inside conditions",
                );
                self.sink.set(dest, 0);
                ValueKind::Number
            }
        }
    }

    fn lower_binary(&mut self, b: &skald_ast::BinaryExpression, dest: Reg) -> ValueKind {
        let line = b.span.line;
        if b.operator.is_comparison() {
            self.diags.error(
                Category::GrammarRestriction,
                line,
                "comparisons are only valid inside conditions",
            );
            self.sink.set(dest, 0);
            return ValueKind::Number;
        }

        if b.operator == BinaryOperator::Add {
            let lk = self.peek_kind(&b.left);
            let rk = self.peek_kind(&b.right);
            if matches!(lk, ValueKind::Str | ValueKind::Quote)
                || matches!(rk, ValueKind::Str | ValueKind::Quote)
            {
                return self.lower_concat(&b.left, &b.right, dest, line);
            }
        }

        // Both sides compile-time: fold the whole node.
        if let (Some(l), Some(r)) = (self.fold_const(&b.left), self.fold_const(&b.right)) {
            if let Some(v) = fold_binary(b.operator, l, r) {
                self.sink.set(dest, v);
                return ValueKind::Number;
            }
        }

        let op = binary_op_text(b.operator);
        if let Some(r) = self.fold_const(&b.right) {
            self.check_numeric(&b.left, line);
            self.lower_expr(&b.left, Reg::Acc);
            self.sink.rr(op, Reg::Acc, r);
            if dest != Reg::Acc {
                self.sink.set(dest, Reg::Acc);
            }
            return ValueKind::Number;
        }

        self.check_numeric(&b.left, line);
        self.check_numeric(&b.right, line);
        let saved = self.reserve_tmp();
        self.lower_expr(&b.left, Reg::Acc);
        self.sink.set(Reg::Tmp, Reg::Acc);
        self.lower_expr(&b.right, Reg::Acc);
        self.sink.rr(op, Reg::Tmp, Reg::Acc);
        self.sink.set(dest, Reg::Tmp);
        self.release_tmp(saved);
        ValueKind::Number
    }

    fn check_numeric(&mut self, e: &Expression, line: u32) {
        let kind = self.peek_kind(e);
        if matches!(kind, ValueKind::Str | ValueKind::Quote) {
            self.diags.warning(
                Category::ShapeMismatch,
                line,
                format!("{} value used in arithmetic", kind.describe()),
            );
        }
    }

    // ====================================================================
    // Strings
    // ====================================================================

    fn lower_string_literal(&mut self, text: &str, dest: Reg) -> ValueKind {
        let chars: Vec<i64> = text.chars().map(|c| c as u32 as i64).collect();
        let len = chars.len() as i64;
        self.runtime_call("gcalloc", |s| {
            s.set(Reg::Arg(0), len + 1);
            s.set(Reg::Arg(1), 0);
        });
        self.sink.seta(MEM, Reg::Ret, len);
        self.sink.set(Reg::Addr, Reg::Ret);
        for ch in chars {
            self.sink.rr("add", Reg::Addr, 1);
            self.sink.seta(MEM, Reg::Addr, ch);
        }
        if dest != Reg::Ret {
            self.sink.set(dest, Reg::Ret);
        }
        ValueKind::Str
    }

    /// `+` with a string side: build a fresh heap string from both halves.
    /// Numbers pass through the runtime's formatter first.
    fn lower_concat(
        &mut self,
        left: &Expression,
        right: &Expression,
        dest: Reg,
        line: u32,
    ) -> ValueKind {
        let lk = self.lower_expr(left, Reg::Acc);
        self.coerce_to_str(lk, line);
        self.sink.push(Reg::Acc);
        let rk = self.lower_expr(right, Reg::Acc);
        self.coerce_to_str(rk, line);
        self.sink.pop(Reg::Addr);
        self.runtime_call("rt_strcat", |s| {
            s.set(Reg::Arg(0), Reg::Addr);
            s.set(Reg::Arg(1), Reg::Acc);
        });
        if dest != Reg::Ret {
            self.sink.set(dest, Reg::Ret);
        }
        ValueKind::Str
    }

    /// Turn the accumulator into a heap string pointer if it is not one.
    fn coerce_to_str(&mut self, kind: ValueKind, line: u32) {
        match kind {
            ValueKind::Str => {}
            ValueKind::Number | ValueKind::Handle(_) => {
                self.runtime_call("rt_itoa", |s| {
                    s.set(Reg::Arg(0), Reg::Acc);
                });
                self.sink.set(Reg::Acc, Reg::Ret);
            }
            ValueKind::Quote => {
                self.diags.error(
                    Category::ShapeMismatch,
                    line,
                    "quote strings live in the fixed table and cannot be concatenated",
                );
            }
            ValueKind::Array | ValueKind::Object => {
                self.diags.warning(
                    Category::ShapeMismatch,
                    line,
                    "block pointer formatted as a number in string concatenation",
                );
                self.runtime_call("rt_itoa", |s| {
                    s.set(Reg::Arg(0), Reg::Acc);
                });
                self.sink.set(Reg::Acc, Reg::Ret);
            }
        }
    }

    // ====================================================================
    // Heap literals
    // ====================================================================

    fn lower_array_literal(&mut self, elements: &[Expression], dest: Reg) -> ValueKind {
        let n = elements.len() as i64;
        self.runtime_call("gcalloc", |s| {
            s.set(Reg::Arg(0), n + 1);
            s.set(Reg::Arg(1), 1);
        });
        self.sink.seta(MEM, Reg::Ret, n);
        self.sink.push(Reg::Ret);
        for (i, e) in elements.iter().enumerate() {
            self.lower_expr(e, Reg::Acc);
            self.reload_parked_base();
            self.sink.rr("add", Reg::Addr, 1 + i as i64);
            self.sink.seta(MEM, Reg::Addr, Reg::Acc);
        }
        self.sink.pop(Reg::Acc);
        if dest != Reg::Acc {
            self.sink.set(dest, Reg::Acc);
        }
        ValueKind::Array
    }

    fn lower_object_literal(&mut self, o: &skald_ast::ObjectExpression, dest: Reg) -> ValueKind {
        let n = (o.properties.len() as i64).max(1);
        self.runtime_call("gcalloc", |s| {
            s.set(Reg::Arg(0), n);
            s.set(Reg::Arg(1), 1);
        });
        self.sink.push(Reg::Ret);
        for (i, p) in o.properties.iter().enumerate() {
            self.lower_expr(&p.value, Reg::Acc);
            self.reload_parked_base();
            if i > 0 {
                self.sink.rr("add", Reg::Addr, i as i64);
            }
            self.sink.seta(MEM, Reg::Addr, Reg::Acc);
        }
        self.sink.pop(Reg::Acc);
        if dest != Reg::Acc {
            self.sink.set(dest, Reg::Acc);
        }
        ValueKind::Object
    }

    fn lower_new_array(&mut self, length: &Expression, dest: Reg) -> ValueKind {
        self.lower_expr(length, Reg::Acc);
        self.runtime_call("gcalloc", |s| {
            s.set(Reg::Arg(0), Reg::Acc);
            s.rr("add", Reg::Arg(0), 1);
            s.set(Reg::Arg(1), 1);
        });
        self.sink.seta(MEM, Reg::Ret, Reg::Acc);
        // Pages get reused, so fresh arrays are zeroed explicitly.
        let saved = self.reserve_tmp();
        self.sink.set(Reg::Tmp, Reg::Ret);
        self.sink.rr("add", Reg::Tmp, Reg::Acc);
        self.sink.rr("add", Reg::Tmp, 1);
        self.sink.set(Reg::Addr, Reg::Ret);
        self.sink.rr("add", Reg::Addr, 1);
        self.sink.open("whilen rx rt");
        self.sink.seta(MEM, Reg::Addr, 0);
        self.sink.rr("add", Reg::Addr, 1);
        self.sink.close();
        self.release_tmp(saved);
        if dest != Reg::Ret {
            self.sink.set(dest, Reg::Ret);
        }
        ValueKind::Array
    }

    /// Load the block base parked on top of the stack into `rx` without
    /// popping it.
    fn reload_parked_base(&mut self) {
        self.sink.set(Reg::Addr, Reg::StackTop);
        self.sink.rr("sub", Reg::Addr, 1);
        self.sink.geta(Reg::Addr, MEM, Reg::Addr);
    }

    // ====================================================================
    // Assignment
    // ====================================================================

    fn lower_assignment(&mut self, a: &AssignmentExpression, dest: Reg) -> ValueKind {
        let line = a.span.line;
        match a.operator.binary_op() {
            None => {
                let kind = self.lower_expr(&a.right, Reg::Acc);
                self.store_acc(&a.left, kind, line);
                if dest != Reg::Acc {
                    self.sink.set(dest, Reg::Acc);
                }
                kind
            }
            Some(BinaryOperator::Add)
                if matches!(self.peek_kind(&a.left), ValueKind::Str)
                    || matches!(self.peek_kind(&a.right), ValueKind::Str | ValueKind::Quote) =>
            {
                let kind = self.lower_concat(&a.left, &a.right, Reg::Acc, line);
                self.store_acc(&a.left, kind, line);
                if dest != Reg::Acc {
                    self.sink.set(dest, Reg::Acc);
                }
                kind
            }
            Some(op) => self.lower_compound(&a.left, &a.right, op, dest, line),
        }
    }

    /// Store the accumulator into the place `left` names, parking it while
    /// any address code runs.
    fn store_acc(&mut self, left: &Expression, kind: ValueKind, line: u32) {
        let place = if place_is_static(left) {
            self.resolve_place(left)
        } else {
            self.sink.push(Reg::Acc);
            let place = self.resolve_place(left);
            self.sink.pop(Reg::Acc);
            place
        };
        let Some(place) = place else { return };
        if place.readonly {
            self.diags.error(
                Category::ReadOnlyViolation,
                line,
                "cannot assign to a read-only field",
            );
            // The place stays untouched; the statement's value becomes zero.
            self.sink.set(Reg::Acc, 0);
            return;
        }
        if kinds_clash(place.kind, kind) {
            self.diags.warning(
                Category::ShapeMismatch,
                line,
                format!(
                    "assigning a {} value to a {} slot",
                    kind.describe(),
                    place.kind.describe()
                ),
            );
        }
        self.write_place(&place, Reg::Acc);
    }

    fn lower_compound(
        &mut self,
        left: &Expression,
        right: &Expression,
        op: BinaryOperator,
        dest: Reg,
        line: u32,
    ) -> ValueKind {
        self.check_numeric(right, line);
        self.lower_expr(right, Reg::Acc);
        let place = if place_is_static(left) {
            self.resolve_place(left)
        } else {
            self.sink.push(Reg::Acc);
            let place = self.resolve_place(left);
            self.sink.pop(Reg::Acc);
            place
        };
        let Some(place) = place else {
            if dest != Reg::Acc {
                self.sink.set(dest, Reg::Acc);
            }
            return ValueKind::Number;
        };
        if place.readonly {
            self.diags.error(
                Category::ReadOnlyViolation,
                line,
                "cannot assign to a read-only field",
            );
            self.sink.set(dest, 0);
            return ValueKind::Number;
        }
        let saved = self.reserve_tmp();
        self.read_place(&place, Reg::Tmp);
        self.sink.rr(binary_op_text(op), Reg::Tmp, Reg::Acc);
        self.write_place(&place, Reg::Tmp);
        self.sink.set(dest, Reg::Tmp);
        self.release_tmp(saved);
        ValueKind::Number
    }

    // ====================================================================
    // Calls
    // ====================================================================

    fn lower_call(&mut self, call: &CallExpression, dest: Reg) -> ValueKind {
        let line = call.span.line;
        match call.callee.as_ref() {
            Expression::Identifier(id) => {
                match id.name.as_str() {
                    "inject" | "inject_raw" => {
                        return self.lower_inject(id.name == "inject_raw", call, dest);
                    }
                    _ => {}
                }
                if let Some(sym) = self.static_symbol_of(call.callee.as_ref()) {
                    match sym.kind {
                        SymbolKind::Function => {
                            let state = sym.target.clone().unwrap_or_else(|| id.name.clone());
                            return self.emit_user_call(
                                &state,
                                sym.returns,
                                sym.num_elements as usize,
                                &call.arguments,
                                None,
                                dest,
                                line,
                            );
                        }
                        SymbolKind::Class | SymbolKind::Enum => {
                            self.diags.error(
                                Category::ShapeMismatch,
                                line,
                                format!("'{}' is a type, not a function", id.name),
                            );
                            self.sink.set(dest, 0);
                            return ValueKind::Number;
                        }
                        _ => {
                            self.diags.error(
                                Category::ShapeMismatch,
                                line,
                                format!("'{}' is not callable", id.name),
                            );
                            self.sink.set(dest, 0);
                            return ValueKind::Number;
                        }
                    }
                }
                if let Some(b) = self.catalog().resolve_call(&id.name, None) {
                    return self.emit_native_call(b, &call.arguments, None, dest, line);
                }
                self.diags.error(
                    Category::UnresolvedReference,
                    line,
                    format!("unknown function '{}'", id.name),
                );
                self.sink.set(dest, 0);
                ValueKind::Number
            }
            Expression::Member(m) => {
                // User methods shadow catalog bindings for shaped receivers.
                if let Some(parent) = self.static_symbol_of(&m.object) {
                    if let Some(method) = parent.children.get(&m.property.name) {
                        if method.kind == SymbolKind::Function {
                            let state = method
                                .target
                                .clone()
                                .unwrap_or_else(|| m.property.name.clone());
                            let returns = method.returns;
                            let arity = method.num_elements as usize;
                            return self.emit_user_call(
                                &state,
                                returns,
                                arity,
                                &call.arguments,
                                Some(&m.object),
                                dest,
                                line,
                            );
                        }
                    }
                }
                let owner = self.peek_kind(&m.object);
                if let Some(b) = self.catalog().resolve_call(&m.property.name, Some(owner)) {
                    let receiver = if b.owner.is_some() {
                        Some(m.object.as_ref())
                    } else {
                        None
                    };
                    return self.emit_native_call(b, &call.arguments, receiver, dest, line);
                }
                self.diags.error(
                    Category::UnresolvedReference,
                    line,
                    format!(
                        "no method '{}' on a {} receiver",
                        m.property.name,
                        owner.describe()
                    ),
                );
                self.sink.set(dest, 0);
                ValueKind::Number
            }
            _ => {
                self.diags.error(
                    Category::GrammarRestriction,
                    line,
                    "only named functions and methods can be called",
                );
                self.sink.set(dest, 0);
                ValueKind::Number
            }
        }
    }

    /// Call a user function or method. Arguments park on the value stack
    /// while they are computed (they may call in turn), then pop into
    /// `r0..`; methods append the receiver as a trailing argument. A live
    /// expression temporary is saved here as well: callees clobber `rt`
    /// freely and never preserve it.
    #[allow(clippy::too_many_arguments)]
    fn emit_user_call(
        &mut self,
        state: &str,
        returns: ValueKind,
        arity: usize,
        args: &[Expression],
        receiver: Option<&Expression>,
        dest: Reg,
        line: u32,
    ) -> ValueKind {
        if args.len() != arity {
            self.diags.warning(
                Category::ShapeMismatch,
                line,
                format!("expected {} argument(s), got {}", arity, args.len()),
            );
        }
        let tmp_held = !self.tmp_free();
        if tmp_held {
            self.sink.push(Reg::Tmp);
        }
        let m = self.cur_arity();
        emit_save_args(&mut self.sink, m);
        for i in 0..arity {
            match args.get(i) {
                Some(a) => {
                    self.lower_expr(a, Reg::Acc);
                }
                None => self.sink.set(Reg::Acc, 0),
            }
            self.sink.push(Reg::Acc);
        }
        let total = if let Some(obj) = receiver {
            let kind = self.lower_expr(obj, Reg::Acc);
            if !matches!(kind, ValueKind::Object) {
                self.diags.warning(
                    Category::ShapeMismatch,
                    line,
                    "method receiver is not an object",
                );
            }
            self.sink.push(Reg::Acc);
            arity + 1
        } else {
            arity
        };
        for i in (0..total).rev() {
            self.sink.pop(Reg::Arg(i as u8));
        }
        self.sink.call(state);
        emit_restore_args(&mut self.sink, m);
        if tmp_held {
            self.sink.pop(Reg::Tmp);
        }
        self.note_args(total as u8);
        if dest != Reg::Ret {
            self.sink.set(dest, Reg::Ret);
        }
        returns
    }

    /// Expand a catalog binding at this call site. Foldable arguments go
    /// into the template as literal text; the rest are computed, parked,
    /// and popped into scratch argument registers in declaration order.
    fn emit_native_call(
        &mut self,
        b: &'static Binding,
        args: &[Expression],
        receiver: Option<&Expression>,
        dest: Reg,
        line: u32,
    ) -> ValueKind {
        use crate::natives::arg;

        let required = b.required_args();
        if args.len() < required {
            self.diags.error(
                Category::ShapeMismatch,
                line,
                format!(
                    "'{}' needs at least {} argument(s), got {}",
                    b.name,
                    required,
                    args.len()
                ),
            );
        }
        if args.len() > b.args.len() {
            self.diags.warning(
                Category::ShapeMismatch,
                line,
                format!("'{}' takes at most {} argument(s)", b.name, b.args.len()),
            );
        }

        let mut texts: Vec<String> = Vec::with_capacity(b.args.len());
        let mut reg_plan: Vec<&Expression> = Vec::new();
        let mut callback: Option<String> = None;
        for (k, spec) in b.args.iter().enumerate() {
            let supplied = args.get(k);
            let Some(e) = supplied else {
                texts.push("0".to_string());
                continue;
            };
            if spec.accepts(arg::CALLBACK) {
                if let Expression::Callback(cb) = e {
                    let (code, exits) = self.capture_into(|lw| {
                        lw.symbols.push_scope(crate::symbols::ScopeKind::Block);
                        let exits = lw.lower_stmts(&cb.body.statements, false);
                        lw.symbols.pop_scope();
                        exits
                    });
                    self.note_exits(exits);
                    callback = Some(code);
                    texts.push("0".to_string());
                    continue;
                }
            }
            if spec.accepts(arg::LABEL) {
                if let Some(label) = self.fold_label(e) {
                    texts.push(label);
                    continue;
                }
            }
            if spec.accepts(arg::CONST) {
                if let Some(v) = self.fold_const(e) {
                    texts.push(v.to_string());
                    continue;
                }
            }
            if spec.takes_register() {
                texts.push(format!("r{}", reg_plan.len()));
                reg_plan.push(e);
                continue;
            }
            self.diags.error(
                Category::ShapeMismatch,
                line,
                format!("argument {} of '{}' must be compile-time", k + 1, b.name),
            );
            texts.push("0".to_string());
        }
        let supplied_optionals = args.len().saturating_sub(required).min(
            b.args.len().saturating_sub(required),
        ) as u32;

        let template_calls = matches!(b.code, Template::Fixed(t) if t.contains("call "));
        let needs_save = !reg_plan.is_empty() || template_calls;
        let m = self.cur_arity();
        if needs_save {
            emit_save_args(&mut self.sink, m);
        }

        let receiver_text = receiver.map(|obj| {
            self.lower_expr(obj, Reg::Acc);
            self.sink.push(Reg::Acc);
            "rx".to_string()
        });
        let reg_count = reg_plan.len();
        for e in &reg_plan {
            self.lower_expr(e, Reg::Acc);
            self.sink.push(Reg::Acc);
        }
        for j in (0..reg_count).rev() {
            self.sink.pop(Reg::Arg(j as u8));
        }
        if receiver_text.is_some() {
            self.sink.pop(Reg::Addr);
        }

        let resolved = ResolvedCall {
            args: texts,
            receiver: receiver_text,
            callback,
            supplied_optionals,
        };
        let code = match b.code {
            Template::Fixed(t) => crate::natives::expand(t, &resolved),
            Template::Gen(f) => f(&resolved),
        };
        self.sink.raw(&code);
        if needs_save {
            emit_restore_args(&mut self.sink, m);
        }
        self.note_args((reg_count as u8).max(m));

        match b.returns {
            Some(kind) => {
                if dest != Reg::Acc {
                    self.sink.set(dest, Reg::Acc);
                }
                kind
            }
            None => {
                self.sink.set(dest, 0);
                ValueKind::Number
            }
        }
    }

    /// Escape hatch: splice target code straight into the output. The safe
    /// variant shields the expression temporaries around the splice.
    fn lower_inject(&mut self, raw: bool, call: &CallExpression, dest: Reg) -> ValueKind {
        let line = call.span.line;
        let Some(Expression::StringLiteral(text)) = call.arguments.first() else {
            self.diags.error(
                Category::GrammarRestriction,
                line,
                "inject takes a single string literal of target code",
            );
            self.sink.set(dest, 0);
            return ValueKind::Number;
        };
        if raw {
            self.sink.raw(&text.value);
        } else {
            self.sink.push(Reg::Tmp);
            self.sink.push(Reg::Addr);
            self.sink.raw(&text.value);
            self.sink.pop(Reg::Addr);
            self.sink.pop(Reg::Tmp);
        }
        if dest != Reg::Acc {
            self.sink.set(dest, Reg::Acc);
        }
        ValueKind::Number
    }

    // ====================================================================
    // Chains
    // ====================================================================

    fn walk_chain(&mut self, e: &Expression) -> Option<Chain> {
        match e {
            Expression::Identifier(id) => self.walk_ident(id),
            Expression::Member(m) => {
                let chain = self.walk_chain(&m.object)?;
                self.walk_member(chain, &m.property.name, m.span.line)
            }
            Expression::Index(ix) => {
                let chain = self.walk_chain(&ix.object)?;
                self.walk_index(chain, &ix.index, ix.span.line)
            }
            other => {
                self.diags.error(
                    Category::GrammarRestriction,
                    other.span().line,
                    "expression is not a storage location",
                );
                None
            }
        }
    }

    fn walk_ident(&mut self, id: &Identifier) -> Option<Chain> {
        let line = id.span.line;
        if id.name == "this" {
            let this = self.frame().and_then(|f| f.this);
            let Some(this) = this else {
                self.diags.error(
                    Category::GrammarRestriction,
                    line,
                    "'this' is only valid inside a method or handler",
                );
                return None;
            };
            let children = self
                .cur_class()
                .and_then(|c| self.symbols.resolve(c))
                .map(|c| c.children.clone())
                .unwrap_or_default();
            let mut chain = Chain::value(Cursor::InReg(Reg::Arg(this)), ValueKind::Object);
            chain.children = children;
            return Some(chain);
        }
        if let Some(sym) = self.param_sym(&id.name).cloned() {
            let reg = Reg::Arg(sym.offset as u8);
            return Some(self.chain_from_symbol(sym, Some(reg)));
        }
        if let Some((sym, from_module)) = self.symbols.resolve_split(&id.name) {
            let sym = sym.clone();
            if from_module {
                if let Some(member) = self.member_chain(&id.name) {
                    return Some(member);
                }
            }
            return Some(self.chain_from_symbol(sym, None));
        }
        if let Some(member) = self.member_chain(&id.name) {
            return Some(member);
        }
        if let Some(c) = Collection::from_name(&id.name) {
            if c.is_singleton() {
                let mut chain = Chain::value(
                    Cursor::Entity {
                        c,
                        index: "curplayer".to_string(),
                    },
                    ValueKind::Handle(c),
                );
                chain.readonly = true;
                return Some(chain);
            }
            return Some(Chain::value(Cursor::CollectionBase(c), ValueKind::Number));
        }
        if id.name == "self" {
            // Engine var holding the entity index being dispatched; live
            // through the whole event, including called functions.
            let mut chain = Chain::value(
                Cursor::Entity {
                    c: Collection::Actor,
                    index: "self".to_string(),
                },
                ValueKind::Handle(Collection::Actor),
            );
            chain.readonly = true;
            return Some(chain);
        }
        self.diags.error(
            Category::UnresolvedReference,
            line,
            format!("unknown name '{}'", id.name),
        );
        None
    }

    /// Chain for a class member of the current instance.
    fn member_chain(&mut self, name: &str) -> Option<Chain> {
        let class = self.cur_class()?.to_string();
        let this = self.frame()?.this?;
        let member = self
            .symbols
            .resolve(&class)
            .and_then(|c| c.children.get(name))
            .cloned()?;
        if member.global || member.kind == SymbolKind::Constant {
            return Some(self.chain_from_symbol(member, None));
        }
        if member.kind == SymbolKind::Function {
            return Some(Chain::value(Cursor::Namespace, ValueKind::Number));
        }
        let mut chain = self.chain_from_symbol(member.clone(), None);
        chain.cursor = Cursor::RegRel(Reg::Arg(this), member.offset as i64);
        Some(chain)
    }

    /// Build a chain for a resolved symbol. `in_reg` carries parameters,
    /// whose value lives in an argument register instead of a slot.
    fn chain_from_symbol(&mut self, sym: Symbol, in_reg: Option<Reg>) -> Chain {
        let cursor = match sym.kind {
            SymbolKind::Constant => Cursor::Folded(sym.literal.unwrap_or(0)),
            SymbolKind::Enum | SymbolKind::Class | SymbolKind::Module => Cursor::Namespace,
            SymbolKind::Function | SymbolKind::Native => Cursor::Namespace,
            _ => match in_reg {
                Some(r) => Cursor::InReg(r),
                None if sym.global => Cursor::Abs(sym.offset as i64),
                None => Cursor::Frame(sym.offset as i64),
            },
        };
        let elem_size = sym.element_size();
        Chain {
            cursor,
            kind: sym.value_kind(),
            readonly: sym.readonly,
            heap: sym.heap && in_reg.is_none(),
            children: sym.children,
            elem_size,
            elem_kind: sym.returns,
        }
    }

    fn walk_member(&mut self, chain: Chain, prop: &str, line: u32) -> Option<Chain> {
        match chain.cursor {
            Cursor::CollectionBase(c) => {
                self.diags.error(
                    Category::GrammarRestriction,
                    line,
                    format!("'{}' needs a subscript before field access", c.name()),
                );
                None
            }
            Cursor::Entity { c, index } => self.entity_field(c, index, prop, line),
            Cursor::NativeField { field, index } => {
                // Mid-chain field read: pull the value into rx and keep
                // walking if it is a handle.
                match chain.kind {
                    ValueKind::Handle(next) => {
                        self.read_native_field(&field, &index, Reg::Addr);
                        self.entity_field(next, "rx".to_string(), prop, line)
                    }
                    _ => {
                        self.diags.error(
                            Category::UnresolvedReference,
                            line,
                            format!("no member '{prop}' on a {}", chain.kind.describe()),
                        );
                        None
                    }
                }
            }
            Cursor::Namespace => match chain.children.get(prop).cloned() {
                Some(child) => Some(self.chain_from_symbol(child, None)),
                None => {
                    self.diags.error(
                        Category::UnresolvedReference,
                        line,
                        format!("unknown member '{prop}'"),
                    );
                    None
                }
            },
            Cursor::OverrideBase { .. } => {
                self.diags.error(
                    Category::GrammarRestriction,
                    line,
                    "re-based field tables need a subscript",
                );
                None
            }
            Cursor::Folded(_) => {
                self.diags.error(
                    Category::GrammarRestriction,
                    line,
                    "constants have no members",
                );
                None
            }
            Cursor::Abs(_) | Cursor::Frame(_) | Cursor::InReg(_) | Cursor::RegRel(..)
            | Cursor::Rx(_) => {
                // Handle stored in a slot or register: load it, then go to
                // the entity's field table.
                if let ValueKind::Handle(c) = chain.kind {
                    let index = self.load_chain_value(&chain);
                    return self.entity_field(c, index, prop, line);
                }
                let mut chain = chain;
                if chain.heap {
                    self.deref_cursor(&mut chain);
                }
                let Some(child) = chain.children.get(prop).cloned() else {
                    self.diags.error(
                        Category::UnresolvedReference,
                        line,
                        format!("unknown member '{prop}'"),
                    );
                    return None;
                };
                if child.kind == SymbolKind::Function {
                    return Some(Chain::value(Cursor::Namespace, ValueKind::Number));
                }
                let cursor = advance(chain.cursor, child.offset as i64);
                Some(Chain {
                    cursor,
                    kind: child.value_kind(),
                    readonly: child.readonly,
                    heap: child.heap,
                    elem_size: child.element_size(),
                    elem_kind: child.returns,
                    children: child.children,
                })
            }
        }
    }

    fn entity_field(
        &mut self,
        c: Collection,
        index: String,
        prop: &str,
        line: u32,
    ) -> Option<Chain> {
        let Some(field) = self.catalog().field(c, prop).cloned() else {
            self.diags.error(
                Category::UnresolvedReference,
                line,
                format!("no field '{}' on {}", prop, c.name()),
            );
            return None;
        };
        match field {
            FieldTemplate::IndexOverride { derive, target } => {
                let code = crate::natives::expand_field(derive, "rx", &index, "");
                self.sink.raw(&code);
                let mut chain =
                    Chain::value(Cursor::OverrideBase { target }, ValueKind::Handle(target));
                chain.readonly = true;
                Some(chain)
            }
            direct => {
                let kind = direct.kind();
                let readonly = direct.read_only();
                let mut chain = Chain::value(
                    Cursor::NativeField {
                        field: direct,
                        index,
                    },
                    kind,
                );
                chain.readonly = readonly;
                Some(chain)
            }
        }
    }

    fn walk_index(&mut self, chain: Chain, idx: &Expression, line: u32) -> Option<Chain> {
        match chain.cursor {
            Cursor::CollectionBase(c) => {
                let index = match self.fold_const(idx) {
                    Some(v) => v.to_string(),
                    None => {
                        self.lower_expr(idx, Reg::Acc);
                        self.sink.set(Reg::Addr, Reg::Acc);
                        "rx".to_string()
                    }
                };
                Some(Chain::value(
                    Cursor::Entity { c, index },
                    ValueKind::Handle(c),
                ))
            }
            Cursor::OverrideBase { target } => {
                match self.fold_const(idx) {
                    Some(0) => {}
                    Some(v) => self.sink.rr("add", Reg::Addr, v),
                    None => {
                        self.sink.push(Reg::Addr);
                        self.lower_expr(idx, Reg::Acc);
                        self.sink.pop(Reg::Addr);
                        self.sink.rr("add", Reg::Addr, Reg::Acc);
                    }
                }
                Some(Chain::value(
                    Cursor::Entity {
                        c: target,
                        index: "rx".to_string(),
                    },
                    ValueKind::Handle(target),
                ))
            }
            Cursor::Entity { .. } | Cursor::NativeField { .. } => {
                self.diags.error(
                    Category::GrammarRestriction,
                    line,
                    "entities cannot be subscripted",
                );
                None
            }
            Cursor::Namespace | Cursor::Folded(_) => {
                self.diags.error(
                    Category::GrammarRestriction,
                    line,
                    "expression cannot be subscripted",
                );
                None
            }
            _ => self.index_block(chain, idx, line),
        }
    }

    /// Subscript a flat-memory array (or string). Literal subscripts fold
    /// into the cursor; dynamic ones force materialization.
    fn index_block(&mut self, mut chain: Chain, idx: &Expression, line: u32) -> Option<Chain> {
        if !matches!(chain.kind, ValueKind::Array | ValueKind::Str) {
            self.diags.warning(
                Category::ShapeMismatch,
                line,
                format!("subscript applied to a {}", chain.kind.describe()),
            );
        }
        let was_heap = chain.heap;
        if was_heap {
            self.deref_cursor(&mut chain);
        }
        let is_str = chain.kind == ValueKind::Str;
        let stride = if is_str { 1 } else { chain.elem_size.max(1) as i64 };

        let cursor = if let Some(i) = self.fold_const(idx) {
            advance(chain.cursor, 1 + i * stride)
        } else {
            match chain.cursor {
                Cursor::Rx(d) => {
                    self.sink.push(Reg::Addr);
                    self.lower_expr(idx, Reg::Acc);
                    if stride > 1 {
                        self.sink.rr("mul", Reg::Acc, stride);
                    }
                    self.sink.pop(Reg::Addr);
                    add_disp(self, d + 1);
                    self.sink.rr("add", Reg::Addr, Reg::Acc);
                    Cursor::Rx(0)
                }
                cursor => {
                    self.lower_expr(idx, Reg::Acc);
                    if stride > 1 {
                        self.sink.rr("mul", Reg::Acc, stride);
                    }
                    self.materialize_addr(&cursor);
                    self.sink.rr("add", Reg::Addr, 1);
                    self.sink.rr("add", Reg::Addr, Reg::Acc);
                    Cursor::Rx(0)
                }
            }
        };

        if is_str {
            return Some(Chain::value(cursor, ValueKind::Number));
        }
        let elem_kind = chain.elem_kind;
        // Declared arrays hold shaped elements inline; heap arrays hold one
        // pointer per element no matter what the element is.
        let shaped = !was_heap && elem_kind == ValueKind::Object && !chain.children.is_empty();
        Some(Chain {
            cursor,
            kind: elem_kind,
            readonly: chain.readonly,
            heap: !shaped
                && matches!(
                    elem_kind,
                    ValueKind::Str | ValueKind::Array | ValueKind::Object
                ),
            children: chain.children,
            elem_size: 1,
            elem_kind: ValueKind::Number,
        })
    }

    /// Point `rx` at the address the cursor denotes.
    fn materialize_addr(&mut self, cursor: &Cursor) {
        match cursor {
            Cursor::Abs(a) => self.sink.set(Reg::Addr, *a),
            Cursor::Frame(f) => {
                self.sink.set(Reg::Addr, Reg::FrameBase);
                add_disp(self, *f);
            }
            Cursor::InReg(r) => self.sink.set(Reg::Addr, *r),
            Cursor::RegRel(r, d) => {
                self.sink.set(Reg::Addr, *r);
                add_disp(self, *d);
            }
            Cursor::Rx(d) => add_disp(self, *d),
            _ => debug_assert!(false, "cursor has no flat-memory address"),
        }
    }

    /// Replace a pointer-slot cursor with the block it points at.
    fn deref_cursor(&mut self, chain: &mut Chain) {
        match &chain.cursor {
            Cursor::Abs(a) => self.sink.geta(Reg::Addr, MEM, *a),
            Cursor::Frame(_) | Cursor::RegRel(..) | Cursor::Rx(_) => {
                self.materialize_addr(&chain.cursor.clone());
                self.sink.geta(Reg::Addr, MEM, Reg::Addr);
            }
            Cursor::InReg(r) => {
                self.sink.geta(Reg::Addr, MEM, *r);
            }
            _ => debug_assert!(false, "cursor cannot be dereferenced"),
        }
        chain.cursor = Cursor::Rx(0);
        chain.heap = false;
    }

    /// Load the scalar value a chain denotes into `rx` and hand back its
    /// operand text, for entity index positions.
    fn load_chain_value(&mut self, chain: &Chain) -> String {
        match &chain.cursor {
            Cursor::Folded(v) => return v.to_string(),
            Cursor::InReg(r) => return r.to_string(),
            Cursor::Abs(a) => self.sink.geta(Reg::Addr, MEM, *a),
            Cursor::Frame(_) | Cursor::RegRel(..) | Cursor::Rx(_) => {
                self.materialize_addr(&chain.cursor.clone());
                self.sink.geta(Reg::Addr, MEM, Reg::Addr);
            }
            _ => {
                debug_assert!(false, "chain has no loadable value");
                return "0".to_string();
            }
        }
        "rx".to_string()
    }

    fn read_native_field(&mut self, field: &FieldTemplate, index: &str, dest: Reg) {
        let code = match field {
            FieldTemplate::Direct { get, .. } => {
                crate::natives::expand_field(get, &dest.to_string(), index, "")
            }
            FieldTemplate::IndexOverride { derive, .. } => {
                crate::natives::expand_field(derive, &dest.to_string(), index, "")
            }
        };
        self.sink.raw(&code);
    }

    fn read_chain(&mut self, chain: Chain, dest: Reg, line: u32) -> ValueKind {
        let block = chain.is_block();
        match &chain.cursor {
            Cursor::Folded(v) => self.sink.set(dest, *v),
            Cursor::Namespace => {
                self.diags.error(
                    Category::ShapeMismatch,
                    line,
                    "name is not a value",
                );
                self.sink.set(dest, 0);
            }
            Cursor::CollectionBase(c) => {
                self.diags.error(
                    Category::GrammarRestriction,
                    line,
                    format!("'{}' needs a subscript", c.name()),
                );
                self.sink.set(dest, 0);
            }
            Cursor::InReg(r) => self.sink.set(dest, *r),
            Cursor::Abs(a) => {
                if block {
                    self.sink.set(dest, *a);
                } else {
                    self.sink.geta(dest, MEM, *a);
                }
            }
            Cursor::Frame(f) => {
                if block {
                    self.sink.set(dest, Reg::FrameBase);
                    if *f != 0 {
                        self.sink.rr("add", dest, *f);
                    }
                } else {
                    self.sink.set(Reg::Addr, Reg::FrameBase);
                    add_disp(self, *f);
                    self.sink.geta(dest, MEM, Reg::Addr);
                }
            }
            Cursor::RegRel(r, d) => {
                if block {
                    self.sink.set(dest, *r);
                    if *d != 0 {
                        self.sink.rr("add", dest, *d);
                    }
                } else {
                    self.sink.set(Reg::Addr, *r);
                    add_disp(self, *d);
                    self.sink.geta(dest, MEM, Reg::Addr);
                }
            }
            Cursor::Rx(d) => {
                if block {
                    self.sink.set(dest, Reg::Addr);
                    if *d != 0 {
                        self.sink.rr("add", dest, *d);
                    }
                } else {
                    add_disp(self, *d);
                    self.sink.geta(dest, MEM, Reg::Addr);
                }
            }
            Cursor::Entity { index, .. } => {
                self.sink.rr("set", dest, Operand::Sym(index.clone()));
            }
            Cursor::NativeField { field, index } => {
                let field = field.clone();
                let index = index.clone();
                self.read_native_field(&field, &index, dest);
            }
            Cursor::OverrideBase { .. } => {
                self.sink.set(dest, Reg::Addr);
            }
        }
        chain.kind
    }

    // ====================================================================
    // Places
    // ====================================================================

    pub(crate) fn resolve_place(&mut self, e: &Expression) -> Option<Place> {
        let line = e.span().line;
        let chain = self.walk_chain(e)?;
        if chain.is_block() {
            self.diags.error(
                Category::ShapeMismatch,
                line,
                "whole blocks cannot be assigned; write their fields instead",
            );
            return None;
        }
        let slot = match chain.cursor {
            Cursor::InReg(r) => Slot::Reg(r),
            Cursor::Abs(a) => Slot::Abs(a),
            Cursor::Frame(f) => Slot::Frame(f),
            Cursor::RegRel(r, d) => {
                self.sink.set(Reg::Addr, r);
                add_disp(self, d);
                Slot::Indirect
            }
            Cursor::Rx(d) => {
                add_disp(self, d);
                Slot::Indirect
            }
            Cursor::NativeField { field, index } => Slot::Native { field, index },
            Cursor::Entity { .. }
            | Cursor::OverrideBase { .. }
            | Cursor::CollectionBase(_)
            | Cursor::Namespace
            | Cursor::Folded(_) => {
                self.diags.error(
                    Category::ShapeMismatch,
                    line,
                    "expression is not assignable",
                );
                return None;
            }
        };
        Some(Place {
            slot,
            kind: chain.kind,
            readonly: chain.readonly,
        })
    }

    pub(crate) fn read_place(&mut self, place: &Place, dest: Reg) {
        match &place.slot {
            Slot::Reg(r) => self.sink.set(dest, *r),
            Slot::Abs(a) => self.sink.geta(dest, MEM, *a),
            Slot::Frame(f) => {
                self.sink.set(Reg::Addr, Reg::FrameBase);
                add_disp(self, *f);
                self.sink.geta(dest, MEM, Reg::Addr);
            }
            Slot::Indirect => self.sink.geta(dest, MEM, Reg::Addr),
            Slot::Native { field, index } => {
                let field = field.clone();
                let index = index.clone();
                self.read_native_field(&field, &index, dest);
            }
        }
    }

    pub(crate) fn write_place(&mut self, place: &Place, src: Reg) {
        debug_assert!(!place.readonly);
        match &place.slot {
            Slot::Reg(r) => self.sink.set(*r, src),
            Slot::Abs(a) => self.sink.seta(MEM, *a, src),
            Slot::Frame(f) => {
                self.sink.set(Reg::Addr, Reg::FrameBase);
                add_disp(self, *f);
                self.sink.seta(MEM, Reg::Addr, src);
            }
            Slot::Indirect => self.sink.seta(MEM, Reg::Addr, src),
            Slot::Native { field, index } => {
                if let FieldTemplate::Direct { set: Some(t), .. } = field {
                    let code = crate::natives::expand_field(t, "", index, &src.to_string());
                    self.sink.raw(&code);
                }
            }
        }
    }
}

fn advance(cursor: Cursor, disp: i64) -> Cursor {
    match cursor {
        Cursor::Abs(a) => Cursor::Abs(a + disp),
        Cursor::Frame(f) => Cursor::Frame(f + disp),
        Cursor::RegRel(r, d) => Cursor::RegRel(r, d + disp),
        Cursor::Rx(d) => Cursor::Rx(d + disp),
        Cursor::InReg(r) => Cursor::RegRel(r, disp),
        other => other,
    }
}

fn add_disp(lw: &mut Lowerer, disp: i64) {
    if disp != 0 {
        lw.sink.rr("add", Reg::Addr, disp);
    }
}

fn place_is_static(e: &Expression) -> bool {
    matches!(e, Expression::Identifier(_))
}

fn binary_op_text(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Add => "add",
        BinaryOperator::Subtract => "sub",
        BinaryOperator::Multiply => "mul",
        BinaryOperator::Divide => "div",
        BinaryOperator::Modulo => "mod",
        BinaryOperator::BitwiseAnd => "band",
        BinaryOperator::BitwiseOr => "bor",
        BinaryOperator::BitwiseXor => "bxor",
        BinaryOperator::LeftShift => "shl",
        BinaryOperator::RightShift => "shr",
        // Comparisons never reach emission.
        _ => "set",
    }
}

fn fold_binary(op: BinaryOperator, l: i64, r: i64) -> Option<i64> {
    Some(match op {
        BinaryOperator::Add => l.wrapping_add(r),
        BinaryOperator::Subtract => l.wrapping_sub(r),
        BinaryOperator::Multiply => l.wrapping_mul(r),
        // Division by zero reads as zero at runtime; fold the same way.
        BinaryOperator::Divide => l.checked_div(r).unwrap_or(0),
        BinaryOperator::Modulo => l.checked_rem(r).unwrap_or(0),
        BinaryOperator::BitwiseAnd => l & r,
        BinaryOperator::BitwiseOr => l | r,
        BinaryOperator::BitwiseXor => l ^ r,
        BinaryOperator::LeftShift => {
            if !(0..64).contains(&r) {
                return None;
            }
            l.wrapping_shl(r as u32)
        }
        BinaryOperator::RightShift => {
            if !(0..64).contains(&r) {
                return None;
            }
            l.wrapping_shr(r as u32)
        }
        _ => return None,
    })
}

/// Only string-versus-everything mismatches are worth a warning; handles
/// and pointers are numbers by design.
pub(crate) fn kinds_clash(expected: ValueKind, got: ValueKind) -> bool {
    use ValueKind::*;
    matches!(
        (expected, got),
        (Str, Number | Quote | Handle(_))
            | (Quote, Number | Str | Handle(_) | Array | Object)
            | (Number, Str | Quote)
    )
}

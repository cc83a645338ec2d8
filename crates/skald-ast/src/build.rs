//! Shorthand constructors for hand-written trees.
//!
//! Front ends produce nodes with real spans; embedder code and the compiler
//! test suites build trees inline, where full struct syntax drowns the shape
//! of the program. Everything here uses a default span.
//!
//! ```
//! use skald_ast::build::*;
//!
//! let m = module(
//!     "demo.sk",
//!     vec![
//!         let_("x", Some(ty_number()), Some(bin_add(int(2), int(3)))),
//!         expr(call("out", vec![ident("x")])),
//!     ],
//! );
//! assert_eq!(m.statements.len(), 2);
//! ```

use crate::expression::*;
use crate::statement::*;
use crate::types::*;
use crate::{Identifier, Module, Span};

// ============================================================================
// Modules and identifiers
// ============================================================================

pub fn module(file: &str, statements: Vec<Statement>) -> Module {
    Module::new(file, statements)
}

pub fn name(n: &str) -> Identifier {
    Identifier::new(n, Span::default())
}

pub fn block(statements: Vec<Statement>) -> BlockStatement {
    BlockStatement {
        statements,
        span: Span::default(),
    }
}

// ============================================================================
// Expressions
// ============================================================================

pub fn int(value: i64) -> Expression {
    Expression::IntLiteral(IntLiteral {
        value,
        span: Span::default(),
    })
}

pub fn string(value: &str) -> Expression {
    Expression::StringLiteral(StringLiteral {
        value: value.to_string(),
        span: Span::default(),
    })
}

pub fn boolean(value: bool) -> Expression {
    Expression::BooleanLiteral(BooleanLiteral {
        value,
        span: Span::default(),
    })
}

pub fn ident(n: &str) -> Expression {
    Expression::Identifier(name(n))
}

pub fn unary(operator: UnaryOperator, operand: Expression) -> Expression {
    Expression::Unary(UnaryExpression {
        operator,
        operand: Box::new(operand),
        span: Span::default(),
    })
}

pub fn bin(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::Binary(BinaryExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
        span: Span::default(),
    })
}

pub fn bin_add(left: Expression, right: Expression) -> Expression {
    bin(BinaryOperator::Add, left, right)
}

pub fn logic(operator: LogicalOperator, left: Expression, right: Expression) -> Expression {
    Expression::Logical(LogicalExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
        span: Span::default(),
    })
}

pub fn assign(left: Expression, right: Expression) -> Expression {
    assign_op(AssignmentOperator::Assign, left, right)
}

pub fn assign_op(
    operator: AssignmentOperator,
    left: Expression,
    right: Expression,
) -> Expression {
    Expression::Assignment(AssignmentExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
        span: Span::default(),
    })
}

/// Call through a bare name: call("out", vec![int(1)])
pub fn call(callee: &str, arguments: Vec<Expression>) -> Expression {
    call_expr(ident(callee), arguments)
}

pub fn call_expr(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::Call(CallExpression {
        callee: Box::new(callee),
        arguments,
        span: Span::default(),
    })
}

pub fn member(object: Expression, property: &str) -> Expression {
    Expression::Member(MemberExpression {
        object: Box::new(object),
        property: name(property),
        span: Span::default(),
    })
}

pub fn index(object: Expression, idx: Expression) -> Expression {
    Expression::Index(IndexExpression {
        object: Box::new(object),
        index: Box::new(idx),
        span: Span::default(),
    })
}

pub fn array(elements: Vec<Expression>) -> Expression {
    Expression::Array(ArrayExpression {
        elements,
        span: Span::default(),
    })
}

pub fn new_array(length: Expression) -> Expression {
    Expression::NewArray(NewArrayExpression {
        length: Box::new(length),
        span: Span::default(),
    })
}

pub fn object(properties: Vec<(&str, Expression)>) -> Expression {
    Expression::Object(ObjectExpression {
        properties: properties
            .into_iter()
            .map(|(key, value)| Property {
                key: name(key),
                value,
                span: Span::default(),
            })
            .collect(),
        span: Span::default(),
    })
}

pub fn callback(statements: Vec<Statement>) -> Expression {
    Expression::Callback(CallbackExpression {
        body: block(statements),
        span: Span::default(),
    })
}

// ============================================================================
// Statements
// ============================================================================

pub fn let_(n: &str, ty: Option<TypeAnnotation>, init: Option<Expression>) -> Statement {
    Statement::Variable(VariableDecl {
        kind: VariableKind::Let,
        name: name(n),
        type_annotation: ty,
        initializer: init,
        span: Span::default(),
    })
}

pub fn const_(n: &str, ty: Option<TypeAnnotation>, init: Expression) -> Statement {
    Statement::Variable(VariableDecl {
        kind: VariableKind::Const,
        name: name(n),
        type_annotation: ty,
        initializer: Some(init),
        span: Span::default(),
    })
}

pub fn expr(expression: Expression) -> Statement {
    Statement::Expression(ExpressionStatement {
        expression,
        span: Span::default(),
    })
}

pub fn if_(condition: Expression, then: Vec<Statement>) -> Statement {
    Statement::If(IfStatement {
        condition,
        then_branch: block(then),
        else_branch: None,
        span: Span::default(),
    })
}

pub fn if_else(condition: Expression, then: Vec<Statement>, els: Vec<Statement>) -> Statement {
    Statement::If(IfStatement {
        condition,
        then_branch: block(then),
        else_branch: Some(ElseClause::Block(block(els))),
        span: Span::default(),
    })
}

pub fn while_(condition: Expression, body: Vec<Statement>) -> Statement {
    Statement::While(WhileStatement {
        condition,
        body: block(body),
        span: Span::default(),
    })
}

pub fn switch(discriminant: Expression, cases: Vec<(Option<Expression>, Vec<Statement>)>) -> Statement {
    Statement::Switch(SwitchStatement {
        discriminant,
        cases: cases
            .into_iter()
            .map(|(test, consequent)| SwitchCase {
                test,
                consequent,
                span: Span::default(),
            })
            .collect(),
        span: Span::default(),
    })
}

pub fn brk() -> Statement {
    Statement::Break(BreakStatement {
        span: Span::default(),
    })
}

pub fn ret(value: Option<Expression>) -> Statement {
    Statement::Return(ReturnStatement {
        value,
        span: Span::default(),
    })
}

pub fn func(
    n: &str,
    params: Vec<(&str, TypeAnnotation)>,
    return_type: Option<TypeAnnotation>,
    body: Vec<Statement>,
) -> Statement {
    Statement::Function(FunctionDecl {
        name: name(n),
        params: params
            .into_iter()
            .map(|(p, ty)| Parameter {
                name: name(p),
                type_annotation: Some(ty),
                span: Span::default(),
            })
            .collect(),
        return_type,
        body: block(body),
        span: Span::default(),
    })
}

pub fn enum_(n: &str, variants: Vec<(&str, Option<i64>)>) -> Statement {
    Statement::Enum(EnumDecl {
        name: name(n),
        variants: variants
            .into_iter()
            .map(|(v, value)| EnumVariant {
                name: name(v),
                value,
                span: Span::default(),
            })
            .collect(),
        span: Span::default(),
    })
}

// ============================================================================
// Classes
// ============================================================================

pub fn class(n: &str, members: Vec<ClassMember>) -> Statement {
    Statement::Class(ClassDecl {
        name: name(n),
        members,
        span: Span::default(),
    })
}

pub fn field(n: &str, ty: TypeAnnotation, init: Option<Expression>) -> ClassMember {
    ClassMember::Field(FieldDecl {
        name: name(n),
        type_annotation: Some(ty),
        initializer: init,
        readonly: false,
        span: Span::default(),
    })
}

pub fn field_ro(n: &str, ty: TypeAnnotation, init: Option<Expression>) -> ClassMember {
    ClassMember::Field(FieldDecl {
        name: name(n),
        type_annotation: Some(ty),
        initializer: init,
        readonly: true,
        span: Span::default(),
    })
}

pub fn method(
    n: &str,
    params: Vec<(&str, TypeAnnotation)>,
    return_type: Option<TypeAnnotation>,
    body: Vec<Statement>,
) -> ClassMember {
    ClassMember::Method(MethodDecl {
        name: name(n),
        params: params
            .into_iter()
            .map(|(p, ty)| Parameter {
                name: name(p),
                type_annotation: Some(ty),
                span: Span::default(),
            })
            .collect(),
        return_type,
        body: block(body),
        span: Span::default(),
    })
}

/// Constructor whose body is the single required base-initializer call.
pub fn ctor(base_args: Vec<Expression>) -> ClassMember {
    ClassMember::Constructor(ConstructorDecl {
        body: block(vec![expr(call("base", base_args))]),
        span: Span::default(),
    })
}

pub fn handler(event: &str, body: Vec<Statement>) -> ClassMember {
    ClassMember::Handler(HandlerDecl {
        event: name(event),
        body: block(body),
        span: Span::default(),
    })
}

pub fn action_row(n: &str, values: Vec<i64>) -> ClassMember {
    ClassMember::Action(ActionDecl {
        name: name(n),
        values,
        span: Span::default(),
    })
}

pub fn move_row(n: &str, values: Vec<i64>) -> ClassMember {
    ClassMember::Move(MoveDecl {
        name: name(n),
        values,
        span: Span::default(),
    })
}

pub fn ai_row(n: &str, action: &str, movement: &str, flags: i64) -> ClassMember {
    ClassMember::Ai(AiDecl {
        name: name(n),
        action: name(action),
        movement: name(movement),
        flags,
        span: Span::default(),
    })
}

// ============================================================================
// Types
// ============================================================================

pub fn ty_number() -> TypeAnnotation {
    TypeAnnotation::primitive(PrimitiveType::Number, Span::default())
}

pub fn ty_string() -> TypeAnnotation {
    TypeAnnotation::primitive(PrimitiveType::String, Span::default())
}

pub fn ty_quote() -> TypeAnnotation {
    TypeAnnotation::primitive(PrimitiveType::Quote, Span::default())
}

pub fn ty_bool() -> TypeAnnotation {
    TypeAnnotation::primitive(PrimitiveType::Boolean, Span::default())
}

pub fn ty(n: &str) -> TypeAnnotation {
    TypeAnnotation::named(n, Span::default())
}

pub fn ty_array(elem: TypeAnnotation) -> TypeAnnotation {
    TypeAnnotation::array(elem)
}

//! Statement AST nodes.
//!
//! The statement surface is deliberately small: the target language has no
//! native call stack or jump labels, so every construct here must lower to
//! the world VM's structured conditional blocks. There is no `for`, no
//! `continue`, no exceptions.

use crate::expression::Expression;
use crate::types::TypeAnnotation;
use crate::{Identifier, Span};

/// Statement (performs an action, produces no value)
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Variable declaration: let x: number = 1; const Y = 2;
    Variable(VariableDecl),

    /// Function declaration: function f(a: number): number { ... }
    Function(FunctionDecl),

    /// Class declaration: class Turret { ... }
    Class(ClassDecl),

    /// Enum declaration: enum Phase { Idle, Hunt = 4 }
    Enum(EnumDecl),

    /// Expression statement: f(x); a = b;
    Expression(ExpressionStatement),

    /// If statement
    If(IfStatement),

    /// While loop
    While(WhileStatement),

    /// Switch statement
    Switch(SwitchStatement),

    /// Break out of the innermost loop or switch
    Break(BreakStatement),

    /// Return from the enclosing function or method
    Return(ReturnStatement),
}

impl Statement {
    /// Get the span of this statement
    pub fn span(&self) -> &Span {
        match self {
            Statement::Variable(s) => &s.span,
            Statement::Function(s) => &s.span,
            Statement::Class(s) => &s.span,
            Statement::Enum(s) => &s.span,
            Statement::Expression(s) => &s.span,
            Statement::If(s) => &s.span,
            Statement::While(s) => &s.span,
            Statement::Switch(s) => &s.span,
            Statement::Break(s) => &s.span,
            Statement::Return(s) => &s.span,
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// Variable declaration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// `let` - mutable
    Let,
    /// `const` - immutable, literal initializers fold to compile-time values
    Const,
}

/// Variable declaration: let x: number = 1;
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub kind: VariableKind,
    pub name: Identifier,
    pub type_annotation: Option<TypeAnnotation>,
    pub initializer: Option<Expression>,
    pub span: Span,
}

/// Function declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Identifier,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeAnnotation>,
    pub body: BlockStatement,
    pub span: Span,
}

/// Function or method parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Identifier,
    pub type_annotation: Option<TypeAnnotation>,
    pub span: Span,
}

/// Enum declaration. Variants without an explicit value continue counting
/// from the previous one, starting at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: Identifier,
    pub variants: Vec<EnumVariant>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariant {
    pub name: Identifier,
    pub value: Option<i64>,
    pub span: Span,
}

// ============================================================================
// Classes
// ============================================================================

/// Class declaration: a world entity type.
///
/// # Example
/// ```text
/// class Turret {
///     hp: number = 50;
///     walk: action = action(0, 4, 5, 1, 16);
///
///     constructor() { base(2120, true, 50, walk); }
///
///     on tick { ... }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Identifier,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

/// Class member
#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    /// Field declaration
    Field(FieldDecl),

    /// Method declaration
    Method(MethodDecl),

    /// Constructor (at most one; body restricted to the base initializer)
    Constructor(ConstructorDecl),

    /// Event handler: on <event> { ... }
    Handler(HandlerDecl),

    /// Animation table row: action walk(0, 4, 5, 1, 16);
    Action(ActionDecl),

    /// Velocity table row: move chase(120, 0);
    Move(MoveDecl),

    /// Behavior table row: ai hunt(walk, chase, 1);
    Ai(AiDecl),
}

/// Field declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: Identifier,
    pub type_annotation: Option<TypeAnnotation>,
    pub initializer: Option<Expression>,
    pub readonly: bool,
    pub span: Span,
}

/// Method declaration
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: Identifier,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeAnnotation>,
    pub body: BlockStatement,
    pub span: Span,
}

/// Constructor declaration.
///
/// The body may contain exactly one statement: a call to the implicit base
/// initializer with the entity's registration metadata (numeric tag, enemy
/// flag, initial strength, optional first action/move).
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDecl {
    pub body: BlockStatement,
    pub span: Span,
}

/// Event handler: on tick { ... }, on hurt { ... }
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerDecl {
    pub event: Identifier,
    pub body: BlockStatement,
    pub span: Span,
}

/// Animation table row. Values are frame metadata passed through to the
/// target verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDecl {
    pub name: Identifier,
    pub values: Vec<i64>,
    pub span: Span,
}

/// Velocity table row
#[derive(Debug, Clone, PartialEq)]
pub struct MoveDecl {
    pub name: Identifier,
    pub values: Vec<i64>,
    pub span: Span,
}

/// Behavior table row referencing action and move rows by name
#[derive(Debug, Clone, PartialEq)]
pub struct AiDecl {
    pub name: Identifier,
    pub action: Identifier,
    pub movement: Identifier,
    pub flags: i64,
    pub span: Span,
}

// ============================================================================
// Control Flow Statements
// ============================================================================

/// If statement
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub condition: Expression,
    pub then_branch: BlockStatement,
    pub else_branch: Option<ElseClause>,
    pub span: Span,
}

/// Else clause: either a plain block or a chained `else if`
#[derive(Debug, Clone, PartialEq)]
pub enum ElseClause {
    Block(BlockStatement),
    If(Box<IfStatement>),
}

/// While loop
#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    pub condition: Expression,
    pub body: BlockStatement,
    pub span: Span,
}

/// Switch statement
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStatement {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// None for the default case
    pub test: Option<Expression>,
    pub consequent: Vec<Statement>,
    pub span: Span,
}

/// Break statement
#[derive(Debug, Clone, PartialEq)]
pub struct BreakStatement {
    pub span: Span,
}

/// Return statement
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub value: Option<Expression>,
    pub span: Span,
}

/// Block statement - a sequence of statements wrapped in { }.
///
/// Not a standalone statement: blocks only appear as function, handler,
/// branch, and loop bodies, and as callback arguments to native bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
    pub span: Span,
}

/// Expression statement
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionStatement {
    pub expression: Expression,
    pub span: Span,
}

//! Expression AST nodes.

use crate::statement::BlockStatement;
use crate::{Identifier, Span};

/// Expression (produces a value)
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Integer literal: 42, 0xFF
    IntLiteral(IntLiteral),

    /// String literal: "hello"
    StringLiteral(StringLiteral),

    /// Boolean literal: true, false. Lowers to 1/0.
    BooleanLiteral(BooleanLiteral),

    /// Identifier
    Identifier(Identifier),

    /// Array literal: [1, 2, 3]
    Array(ArrayExpression),

    /// Sized array constructor: array(16)
    NewArray(NewArrayExpression),

    /// Object literal: { x: 1, y: 2 }
    Object(ObjectExpression),

    /// Unary expression: -x, !x
    Unary(UnaryExpression),

    /// Binary expression: x + y, a << b
    Binary(BinaryExpression),

    /// Logical expression: x && y, a || b
    Logical(LogicalExpression),

    /// Assignment: x = 42, y += 1
    Assignment(AssignmentExpression),

    /// Call: f(1, 2)
    Call(CallExpression),

    /// Member access: obj.prop
    Member(MemberExpression),

    /// Index access: arr[i]
    Index(IndexExpression),

    /// Callback block literal, only valid as a native binding argument:
    /// spawn(2120, { ... })
    Callback(CallbackExpression),
}

impl Expression {
    /// Get the span of this expression
    pub fn span(&self) -> &Span {
        match self {
            Expression::IntLiteral(e) => &e.span,
            Expression::StringLiteral(e) => &e.span,
            Expression::BooleanLiteral(e) => &e.span,
            Expression::Identifier(e) => &e.span,
            Expression::Array(e) => &e.span,
            Expression::NewArray(e) => &e.span,
            Expression::Object(e) => &e.span,
            Expression::Unary(e) => &e.span,
            Expression::Binary(e) => &e.span,
            Expression::Logical(e) => &e.span,
            Expression::Assignment(e) => &e.span,
            Expression::Call(e) => &e.span,
            Expression::Member(e) => &e.span,
            Expression::Index(e) => &e.span,
            Expression::Callback(e) => &e.span,
        }
    }

    /// Check if this expression is a literal
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expression::IntLiteral(_)
                | Expression::StringLiteral(_)
                | Expression::BooleanLiteral(_)
        )
    }

    /// Integer value if this is an int literal
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Expression::IntLiteral(e) => Some(e.value),
            _ => None,
        }
    }
}

// ============================================================================
// Literals
// ============================================================================

/// Integer literal: 42, 0xFF
#[derive(Debug, Clone, PartialEq)]
pub struct IntLiteral {
    pub value: i64,
    pub span: Span,
}

/// String literal: "hello"
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub value: String,
    pub span: Span,
}

/// Boolean literal: true, false
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanLiteral {
    pub value: bool,
    pub span: Span,
}

// ============================================================================
// Array and Object Expressions
// ============================================================================

/// Array literal: [1, 2, 3]
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayExpression {
    pub elements: Vec<Expression>,
    pub span: Span,
}

/// Sized array constructor: array(16).
///
/// With a literal length this sizes stack layouts at compile time; any other
/// length forces a heap allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArrayExpression {
    pub length: Box<Expression>,
    pub span: Span,
}

/// Object literal: { x: 1, y: 2 }
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectExpression {
    pub properties: Vec<Property>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: Identifier,
    pub value: Expression,
    pub span: Span,
}

// ============================================================================
// Unary & Binary Expressions
// ============================================================================

/// Unary expression: -x, !x
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpression {
    pub operator: UnaryOperator,
    pub operand: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus, // -x
    Not,   // !x
}

/// Binary expression: x + y, a * b
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    pub operator: BinaryOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,      // +
    Subtract, // -
    Multiply, // *
    Divide,   // /
    Modulo,   // %

    // Comparison
    Equal,        // ==
    NotEqual,     // !=
    LessThan,     // <
    LessEqual,    // <=
    GreaterThan,  // >
    GreaterEqual, // >=

    // Bitwise
    BitwiseAnd, // &
    BitwiseOr,  // |
    BitwiseXor, // ^
    LeftShift,  // <<
    RightShift, // >>
}

impl BinaryOperator {
    /// Comparison operators are only legal inside condition expressions.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterEqual
        )
    }
}

/// Logical expression: x && y, a || b
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalExpression {
    pub operator: LogicalOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And, // &&
    Or,  // ||
}

/// Assignment expression: x = 42, y += 1
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentExpression {
    pub operator: AssignmentOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,    // =
    AddAssign, // +=
    SubAssign, // -=
    MulAssign, // *=
    DivAssign, // /=
    ModAssign, // %=
}

impl AssignmentOperator {
    /// The arithmetic operator a compound assignment expands to.
    pub fn binary_op(&self) -> Option<BinaryOperator> {
        match self {
            AssignmentOperator::Assign => None,
            AssignmentOperator::AddAssign => Some(BinaryOperator::Add),
            AssignmentOperator::SubAssign => Some(BinaryOperator::Subtract),
            AssignmentOperator::MulAssign => Some(BinaryOperator::Multiply),
            AssignmentOperator::DivAssign => Some(BinaryOperator::Divide),
            AssignmentOperator::ModAssign => Some(BinaryOperator::Modulo),
        }
    }
}

// ============================================================================
// Complex Expressions
// ============================================================================

/// Call: f(1, 2), obj.method(x), spawn(2120, { ... })
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
    pub span: Span,
}

/// Member access: obj.prop
#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpression {
    pub object: Box<Expression>,
    pub property: Identifier,
    pub span: Span,
}

/// Index access: arr[i]
#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpression {
    pub object: Box<Expression>,
    pub index: Box<Expression>,
    pub span: Span,
}

/// Callback block literal passed to a native binding.
///
/// Not a closure: the block is lowered inline at the binding's insertion
/// point and sees the enclosing scope directly.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackExpression {
    pub body: BlockStatement,
    pub span: Span,
}

//! Type annotation AST nodes.
//!
//! Annotations are names, not resolved types. The compiler interprets them
//! against its symbol table and native catalog: `number`/`string`/`quote`/
//! `bool` are primitive, a name is either a class shape, an enum, or one of
//! the reserved world collection handles (`actor`, `sector`, `wall`,
//! `player`), and `T[]` is an array of any of those.

use crate::Span;

/// Type annotation (compile-time type)
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub ty: Type,
    pub span: Span,
}

/// Type
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// Primitive types: number, string, quote, bool
    Primitive(PrimitiveType),

    /// Named type: a class shape, an enum, or a reserved collection handle
    Named(String),

    /// Array type: number[], Vec2[]
    Array(Box<TypeAnnotation>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    /// One flat-memory slot holding a signed integer
    Number,
    /// Heap string: length header plus one slot per character
    String,
    /// Fixed-table quote string, at most 128 characters
    Quote,
    /// 1/0 in one slot
    Boolean,
}

impl TypeAnnotation {
    pub fn primitive(p: PrimitiveType, span: Span) -> Self {
        Self {
            ty: Type::Primitive(p),
            span,
        }
    }

    pub fn named(name: impl Into<String>, span: Span) -> Self {
        Self {
            ty: Type::Named(name.into()),
            span,
        }
    }

    pub fn array(elem: TypeAnnotation) -> Self {
        let span = elem.span;
        Self {
            ty: Type::Array(Box::new(elem)),
            span,
        }
    }

    /// Element annotation if this is an array type.
    pub fn element(&self) -> Option<&TypeAnnotation> {
        match &self.ty {
            Type::Array(elem) => Some(elem),
            _ => None,
        }
    }
}

//! Object and array shape layout
//!
//! Class fields are laid out into contiguous flat-memory blocks by a
//! depth-first walk in declaration order. Scalars take one slot. An array
//! field takes a length header plus element-size times count slots inline.
//! A field typed as another known shape takes one indirection slot in the
//! head region; the nested block itself is appended after the last field,
//! so the parent's total size includes every nested block and the pointer
//! slot is wired to the appended block at construction time.
//!
//! Layouts are memoized per shape name, which both keeps repeated
//! instantiations cheap and guarantees two objects of the same shape get
//! identical offsets.

use rustc_hash::{FxHashMap, FxHashSet};

use skald_ast::types::{PrimitiveType, Type, TypeAnnotation};

use crate::natives::Collection;
use crate::symbols::ValueKind;

/// Layout input for one declared field, extracted from the AST.
#[derive(Debug, Clone)]
pub struct ShapeField {
    pub name: String,
    pub annotation: Option<TypeAnnotation>,
    /// Element count taken from a literal array constructor or array
    /// literal at the declaration site.
    pub declared_count: Option<u32>,
    pub readonly: bool,
}

/// Computed layout of one shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub shape: String,
    /// Total slots, appended nested blocks included.
    pub size: u32,
    /// Declaration order preserved.
    pub fields: Vec<Field>,
}

impl Layout {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    /// Slot offset of the field in the head region, parent-relative.
    pub offset: u32,
    pub readonly: bool,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// One slot holding the value (or pointer, for strings).
    Scalar(ValueKind),
    /// One pointer slot; the block it points at sits at `block_offset`
    /// within the same parent allocation.
    Object {
        shape: String,
        block_offset: u32,
        block_size: u32,
    },
    /// Length header plus `count * elem_size` slots inline.
    Array {
        elem: ElemKind,
        count: u32,
        elem_size: u32,
    },
}

impl FieldKind {
    /// Slots this field occupies in the head region.
    pub fn head_size(&self) -> u32 {
        match self {
            FieldKind::Scalar(_) | FieldKind::Object { .. } => 1,
            FieldKind::Array {
                count, elem_size, ..
            } => 1 + count * elem_size,
        }
    }

    /// Kind of value reading the field produces.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            FieldKind::Scalar(k) => *k,
            FieldKind::Object { .. } => ValueKind::Object,
            FieldKind::Array { .. } => ValueKind::Array,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElemKind {
    Scalar(ValueKind),
    Shape(String),
}

/// A non-fatal problem found while computing a layout. The lowerer drains
/// these into warnings at the declaring class's location.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutIssue {
    pub shape: String,
    pub field: String,
    pub kind: IssueKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Array field without a literal count at the declaration site;
    /// laid out with zero elements.
    MissingCount,
}

/// Memoizing layout computer.
#[derive(Debug, Default)]
pub struct LayoutEngine {
    shapes: FxHashMap<String, Vec<ShapeField>>,
    memo: FxHashMap<String, Layout>,
    issues: Vec<LayoutIssue>,
}

impl LayoutEngine {
    pub fn new() -> LayoutEngine {
        LayoutEngine::default()
    }

    pub fn register_shape(&mut self, name: impl Into<String>, fields: Vec<ShapeField>) {
        self.shapes.insert(name.into(), fields);
    }

    pub fn has_shape(&self, name: &str) -> bool {
        self.shapes.contains_key(name)
    }

    /// Compute (or fetch) the layout for a registered shape.
    pub fn layout_of(&mut self, name: &str) -> Option<&Layout> {
        if !self.shapes.contains_key(name) {
            return None;
        }
        if !self.memo.contains_key(name) {
            let mut visiting = FxHashSet::default();
            let layout = self.compute(name, &mut visiting);
            self.memo.insert(name.to_string(), layout);
        }
        self.memo.get(name)
    }

    pub fn size_of(&mut self, name: &str) -> Option<u32> {
        self.layout_of(name).map(|l| l.size)
    }

    /// Problems accumulated so far; drained by the caller.
    pub fn take_issues(&mut self) -> Vec<LayoutIssue> {
        std::mem::take(&mut self.issues)
    }

    /// The kind of value a type annotation denotes, without forcing a
    /// layout computation.
    pub fn annotation_kind(&self, ann: &TypeAnnotation) -> ValueKind {
        match &ann.ty {
            Type::Primitive(PrimitiveType::Number) | Type::Primitive(PrimitiveType::Boolean) => {
                ValueKind::Number
            }
            Type::Primitive(PrimitiveType::String) => ValueKind::Str,
            Type::Primitive(PrimitiveType::Quote) => ValueKind::Quote,
            Type::Named(n) => {
                if let Some(c) = Collection::from_type_name(n) {
                    ValueKind::Handle(c)
                } else if self.has_shape(n) {
                    ValueKind::Object
                } else {
                    // Enum names and anything unresolved read as numbers.
                    ValueKind::Number
                }
            }
            Type::Array(_) => ValueKind::Array,
        }
    }

    fn compute(&mut self, name: &str, visiting: &mut FxHashSet<String>) -> Layout {
        visiting.insert(name.to_string());
        let fields = self.shapes.get(name).cloned().unwrap_or_default();

        let mut head = 0u32;
        let mut out: Vec<Field> = Vec::with_capacity(fields.len());
        // (field index, shape, size) of blocks to append after the head
        let mut appended: Vec<(usize, String, u32)> = Vec::new();

        for sf in &fields {
            let kind = self.field_kind(name, sf, visiting);
            let offset = head;
            head += kind.head_size();
            if let FieldKind::Object {
                shape, block_size, ..
            } = &kind
            {
                appended.push((out.len(), shape.clone(), *block_size));
            }
            out.push(Field {
                name: sf.name.clone(),
                offset,
                readonly: sf.readonly,
                kind,
            });
        }

        let mut cursor = head;
        for (idx, _, block_size) in &appended {
            if let FieldKind::Object { block_offset, .. } = &mut out[*idx].kind {
                *block_offset = cursor;
            }
            cursor += block_size;
        }

        visiting.remove(name);
        Layout {
            shape: name.to_string(),
            size: cursor,
            fields: out,
        }
    }

    fn field_kind(
        &mut self,
        owner: &str,
        sf: &ShapeField,
        visiting: &mut FxHashSet<String>,
    ) -> FieldKind {
        match sf.annotation.as_ref().map(|a| &a.ty) {
            None => {
                // No annotation: an array-literal initializer still shapes
                // the field, anything else is one numeric slot.
                match sf.declared_count {
                    Some(count) => FieldKind::Array {
                        elem: ElemKind::Scalar(ValueKind::Number),
                        count,
                        elem_size: 1,
                    },
                    None => FieldKind::Scalar(ValueKind::Number),
                }
            }
            Some(Type::Primitive(p)) => FieldKind::Scalar(match p {
                PrimitiveType::Number | PrimitiveType::Boolean => ValueKind::Number,
                PrimitiveType::String => ValueKind::Str,
                PrimitiveType::Quote => ValueKind::Quote,
            }),
            Some(Type::Named(n)) => {
                if let Some(c) = Collection::from_type_name(n) {
                    FieldKind::Scalar(ValueKind::Handle(c))
                } else if self.shapes.contains_key(n) && !visiting.contains(n) {
                    let nested = self.nested_size(n, visiting);
                    FieldKind::Object {
                        shape: n.clone(),
                        block_offset: 0,
                        block_size: nested,
                    }
                } else {
                    // Unknown or self-referential shape degrades to one
                    // slot rather than failing the whole class.
                    FieldKind::Scalar(ValueKind::Number)
                }
            }
            Some(Type::Array(elem)) => {
                let count = match sf.declared_count {
                    Some(c) => c,
                    None => {
                        self.issues.push(LayoutIssue {
                            shape: owner.to_string(),
                            field: sf.name.clone(),
                            kind: IssueKind::MissingCount,
                        });
                        0
                    }
                };
                let (elem_kind, elem_size) = self.element_kind(elem, visiting);
                FieldKind::Array {
                    elem: elem_kind,
                    count,
                    elem_size,
                }
            }
        }
    }

    fn element_kind(
        &mut self,
        elem: &TypeAnnotation,
        visiting: &mut FxHashSet<String>,
    ) -> (ElemKind, u32) {
        match &elem.ty {
            Type::Primitive(p) => {
                let k = match p {
                    PrimitiveType::Number | PrimitiveType::Boolean => ValueKind::Number,
                    PrimitiveType::String => ValueKind::Str,
                    PrimitiveType::Quote => ValueKind::Quote,
                };
                (ElemKind::Scalar(k), 1)
            }
            Type::Named(n) => {
                if let Some(c) = Collection::from_type_name(n) {
                    (ElemKind::Scalar(ValueKind::Handle(c)), 1)
                } else if self.shapes.contains_key(n) && !visiting.contains(n) {
                    let size = self.nested_size(n, visiting);
                    (ElemKind::Shape(n.clone()), size)
                } else {
                    (ElemKind::Scalar(ValueKind::Number), 1)
                }
            }
            // Arrays of arrays collapse to one pointer slot per element.
            Type::Array(_) => (ElemKind::Scalar(ValueKind::Array), 1),
        }
    }

    fn nested_size(&mut self, name: &str, visiting: &mut FxHashSet<String>) -> u32 {
        if let Some(l) = self.memo.get(name) {
            return l.size;
        }
        let layout = self.compute(name, visiting);
        let size = layout.size;
        self.memo.insert(name.to_string(), layout);
        size
    }
}

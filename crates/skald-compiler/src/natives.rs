//! Native binding resolution
//!
//! The world simulator exposes engine functionality two ways: per-entity
//! field tables (backed by parallel arrays the runtime maintains) and
//! callable intrinsics described by code templates. Both live in a
//! [`NativeCatalog`] that the lowerer consults after the user symbol table
//! comes up empty. Embedders swap the catalog to target a different
//! engine build.

use rustc_hash::FxHashMap;

use crate::symbols::ValueKind;

/// Built-in world collections with engine-maintained backing arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Actor,
    Sector,
    Wall,
    Player,
}

impl Collection {
    /// The reserved source-level name of the collection.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Actor => "actors",
            Collection::Sector => "sectors",
            Collection::Wall => "walls",
            Collection::Player => "player",
        }
    }

    /// Singleton collections are addressed without an index; the engine
    /// keeps the current index in a well-known var instead.
    pub fn is_singleton(&self) -> bool {
        matches!(self, Collection::Player)
    }

    pub fn all() -> [Collection; 4] {
        [
            Collection::Actor,
            Collection::Sector,
            Collection::Wall,
            Collection::Player,
        ]
    }

    pub fn from_name(name: &str) -> Option<Collection> {
        Collection::all().into_iter().find(|c| c.name() == name)
    }

    /// Lookup by the singular type-annotation name (`actor`, `sector`,
    /// `wall`, `player`).
    pub fn from_type_name(name: &str) -> Option<Collection> {
        match name {
            "actor" => Some(Collection::Actor),
            "sector" => Some(Collection::Sector),
            "wall" => Some(Collection::Wall),
            "player" => Some(Collection::Player),
            _ => None,
        }
    }
}

// ============================================================================
// Argument specifications
// ============================================================================

/// Bitmask of argument forms a binding parameter accepts.
pub mod arg {
    /// Compile-time integer constant, folded into the template text.
    pub const CONST: u8 = 1 << 0;
    /// Runtime numeric value, packed into an argument register.
    pub const VAR: u8 = 1 << 1;
    /// String or quote value.
    pub const STRING: u8 = 1 << 2;
    /// Label reference, resolved to literal text at compile time.
    pub const LABEL: u8 = 1 << 3;
    /// Callback block, lowered inline into the template.
    pub const CALLBACK: u8 = 1 << 4;
    /// Object pointer.
    pub const OBJECT: u8 = 1 << 5;
    /// Array pointer.
    pub const ARRAY: u8 = 1 << 6;
    /// May be omitted at the call site; omissions must be trailing.
    pub const OPTIONAL: u8 = 1 << 7;
}

/// One declared parameter of a native binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub mask: u8,
}

impl ArgSpec {
    pub const fn of(mask: u8) -> ArgSpec {
        ArgSpec { mask }
    }

    pub fn accepts(&self, bit: u8) -> bool {
        self.mask & bit != 0
    }

    pub fn optional(&self) -> bool {
        self.mask & arg::OPTIONAL != 0
    }

    /// Whether a supplied value for this parameter occupies an argument
    /// register at runtime (as opposed to being folded into the template).
    pub fn takes_register(&self) -> bool {
        self.mask & (arg::VAR | arg::STRING | arg::OBJECT | arg::ARRAY) != 0
    }
}

// ============================================================================
// Bindings
// ============================================================================

/// Owner restriction on a binding. A restricted binding only matches
/// calls whose receiver lowers to the named kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerTag {
    Str,
    Quote,
    Array,
    Object,
    Collection(Collection),
}

impl OwnerTag {
    pub fn matches(&self, kind: ValueKind) -> bool {
        match (self, kind) {
            (OwnerTag::Str, ValueKind::Str) => true,
            (OwnerTag::Quote, ValueKind::Quote) => true,
            (OwnerTag::Array, ValueKind::Array) => true,
            (OwnerTag::Object, ValueKind::Object) => true,
            (OwnerTag::Collection(c), ValueKind::Handle(k)) => *c == k,
            _ => false,
        }
    }
}

/// Everything a template needs about an already-lowered call site.
///
/// `args` holds one operand text per declared parameter: a register name
/// for register-packed values, literal text for folded constants and
/// labels, and `"0"` for omitted optionals.
#[derive(Debug)]
pub struct ResolvedCall {
    pub args: Vec<String>,
    /// Receiver operand text, present for owner-restricted bindings.
    pub receiver: Option<String>,
    /// Lowered callback code, inserted verbatim where the template asks.
    pub callback: Option<String>,
    /// How many trailing optionals the call site actually supplied.
    pub supplied_optionals: u32,
}

impl ResolvedCall {
    pub fn arg(&self, i: usize) -> &str {
        self.args.get(i).map(String::as_str).unwrap_or("0")
    }
}

/// Code a binding expands to.
#[derive(Clone, Copy)]
pub enum Template {
    /// Fixed text with placeholder substitution (see [`expand`]).
    Fixed(&'static str),
    /// Generated per call site, for bindings whose shape depends on which
    /// optionals were supplied.
    Gen(fn(&ResolvedCall) -> String),
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Template::Fixed(t) => f.debug_tuple("Fixed").field(t).finish(),
            Template::Gen(_) => f.write_str("Gen(..)"),
        }
    }
}

/// A callable native intrinsic.
#[derive(Debug)]
pub struct Binding {
    pub name: &'static str,
    pub owner: Option<OwnerTag>,
    pub args: Vec<ArgSpec>,
    /// Result kind; `None` for statement-only intrinsics. Templates that
    /// produce a result leave it in the accumulator.
    pub returns: Option<ValueKind>,
    pub code: Template,
}

impl Binding {
    /// Minimum number of arguments a call site must supply.
    pub fn required_args(&self) -> usize {
        self.args.iter().take_while(|a| !a.optional()).count()
    }
}

/// Expand placeholder text against a resolved call. Placeholders:
/// `%0`..`%9` declared arguments, `%t` the receiver, `%!` the callback
/// insertion point, `%#` the supplied-optionals count, `%L` the loop
/// counter register, `%%` a literal percent.
pub fn expand(template: &str, call: &ResolvedCall) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(d @ '0'..='9') => {
                out.push_str(call.arg(d as usize - '0' as usize));
            }
            Some('t') => {
                out.push_str(call.receiver.as_deref().unwrap_or("0"));
            }
            Some('!') => {
                if let Some(cb) = &call.callback {
                    out.push_str(cb.trim_end());
                }
            }
            Some('#') => {
                out.push_str(&call.supplied_optionals.to_string());
            }
            Some('L') => out.push_str("rlc"),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

// ============================================================================
// Field tables
// ============================================================================

/// How a collection field reads and writes.
#[derive(Debug, Clone)]
pub enum FieldTemplate {
    /// Ordinary field backed by a parallel array. `get` substitutes `%d`
    /// for the destination cell and `%i` for the entity index; `set`
    /// substitutes `%i` and `%v` for the stored value. A missing `set`
    /// marks the field read-only.
    Direct {
        get: &'static str,
        set: Option<&'static str>,
        kind: ValueKind,
    },
    /// Field whose subscript re-derives a base index into another
    /// collection (a sector's wall list starts at its first wall).
    IndexOverride {
        derive: &'static str,
        target: Collection,
    },
}

impl FieldTemplate {
    pub fn kind(&self) -> ValueKind {
        match self {
            FieldTemplate::Direct { kind, .. } => *kind,
            FieldTemplate::IndexOverride { target, .. } => ValueKind::Handle(*target),
        }
    }

    pub fn read_only(&self) -> bool {
        matches!(self, FieldTemplate::Direct { set: None, .. })
            || matches!(self, FieldTemplate::IndexOverride { .. })
    }
}

/// Substitute `%d`/`%i`/`%v` in a field template.
pub fn expand_field(template: &str, dest: &str, index: &str, value: &str) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('d') => out.push_str(dest),
            Some('i') => out.push_str(index),
            Some('v') => out.push_str(value),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

// ============================================================================
// Catalog
// ============================================================================

/// The binding and field tables for one engine build.
#[derive(Debug, Default)]
pub struct NativeCatalog {
    bindings: Vec<Binding>,
    fields: FxHashMap<Collection, FxHashMap<&'static str, FieldTemplate>>,
}

impl NativeCatalog {
    pub fn new() -> NativeCatalog {
        NativeCatalog::default()
    }

    pub fn add_binding(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    pub fn add_field(&mut self, c: Collection, name: &'static str, template: FieldTemplate) {
        self.fields.entry(c).or_default().insert(name, template);
    }

    /// Resolve a call by name and receiver kind. An owner-restricted
    /// binding whose tag matches the receiver wins over an unrestricted
    /// one of the same name; calls without a matching restricted binding
    /// fall back to the unrestricted entry.
    pub fn resolve_call(&self, name: &str, owner: Option<ValueKind>) -> Option<&Binding> {
        if let Some(kind) = owner {
            let restricted = self.bindings.iter().find(|b| {
                b.name == name && b.owner.map(|o| o.matches(kind)).unwrap_or(false)
            });
            if restricted.is_some() {
                return restricted;
            }
        }
        self.bindings
            .iter()
            .find(|b| b.name == name && b.owner.is_none())
    }

    pub fn has_binding(&self, name: &str) -> bool {
        self.bindings.iter().any(|b| b.name == name)
    }

    pub fn field(&self, c: Collection, name: &str) -> Option<&FieldTemplate> {
        self.fields.get(&c).and_then(|t| t.get(name))
    }
}

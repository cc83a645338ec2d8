//! Symbol table and scope chain.
//!
//! One table runs through a whole compilation: included files fold their
//! globals in before the including file lowers. Scopes are overlay layers on
//! a stack rather than a persistent tree; a child scope lives exactly as long
//! as the lowering call that pushed it, and nothing a child declares can leak
//! upward except through the explicit promotion APIs (`define_global`, a
//! class symbol's shared `children` map).

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::natives::Collection;

/// What a name denotes. Closed set; lowering matches on this everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// One flat slot holding a signed integer
    Number,
    /// Heap string pointer when `heap`, interned quote id otherwise
    String,
    /// 1/0 in one slot
    Boolean,
    /// An address or collection index
    Pointer,
    /// Contiguous length-prefixed block
    Array,
    /// Contiguous field block of a known shape
    Object,
    /// User function or method, lowered to a target state
    Function,
    /// Native binding resolved through the catalog
    Native,
    /// Compile-time constant, folded at use sites
    Constant,
    /// Class: shape plus member table plus entity metadata
    Class,
    /// One compiled file's exported table
    Module,
    /// Enum declaration; variants are Constant children
    Enum,
}

/// The kind of value an expression just produced.
///
/// Returned explicitly from every expression lowering call. String-like
/// values stay three-valued at compile time (heap string, quote, number) and
/// collection handles carry their collection, so there is no side flag to go
/// stale between expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Plain integer, including booleans and folded constants
    Number,
    /// Pointer to a length-prefixed heap string
    Str,
    /// Id into the fixed quote table
    Quote,
    /// Pointer to a length-prefixed block
    Array,
    /// Pointer to (or stack base of) a field block
    Object,
    /// Index into a world collection
    Handle(Collection),
}

impl ValueKind {
    /// Can this value be used where arithmetic expects a number?
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKind::Number | ValueKind::Handle(_))
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ValueKind::Number => "number",
            ValueKind::Str => "string",
            ValueKind::Quote => "quote",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Handle(_) => "collection handle",
        }
    }
}

/// A declared name.
///
/// `offset` is relative to the enclosing frame base, except for `global`
/// symbols where it is an absolute flat-memory address (globals sit at the
/// bottom of the value stack, below every frame). Children of a nested
/// layout keep parent-relative offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub offset: i32,
    /// Total slots, children included
    pub size: u32,
    /// Element count for arrays, field count for objects
    pub num_elements: u32,
    /// Block lives on the heap; the symbol's slot holds its address
    pub heap: bool,
    /// Offset is an absolute address, and the collector roots it
    pub global: bool,
    pub readonly: bool,
    /// Which collection this symbol indexes into, for handle symbols
    pub native_pointer: Option<Collection>,
    /// Member map for classes, modules, enums, and object layouts
    pub children: FxHashMap<String, Symbol>,
    /// Result kind of calling this symbol, for functions
    pub returns: ValueKind,
    /// Folded value for constants and enum variants
    pub literal: Option<i64>,
    /// Emitted target-side name: the state a function or method lowers
    /// to, or the metadata label of an action/move/ai row
    pub target: Option<String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
            offset: 0,
            size: 1,
            num_elements: 0,
            heap: false,
            global: false,
            readonly: false,
            native_pointer: None,
            children: FxHashMap::default(),
            returns: ValueKind::Number,
            literal: None,
            target: None,
        }
    }

    pub fn constant(name: impl Into<String>, value: i64) -> Self {
        let mut sym = Symbol::new(name, SymbolKind::Constant);
        sym.readonly = true;
        sym.literal = Some(value);
        sym
    }

    pub fn function(name: impl Into<String>, returns: ValueKind) -> Self {
        let mut sym = Symbol::new(name, SymbolKind::Function);
        sym.size = 0;
        sym.returns = returns;
        sym
    }

    pub fn at_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    pub fn sized(mut self, size: u32, num_elements: u32) -> Self {
        self.size = size;
        self.num_elements = num_elements;
        self
    }

    pub fn on_heap(mut self) -> Self {
        self.heap = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Kind of value produced by reading this symbol's slot.
    pub fn value_kind(&self) -> ValueKind {
        match self.kind {
            SymbolKind::Number | SymbolKind::Boolean | SymbolKind::Constant => ValueKind::Number,
            SymbolKind::Enum => ValueKind::Number,
            SymbolKind::String => {
                if self.heap {
                    ValueKind::Str
                } else {
                    ValueKind::Quote
                }
            }
            SymbolKind::Pointer => match self.native_pointer {
                Some(c) => ValueKind::Handle(c),
                None => ValueKind::Number,
            },
            SymbolKind::Array => ValueKind::Array,
            SymbolKind::Object => ValueKind::Object,
            // Reading a function, native, class, or module name as a value
            // is a shape error the caller diagnoses; Number keeps fallback
            // code well-formed.
            SymbolKind::Function | SymbolKind::Native | SymbolKind::Class | SymbolKind::Module => {
                ValueKind::Number
            }
        }
    }

    /// Slots one element occupies, for arrays.
    pub fn element_size(&self) -> u32 {
        if self.num_elements == 0 {
            1
        } else {
            (self.size.saturating_sub(1)) / self.num_elements
        }
    }
}

/// Why a `define` was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefineError {
    #[error("Symbol '{name}' is already defined in this scope")]
    Duplicate { name: String },

    #[error("'{name}' is a built-in collection name and cannot be declared")]
    Reserved { name: String },
}

/// What opened a scope. Function scopes are where frame-local offsets
/// restart; block scopes share the enclosing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Block,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    symbols: FxHashMap<String, Symbol>,
}

/// Overlay-stack symbol table.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    reserved: FxHashSet<String>,
}

impl SymbolTable {
    /// Table with the module scope open. `reserved` is the catalog's
    /// collection name set; those names never accept a declaration.
    pub fn new(reserved: FxHashSet<String>) -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Module,
                symbols: FxHashMap::default(),
            }],
            reserved,
        }
    }

    pub fn push_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind,
            symbols: FxHashMap::default(),
        });
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the module scope");
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Run `f` inside a fresh child scope; the overlay is gone when this
    /// returns, whatever `f` did.
    pub fn with_scope<T>(&mut self, kind: ScopeKind, f: impl FnOnce(&mut Self) -> T) -> T {
        self.push_scope(kind);
        let out = f(self);
        self.pop_scope();
        out
    }

    /// Declare in the innermost scope.
    pub fn define(&mut self, symbol: Symbol) -> Result<(), DefineError> {
        if self.reserved.contains(&symbol.name) {
            return Err(DefineError::Reserved { name: symbol.name });
        }
        let top = self.scopes.len() - 1;
        let scope = &mut self.scopes[top];
        if scope.symbols.contains_key(&symbol.name) {
            return Err(DefineError::Duplicate { name: symbol.name });
        }
        scope.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Promote a declaration to the module scope regardless of the current
    /// nesting. Used for hoisted functions, classes, and exports.
    pub fn define_global(&mut self, symbol: Symbol) -> Result<(), DefineError> {
        if self.reserved.contains(&symbol.name) {
            return Err(DefineError::Reserved { name: symbol.name });
        }
        let scope = &mut self.scopes[0];
        if scope.symbols.contains_key(&symbol.name) {
            return Err(DefineError::Duplicate { name: symbol.name });
        }
        scope.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Innermost declaration wins.
    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
    }

    pub fn resolve_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.symbols.get_mut(name))
    }

    /// Like `resolve`, but also reports whether the hit came from the
    /// module scope. Class members shadow globals but not locals, so the
    /// identifier path needs to know which layer answered.
    pub fn resolve_split(&self, name: &str) -> Option<(&Symbol, bool)> {
        for (i, scope) in self.scopes.iter().enumerate().rev() {
            if let Some(sym) = scope.symbols.get(name) {
                return Some((sym, i == 0));
            }
        }
        None
    }

    /// True when no function scope is open (module-level lowering).
    pub fn at_module_level(&self) -> bool {
        !self
            .scopes
            .iter()
            .any(|scope| scope.kind == ScopeKind::Function)
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }
}

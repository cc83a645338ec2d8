//! Emitted-text building blocks: registers, operands, the line sink, and
//! the quote table.
//!
//! World-script is line-oriented with structured `{ }` blocks and no labels.
//! The sink only ever appends; lowering that needs a sub-block's text (native
//! callback insertion, library fragments) captures it through [`CodeSink::
//! capture`] instead of patching earlier lines.

use rustc_hash::FxHashMap;
use std::fmt;

/// The memory array every emitted program declares.
pub const MEM: &str = "mem";

/// Entity-index-to-instance-pointer array, declared only when some class
/// carries per-instance fields.
pub const INSTMAP: &str = "instmap";

/// Quote text capacity in the target's fixed table.
pub const QUOTE_CAPACITY: usize = 128;

/// A VM register.
///
/// Arguments travel in `r0..rN`; everything else has a single job and the
/// lowering rules lean on that: `rt` is the only expression temporary and is
/// protected by the push/pop reservation discipline, `rx` never survives a
/// statement, and the construct registers (`rs*`, `rl*`, `rf*`) are saved
/// exactly where a construct or frame says they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    /// Argument register r0..rN
    Arg(u8),
    /// Accumulator `ra`, result of the most recent sub-expression
    Acc,
    /// Reserved expression temporary `rt`
    Tmp,
    /// Address scratch `rx` for member/index chains
    Addr,
    /// Return value `rv`
    Ret,
    /// Frame base `rbp`
    FrameBase,
    /// Stack top `rsp`, one past the last live slot
    StackTop,
    /// Switch return address `rsb`
    SwitchBase,
    /// Switch case index `rsi`
    SwitchIdx,
    /// Loop broke flag `rlf`
    LoopFlag,
    /// Loop iteration counter `rlc`
    LoopCount,
    /// Function exiting flag `rff`
    ExitFlag,
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Arg(n) => write!(f, "r{n}"),
            Reg::Acc => write!(f, "ra"),
            Reg::Tmp => write!(f, "rt"),
            Reg::Addr => write!(f, "rx"),
            Reg::Ret => write!(f, "rv"),
            Reg::FrameBase => write!(f, "rbp"),
            Reg::StackTop => write!(f, "rsp"),
            Reg::SwitchBase => write!(f, "rsb"),
            Reg::SwitchIdx => write!(f, "rsi"),
            Reg::LoopFlag => write!(f, "rlf"),
            Reg::LoopCount => write!(f, "rlc"),
            Reg::ExitFlag => write!(f, "rff"),
        }
    }
}

impl Reg {
    /// Every non-argument register, in declaration order.
    pub fn specials() -> [Reg; 11] {
        [
            Reg::Acc,
            Reg::Tmp,
            Reg::Addr,
            Reg::Ret,
            Reg::FrameBase,
            Reg::StackTop,
            Reg::SwitchBase,
            Reg::SwitchIdx,
            Reg::LoopFlag,
            Reg::LoopCount,
            Reg::ExitFlag,
        ]
    }
}

/// An instruction operand: register, immediate, or symbolic name (declared
/// var or metadata label, resolved by the VM loader).
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reg(Reg),
    Imm(i64),
    Sym(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::Imm(v) => write!(f, "{v}"),
            Operand::Sym(s) => write!(f, "{s}"),
        }
    }
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Self {
        Operand::Reg(r)
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Imm(v)
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Sym(s.to_string())
    }
}

/// Append-only emitter for one region of the output program.
#[derive(Debug)]
pub struct CodeSink {
    buf: String,
    depth: usize,
    comments: bool,
}

impl CodeSink {
    pub fn new(comments: bool) -> Self {
        Self {
            buf: String::new(),
            depth: 0,
            comments,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str("  ");
        }
    }

    /// One instruction or declaration line at the current depth.
    pub fn line(&mut self, text: impl AsRef<str>) {
        self.indent();
        self.buf.push_str(text.as_ref());
        self.buf.push('\n');
    }

    /// Verbatim text, re-indented line by line. Used for library fragments
    /// and generated runtime states.
    pub fn raw(&mut self, text: &str) {
        for line in text.lines() {
            if line.is_empty() {
                self.buf.push('\n');
            } else {
                self.line(line);
            }
        }
    }

    /// Source-line comment, only when enabled.
    pub fn comment(&mut self, text: impl AsRef<str>) {
        if self.comments {
            self.line(format!("// {}", text.as_ref()));
        }
    }

    /// Open a block: emits `head {` and indents.
    pub fn open(&mut self, head: impl AsRef<str>) {
        self.line(format!("{} {{", head.as_ref()));
        self.depth += 1;
    }

    /// Close the innermost block.
    pub fn close(&mut self) {
        debug_assert!(self.depth > 0);
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    /// Close the then-block and open the else-block at the same depth.
    pub fn close_else(&mut self) {
        debug_assert!(self.depth > 0);
        self.depth = self.depth.saturating_sub(1);
        self.line("} else {");
        self.depth += 1;
    }

    // ── Instruction helpers ──

    /// Two-operand register op: `set ra 5`, `add rt ra`, ...
    pub fn rr(&mut self, op: &str, dst: Reg, src: impl Into<Operand>) {
        self.line(format!("{op} {dst} {}", src.into()));
    }

    pub fn set(&mut self, dst: Reg, src: impl Into<Operand>) {
        self.rr("set", dst, src);
    }

    /// Array read: `geta dst array index`
    pub fn geta(&mut self, dst: Reg, array: &str, index: impl Into<Operand>) {
        self.line(format!("geta {dst} {array} {}", index.into()));
    }

    /// Array write: `seta array index value`
    pub fn seta(&mut self, array: &str, index: impl Into<Operand>, value: impl Into<Operand>) {
        self.line(format!("seta {array} {} {}", index.into(), value.into()));
    }

    /// State invocation
    pub fn call(&mut self, state: &str) {
        self.line(format!("call {state}"));
    }

    /// Push a register onto the value stack.
    pub fn push(&mut self, r: Reg) {
        self.seta(MEM, Reg::StackTop, r);
        self.rr("add", Reg::StackTop, 1);
    }

    /// Pop the value stack into a register.
    pub fn pop(&mut self, r: Reg) {
        self.rr("sub", Reg::StackTop, 1);
        self.geta(r, MEM, Reg::StackTop);
    }

    /// Run `f` against an empty buffer and hand back what it emitted; the
    /// sink's own text is untouched. Depth carries over so captured blocks
    /// indent correctly when re-inserted.
    pub fn capture<T>(&mut self, f: impl FnOnce(&mut CodeSink) -> T) -> (String, T) {
        let saved = std::mem::take(&mut self.buf);
        let depth = self.depth;
        self.depth = 0;
        let out = f(self);
        let captured = std::mem::replace(&mut self.buf, saved);
        self.depth = depth;
        (captured, out)
    }

    pub fn comments_enabled(&self) -> bool {
        self.comments
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> String {
        self.buf
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

/// Compile-time interned quote strings.
///
/// The target's quote table is fixed-size and write-once, so the compiler
/// assigns ids up front and deduplicates identical texts. Ids start at 1;
/// id 0 stays free as the empty quote.
#[derive(Debug, Default)]
pub struct QuoteTable {
    ids: FxHashMap<String, u16>,
    texts: Vec<String>,
}

/// Outcome of interning one text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternedQuote {
    pub id: u16,
    /// Text exceeded the table's capacity and was cut to fit.
    pub truncated: bool,
}

impl QuoteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `text`, reusing the id of an identical earlier quote.
    pub fn intern(&mut self, text: &str) -> InternedQuote {
        let mut clean: String = text
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();

        let mut truncated = false;
        if clean.chars().count() > QUOTE_CAPACITY {
            clean = clean.chars().take(QUOTE_CAPACITY).collect();
            truncated = true;
        }

        if let Some(&id) = self.ids.get(&clean) {
            return InternedQuote { id, truncated };
        }
        let id = (self.texts.len() + 1) as u16;
        self.ids.insert(clean.clone(), id);
        self.texts.push(clean);
        InternedQuote { id, truncated }
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// `quote <id> <text>` declaration lines, in id order.
    pub fn render(&self, sink: &mut CodeSink) {
        for (i, text) in self.texts.iter().enumerate() {
            sink.line(format!("quote {} {}", i + 1, text));
        }
    }
}

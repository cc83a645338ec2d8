//! A reference interpreter for the emitted dialect: one flat cell space
//! for registers and vars, named arrays, the quote table, and `state`
//! blocks parsed into jump-resolved instruction lists. The engine
//! intrinsics the stock catalog emits (`spawn`, `rand`, `damage`, ...)
//! are modeled just far enough to observe their effects from a test.
//!
//! The machine is strict where the real VM is forgiving: unknown
//! instructions, unbalanced blocks, out-of-range array access, and
//! runaway execution all panic, so a codegen fault fails the test that
//! tripped it instead of corrupting the image silently.

use std::rc::Rc;

use rustc_hash::FxHashMap;

/// Executed-instruction ceiling per `run_main`/`dispatch`.
const STEP_LIMIT: u64 = 20_000_000;
const CALL_DEPTH_LIMIT: u32 = 256;
/// Metadata labels resolve to ids from this base so they never collide
/// with addresses or small scalars.
const LABEL_BASE: i64 = 1_000_000;
/// Entity indices handed out by `spawn`.
const SPAWN_BASE: i64 = 5_000;
/// Engine collections (`actor_hp`, `instmap`, ...) auto-size to this.
const COLLECTION_LEN: usize = 1024;

#[derive(Debug, Clone)]
enum Operand {
    Lit(i64),
    Sym(String),
}

#[derive(Debug, Clone, Copy)]
enum Alu {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Band,
    Bor,
    Bxor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy)]
enum Test {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Test {
    fn holds(self, l: i64, r: i64) -> bool {
        match self {
            Test::Eq => l == r,
            Test::Ne => l != r,
            Test::Lt => l < r,
            Test::Le => l <= r,
            Test::Gt => l > r,
            Test::Ge => l >= r,
        }
    }
}

#[derive(Debug, Clone)]
enum Instr {
    Alu(Alu, String, Operand),
    Geta {
        dst: String,
        array: String,
        index: Operand,
    },
    Seta {
        array: String,
        index: Operand,
        value: Operand,
    },
    Call(String),
    Print(Operand),
    Display(Operand),
    Resize {
        array: String,
        len: Operand,
    },
    Copy {
        array: String,
        from: Operand,
        to: Operand,
        count: Operand,
    },
    Getpc(String),
    Jump(String),
    /// A conditional block head; `on_false` is the index just past the
    /// block (or past the `Skip` into the else arm).
    Guard {
        test: Test,
        cell: String,
        rhs: Operand,
        on_false: usize,
    },
    /// End of a then-arm that has an else arm: hop past the else.
    Skip {
        to: usize,
    },
    /// `whilen` head: run the body while the cell differs from the
    /// operand, else resume at `exit`.
    Loop {
        cell: String,
        rhs: Operand,
        exit: usize,
    },
    /// Bottom of a `whilen` block: back to the head for a re-test.
    Again {
        head: usize,
    },
    Spawn(Operand),
    Rand(String),
    Dist {
        dst: String,
        a: Operand,
        b: Operand,
    },
    /// Effect-only engine ops: `sound`, `wait`, `damage`, `kill`.
    World {
        op: String,
        args: Vec<Operand>,
    },
}

pub struct Machine {
    cells: FxHashMap<String, i64>,
    arrays: FxHashMap<String, Vec<i64>>,
    states: FxHashMap<String, Rc<[Instr]>>,
    labels: FxHashMap<String, i64>,
    quotes: FxHashMap<i64, String>,
    handlers: FxHashMap<(String, String), String>,
    rows: Vec<String>,
    /// Values passed to `print`, in order.
    pub prints: Vec<i64>,
    /// Engine side effects, one formatted line per op, in order.
    pub events: Vec<String>,
    /// What the modeled `rand` op yields.
    pub rand_value: i64,
    next_label: i64,
    next_spawn: i64,
    steps: u64,
    depth: u32,
}

impl Machine {
    pub fn new() -> Machine {
        Machine {
            cells: FxHashMap::default(),
            arrays: FxHashMap::default(),
            states: FxHashMap::default(),
            labels: FxHashMap::default(),
            quotes: FxHashMap::default(),
            handlers: FxHashMap::default(),
            rows: Vec::new(),
            prints: Vec::new(),
            events: Vec::new(),
            rand_value: 7,
            next_label: LABEL_BASE,
            next_spawn: SPAWN_BASE,
            steps: 0,
            depth: 0,
        }
    }

    // ====================================================================
    // Loading
    // ====================================================================

    /// Parse one emitted text: declarations, metadata rows, and states.
    /// Call once per text; a linked header loads before the program.
    pub fn load(&mut self, text: &str) {
        let lines: Vec<&str> = text.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();
            i += 1;
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.as_slice() {
                ["var", name, value] => {
                    let v = value
                        .parse()
                        .unwrap_or_else(|_| panic!("bad var initializer: {line}"));
                    self.cells.insert((*name).to_string(), v);
                }
                ["array", name, size] => {
                    let n: usize = size
                        .parse()
                        .unwrap_or_else(|_| panic!("bad array size: {line}"));
                    self.arrays.insert((*name).to_string(), vec![0; n]);
                }
                ["quote", id, ..] => {
                    let id: i64 = id
                        .parse()
                        .unwrap_or_else(|_| panic!("bad quote id: {line}"));
                    let text = line.splitn(3, ' ').nth(2).unwrap_or("").to_string();
                    self.quotes.insert(id, text);
                }
                ["linked", _] => {}
                ["state", name, "{"] => {
                    let start = i;
                    let mut depth = 1usize;
                    while i < lines.len() && depth > 0 {
                        depth += lines[i].matches('{').count();
                        depth -= lines[i].matches('}').count();
                        i += 1;
                    }
                    assert_eq!(depth, 0, "unterminated state '{name}'");
                    let body = parse_block(&lines[start..i - 1]);
                    self.states.insert((*name).to_string(), Rc::from(body));
                }
                ["action", label, ..] | ["move", label, ..] | ["ai", label, ..] => {
                    self.intern_label(label);
                    self.rows.push(line.to_string());
                }
                ["entity", ..] => self.rows.push(line.to_string()),
                ["handler", class, event, state] => {
                    self.handlers.insert(
                        ((*class).to_string(), (*event).to_string()),
                        (*state).to_string(),
                    );
                    self.rows.push(line.to_string());
                }
                _ => panic!("unrecognized declaration: {line}"),
            }
        }
    }

    fn intern_label(&mut self, label: &str) {
        if !self.labels.contains_key(label) {
            self.labels.insert(label.to_string(), self.next_label);
            self.next_label += 1;
        }
    }

    // ====================================================================
    // Execution
    // ====================================================================

    pub fn run_main(&mut self) {
        self.exec("main");
    }

    /// Run the handler registered for `class.event` with the entity index
    /// in the engine's `self` var, the way the scheduler would.
    pub fn dispatch(&mut self, class: &str, event: &str, entity: i64) {
        let key = (class.to_string(), event.to_string());
        let state = self
            .handlers
            .get(&key)
            .cloned()
            .unwrap_or_else(|| panic!("no handler for {class}.{event}"));
        self.cells.insert("self".to_string(), entity);
        self.exec(&state);
    }

    fn exec(&mut self, name: &str) {
        let code: Rc<[Instr]> = match self.states.get(name) {
            Some(c) => Rc::clone(c),
            None => panic!("call to undefined state '{name}'"),
        };
        self.depth += 1;
        assert!(
            self.depth <= CALL_DEPTH_LIMIT,
            "call depth exceeded entering '{name}'"
        );
        let mut pc = 0;
        while pc < code.len() {
            self.steps += 1;
            assert!(
                self.steps <= STEP_LIMIT,
                "step limit exceeded in '{name}' at {pc}"
            );
            pc = self.step(&code, pc, name);
        }
        self.depth -= 1;
    }

    fn step(&mut self, code: &[Instr], pc: usize, state: &str) -> usize {
        match &code[pc] {
            Instr::Alu(op, dst, rhs) => {
                let r = self.eval(rhs);
                let l = self.cell(dst);
                let v = apply(*op, l, r);
                self.cells.insert(dst.clone(), v);
                pc + 1
            }
            Instr::Geta { dst, array, index } => {
                let i = self.eval(index);
                let v = self.load_at(array, i);
                self.cells.insert(dst.clone(), v);
                pc + 1
            }
            Instr::Seta {
                array,
                index,
                value,
            } => {
                let i = self.eval(index);
                let v = self.eval(value);
                self.store_at(array, i, v);
                pc + 1
            }
            Instr::Call(target) => {
                self.exec(target);
                pc + 1
            }
            Instr::Print(v) => {
                let v = self.eval(v);
                self.prints.push(v);
                self.events.push(format!("print {v}"));
                pc + 1
            }
            Instr::Display(q) => {
                let id = self.eval(q);
                let text = self.quotes.get(&id).cloned().unwrap_or_default();
                self.events.push(format!("display {text}"));
                pc + 1
            }
            Instr::Resize { array, len } => {
                let n = self.eval(len).max(0) as usize;
                self.backing(array).resize(n, 0);
                pc + 1
            }
            Instr::Copy {
                array,
                from,
                to,
                count,
            } => {
                let from = self.eval(from);
                let to = self.eval(to);
                let n = self.eval(count);
                let held: Vec<i64> = (0..n).map(|k| self.load_at(array, from + k)).collect();
                for (k, v) in held.into_iter().enumerate() {
                    self.store_at(array, to + k as i64, v);
                }
                pc + 1
            }
            Instr::Getpc(cell) => {
                self.cells.insert(cell.clone(), pc as i64);
                pc + 1
            }
            Instr::Jump(cell) => {
                let t = self.cell(cell);
                assert!(
                    t >= 0 && (t as usize) < code.len(),
                    "jump out of range in '{state}': {t}"
                );
                t as usize
            }
            Instr::Guard {
                test,
                cell,
                rhs,
                on_false,
            } => {
                let l = self.cell(cell);
                let r = self.eval(rhs);
                if test.holds(l, r) {
                    pc + 1
                } else {
                    *on_false
                }
            }
            Instr::Skip { to } => *to,
            Instr::Loop { cell, rhs, exit } => {
                let l = self.cell(cell);
                let r = self.eval(rhs);
                if l != r {
                    pc + 1
                } else {
                    *exit
                }
            }
            Instr::Again { head } => *head,
            Instr::Spawn(tag) => {
                let tag = self.eval(tag);
                let id = self.next_spawn;
                self.next_spawn += 1;
                self.cells.insert("spawned".to_string(), id);
                self.events.push(format!("spawn {tag}"));
                pc + 1
            }
            Instr::Rand(dst) => {
                let v = self.rand_value;
                self.cells.insert(dst.clone(), v);
                pc + 1
            }
            Instr::Dist { dst, a, b } => {
                let a = self.eval(a);
                let b = self.eval(b);
                let dx = (self.load_at("actor_x", a) - self.load_at("actor_x", b)).abs();
                let dy = (self.load_at("actor_y", a) - self.load_at("actor_y", b)).abs();
                self.cells.insert(dst.clone(), dx + dy);
                pc + 1
            }
            Instr::World { op, args } => {
                let vals: Vec<String> = args.iter().map(|a| self.eval(a).to_string()).collect();
                self.events.push(if vals.is_empty() {
                    op.clone()
                } else {
                    format!("{} {}", op, vals.join(" "))
                });
                pc + 1
            }
        }
    }

    // ====================================================================
    // Cells and arrays
    // ====================================================================

    fn eval(&self, o: &Operand) -> i64 {
        match o {
            Operand::Lit(v) => *v,
            Operand::Sym(s) => match self.labels.get(s) {
                Some(&id) => id,
                None => self.cell(s),
            },
        }
    }

    pub fn cell(&self, name: &str) -> i64 {
        self.cells.get(name).copied().unwrap_or(0)
    }

    fn backing(&mut self, name: &str) -> &mut Vec<i64> {
        self.arrays
            .entry(name.to_string())
            .or_insert_with(|| vec![0; COLLECTION_LEN])
    }

    fn load_at(&mut self, name: &str, index: i64) -> i64 {
        let arr = self.backing(name);
        let len = arr.len();
        assert!(
            index >= 0 && (index as usize) < len,
            "{name}[{index}] read out of range (len {len})"
        );
        arr[index as usize]
    }

    fn store_at(&mut self, name: &str, index: i64, value: i64) {
        let arr = self.backing(name);
        let len = arr.len();
        assert!(
            index >= 0 && (index as usize) < len,
            "{name}[{index}] write out of range (len {len})"
        );
        arr[index as usize] = value;
    }

    /// Seed an array cell before running, auto-creating collections.
    pub fn poke(&mut self, name: &str, index: i64, value: i64) {
        self.store_at(name, index, value);
    }

    // ====================================================================
    // Inspection
    // ====================================================================

    pub fn mem(&self, index: i64) -> i64 {
        self.array_value("mem", index)
    }

    pub fn array_value(&self, name: &str, index: i64) -> i64 {
        let arr = self
            .arrays
            .get(name)
            .unwrap_or_else(|| panic!("no array named '{name}'"));
        assert!(
            index >= 0 && (index as usize) < arr.len(),
            "{name}[{index}] out of range (len {})",
            arr.len()
        );
        arr[index as usize]
    }

    pub fn array_len(&self, name: &str) -> usize {
        self.arrays.get(name).map_or(0, Vec::len)
    }

    /// Read the heap string whose base pointer is `addr`.
    pub fn string_at(&self, addr: i64) -> String {
        let len = self.mem(addr);
        (1..=len)
            .map(|k| char::from_u32(self.mem(addr + k) as u32).unwrap_or('?'))
            .collect()
    }

    pub fn label(&self, name: &str) -> Option<i64> {
        self.labels.get(name).copied()
    }

    /// Metadata rows (`action`/`move`/`ai`/`entity`/`handler`) in
    /// declaration order.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Count of heap pages currently marked allocated.
    pub fn allocated_pages(&self) -> usize {
        self.arrays
            .get("pagestat")
            .map_or(0, |stat| stat.iter().filter(|&&s| s != 0).count())
    }
}

fn apply(op: Alu, l: i64, r: i64) -> i64 {
    match op {
        Alu::Set => r,
        Alu::Add => l.wrapping_add(r),
        Alu::Sub => l.wrapping_sub(r),
        Alu::Mul => l.wrapping_mul(r),
        // Division and modulo by zero read as zero on the target.
        Alu::Div => l.checked_div(r).unwrap_or(0),
        Alu::Mod => l.checked_rem(r).unwrap_or(0),
        Alu::Band => l & r,
        Alu::Bor => l | r,
        Alu::Bxor => l ^ r,
        Alu::Shl => {
            if (0..64).contains(&r) {
                l.wrapping_shl(r as u32)
            } else {
                0
            }
        }
        Alu::Shr => {
            if (0..64).contains(&r) {
                l.wrapping_shr(r as u32)
            } else {
                0
            }
        }
    }
}

// ========================================================================
// Parsing
// ========================================================================

enum OpenBlock {
    Guard { at: usize },
    Else { skip_at: usize },
    Loop { head: usize },
}

/// Parse a state body into a flat instruction list with block edges
/// resolved to indices, so `getpc`/`jump` have a concrete address space.
fn parse_block(lines: &[&str]) -> Vec<Instr> {
    let mut code: Vec<Instr> = Vec::new();
    let mut open: Vec<OpenBlock> = Vec::new();
    for raw in lines {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["}"] => {
                let end = code.len();
                match open.pop().expect("close without an open block") {
                    OpenBlock::Guard { at } => patch_guard(&mut code, at, end),
                    OpenBlock::Else { skip_at } => patch_skip(&mut code, skip_at, end),
                    OpenBlock::Loop { head } => {
                        code.push(Instr::Again { head });
                        patch_loop(&mut code, head, end + 1);
                    }
                }
            }
            ["}", "else", "{"] => {
                let at = match open.pop() {
                    Some(OpenBlock::Guard { at }) => at,
                    _ => panic!("else without a guard"),
                };
                let skip_at = code.len();
                code.push(Instr::Skip { to: usize::MAX });
                patch_guard(&mut code, at, skip_at + 1);
                open.push(OpenBlock::Else { skip_at });
            }
            ["whilen", cell, rhs, "{"] => {
                let head = code.len();
                code.push(Instr::Loop {
                    cell: (*cell).to_string(),
                    rhs: operand(rhs),
                    exit: usize::MAX,
                });
                open.push(OpenBlock::Loop { head });
            }
            [test, cell, rhs, "{"] if parse_test(test).is_some() => {
                let at = code.len();
                code.push(Instr::Guard {
                    test: parse_test(test).unwrap(),
                    cell: (*cell).to_string(),
                    rhs: operand(rhs),
                    on_false: usize::MAX,
                });
                open.push(OpenBlock::Guard { at });
            }
            plain => code.push(parse_instr(plain, line)),
        }
    }
    assert!(open.is_empty(), "unbalanced block in state body");
    code
}

fn parse_instr(words: &[&str], line: &str) -> Instr {
    match words {
        [op, dst, rhs] if parse_alu(op).is_some() => Instr::Alu(
            parse_alu(op).unwrap(),
            (*dst).to_string(),
            operand(rhs),
        ),
        ["geta", dst, array, index] => Instr::Geta {
            dst: (*dst).to_string(),
            array: (*array).to_string(),
            index: operand(index),
        },
        ["seta", array, index, value] => Instr::Seta {
            array: (*array).to_string(),
            index: operand(index),
            value: operand(value),
        },
        ["call", target] => Instr::Call((*target).to_string()),
        ["print", v] => Instr::Print(operand(v)),
        ["display", q] => Instr::Display(operand(q)),
        ["resize", array, len] => Instr::Resize {
            array: (*array).to_string(),
            len: operand(len),
        },
        ["copy", array, from, to, count] => Instr::Copy {
            array: (*array).to_string(),
            from: operand(from),
            to: operand(to),
            count: operand(count),
        },
        ["getpc", cell] => Instr::Getpc((*cell).to_string()),
        ["jump", cell] => Instr::Jump((*cell).to_string()),
        ["spawn", tag] => Instr::Spawn(operand(tag)),
        ["rand", dst] => Instr::Rand((*dst).to_string()),
        ["dist", dst, a, b] => Instr::Dist {
            dst: (*dst).to_string(),
            a: operand(a),
            b: operand(b),
        },
        [op @ ("sound" | "wait" | "damage" | "kill"), rest @ ..] => Instr::World {
            op: (*op).to_string(),
            args: rest.iter().map(|w| operand(w)).collect(),
        },
        _ => panic!("unrecognized instruction: {line}"),
    }
}

fn operand(word: &str) -> Operand {
    match word.parse::<i64>() {
        Ok(v) => Operand::Lit(v),
        Err(_) => Operand::Sym(word.to_string()),
    }
}

fn parse_alu(word: &str) -> Option<Alu> {
    Some(match word {
        "set" => Alu::Set,
        "add" => Alu::Add,
        "sub" => Alu::Sub,
        "mul" => Alu::Mul,
        "div" => Alu::Div,
        "mod" => Alu::Mod,
        "band" => Alu::Band,
        "bor" => Alu::Bor,
        "bxor" => Alu::Bxor,
        "shl" => Alu::Shl,
        "shr" => Alu::Shr,
        _ => return None,
    })
}

fn parse_test(word: &str) -> Option<Test> {
    Some(match word {
        "ife" => Test::Eq,
        "ifn" => Test::Ne,
        "ifl" => Test::Lt,
        "ifle" => Test::Le,
        "ifg" => Test::Gt,
        "ifge" => Test::Ge,
        _ => return None,
    })
}

fn patch_guard(code: &mut [Instr], at: usize, target: usize) {
    match &mut code[at] {
        Instr::Guard { on_false, .. } => *on_false = target,
        _ => panic!("patch target is not a guard"),
    }
}

fn patch_skip(code: &mut [Instr], at: usize, target: usize) {
    match &mut code[at] {
        Instr::Skip { to } => *to = target,
        _ => panic!("patch target is not a skip"),
    }
}

fn patch_loop(code: &mut [Instr], at: usize, target: usize) {
    match &mut code[at] {
        Instr::Loop { exit, .. } => *exit = target,
        _ => panic!("patch target is not a loop head"),
    }
}

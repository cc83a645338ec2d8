//! Heap allocator and collector codegen
//!
//! The target gives us one flat array and nothing else, so heap management
//! is emitted as program text: a fixed block of runtime states every
//! compiled program carries (inline, or split into a linked header). The
//! low region of `mem` is the value stack with globals at the bottom; the
//! high region is the heap, managed in 16-slot pages through two parallel
//! tracking arrays:
//!
//! - `pagestat`: 0 free, 1 allocated, 2 allocated-traceable, 3 pending
//!   collection, 4 pending-traceable
//! - `pageowner`: base address of the owning allocation, 0 when free
//!
//! The runtime states keep their working values in dedicated vars rather
//! than registers, so calling them clobbers nothing beyond `r0`, `r1`, and
//! `rv`. Call sites save their own live argument registers anyway, per the
//! calling convention.

use crate::emit::CodeSink;
use crate::frames::MAX_SAVED_ARGS;

/// Heap granularity in slots.
pub const PAGE_SIZE: u32 = 16;

/// Runtime error code printed when a free lands below the heap base.
pub const ERR_FREE_BELOW_HEAP: i64 = 9001;

/// Name the emitted `linked` line references in split-header mode.
pub const RUNTIME_HEADER_NAME: &str = "skaldrt";

/// Page states in `pagestat`. Pending states are the allocated ones
/// shifted up by two, which is what lets the collector move a whole run
/// between the families with one add or sub.
pub mod page {
    pub const FREE: i64 = 0;
    pub const ALLOC: i64 = 1;
    pub const ALLOC_TRACE: i64 = 2;
    pub const PENDING: i64 = 3;
    pub const PENDING_TRACE: i64 = 4;
}

/// Sizing inputs for the emitted runtime.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub stack_size: u32,
    pub heap_pages: u32,
    /// Program-wide maximum call arity; decides whether the bulk
    /// `pushall`/`popall` states are emitted and how wide they are.
    pub max_args: u8,
}

impl RuntimeConfig {
    /// First heap slot; also the null boundary `gcfree` enforces.
    pub fn heap_base(&self) -> u32 {
        self.stack_size
    }

    pub fn mem_size(&self) -> u32 {
        self.stack_size + self.heap_pages * PAGE_SIZE
    }
}

/// Emit the runtime's own declarations: the page tracking arrays, the
/// heap bounds, and the scratch vars the states compute in.
pub fn render_runtime_decls(sink: &mut CodeSink, cfg: &RuntimeConfig) {
    sink.line(format!("array pagestat {}", cfg.heap_pages));
    sink.line(format!("array pageowner {}", cfg.heap_pages));
    sink.line(format!("var hbase {}", cfg.heap_base()));
    sink.line(format!("var hpages {}", cfg.heap_pages));
    for name in SCRATCH_VARS {
        sink.line(format!("var {name} 0"));
    }
}

const SCRATCH_VARS: &[&str] = &[
    // gcalloc
    "ga_n", "ga_i", "ga_run", "ga_base", "ga_found", "ga_j", "ga_k", "ga_s",
    // gcfree
    "gf_i", "gf_o",
    // gcrealloc
    "gr_old", "gr_n", "gr_i", "gr_o", "gr_p", "gr_s", "gr_new",
    // gccollect
    "gc_p", "gc_a", "gc_addr", "gc_s", "gc_live", "gc_i", "gc_v", "gc_j", "gc_t", "gc_o",
    "gc_k", "gc_e", "gc_m",
    // rt_itoa
    "ri_v", "ri_neg", "ri_t", "ri_len", "ri_i", "ri_d", "ri_done",
    // rt_strcat
    "rs_a", "rs_b", "rs_la", "rs_lb", "rs_n", "rs_s", "rs_d",
];

/// Emit every runtime state.
pub fn render_runtime_states(sink: &mut CodeSink, cfg: &RuntimeConfig) {
    sink.raw(&gcalloc_state());
    sink.raw(&gcfree_state());
    sink.raw(&gcrealloc_state());
    sink.raw(&gccollect_state());
    sink.raw(&register_save_states(cfg.max_args));
    sink.raw(&itoa_state());
    sink.raw(&strcat_state());
}

/// The whole runtime block, declarations first.
pub fn render_runtime(sink: &mut CodeSink, cfg: &RuntimeConfig) {
    render_runtime_decls(sink, cfg);
    render_runtime_states(sink, cfg);
}

/// Allocate `r0` slots, traceable when `r1` is 1; base address in `rv`.
///
/// First-fit scan over whole pages, starting at page 1 so page 0 stays
/// reserved and address 0 means null. Running off the end grows the heap
/// by exactly the pages the current run still lacks.
fn gcalloc_state() -> String {
    r#"state gcalloc {
  set ga_n r0
  add ga_n 15
  div ga_n 16
  ifl ga_n 1 {
    set ga_n 1
  }
  set ga_i 1
  set ga_run 0
  set ga_base 1
  set ga_found 0
  whilen ga_found 1 {
    ifge ga_i hpages {
      set ga_j ga_n
      sub ga_j ga_run
      add ga_j hpages
      set ga_k ga_j
      mul ga_k 16
      add ga_k hbase
      resize mem ga_k
      resize pagestat ga_j
      resize pageowner ga_j
      set hpages ga_j
    }
    geta ga_s pagestat ga_i
    ife ga_s 0 {
      ife ga_run 0 {
        set ga_base ga_i
      }
      add ga_run 1
      ifge ga_run ga_n {
        set ga_found 1
      }
    } else {
      set ga_run 0
    }
    add ga_i 1
  }
  set rv ga_base
  mul rv 16
  add rv hbase
  set ga_s 1
  ife r1 1 {
    set ga_s 2
  }
  set ga_i ga_base
  set ga_j ga_base
  add ga_j ga_n
  whilen ga_i ga_j {
    seta pagestat ga_i ga_s
    seta pageowner ga_i rv
    add ga_i 1
  }
}
"#
    .to_string()
}

/// Release the allocation whose base is in `r0`. A base below the heap is
/// corruption by definition and gets the fatal code printed instead of a
/// sweep.
fn gcfree_state() -> String {
    format!(
        r#"state gcfree {{
  ifl r0 hbase {{
    print {ERR_FREE_BELOW_HEAP}
  }} else {{
    set gf_i 1
    whilen gf_i hpages {{
      geta gf_o pageowner gf_i
      ife gf_o r0 {{
        seta pagestat gf_i 0
        seta pageowner gf_i 0
      }}
      add gf_i 1
    }}
  }}
}}
"#
    )
}

/// Move the allocation in `r0` to a fresh block of `r1` slots; new base in
/// `rv`. Copies forward by the old run's slot count (callers only grow);
/// the traceable tag carries over.
fn gcrealloc_state() -> String {
    r#"state gcrealloc {
  set gr_old r0
  set gr_n 0
  set gr_i 1
  whilen gr_i hpages {
    geta gr_o pageowner gr_i
    ife gr_o gr_old {
      add gr_n 16
    }
    add gr_i 1
  }
  set gr_p gr_old
  sub gr_p hbase
  div gr_p 16
  geta gr_s pagestat gr_p
  set r0 r1
  set r1 0
  ife gr_s 2 {
    set r1 1
  }
  ife gr_s 4 {
    set r1 1
  }
  call gcalloc
  set gr_new rv
  copy mem gr_old gr_new gr_n
  set r0 gr_old
  call gcfree
  set rv gr_new
}
"#
    .to_string()
}

/// One collection pass.
///
/// For each run (a page whose owner equals its own address): live when the
/// base value appears anywhere on the live value stack `0..rsp`, or inside
/// any allocated traceable run other than itself. Unreachable allocated
/// runs move to pending; unreachable pending runs are reclaimed; pending
/// runs found live again are restored. Two-phase so a run never disappears
/// in the same pass that another unswept run still references it from.
fn gccollect_state() -> String {
    r#"state gccollect {
  set gc_p 1
  whilen gc_p hpages {
    geta gc_a pageowner gc_p
    set gc_addr gc_p
    mul gc_addr 16
    add gc_addr hbase
    ife gc_a gc_addr {
      geta gc_s pagestat gc_p
      set gc_live 0
      set gc_i 0
      whilen gc_i rsp {
        geta gc_v mem gc_i
        ife gc_v gc_a {
          set gc_live 1
        }
        add gc_i 1
      }
      ife gc_live 0 {
        set gc_j 1
        whilen gc_j hpages {
          geta gc_t pagestat gc_j
          ife gc_t 2 {
            geta gc_o pageowner gc_j
            ifn gc_o gc_a {
              set gc_k gc_j
              mul gc_k 16
              add gc_k hbase
              set gc_e gc_k
              add gc_e 16
              whilen gc_k gc_e {
                geta gc_v mem gc_k
                ife gc_v gc_a {
                  set gc_live 1
                }
                add gc_k 1
              }
            }
          }
          add gc_j 1
        }
      }
      ife gc_live 0 {
        ifle gc_s 2 {
          set gc_m gc_p
          whilen gc_m hpages {
            geta gc_o pageowner gc_m
            ife gc_o gc_a {
              geta gc_t pagestat gc_m
              add gc_t 2
              seta pagestat gc_m gc_t
            }
            add gc_m 1
          }
        } else {
          set gc_m gc_p
          whilen gc_m hpages {
            geta gc_o pageowner gc_m
            ife gc_o gc_a {
              seta pagestat gc_m 0
              seta pageowner gc_m 0
            }
            add gc_m 1
          }
        }
      } else {
        ifg gc_s 2 {
          set gc_m gc_p
          whilen gc_m hpages {
            geta gc_o pageowner gc_m
            ife gc_o gc_a {
              geta gc_t pagestat gc_m
              sub gc_t 2
              seta pagestat gc_m gc_t
            }
            add gc_m 1
          }
        }
      }
    }
    add gc_p 1
  }
}
"#
    .to_string()
}

/// The single-count register save/restore states, plus the bulk pair when
/// some call site's arity exceeds the single-count range.
fn register_save_states(max_args: u8) -> String {
    let mut out = String::new();
    for n in 1..=MAX_SAVED_ARGS {
        out.push_str(&format!("state pushr{n} {{\n"));
        for r in 0..n {
            out.push_str(&format!("  seta mem rsp r{r}\n  add rsp 1\n"));
        }
        out.push_str("}\n");

        out.push_str(&format!("state popr{n} {{\n"));
        for r in (0..n).rev() {
            out.push_str(&format!("  sub rsp 1\n  geta r{r} mem rsp\n"));
        }
        out.push_str("}\n");
    }
    if max_args > MAX_SAVED_ARGS {
        out.push_str("state pushall {\n");
        for r in 0..max_args {
            out.push_str(&format!("  seta mem rsp r{r}\n  add rsp 1\n"));
        }
        out.push_str("}\n");
        out.push_str("state popall {\n");
        for r in (0..max_args).rev() {
            out.push_str(&format!("  sub rsp 1\n  geta r{r} mem rsp\n"));
        }
        out.push_str("}\n");
    }
    out
}

/// Heap string from the integer in `r0`; pointer in `rv`. Digits are
/// written back to front, minus sign last.
fn itoa_state() -> String {
    r#"state rt_itoa {
  set ri_v r0
  set ri_neg 0
  ifl ri_v 0 {
    set ri_neg 1
    mul ri_v -1
  }
  set ri_len 1
  set ri_t ri_v
  div ri_t 10
  whilen ri_t 0 {
    add ri_len 1
    div ri_t 10
  }
  add ri_len ri_neg
  set r0 ri_len
  add r0 1
  set r1 0
  call gcalloc
  seta mem rv ri_len
  set ri_i rv
  add ri_i ri_len
  set ri_t ri_v
  set ri_done 0
  whilen ri_done 1 {
    set ri_d ri_t
    mod ri_d 10
    add ri_d 48
    seta mem ri_i ri_d
    sub ri_i 1
    div ri_t 10
    ife ri_t 0 {
      set ri_done 1
    }
  }
  ife ri_neg 1 {
    seta mem ri_i 45
  }
}
"#
    .to_string()
}

/// Concatenation of the heap strings in `r0` and `r1`; result in `rv`.
fn strcat_state() -> String {
    r#"state rt_strcat {
  set rs_a r0
  set rs_b r1
  geta rs_la mem rs_a
  geta rs_lb mem rs_b
  set rs_n rs_la
  add rs_n rs_lb
  set r0 rs_n
  add r0 1
  set r1 0
  call gcalloc
  seta mem rv rs_n
  set rs_s rs_a
  add rs_s 1
  set rs_d rv
  add rs_d 1
  copy mem rs_s rs_d rs_la
  set rs_s rs_b
  add rs_s 1
  add rs_d rs_la
  copy mem rs_s rs_d rs_lb
}
"#
    .to_string()
}

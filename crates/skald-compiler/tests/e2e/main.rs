//! End-to-end scenarios: compile a source tree, then execute the emitted
//! text on a reference machine modeling the target VM's cell space,
//! arrays, and state dispatch. Tests here assert on final memory and the
//! engine event log, not on the shape of the generated code.

mod arith;
mod classes;
mod control;
mod harness;
mod heap;
mod machine;
mod natives;
mod strings;

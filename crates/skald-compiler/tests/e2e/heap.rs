//! Allocator and collector scenarios, observed through final page tables
//! and block contents. Default geometry: a 1024-cell stack, 16-slot pages,
//! page 0 reserved, so the first block lands at 1040.

use skald_ast::build;
use skald_compiler::CompileOptions;

use super::harness::*;

/// Page index of a heap address under the default stack size.
fn page(addr: i64) -> i64 {
    (addr - 1024) / 16
}

#[test]
fn test_first_allocation_skips_the_reserved_page() {
    let r = run(vec![build::let_(
        "a",
        None,
        Some(build::call("alloc", vec![build::int(4)])),
    )]);
    assert_eq!(r.slot("a"), 1040);
    assert_eq!(r.vm.array_value("pagestat", 0), 0);
}

#[test]
fn test_allocations_advance_by_whole_pages() {
    let r = run(vec![
        build::let_("a", None, Some(build::call("alloc", vec![build::int(1)]))),
        build::let_("b", None, Some(build::call("alloc", vec![build::int(1)]))),
    ]);
    assert_eq!(r.slot("b") - r.slot("a"), 16);
}

#[test]
fn test_freed_pages_are_reused_first_fit() {
    let r = run(vec![
        build::let_("p", None, Some(build::call("alloc", vec![build::int(20)]))),
        build::expr(build::call("free", vec![build::ident("p")])),
        build::let_("q", None, Some(build::call("alloc", vec![build::int(20)]))),
    ]);
    assert_eq!(r.slot("q"), r.slot("p"));
}

#[test]
fn test_free_below_the_heap_reports_and_clears_nothing() {
    let r = run(vec![
        build::let_("p", None, Some(build::int(5))),
        build::expr(build::call("free", vec![build::ident("p")])),
    ]);
    assert!(r.vm.prints.contains(&9001), "{:?}", r.vm.prints);
    assert_eq!(r.vm.allocated_pages(), 0);
}

#[test]
fn test_realloc_moves_the_block_and_preserves_contents() {
    let r = run(vec![
        build::let_(
            "a",
            None,
            Some(build::array(vec![build::int(7), build::int(8), build::int(9)])),
        ),
        build::let_(
            "b",
            None,
            Some(build::call(
                "realloc",
                vec![build::ident("a"), build::int(40)],
            )),
        ),
    ]);
    let (a, b) = (r.slot("a"), r.slot("b"));
    // the new block is claimed while the old one still holds its pages
    assert_eq!(b, a + 16);
    assert_eq!(r.vm.mem(b), 3);
    assert_eq!(r.vm.mem(b + 1), 7);
    assert_eq!(r.vm.mem(b + 2), 8);
    assert_eq!(r.vm.mem(b + 3), 9);
    // old page released, three pages now backing the grown block
    assert_eq!(r.vm.array_value("pagestat", page(a)), 0);
    assert_eq!(r.vm.allocated_pages(), 3);
}

#[test]
fn test_heap_grows_by_the_missing_pages() {
    let r = run_with(
        CompileOptions::default().heap_pages(2),
        vec![build::let_(
            "a",
            None,
            Some(build::call("alloc", vec![build::int(40)])),
        )],
    );
    assert_eq!(r.slot("a"), 1040);
    assert_eq!(r.vm.cell("hpages"), 4);
    assert_eq!(r.vm.array_len("mem"), 1024 + 4 * 16);
    assert_eq!(r.vm.allocated_pages(), 3);
}

#[test]
fn test_collector_keeps_indirectly_reachable_blocks() {
    let r = run(vec![
        build::let_("outer", None, Some(build::array(vec![build::int(0)]))),
        build::expr(build::assign(
            build::index(build::ident("outer"), build::int(0)),
            build::array(vec![build::int(42)]),
        )),
        build::expr(build::call("collect", vec![])),
    ]);
    let outer = r.slot("outer");
    let inner = r.vm.mem(outer + 1);
    assert_ne!(inner, 0);
    assert_eq!(r.vm.mem(inner + 1), 42, "inner block survived the pass");
    assert_eq!(r.vm.array_value("pagestat", page(inner)), 2);
    assert_eq!(r.vm.array_value("pagestat", page(outer)), 2);
}

#[test]
fn test_unreachable_blocks_take_two_passes_to_free() {
    // one pass parks the page in the pending family
    let one = run(vec![
        build::let_("junk", None, Some(build::array(vec![build::int(9)]))),
        build::expr(build::assign(build::ident("junk"), build::int(0))),
        build::expr(build::call("collect", vec![])),
    ]);
    assert_eq!(one.vm.array_value("pagestat", 1), 4);

    // a second pass with the page still unreferenced releases it
    let two = run(vec![
        build::let_("junk", None, Some(build::array(vec![build::int(9)]))),
        build::expr(build::assign(build::ident("junk"), build::int(0))),
        build::expr(build::call("collect", vec![])),
        build::expr(build::call("collect", vec![])),
    ]);
    assert_eq!(two.vm.array_value("pagestat", 1), 0);
    assert_eq!(two.vm.array_value("pageowner", 1), 0);
}

#[test]
fn test_pending_page_revives_when_a_reference_reappears() {
    let r = run(vec![
        build::let_("junk", None, Some(build::array(vec![build::int(9)]))),
        build::expr(build::assign(build::ident("junk"), build::int(0))),
        build::expr(build::call("collect", vec![])),
        // the block's base address under default geometry
        build::expr(build::assign(build::ident("junk"), build::int(1040))),
        build::expr(build::call("collect", vec![])),
    ]);
    assert_eq!(r.vm.array_value("pagestat", 1), 2);
    assert_eq!(r.vm.mem(1040 + 1), 9, "contents rode out the pending pass");
}

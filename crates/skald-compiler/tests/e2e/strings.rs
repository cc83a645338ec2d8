//! Heap string scenarios: literal materialization, concatenation with
//! number formatting, and length reads.

use skald_ast::{build, UnaryOperator};

use super::harness::*;

#[test]
fn test_literal_lands_on_the_heap_with_a_length_header() {
    let r = run(vec![build::let_("s", None, Some(build::string("abc")))]);
    assert_eq!(r.string("s"), "abc");
    let base = r.slot("s");
    assert_eq!(r.vm.mem(base), 3);
    // past the value stack, never in page zero
    assert!(base >= 1024 + 16, "base {base}");
}

#[test]
fn test_number_glued_to_a_string_formats_it() {
    let r = run(vec![build::let_(
        "s",
        None,
        Some(build::bin_add(build::string("a"), build::int(1))),
    )]);
    assert_eq!(r.string("s"), "a1");
    assert_eq!(r.vm.mem(r.slot("s")), 2);
}

#[test]
fn test_concatenation_of_two_literals() {
    expect_string(
        vec![build::let_(
            "s",
            None,
            Some(build::bin_add(build::string("ab"), build::string("cd"))),
        )],
        "s",
        "abcd",
    );
}

#[test]
fn test_number_on_the_left_coerces_too() {
    expect_string(
        vec![build::let_(
            "s",
            None,
            Some(build::bin_add(build::int(7), build::string("x"))),
        )],
        "s",
        "7x",
    );
}

#[test]
fn test_zero_and_negative_numbers_format() {
    let r = run(vec![
        build::let_(
            "z",
            None,
            Some(build::bin_add(build::string(""), build::int(0))),
        ),
        build::let_("n", None, Some(build::unary(UnaryOperator::Minus, build::int(42)))),
        build::let_(
            "v",
            None,
            Some(build::bin_add(build::string("v"), build::ident("n"))),
        ),
    ]);
    assert_eq!(r.string("z"), "0");
    assert_eq!(r.string("v"), "v-42");
}

#[test]
fn test_chained_concatenation() {
    expect_string(
        vec![build::let_(
            "s",
            None,
            Some(build::bin_add(
                build::bin_add(build::string("a"), build::int(1)),
                build::string("b"),
            )),
        )],
        "s",
        "a1b",
    );
}

#[test]
fn test_concatenation_through_variables() {
    let r = run(vec![
        build::let_("s", None, Some(build::string("ab"))),
        build::let_("t", None, Some(build::string("cd"))),
        build::let_(
            "u",
            None,
            Some(build::bin_add(build::ident("s"), build::ident("t"))),
        ),
    ]);
    assert_eq!(r.string("u"), "abcd");
}

#[test]
fn test_length_reads_the_header() {
    expect_slot(
        vec![
            build::let_("s", None, Some(build::string("abcd"))),
            build::let_(
                "n",
                None,
                Some(build::call_expr(
                    build::member(build::ident("s"), "len"),
                    vec![],
                )),
            ),
        ],
        "n",
        4,
    );
}

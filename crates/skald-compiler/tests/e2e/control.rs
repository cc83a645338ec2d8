//! Control-flow scenarios: branch selection, loop exits, short-circuit
//! conditions, and switch dispatch with C-style fallthrough.

use skald_ast::{build, BinaryOperator, LogicalOperator, Statement, UnaryOperator};

use super::harness::*;

fn set(name: &str, value: i64) -> Statement {
    build::expr(build::assign(build::ident(name), build::int(value)))
}

fn add_to(name: &str, amount: skald_ast::Expression) -> Statement {
    build::expr(build::assign_op(
        skald_ast::AssignmentOperator::AddAssign,
        build::ident(name),
        amount,
    ))
}

#[test]
fn test_if_takes_the_matching_arm() {
    let pick = |a: i64| {
        vec![
            build::let_("a", None, Some(build::int(a))),
            build::let_("x", None, Some(build::int(0))),
            build::if_else(
                build::bin(BinaryOperator::LessThan, build::ident("a"), build::int(10)),
                vec![set("x", 1)],
                vec![build::if_else(
                    build::bin(BinaryOperator::Equal, build::ident("a"), build::int(10)),
                    vec![set("x", 2)],
                    vec![set("x", 3)],
                )],
            ),
        ]
    };
    expect_slot(pick(5), "x", 1);
    expect_slot(pick(10), "x", 2);
    expect_slot(pick(11), "x", 3);
}

#[test]
fn test_false_head_condition_skips_the_loop_entirely() {
    expect_slot(
        vec![
            build::let_("x", None, Some(build::int(0))),
            build::while_(
                build::bin(BinaryOperator::GreaterThan, build::ident("x"), build::int(5)),
                vec![set("x", 99)],
            ),
        ],
        "x",
        0,
    );
}

#[test]
fn test_while_accumulates() {
    expect_slot(
        vec![
            build::let_("sum", None, Some(build::int(0))),
            build::let_("i", None, Some(build::int(1))),
            build::while_(
                build::bin(BinaryOperator::LessEqual, build::ident("i"), build::int(10)),
                vec![
                    add_to("sum", build::ident("i")),
                    add_to("i", build::int(1)),
                ],
            ),
        ],
        "sum",
        55,
    );
}

#[test]
fn test_nested_loops_run_the_full_grid() {
    expect_slot(
        vec![
            build::let_("total", None, Some(build::int(0))),
            build::let_("i", None, Some(build::int(0))),
            build::while_(
                build::bin(BinaryOperator::LessThan, build::ident("i"), build::int(3)),
                vec![
                    build::let_("j", None, Some(build::int(0))),
                    build::while_(
                        build::bin(
                            BinaryOperator::LessThan,
                            build::ident("j"),
                            build::int(4),
                        ),
                        vec![add_to("total", build::int(1)), add_to("j", build::int(1))],
                    ),
                    add_to("i", build::int(1)),
                ],
            ),
        ],
        "total",
        12,
    );
}

#[test]
fn test_break_stops_the_loop_and_skips_the_rest_of_the_pass() {
    let r = run(vec![
        build::let_("i", None, Some(build::int(0))),
        build::let_("j", None, Some(build::int(0))),
        build::while_(
            build::bin(BinaryOperator::LessThan, build::ident("i"), build::int(10)),
            vec![
                add_to("i", build::int(1)),
                build::if_(
                    build::bin(BinaryOperator::Equal, build::ident("i"), build::int(3)),
                    vec![build::brk()],
                ),
                add_to("j", build::int(1)),
            ],
        ),
    ]);
    assert_eq!(r.slot("i"), 3);
    // the pass that broke never reached the tail of the body
    assert_eq!(r.slot("j"), 2);
}

#[test]
fn test_truthiness_of_names_and_calls() {
    let r = run(vec![
        build::let_("flag", None, Some(build::int(1))),
        build::let_("off", None, Some(build::int(0))),
        build::let_("x", None, Some(build::int(0))),
        build::let_("y", None, Some(build::int(0))),
        build::let_("z", None, Some(build::int(0))),
        build::func(
            "armed",
            vec![],
            Some(build::ty_number()),
            vec![build::ret(Some(build::int(5)))],
        ),
        build::if_(build::ident("flag"), vec![set("x", 1)]),
        build::if_(build::ident("off"), vec![set("y", 1)]),
        build::if_(build::call("armed", vec![]), vec![set("z", 1)]),
    ]);
    assert_eq!(r.slot("x"), 1);
    assert_eq!(r.slot("y"), 0);
    assert_eq!(r.slot("z"), 1);
}

#[test]
fn test_negated_or_is_true_only_when_both_are_clear() {
    let neither = |a: i64, b: i64| {
        vec![
            build::let_("a", None, Some(build::int(a))),
            build::let_("b", None, Some(build::int(b))),
            build::let_("x", None, Some(build::int(0))),
            build::if_(
                build::unary(
                    UnaryOperator::Not,
                    build::logic(LogicalOperator::Or, build::ident("a"), build::ident("b")),
                ),
                vec![set("x", 9)],
            ),
        ]
    };
    expect_slot(neither(0, 0), "x", 9);
    expect_slot(neither(1, 0), "x", 0);
    expect_slot(neither(0, 1), "x", 0);
}

#[test]
fn test_and_short_circuits_the_right_side() {
    let probe = |a: i64| {
        vec![
            build::let_("side", None, Some(build::int(0))),
            build::let_("a", None, Some(build::int(a))),
            build::let_("x", None, Some(build::int(0))),
            build::func(
                "touch",
                vec![],
                Some(build::ty_number()),
                vec![
                    build::expr(build::assign(
                        build::ident("side"),
                        build::bin_add(build::ident("side"), build::int(1)),
                    )),
                    build::ret(Some(build::int(1))),
                ],
            ),
            build::if_(
                build::logic(
                    LogicalOperator::And,
                    build::bin(
                        BinaryOperator::GreaterEqual,
                        build::ident("a"),
                        build::int(1),
                    ),
                    build::bin(
                        BinaryOperator::GreaterThan,
                        build::call("touch", vec![]),
                        build::int(0),
                    ),
                ),
                vec![set("x", 1)],
            ),
        ]
    };
    let held = run(probe(0));
    assert_eq!(held.slot("side"), 0, "right side must not evaluate");
    assert_eq!(held.slot("x"), 0);

    let taken = run(probe(1));
    assert_eq!(taken.slot("side"), 1);
    assert_eq!(taken.slot("x"), 1);
}

#[test]
fn test_switch_selects_the_matching_case() {
    let select = |s: i64| {
        vec![
            build::let_("s", None, Some(build::int(s))),
            build::let_("r", None, Some(build::int(0))),
            build::switch(
                build::ident("s"),
                vec![
                    (Some(build::int(1)), vec![set("r", 10), build::brk()]),
                    (Some(build::int(2)), vec![set("r", 20), build::brk()]),
                    (Some(build::int(3)), vec![set("r", 30), build::brk()]),
                ],
            ),
        ]
    };
    expect_slot(select(2), "r", 20);
    expect_slot(select(3), "r", 30);
    expect_slot(select(9), "r", 0);
}

#[test]
fn test_switch_falls_through_without_break() {
    expect_slot(
        vec![
            build::let_("r", None, Some(build::int(0))),
            build::switch(
                build::int(1),
                vec![
                    (Some(build::int(1)), vec![add_to("r", build::int(1))]),
                    (
                        Some(build::int(2)),
                        vec![add_to("r", build::int(10)), build::brk()],
                    ),
                    (Some(build::int(3)), vec![add_to("r", build::int(100))]),
                ],
            ),
        ],
        "r",
        11,
    );
}

#[test]
fn test_switch_default_runs_when_nothing_matches() {
    expect_slot(
        vec![
            build::let_("a", None, Some(build::int(0))),
            build::switch(
                build::int(99),
                vec![
                    (Some(build::int(1)), vec![set("a", 1), build::brk()]),
                    (Some(build::int(2)), vec![set("a", 2), build::brk()]),
                    (None, vec![set("a", 7)]),
                ],
            ),
        ],
        "a",
        7,
    );
    // a mid-list default falls through to the case below it
    expect_slot(
        vec![
            build::let_("a", None, Some(build::int(0))),
            build::switch(
                build::int(99),
                vec![
                    (Some(build::int(1)), vec![add_to("a", build::int(1))]),
                    (None, vec![add_to("a", build::int(10))]),
                    (Some(build::int(3)), vec![add_to("a", build::int(100))]),
                ],
            ),
        ],
        "a",
        110,
    );
}

#[test]
fn test_switch_case_tests_evaluate_at_runtime() {
    expect_slot(
        vec![
            build::let_("lo", None, Some(build::int(5))),
            build::let_("r", None, Some(build::int(0))),
            build::switch(
                build::int(5),
                vec![
                    (Some(build::ident("lo")), vec![set("r", 1), build::brk()]),
                    (Some(build::int(6)), vec![set("r", 2), build::brk()]),
                ],
            ),
        ],
        "r",
        1,
    );
}

#[test]
fn test_break_binds_to_the_innermost_construct() {
    // the inner break leaves the while; the trailing break leaves the switch
    let r = run(vec![
        build::let_("i", None, Some(build::int(0))),
        build::let_("after", None, Some(build::int(0))),
        build::let_("other", None, Some(build::int(0))),
        build::switch(
            build::int(1),
            vec![
                (
                    Some(build::int(1)),
                    vec![
                        build::while_(
                            build::bin(
                                BinaryOperator::LessThan,
                                build::ident("i"),
                                build::int(10),
                            ),
                            vec![
                                add_to("i", build::int(1)),
                                build::if_(
                                    build::bin(
                                        BinaryOperator::Equal,
                                        build::ident("i"),
                                        build::int(2),
                                    ),
                                    vec![build::brk()],
                                ),
                            ],
                        ),
                        set("after", 1),
                        build::brk(),
                    ],
                ),
                (Some(build::int(2)), vec![set("other", 1)]),
            ],
        ),
    ]);
    assert_eq!(r.slot("i"), 2);
    assert_eq!(r.slot("after"), 1);
    assert_eq!(r.slot("other"), 0);
}

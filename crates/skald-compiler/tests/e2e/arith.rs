//! Arithmetic scenarios: evaluation order through nested temporaries, the
//! target's division and shift edges, and compound assignment.

use skald_ast::{build, AssignmentOperator, BinaryOperator, UnaryOperator};

use super::harness::*;

#[test]
fn test_constant_tree_and_runtime_tree_agree() {
    // 2 + 3 * 4, once foldable and once through variables.
    expect_slot(
        vec![build::let_(
            "x",
            None,
            Some(build::bin_add(
                build::int(2),
                build::bin(BinaryOperator::Multiply, build::int(3), build::int(4)),
            )),
        )],
        "x",
        14,
    );
    expect_slot(
        vec![
            build::let_("a", None, Some(build::int(2))),
            build::let_("b", None, Some(build::int(3))),
            build::let_("c", None, Some(build::int(4))),
            build::let_(
                "x",
                None,
                Some(build::bin_add(
                    build::ident("a"),
                    build::bin(
                        BinaryOperator::Multiply,
                        build::ident("b"),
                        build::ident("c"),
                    ),
                )),
            ),
        ],
        "x",
        14,
    );
}

#[test]
fn test_deep_nesting_survives_temporary_spills() {
    // a * (b + (c * (d + e))) forces the temporary through the stack.
    expect_slot(
        vec![
            build::let_("a", None, Some(build::int(2))),
            build::let_("b", None, Some(build::int(3))),
            build::let_("c", None, Some(build::int(5))),
            build::let_("d", None, Some(build::int(7))),
            build::let_("e", None, Some(build::int(11))),
            build::let_(
                "x",
                None,
                Some(build::bin(
                    BinaryOperator::Multiply,
                    build::ident("a"),
                    build::bin_add(
                        build::ident("b"),
                        build::bin(
                            BinaryOperator::Multiply,
                            build::ident("c"),
                            build::bin_add(build::ident("d"), build::ident("e")),
                        ),
                    ),
                )),
            ),
        ],
        "x",
        186,
    );
}

#[test]
fn test_division_and_modulo_by_zero_read_as_zero() {
    let r = run(vec![
        build::let_("d", None, Some(build::int(0))),
        build::let_(
            "q",
            None,
            Some(build::bin(
                BinaryOperator::Divide,
                build::int(10),
                build::ident("d"),
            )),
        ),
        build::let_(
            "m",
            None,
            Some(build::bin(
                BinaryOperator::Modulo,
                build::int(10),
                build::ident("d"),
            )),
        ),
        // folded at compile time, same answer
        build::let_(
            "f",
            None,
            Some(build::bin(
                BinaryOperator::Divide,
                build::int(10),
                build::int(0),
            )),
        ),
    ]);
    assert_eq!(r.slot("q"), 0);
    assert_eq!(r.slot("m"), 0);
    assert_eq!(r.slot("f"), 0);
}

#[test]
fn test_unary_minus_negates() {
    expect_slot(
        vec![
            build::let_("a", None, Some(build::int(5))),
            build::let_(
                "x",
                None,
                Some(build::bin_add(
                    build::unary(UnaryOperator::Minus, build::ident("a")),
                    build::int(12),
                )),
            ),
        ],
        "x",
        7,
    );
}

#[test]
fn test_bitwise_operators() {
    let r = run(vec![
        build::let_("a", None, Some(build::int(12))),
        build::let_("b", None, Some(build::int(10))),
        build::let_(
            "and_",
            None,
            Some(build::bin(
                BinaryOperator::BitwiseAnd,
                build::ident("a"),
                build::ident("b"),
            )),
        ),
        build::let_(
            "or_",
            None,
            Some(build::bin(
                BinaryOperator::BitwiseOr,
                build::ident("a"),
                build::ident("b"),
            )),
        ),
        build::let_(
            "xor_",
            None,
            Some(build::bin(
                BinaryOperator::BitwiseXor,
                build::ident("a"),
                build::ident("b"),
            )),
        ),
    ]);
    assert_eq!(r.slot("and_"), 8);
    assert_eq!(r.slot("or_"), 14);
    assert_eq!(r.slot("xor_"), 6);
}

#[test]
fn test_shifts_and_the_oversized_shift_edge() {
    let r = run(vec![
        build::let_("v", None, Some(build::int(3))),
        build::let_("s", None, Some(build::int(70))),
        build::let_(
            "left",
            None,
            Some(build::bin(
                BinaryOperator::LeftShift,
                build::ident("v"),
                build::int(4),
            )),
        ),
        build::let_(
            "right",
            None,
            Some(build::bin(
                BinaryOperator::RightShift,
                build::int(48),
                build::int(2),
            )),
        ),
        // a shift count past the cell width collapses to zero
        build::let_(
            "wide",
            None,
            Some(build::bin(
                BinaryOperator::LeftShift,
                build::ident("v"),
                build::ident("s"),
            )),
        ),
    ]);
    assert_eq!(r.slot("left"), 48);
    assert_eq!(r.slot("right"), 12);
    assert_eq!(r.slot("wide"), 0);
}

#[test]
fn test_compound_assignments_update_in_place() {
    let r = run(vec![
        build::let_("x", None, Some(build::int(10))),
        build::expr(build::assign_op(
            AssignmentOperator::AddAssign,
            build::ident("x"),
            build::int(5),
        )),
        build::expr(build::assign_op(
            AssignmentOperator::MulAssign,
            build::ident("x"),
            build::int(3),
        )),
        build::expr(build::assign_op(
            AssignmentOperator::SubAssign,
            build::ident("x"),
            build::int(1),
        )),
        build::expr(build::assign_op(
            AssignmentOperator::DivAssign,
            build::ident("x"),
            build::int(4),
        )),
        build::expr(build::assign_op(
            AssignmentOperator::ModAssign,
            build::ident("x"),
            build::int(7),
        )),
    ]);
    assert_eq!(r.slot("x"), 4);
}

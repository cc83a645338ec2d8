//! Class scenarios: field layout through literals and methods, enums,
//! metadata rows with their startup-readable labels, readonly enforcement,
//! and handler-driven instance wiring.

use skald_ast::{build, BinaryOperator};
use skald_compiler::Category;

use super::harness::*;

#[test]
fn test_object_literal_layout_and_method_reads() {
    let r = run(vec![
        build::class(
            "Vec2",
            vec![
                build::field("x", build::ty_number(), None),
                build::field("y", build::ty_number(), None),
                build::method(
                    "dot",
                    vec![("ox", build::ty_number()), ("oy", build::ty_number())],
                    Some(build::ty_number()),
                    vec![build::ret(Some(build::bin_add(
                        build::bin(
                            BinaryOperator::Multiply,
                            build::member(build::ident("this"), "x"),
                            build::ident("ox"),
                        ),
                        build::bin(
                            BinaryOperator::Multiply,
                            build::member(build::ident("this"), "y"),
                            build::ident("oy"),
                        ),
                    )))],
                ),
            ],
        ),
        build::let_(
            "v",
            Some(build::ty("Vec2")),
            Some(build::object(vec![
                ("x", build::int(3)),
                ("y", build::int(4)),
            ])),
        ),
        build::let_("vx", None, Some(build::member(build::ident("v"), "x"))),
        build::let_(
            "d",
            None,
            Some(build::call_expr(
                build::member(build::ident("v"), "dot"),
                vec![build::int(10), build::int(100)],
            )),
        ),
    ]);
    assert_eq!(r.slot("vx"), 3);
    assert_eq!(r.slot("d"), 430);
    // fields sit at consecutive block offsets in declaration order
    let base = r.slot("v");
    assert_eq!(r.vm.mem(base), 3);
    assert_eq!(r.vm.mem(base + 1), 4);
}

#[test]
fn test_method_mutates_its_instance() {
    expect_slot(
        vec![
            build::class(
                "Counter",
                vec![
                    build::field("n", build::ty_number(), Some(build::int(0))),
                    build::method(
                        "bump",
                        vec![],
                        None,
                        vec![build::expr(build::assign(
                            build::member(build::ident("this"), "n"),
                            build::bin_add(
                                build::member(build::ident("this"), "n"),
                                build::int(1),
                            ),
                        ))],
                    ),
                ],
            ),
            build::let_(
                "c",
                Some(build::ty("Counter")),
                Some(build::object(vec![("n", build::int(0))])),
            ),
            build::expr(build::call_expr(
                build::member(build::ident("c"), "bump"),
                vec![],
            )),
            build::expr(build::call_expr(
                build::member(build::ident("c"), "bump"),
                vec![],
            )),
            build::let_("got", None, Some(build::member(build::ident("c"), "n"))),
        ],
        "got",
        2,
    );
}

#[test]
fn test_enum_values_count_up_from_the_last_explicit() {
    let r = run(vec![
        build::enum_(
            "Mode",
            vec![("Idle", None), ("Armed", Some(5)), ("Firing", None)],
        ),
        build::let_("a", None, Some(build::member(build::ident("Mode"), "Idle"))),
        build::let_("b", None, Some(build::member(build::ident("Mode"), "Armed"))),
        build::let_("c", None, Some(build::member(build::ident("Mode"), "Firing"))),
        build::let_(
            "s",
            None,
            Some(build::bin_add(
                build::member(build::ident("Mode"), "Armed"),
                build::member(build::ident("Mode"), "Firing"),
            )),
        ),
    ]);
    assert_eq!(r.slot("a"), 0);
    assert_eq!(r.slot("b"), 5);
    assert_eq!(r.slot("c"), 6);
    assert_eq!(r.slot("s"), 11);
}

#[test]
fn test_metadata_rows_and_startup_labels() {
    let r = run(vec![
        build::class(
            "Turret",
            vec![
                build::action_row("idle", vec![0, 5, 1]),
                build::move_row("still", vec![0, 0]),
                build::ai_row("hunt", "idle", "still", 3),
                build::ctor(vec![
                    build::int(2300),
                    build::int(1),
                    build::int(100),
                    build::ident("idle"),
                    build::ident("still"),
                ]),
            ],
        ),
        build::let_(
            "a",
            None,
            Some(build::member(build::ident("Turret"), "idle")),
        ),
    ]);
    let rows = r.vm.rows();
    assert!(rows.contains(&"action Turret_idle 0 5 1".to_string()), "{rows:?}");
    assert!(rows.contains(&"move Turret_still 0 0".to_string()), "{rows:?}");
    assert!(
        rows.contains(&"ai Turret_hunt Turret_idle Turret_still 3".to_string()),
        "{rows:?}"
    );
    assert!(
        rows.contains(&"entity Turret 2300 1 100 Turret_idle Turret_still".to_string()),
        "{rows:?}"
    );
    // the row is readable as a value: startup loaded its label
    assert_eq!(r.slot("a"), r.vm.label("Turret_idle").unwrap());
}

#[test]
fn test_readonly_field_write_reports_and_leaves_the_field_alone() {
    let program = compile(vec![
        build::class(
            "Probe",
            vec![
                build::field_ro("id", build::ty_number(), Some(build::int(7))),
                build::method(
                    "reset",
                    vec![],
                    None,
                    vec![build::expr(build::assign(
                        build::member(build::ident("this"), "id"),
                        build::int(0),
                    ))],
                ),
            ],
        ),
        build::let_(
            "p",
            Some(build::ty("Probe")),
            Some(build::object(vec![("id", build::int(7))])),
        ),
        build::expr(build::call_expr(
            build::member(build::ident("p"), "reset"),
            vec![],
        )),
        build::let_("got", None, Some(build::member(build::ident("p"), "id"))),
    ]);
    assert!(program.has_errors());
    let readonly = program
        .reports
        .iter()
        .flat_map(|r| &r.diagnostics)
        .filter(|d| d.category == Category::ReadOnlyViolation)
        .count();
    assert_eq!(readonly, 1);

    // the emitted code is still complete and runs; the write is a no-op
    let mut r = boot(program);
    r.vm.run_main();
    assert_eq!(r.slot("got"), 7);
}

#[test]
fn test_handler_allocates_the_instance_once_and_wires_defaults() {
    let mut r = run(vec![build::class(
        "Turret",
        vec![
            build::field("heat", build::ty_number(), Some(build::int(250))),
            build::field("armor", build::ty_number(), Some(build::int(60))),
            build::ctor(vec![build::int(2300), build::int(1), build::int(100)]),
            build::handler(
                "spawn",
                vec![build::expr(build::assign(
                    build::member(build::ident("this"), "heat"),
                    build::int(1000),
                ))],
            ),
        ],
    )]);
    assert!(r
        .vm
        .rows()
        .contains(&"handler Turret spawn Turret_on_spawn".to_string()));

    r.vm.dispatch("Turret", "spawn", 3);
    let base = r.vm.array_value("instmap", 3);
    assert_ne!(base, 0, "first event must allocate the instance");
    assert_eq!(r.vm.mem(base), 1000, "handler body runs after the defaults");
    assert_eq!(r.vm.mem(base + 1), 60, "untouched field keeps its default");

    // a second event reuses the block
    let pages = r.vm.allocated_pages();
    r.vm.dispatch("Turret", "spawn", 3);
    assert_eq!(r.vm.array_value("instmap", 3), base);
    assert_eq!(r.vm.allocated_pages(), pages);
}

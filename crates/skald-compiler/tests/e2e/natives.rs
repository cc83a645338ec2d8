//! Catalog intrinsic scenarios: engine effects in order, spawn result
//! capture around callbacks, collection field access, the re-based
//! sector wall subscript, and the raw-code escape hatch that outranks
//! the binding table.

use skald_ast::{build, BinaryOperator};
use skald_compiler::Category;

use super::harness::*;

#[test]
fn test_out_prints_constants_and_variables() {
    let r = run(vec![
        build::expr(build::call("out", vec![build::int(7)])),
        build::let_("x", None, Some(build::int(42))),
        build::expr(build::call("out", vec![build::ident("x")])),
    ]);
    assert_eq!(r.vm.prints, vec![7, 42]);
}

#[test]
fn test_display_shows_the_interned_quote() {
    let r = run(vec![build::expr(build::call(
        "display",
        vec![build::string("hi there")],
    ))]);
    assert!(
        r.vm.events.contains(&"display hi there".to_string()),
        "{:?}",
        r.vm.events
    );
}

#[test]
fn test_effect_ops_log_in_program_order() {
    let r = run(vec![
        build::expr(build::call("sound", vec![build::int(42)])),
        build::expr(build::call("wait", vec![build::int(3)])),
    ]);
    assert_eq!(r.vm.events, vec!["sound 42", "wait 3"]);
}

#[test]
fn test_spawn_captures_the_result_before_the_callback() {
    let r = run(vec![
        build::let_(
            "a",
            None,
            Some(build::call(
                "spawn",
                vec![
                    build::int(2120),
                    build::callback(vec![build::expr(build::call(
                        "sound",
                        vec![build::int(1)],
                    ))]),
                ],
            )),
        ),
        build::let_("b", None, Some(build::call("spawn", vec![build::int(64)]))),
    ]);
    assert_eq!(r.slot("a"), 5000);
    assert_eq!(r.slot("b"), 5001);
    // a spawn inside the callback window cannot clobber the captured result
    assert_eq!(r.vm.events, vec!["spawn 2120", "sound 1", "spawn 64"]);
}

#[test]
fn test_rand_applies_the_bound() {
    let r = run(vec![
        build::let_("x", None, Some(build::call("rand", vec![build::int(4)]))),
        build::let_("y", None, Some(build::call("rand", vec![]))),
    ]);
    assert_eq!(r.slot("x"), 3);
    assert_eq!(r.slot("y"), 7);

    let seeded = run_seeded(
        |vm| vm.rand_value = 10,
        vec![build::let_(
            "x",
            None,
            Some(build::call("rand", vec![build::int(4)])),
        )],
    );
    assert_eq!(seeded.slot("x"), 2);
}

#[test]
fn test_actor_fields_read_and_write_the_tables() {
    let r = run_seeded(
        |vm| vm.poke("actor_hp", 2, 55),
        vec![
            build::let_(
                "hp",
                None,
                Some(build::member(
                    build::index(build::ident("actors"), build::int(2)),
                    "hp",
                )),
            ),
            build::expr(build::assign(
                build::member(build::index(build::ident("actors"), build::int(2)), "hp"),
                build::bin_add(build::ident("hp"), build::int(5)),
            )),
        ],
    );
    assert_eq!(r.slot("hp"), 55);
    assert_eq!(r.vm.array_value("actor_hp", 2), 60);
}

#[test]
fn test_native_readonly_field_rejects_writes() {
    let program = compile(vec![build::expr(build::assign(
        build::member(build::index(build::ident("actors"), build::int(1)), "tag"),
        build::int(5),
    ))]);
    assert!(program.has_errors());
    let readonly = program
        .reports
        .iter()
        .flat_map(|r| &r.diagnostics)
        .filter(|d| d.category == Category::ReadOnlyViolation)
        .count();
    assert_eq!(readonly, 1);
}

#[test]
fn test_actor_world_effects_carry_the_entity_index() {
    let r = run(vec![
        build::expr(build::call_expr(
            build::member(build::index(build::ident("actors"), build::int(3)), "hurt"),
            vec![build::int(25)],
        )),
        build::expr(build::call_expr(
            build::member(build::index(build::ident("actors"), build::int(0)), "kill"),
            vec![],
        )),
    ]);
    assert_eq!(r.vm.events, vec!["damage 3 25", "kill 0"]);
}

#[test]
fn test_dist_measures_between_entities() {
    let r = run_seeded(
        |vm| {
            vm.poke("actor_x", 4, 3);
            vm.poke("actor_y", 4, 4);
        },
        vec![
            build::let_(
                "h",
                None,
                Some(build::index(build::ident("actors"), build::int(4))),
            ),
            build::let_(
                "d",
                None,
                Some(build::call_expr(
                    build::member(
                        build::index(build::ident("actors"), build::int(0)),
                        "dist",
                    ),
                    vec![build::ident("h")],
                )),
            ),
        ],
    );
    assert_eq!(r.slot("d"), 7);
}

#[test]
fn test_len_picks_the_receiver_shape() {
    let r = run(vec![
        build::let_("s", None, Some(build::string("abcd"))),
        build::let_(
            "arr",
            None,
            Some(build::array(vec![build::int(1), build::int(2), build::int(3)])),
        ),
        build::let_(
            "n1",
            None,
            Some(build::call_expr(
                build::member(build::ident("s"), "len"),
                vec![],
            )),
        ),
        build::let_("n2", None, Some(build::call("len", vec![build::ident("arr")]))),
    ]);
    assert_eq!(r.slot("n1"), 4);
    assert_eq!(r.slot("n2"), 3);
}

#[test]
fn test_sector_walls_rebase_into_the_wall_table() {
    let r = run_seeded(
        |vm| {
            vm.poke("sector_firstwall", 3, 10);
            vm.poke("wall_x", 12, 77);
        },
        vec![build::let_(
            "x",
            None,
            Some(build::member(
                build::index(
                    build::member(
                        build::index(build::ident("sectors"), build::int(3)),
                        "walls",
                    ),
                    build::int(2),
                ),
                "x",
            )),
        )],
    );
    assert_eq!(r.slot("x"), 77);
}

#[test]
fn test_player_singleton_needs_no_subscript() {
    let r = run_seeded(
        |vm| vm.poke("player_health", 0, 88),
        vec![
            build::let_(
                "h",
                None,
                Some(build::member(build::ident("player"), "health")),
            ),
            build::expr(build::assign(
                build::member(build::ident("player"), "health"),
                build::bin(
                    BinaryOperator::Subtract,
                    build::ident("h"),
                    build::int(8),
                ),
            )),
        ],
    );
    assert_eq!(r.slot("h"), 88);
    assert_eq!(r.vm.array_value("player_health", 0), 80);
}

#[test]
fn test_inject_raw_passes_text_straight_through() {
    let r = run(vec![build::let_(
        "x",
        None,
        Some(build::call(
            "inject_raw",
            vec![build::string("set ra 42")],
        )),
    )]);
    assert_eq!(r.slot("x"), 42);
}

#[test]
fn test_safe_inject_restores_the_parked_temporary() {
    // The left operand of the sum is parked in rt while the right side
    // runs; the injected text stomps rt on purpose and the wrapper's
    // save/restore keeps the sum honest.
    let r = run(vec![build::let_(
        "y",
        None,
        Some(build::bin_add(
            build::int(5),
            build::call("inject", vec![build::string("set rt 999\nset ra 10")]),
        )),
    )]);
    assert_eq!(r.slot("y"), 15);
}

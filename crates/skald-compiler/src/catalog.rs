//! Default native catalog
//!
//! Field tables and intrinsic bindings for the stock engine build. Entity
//! fields are backed by parallel arrays the runtime maintains (`actor_hp`,
//! `sector_floorz`, ...); intrinsics expand to short op sequences, calling
//! into the emitted runtime states where real work is needed.

use once_cell::sync::Lazy;

use crate::natives::{
    arg, expand, ArgSpec, Binding, Collection, FieldTemplate, NativeCatalog, OwnerTag,
    ResolvedCall, Template,
};
use crate::symbols::ValueKind;

static DEFAULT: Lazy<NativeCatalog> = Lazy::new(build_default);

/// The catalog for the stock engine. Embedders targeting a modified
/// engine construct their own [`NativeCatalog`] instead.
pub fn default_catalog() -> &'static NativeCatalog {
    &DEFAULT
}

fn rw(get: &'static str, set: &'static str) -> FieldTemplate {
    FieldTemplate::Direct {
        get,
        set: Some(set),
        kind: ValueKind::Number,
    }
}

fn ro(get: &'static str, kind: ValueKind) -> FieldTemplate {
    FieldTemplate::Direct {
        get,
        set: None,
        kind,
    }
}

fn build_default() -> NativeCatalog {
    let mut cat = NativeCatalog::new();

    // ========================================================================
    // Field tables
    // ========================================================================

    cat.add_field(
        Collection::Actor,
        "hp",
        rw("geta %d actor_hp %i", "seta actor_hp %i %v"),
    );
    cat.add_field(
        Collection::Actor,
        "x",
        rw("geta %d actor_x %i", "seta actor_x %i %v"),
    );
    cat.add_field(
        Collection::Actor,
        "y",
        rw("geta %d actor_y %i", "seta actor_y %i %v"),
    );
    cat.add_field(
        Collection::Actor,
        "angle",
        rw("geta %d actor_angle %i", "seta actor_angle %i %v"),
    );
    cat.add_field(
        Collection::Actor,
        "tag",
        ro("geta %d actor_tag %i", ValueKind::Number),
    );
    cat.add_field(
        Collection::Actor,
        "sector",
        ro("geta %d actor_sector %i", ValueKind::Handle(Collection::Sector)),
    );

    cat.add_field(
        Collection::Sector,
        "floorz",
        rw("geta %d sector_floorz %i", "seta sector_floorz %i %v"),
    );
    cat.add_field(
        Collection::Sector,
        "ceilz",
        rw("geta %d sector_ceilz %i", "seta sector_ceilz %i %v"),
    );
    cat.add_field(
        Collection::Sector,
        "lotag",
        rw("geta %d sector_lotag %i", "seta sector_lotag %i %v"),
    );
    cat.add_field(
        Collection::Sector,
        "firstwall",
        ro("geta %d sector_firstwall %i", ValueKind::Handle(Collection::Wall)),
    );
    cat.add_field(
        Collection::Sector,
        "wallcount",
        ro("geta %d sector_wallcount %i", ValueKind::Number),
    );
    // sector.walls[j] indexes the wall table starting at the sector's
    // first wall; the subscript is re-based rather than looked up.
    cat.add_field(
        Collection::Sector,
        "walls",
        FieldTemplate::IndexOverride {
            derive: "geta %d sector_firstwall %i",
            target: Collection::Wall,
        },
    );

    cat.add_field(
        Collection::Wall,
        "x",
        rw("geta %d wall_x %i", "seta wall_x %i %v"),
    );
    cat.add_field(
        Collection::Wall,
        "y",
        rw("geta %d wall_y %i", "seta wall_y %i %v"),
    );
    cat.add_field(
        Collection::Wall,
        "picnum",
        rw("geta %d wall_picnum %i", "seta wall_picnum %i %v"),
    );
    cat.add_field(
        Collection::Wall,
        "nextsector",
        ro("geta %d wall_nextsector %i", ValueKind::Handle(Collection::Sector)),
    );

    cat.add_field(
        Collection::Player,
        "health",
        rw("geta %d player_health %i", "seta player_health %i %v"),
    );
    cat.add_field(
        Collection::Player,
        "x",
        rw("geta %d player_x %i", "seta player_x %i %v"),
    );
    cat.add_field(
        Collection::Player,
        "y",
        rw("geta %d player_y %i", "seta player_y %i %v"),
    );
    cat.add_field(
        Collection::Player,
        "angle",
        rw("geta %d player_angle %i", "seta player_angle %i %v"),
    );
    cat.add_field(
        Collection::Player,
        "sector",
        ro("geta %d player_sector %i", ValueKind::Handle(Collection::Sector)),
    );

    // ========================================================================
    // Unrestricted intrinsics
    // ========================================================================

    cat.add_binding(Binding {
        name: "out",
        owner: None,
        args: vec![ArgSpec::of(arg::VAR | arg::CONST)],
        returns: None,
        code: Template::Fixed("print %0"),
    });
    cat.add_binding(Binding {
        name: "display",
        owner: None,
        args: vec![ArgSpec::of(arg::STRING)],
        returns: None,
        code: Template::Fixed("display %0"),
    });
    cat.add_binding(Binding {
        name: "sound",
        owner: None,
        args: vec![ArgSpec::of(arg::CONST | arg::VAR)],
        returns: None,
        code: Template::Fixed("sound %0"),
    });
    cat.add_binding(Binding {
        name: "wait",
        owner: None,
        args: vec![ArgSpec::of(arg::CONST | arg::VAR)],
        returns: None,
        code: Template::Fixed("wait %0"),
    });
    // The engine parks the new entity's index in the `spawned` var; it is
    // captured before the callback runs so a spawn inside the callback
    // cannot clobber the result.
    cat.add_binding(Binding {
        name: "spawn",
        owner: None,
        args: vec![
            ArgSpec::of(arg::CONST),
            ArgSpec::of(arg::CALLBACK | arg::OPTIONAL),
        ],
        returns: Some(ValueKind::Handle(Collection::Actor)),
        code: Template::Gen(spawn_template),
    });
    cat.add_binding(Binding {
        name: "rand",
        owner: None,
        args: vec![ArgSpec::of(arg::CONST | arg::OPTIONAL)],
        returns: Some(ValueKind::Number),
        code: Template::Gen(rand_template),
    });
    cat.add_binding(Binding {
        name: "len",
        owner: None,
        args: vec![ArgSpec::of(arg::ARRAY | arg::VAR)],
        returns: Some(ValueKind::Number),
        code: Template::Fixed("geta ra mem %0"),
    });
    cat.add_binding(Binding {
        name: "alloc",
        owner: None,
        args: vec![ArgSpec::of(arg::VAR | arg::CONST)],
        returns: Some(ValueKind::Number),
        code: Template::Fixed("set r0 %0\nset r1 0\ncall gcalloc\nset ra rv"),
    });
    cat.add_binding(Binding {
        name: "free",
        owner: None,
        args: vec![ArgSpec::of(arg::VAR)],
        returns: None,
        code: Template::Fixed("call gcfree"),
    });
    cat.add_binding(Binding {
        name: "realloc",
        owner: None,
        args: vec![ArgSpec::of(arg::VAR), ArgSpec::of(arg::VAR | arg::CONST)],
        returns: Some(ValueKind::Number),
        code: Template::Fixed("set r1 %1\ncall gcrealloc\nset ra rv"),
    });
    cat.add_binding(Binding {
        name: "collect",
        owner: None,
        args: vec![],
        returns: None,
        code: Template::Fixed("call gccollect"),
    });
    cat.add_binding(Binding {
        name: "itoa",
        owner: None,
        args: vec![ArgSpec::of(arg::VAR | arg::CONST)],
        returns: Some(ValueKind::Str),
        code: Template::Fixed("set r0 %0\ncall rt_itoa\nset ra rv"),
    });

    // ========================================================================
    // Owner-restricted intrinsics
    // ========================================================================

    cat.add_binding(Binding {
        name: "len",
        owner: Some(OwnerTag::Str),
        args: vec![],
        returns: Some(ValueKind::Number),
        code: Template::Fixed("geta ra mem %t"),
    });
    cat.add_binding(Binding {
        name: "hurt",
        owner: Some(OwnerTag::Collection(Collection::Actor)),
        args: vec![ArgSpec::of(arg::VAR | arg::CONST)],
        returns: None,
        code: Template::Fixed("damage %t %0"),
    });
    cat.add_binding(Binding {
        name: "kill",
        owner: Some(OwnerTag::Collection(Collection::Actor)),
        args: vec![],
        returns: None,
        code: Template::Fixed("kill %t"),
    });
    cat.add_binding(Binding {
        name: "dist",
        owner: Some(OwnerTag::Collection(Collection::Actor)),
        args: vec![ArgSpec::of(arg::VAR)],
        returns: Some(ValueKind::Number),
        code: Template::Fixed("dist ra %t %0"),
    });

    cat
}

fn spawn_template(call: &ResolvedCall) -> String {
    let mut code = expand("spawn %0\nset ra spawned", call);
    if call.callback.is_some() {
        code.push('\n');
        code.push_str(&expand("seta mem rsp ra\nadd rsp 1\n%!\nsub rsp 1\ngeta ra mem rsp", call));
    }
    code
}

fn rand_template(call: &ResolvedCall) -> String {
    if call.supplied_optionals > 0 {
        expand("rand ra\nmod ra %0", call)
    } else {
        "rand ra".to_string()
    }
}

//! SDL descriptor drift: persisted blobs written at an old schema version
//! must upgrade cleanly to the newest one.

use shardfish_server::sdl::parser::parse_source;
use shardfish_server::sdl::{DescriptorDb, State, Values};

fn db_with(source: &str) -> DescriptorDb {
    let mut db = DescriptorDb::new();
    for descriptor in parse_source(source).expect("parse") {
        db.insert(descriptor);
    }
    db
}

const VERSIONED: &str = r#"
STATEDESC imager {
    VERSION 1
    VAR INT     messages[1]  DEFAULT=0
    VAR BOOL    active[1]    DEFAULT=true
}

STATEDESC imager {
    VERSION 2
    VAR INT     messages[1]  DEFAULT=0
    VAR BOOL    active[1]    DEFAULT=true
    VAR FLOAT   delay[1]     DEFAULT=3.5
    VAR SHORT   messages_max[1] DEFAULT=100
}
"#;

#[test]
fn persisted_v1_blob_upgrades_to_v2() {
    let db = db_with(VERSIONED);

    let v1 = db.find("imager", 1).unwrap().clone();
    let mut state = State::from_defaults(&db, &v1).unwrap();
    state.vars[0].values = Values::Int(vec![17]);
    state.vars[1].values = Values::Bool(vec![false]);
    let blob = state.to_blob(&db).unwrap();

    let upgraded = State::from_blob(&db, &blob).unwrap();
    assert_eq!(upgraded.descriptor_version, 2);
    // Matching fields carry over...
    assert_eq!(upgraded.vars[0].values, Values::Int(vec![17]));
    assert_eq!(upgraded.vars[1].values, Values::Bool(vec![false]));
    // ...new fields pick up their declared defaults.
    assert_eq!(upgraded.vars[2].values, Values::Float(vec![3.5]));
    assert_eq!(upgraded.vars[3].values, Values::Short(vec![100]));
}

#[test]
fn current_version_blobs_are_untouched() {
    let db = db_with(VERSIONED);
    let v2 = db.find("imager", 2).unwrap().clone();
    let mut state = State::from_defaults(&db, &v2).unwrap();
    state.vars[2].values = Values::Float(vec![9.0]);
    let blob = state.to_blob(&db).unwrap();

    let back = State::from_blob(&db, &blob).unwrap();
    assert_eq!(back, state);
}

#[test]
fn type_changes_fall_back_to_defaults() {
    let source = r#"
STATEDESC lamp {
    VERSION 1
    VAR INT brightness[1] DEFAULT=7
}

STATEDESC lamp {
    VERSION 2
    VAR FLOAT brightness[1] DEFAULT=0.5
}
"#;
    let db = db_with(source);
    let v1 = db.find("lamp", 1).unwrap().clone();
    let mut state = State::from_defaults(&db, &v1).unwrap();
    state.vars[0].values = Values::Int(vec![3]);
    let blob = state.to_blob(&db).unwrap();

    // Same name but a different type: the old value is dropped.
    let upgraded = State::from_blob(&db, &blob).unwrap();
    assert_eq!(upgraded.descriptor_version, 2);
    assert_eq!(upgraded.vars[0].values, Values::Float(vec![0.5]));
}

#[test]
fn nested_state_upgrades_recursively() {
    let source = r#"
STATEDESC inner {
    VERSION 1
    VAR INT value[1] DEFAULT=1
}

STATEDESC inner {
    VERSION 2
    VAR INT value[1] DEFAULT=1
    VAR INT extra[1] DEFAULT=5
}

STATEDESC outer {
    VERSION 1
    VAR $inner child[1]
}
"#;
    let db = db_with(source);

    // Build an outer state whose child was written at inner v1.
    let outer_desc = db.find("outer", 1).unwrap().clone();
    let inner_v1 = db.find("inner", 1).unwrap().clone();
    let mut outer = State::from_defaults(&db, &outer_desc).unwrap();
    let mut child = State::from_defaults(&db, &inner_v1).unwrap();
    child.vars[0].values = Values::Int(vec![42]);
    outer.vars[0].values = Values::StateDesc(vec![child]);

    let upgraded = outer.upgrade(&db, &outer_desc).unwrap();
    let Values::StateDesc(children) = &upgraded.vars[0].values else {
        panic!("child state missing");
    };
    assert_eq!(children[0].descriptor_version, 2);
    assert_eq!(children[0].vars[0].values, Values::Int(vec![42]));
    assert_eq!(children[0].vars[1].values, Values::Int(vec![5]));
}

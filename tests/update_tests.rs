use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use smartrecord::node::Metadata;
use smartrecord::smart::peer::{Peer, PeerId};
use smartrecord::smart::record::Record;
use smartrecord::update::update;
use smartrecord::{Dict, Node, Predicate, Set, SmartRecordError};

fn leaf() -> impl Strategy<Value = Node> {
    prop_oneof![
        "[a-z]{0,6}".prop_map(Node::string),
        any::<bool>().prop_map(Node::bool),
        any::<i64>().prop_map(Node::int),
        prop::collection::vec(any::<u8>(), 0..4).prop_map(Node::blob),
    ]
}

fn dict_with_prefix(prefix: &'static str) -> impl Strategy<Value = Dict> {
    prop::collection::btree_map("[a-f]{1,3}", leaf(), 0..6).prop_map(move |pairs| {
        let mut d = Dict::new();
        for (k, v) in pairs {
            d.insert(format!("{}{}", prefix, k), v);
        }
        d
    })
}

fn leaf_set() -> impl Strategy<Value = Set> {
    prop::collection::vec(leaf(), 0..5).prop_map(|elements| {
        let mut s = Set::new();
        for e in elements {
            s.insert(e);
        }
        s
    })
}

fn document() -> impl Strategy<Value = Node> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::btree_map("[a-d]{1,2}", inner.clone(), 0..4).prop_map(|pairs| {
                let mut d = Dict::new();
                for (k, v) in pairs {
                    d.insert(k, v);
                }
                Node::dict(d)
            }),
            prop::collection::vec(inner, 0..4).prop_map(|elements| {
                let mut s = Set::new();
                for e in elements {
                    s.insert(e);
                }
                Node::set(s)
            }),
        ]
    })
}

proptest! {
    #[test]
    fn update_with_itself_is_a_no_op(doc in document()) {
        let merged = update(doc.clone(), doc.clone()).unwrap();
        prop_assert_eq!(merged, doc);
    }

    #[test]
    fn disjoint_dicts_union_and_commute(a in dict_with_prefix("a_"), b in dict_with_prefix("b_")) {
        let ab = update(Node::dict(a.clone()), Node::dict(b.clone())).unwrap();
        let ba = update(Node::dict(b.clone()), Node::dict(a.clone())).unwrap();
        prop_assert_eq!(&ab, &ba);

        let merged = ab.as_dict().unwrap();
        prop_assert_eq!(merged.len(), a.len() + b.len());
        for pair in a.iter().chain(b.iter()) {
            prop_assert_eq!(merged.get(&pair.key), Some(&pair.value));
        }
    }

    #[test]
    fn set_union_is_order_independent(x in leaf(), z in leaf(), w in leaf()) {
        let left = Set::new().with(x.clone()).with(z.clone());
        let right = Set::new().with(x.clone()).with(w.clone());
        let expected = Set::new().with(x).with(z).with(w);

        let lr = update(Node::set(left.clone()), Node::set(right.clone())).unwrap();
        let rl = update(Node::set(right), Node::set(left)).unwrap();
        prop_assert_eq!(&lr, &Node::set(expected.clone()));
        prop_assert_eq!(&rl, &Node::set(expected));
    }

    #[test]
    fn disjoint_dict_updates_associate(
        a in dict_with_prefix("a_"),
        b in dict_with_prefix("b_"),
        c in dict_with_prefix("c_"),
    ) {
        let (a, b, c) = (Node::dict(a), Node::dict(b), Node::dict(c));
        let left = update(update(a.clone(), b.clone()).unwrap(), c.clone()).unwrap();
        let right = update(a, update(b, c).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }

    #[test]
    fn set_updates_associate(a in leaf_set(), b in leaf_set(), c in leaf_set()) {
        let (a, b, c) = (Node::set(a), Node::set(b), Node::set(c));
        let left = update(update(a.clone(), b.clone()).unwrap(), c.clone()).unwrap();
        let right = update(a, update(b, c).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }
}

#[test]
fn shared_leaf_takes_the_new_value() -> Result<(), Box<dyn std::error::Error>> {
    let a = Dict::new().with("k", "old").with("keep", "1");
    let b = Dict::new().with("k", "new");
    let merged = update(Node::dict(a), Node::dict(b))?.into_dict()?;

    assert_eq!(merged.get_str("k"), Some(&Node::string("new")));
    assert_eq!(merged.get_str("keep"), Some(&Node::string("1")));
    Ok(())
}

#[test]
fn shared_sub_dicts_merge_recursively() -> Result<(), Box<dyn std::error::Error>> {
    let a = Dict::new().with("profile", Dict::new().with("name", "alice"));
    let b = Dict::new().with("profile", Dict::new().with("age", Node::int(30)));
    let merged = update(Node::dict(a), Node::dict(b))?;

    let expected = Dict::new().with(
        "profile",
        Dict::new().with("name", "alice").with("age", Node::int(30)),
    );
    assert_eq!(merged, Node::dict(expected));
    Ok(())
}

#[test]
fn old_tag_is_kept() -> Result<(), Box<dyn std::error::Error>> {
    let merged = update(
        Node::dict(Dict::tagged("first").with("a", "1")),
        Node::dict(Dict::tagged("second").with("b", "2")),
    )?
    .into_dict()?;
    assert_eq!(merged.tag, "first");
    assert_eq!(merged.len(), 2);
    Ok(())
}

#[test]
fn mismatched_kinds_fail() {
    let res = update(Node::string("x"), Node::int(1));
    match res {
        Err(SmartRecordError::TypeMismatch { expected, found }) => {
            assert_eq!(expected, "string");
            assert_eq!(found, "int");
        }
        other => panic!("expected a type mismatch, got {:?}", other),
    }

    let res = update(Node::dict(Dict::new()), Node::set(Set::new()));
    assert!(matches!(res, Err(SmartRecordError::TypeMismatch { .. })));
}

#[test]
fn differently_tagged_sets_fail() {
    let res = update(
        Node::set(Set::tagged("a").with("x")),
        Node::set(Set::tagged("b").with("x")),
    );
    assert!(matches!(res, Err(SmartRecordError::TypeMismatch { .. })));
}

#[test]
fn predicates_union_positional_and_merge_named() -> Result<(), Box<dyn std::error::Error>> {
    let old = Predicate::new("f").arg("x").named("a", "1");
    let new = Predicate::new("f").arg("x").arg("y").named("a", "2").named("b", "3");
    let merged = update(Node::predicate(old), Node::predicate(new))?;

    let expected = Predicate::new("f").arg("x").arg("y").named("a", "2").named("b", "3");
    assert_eq!(merged, Node::predicate(expected));
    Ok(())
}

#[test]
fn later_expiration_wins() -> Result<(), Box<dyn std::error::Error>> {
    let t0 = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).single().ok_or("bad date")?;
    let t1 = t0 + Duration::hours(1);

    let merged = update(
        Node::string("a").with_meta(Metadata::expiring_at(t1)),
        Node::string("b").with_meta(Metadata::expiring_at(t0)),
    )?;
    assert_eq!(merged.meta.expires_at, Some(t1));
    assert_eq!(merged, Node::string("b"));

    let kept = update(
        Node::string("a").with_meta(Metadata::expiring_at(t0)),
        Node::string("b"),
    )?;
    assert_eq!(kept.meta.expires_at, Some(t0));
    Ok(())
}

#[test]
fn smart_nodes_update_their_user_fields() -> Result<(), Box<dyn std::error::Error>> {
    let old = Node::smart(Record {
        key: "234".to_string(),
        user: Dict::new().with("a", "1"),
    });
    let new = Node::smart(Record {
        key: "234".to_string(),
        user: Dict::new().with("b", "2"),
    });
    let merged = update(old, new)?;
    let record = merged.smart_ref::<Record>().ok_or("not a record")?;
    assert_eq!(record.user, Dict::new().with("a", "1").with("b", "2"));
    Ok(())
}

#[test]
fn smart_nodes_of_different_kinds_fail() {
    let record = Node::smart(Record {
        key: "234".to_string(),
        user: Dict::new(),
    });
    let peer = Node::smart(Peer {
        id: PeerId::new("QmPeer"),
        user: Dict::new(),
    });
    let res = update(record, peer);
    assert!(matches!(res, Err(SmartRecordError::TypeMismatch { .. })));
}

#[test]
fn record_key_cannot_change() {
    let old = Node::smart(Record {
        key: "a".to_string(),
        user: Dict::new(),
    });
    let new = Node::smart(Record {
        key: "b".to_string(),
        user: Dict::new(),
    });
    assert!(matches!(
        update(old, new),
        Err(SmartRecordError::TypeMismatch { .. })
    ));
}

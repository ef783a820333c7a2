use parking_lot::Mutex;
use smartrecord::grammar::{Assembler, AssemblyContext};
use smartrecord::smart::cid::Cid;
use smartrecord::smart::multiaddress::{Multiaddr, Multiaddress};
use smartrecord::smart::peer::{Peer, PeerId};
use smartrecord::smart::reachable::{CheckMode, ReachabilityProbe, Reachable};
use smartrecord::smart::record::Record;
use smartrecord::smart::signed::{DigestKeyring, Signed, Verified, Verify};
use smartrecord::{
    Dict, Grammar, MetadataOptions, Node, Predicate, Set, SmartRecordError, Store, Value,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn local_keyring() -> Arc<DigestKeyring> {
    Arc::new(DigestKeyring::new(PeerId::new("QmLocal"), "local-secret"))
}

#[test]
fn leaves_and_containers_assemble_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let grammar = Grammar::standard();
    let doc = Node::dict(
        Dict::new()
            .with("name", "alice")
            .with("tags", Predicate::new("unregistered").arg(Node::int(1))),
    );
    let assembled = grammar.assemble(&doc, &MetadataOptions::default())?;
    assert_eq!(assembled, doc);
    assert!(assembled.is_plain());
    Ok(())
}

#[test]
fn empty_grammar_matches_nothing() {
    let res = Grammar::empty().assemble(&Node::string("x"), &MetadataOptions::default());
    assert!(matches!(res, Err(SmartRecordError::NoMatchingAssembler(kind)) if kind == "string"));
}

#[test]
fn expiration_reaches_nested_nodes() -> Result<(), Box<dyn std::error::Error>> {
    let grammar = Grammar::standard();
    let doc = Node::dict(Dict::new().with("outer", Dict::new().with("inner", "v")));
    let options = MetadataOptions::expires_in(Duration::from_secs(60));
    let assembled = grammar.assemble(&doc, &options)?;

    let outer = assembled.as_dict().ok_or("not a dict")?;
    let inner_dict = outer.get_str("outer").ok_or("missing outer")?;
    let inner = inner_dict
        .as_dict()
        .and_then(|d| d.get_str("inner"))
        .ok_or("missing inner")?;
    assert!(assembled.meta.expires_at.is_some());
    assert!(inner_dict.meta.expires_at.is_some());
    assert_eq!(inner.meta.expires_at, assembled.meta.expires_at);

    let forever = grammar.assemble(&doc, &MetadataOptions::no_expiration())?;
    assert!(forever.meta.expires_at.is_none());
    Ok(())
}

#[test]
fn smart_tags_assemble_at_any_depth() -> Result<(), Box<dyn std::error::Error>> {
    let grammar = Grammar::standard();
    let doc = Node::dict(
        Dict::new()
            .with("rec", Predicate::new("record").arg("234").named("owner", "alice"))
            .with(
                "nested",
                Dict::new().with("who", Predicate::new("peer").arg("QmPeer")),
            ),
    );
    let assembled = grammar.assemble(&doc, &MetadataOptions::default())?;
    assert!(!assembled.is_plain());
    assert_eq!(assembled, doc);

    let dict = assembled.as_dict().ok_or("not a dict")?;
    let record = dict
        .get_str("rec")
        .and_then(|n| n.smart_ref::<Record>())
        .ok_or("rec is not a record")?;
    assert_eq!(record.key, "234");
    assert_eq!(record.user, Dict::new().with("owner", "alice"));

    let peer = dict
        .get_str("nested")
        .and_then(Node::as_dict)
        .and_then(|d| d.get_str("who"))
        .and_then(|n| n.smart_ref::<Peer>())
        .ok_or("who is not a peer")?;
    assert_eq!(peer.id, PeerId::new("QmPeer"));
    Ok(())
}

#[test]
fn plain_grammar_leaves_smart_tags_alone() -> Result<(), Box<dyn std::error::Error>> {
    let doc = Node::predicate(Predicate::new("record").arg("234"));
    let assembled = Grammar::plain().assemble(&doc, &MetadataOptions::default())?;
    assert!(assembled.is_plain());
    assert!(matches!(assembled.value, Value::Predicate(_)));
    Ok(())
}

#[test]
fn malformed_smart_tags_abort_assembly() {
    let grammar = Grammar::standard();
    let opts = MetadataOptions::default();

    let two_keys = Node::predicate(Predicate::new("record").arg("a").arg("b"));
    assert!(matches!(
        grammar.assemble(&two_keys, &opts),
        Err(SmartRecordError::Assembly(_))
    ));

    let bad_cid = Node::predicate(Predicate::new("cid").arg("not a cid!"));
    assert!(matches!(
        grammar.assemble(&bad_cid, &opts),
        Err(SmartRecordError::Assembly(_))
    ));

    let bad_addr = Node::predicate(Predicate::new("multiaddress").arg("/ip4/999.1.1.1/tcp/1"));
    assert!(matches!(
        grammar.assemble(&bad_addr, &opts),
        Err(SmartRecordError::InvalidMultiaddress(_))
    ));
}

#[test]
fn multiaddresses_parse_and_print() -> Result<(), Box<dyn std::error::Error>> {
    let text = "/ip4/10.0.0.1/tcp/4001/p2p/QmPeer";
    let addr: Multiaddr = text.parse()?;
    assert_eq!(addr.to_string(), text);
    assert_eq!(addr.peer_id(), Some(PeerId::new("QmPeer")));
    assert_eq!(addr.components().len(), 3);

    let quic: Multiaddr = "/ip6/::1/udp/4001/quic-v1".parse()?;
    assert!(quic.peer_id().is_none());

    assert!("ip4/10.0.0.1".parse::<Multiaddr>().is_err());
    assert!("/tcp".parse::<Multiaddr>().is_err());
    assert!("/smoke/1".parse::<Multiaddr>().is_err());

    let node = Grammar::standard().assemble(
        &Node::predicate(Predicate::new("multiaddress").arg(text)),
        &MetadataOptions::default(),
    )?;
    let assembled = node.smart_ref::<Multiaddress>().ok_or("not a multiaddress")?;
    assert_eq!(assembled.addr, addr);
    Ok(())
}

#[test]
fn cid_names_content() -> Result<(), Box<dyn std::error::Error>> {
    let content = Node::dict(Dict::new().with("a", "1"));
    let cid = Cid::of(&content);
    assert!(cid.value.starts_with("sha256-"));

    let plain = Node::predicate(Predicate::new("cid").arg(cid.value.as_str()));
    let assembled = Grammar::standard().assemble(&plain, &MetadataOptions::default())?;
    let parsed = assembled.smart_ref::<Cid>().ok_or("not a cid")?;
    assert_eq!(parsed.value, cid.value);
    Ok(())
}

#[test]
fn signing_requires_a_keyring() {
    let doc = Node::predicate(Predicate::new("sign").arg("hello"));
    let res = Grammar::standard().assemble(&doc, &MetadataOptions::default());
    assert!(matches!(res, Err(SmartRecordError::MissingCapability(c)) if c == "keyring"));
}

#[test]
fn signed_statements_verify_against_the_signer() -> Result<(), Box<dyn std::error::Error>> {
    let grammar = Grammar::standard().with_keyring(local_keyring());
    let opts = MetadataOptions::default();

    let signed = grammar.assemble(
        &Node::predicate(Predicate::new("sign").arg("hello").named("note", "x")),
        &opts,
    )?;
    let sig = &signed.smart_ref::<Signed>().ok_or("not signed")?.sig;
    assert_eq!(sig.by, PeerId::new("QmLocal"));
    assert_eq!(sig.statement, Node::string("hello"));

    // the plain form round-trips through the signed tag
    let plain = signed.disassemble();
    let reparsed = grammar.assemble(&plain, &opts)?;
    assert!(reparsed.smart_ref::<Signed>().is_some());
    assert_eq!(reparsed, signed);

    let claim = Node::predicate(Predicate::new("verify").arg(plain.clone()));
    let verified = grammar.assemble(&claim, &opts)?;
    let verified = verified.smart_ref::<Verified>().ok_or("not verified")?;
    assert_eq!(verified.sig.by, PeerId::new("QmLocal"));

    let stranger = Grammar::standard().with_keyring(Arc::new(DigestKeyring::new(
        PeerId::new("QmStranger"),
        "other-secret",
    )));
    let unverified = stranger.assemble(&claim, &opts)?;
    assert!(unverified.smart_ref::<Verify>().is_some());

    let trusting = Grammar::standard().with_keyring(Arc::new(
        DigestKeyring::new(PeerId::new("QmStranger"), "other-secret")
            .trust(PeerId::new("QmLocal"), "local-secret"),
    ));
    assert!(trusting.assemble(&claim, &opts)?.smart_ref::<Verified>().is_some());
    Ok(())
}

#[test]
fn verified_with_a_bad_signature_fails() {
    let grammar = Grammar::standard().with_keyring(local_keyring());
    let forged = Node::predicate(
        Predicate::new("verified")
            .arg("hello")
            .named("by", "QmLocal")
            .named("signature", Node::blob(vec![0u8; 32])),
    );
    let res = grammar.assemble(&forged, &MetadataOptions::default());
    assert!(matches!(res, Err(SmartRecordError::InvalidSignature(by)) if by == "QmLocal"));
}

struct FakeNetwork {
    dialable: HashSet<String>,
    connected: HashSet<String>,
}

impl ReachabilityProbe for FakeNetwork {
    fn is_dialable(&self, _: Option<&PeerId>, addr: &Multiaddr, _: Option<Instant>) -> bool {
        self.dialable.contains(&addr.to_string())
    }

    fn is_connected(&self, _: Option<&PeerId>, addr: &Multiaddr, _: Option<Instant>) -> bool {
        self.connected.contains(&addr.to_string())
    }
}

fn network_grammar() -> Grammar {
    let network = FakeNetwork {
        dialable: ["/ip4/10.0.0.1/tcp/4001", "/ip4/10.0.0.3/tcp/4001"]
            .into_iter()
            .map(String::from)
            .collect(),
        connected: ["/ip4/10.0.0.2/tcp/4001"]
            .into_iter()
            .map(String::from)
            .collect(),
    };
    Grammar::standard().with_reachability(Arc::new(network))
}

fn candidates() -> Predicate {
    Predicate::new("reachable")
        .arg("/ip4/10.0.0.1/tcp/4001")
        .arg("/ip4/10.0.0.2/tcp/4001")
        .arg("not an address")
        .arg(Predicate::new("multiaddress").arg("/ip4/10.0.0.3/tcp/4001"))
}

#[test]
fn reachable_partitions_candidates() -> Result<(), Box<dyn std::error::Error>> {
    let grammar = network_grammar();
    let ctx = AssemblyContext::new(&MetadataOptions::default())
        .with_writer(PeerId::new("QmWriter"));

    let node = grammar.assemble_in(&Node::predicate(candidates()), &ctx)?;
    let reachable = node.smart_ref::<Reachable>().ok_or("not reachable")?;
    assert_eq!(reachable.mode, CheckMode::Dial);
    assert_eq!(reachable.verified.len(), 2);
    assert!(reachable.verified.contains(&Node::string("/ip4/10.0.0.1/tcp/4001")));
    assert!(reachable.verified.contains(&Node::string("/ip4/10.0.0.3/tcp/4001")));
    assert_eq!(reachable.unverified.len(), 2);
    assert!(reachable.unverified.contains(&Node::string("/ip4/10.0.0.2/tcp/4001")));
    assert!(reachable.unverified.contains(&Node::string("not an address")));

    let by_connection = candidates().named("check", "connection");
    let node = grammar.assemble_in(&Node::predicate(by_connection), &ctx)?;
    let reachable = node.smart_ref::<Reachable>().ok_or("not reachable")?;
    assert_eq!(reachable.mode, CheckMode::Connection);
    assert_eq!(reachable.verified.len(), 1);
    assert_eq!(reachable.unverified.len(), 3);
    let wrapped = Predicate::new("multiaddress").arg("/ip4/10.0.0.3/tcp/4001");
    assert!(reachable.unverified.contains(&Node::predicate(wrapped)));
    Ok(())
}

#[test]
fn reachable_after_deadline_verifies_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let grammar = network_grammar();
    let ctx = AssemblyContext::new(&MetadataOptions::default())
        .with_deadline(Some(Instant::now()));

    let node = grammar.assemble_in(&Node::predicate(candidates()), &ctx)?;
    let reachable = node.smart_ref::<Reachable>().ok_or("not reachable")?;
    assert!(reachable.verified.is_empty());
    assert_eq!(reachable.unverified.len(), 4);
    Ok(())
}

#[test]
fn reachable_rejects_unknown_check_modes() {
    let doc = Node::predicate(candidates().named("check", "ping"));
    let res = network_grammar().assemble(&doc, &MetadataOptions::default());
    assert!(matches!(res, Err(SmartRecordError::Assembly(_))));

    let doc = Node::predicate(candidates().named("unverified", "/ip4/10.0.0.9/tcp/4001"));
    let res = network_grammar().assemble(&doc, &MetadataOptions::default());
    assert!(matches!(res, Err(SmartRecordError::Assembly(_))));
}

/// Dialable addresses can change between writes.
struct SwitchDialer {
    dialable: Mutex<HashSet<String>>,
}

impl SwitchDialer {
    fn allow(&self, addr: &str) {
        self.dialable.lock().insert(addr.to_string());
    }
}

impl ReachabilityProbe for SwitchDialer {
    fn is_dialable(&self, _: Option<&PeerId>, addr: &Multiaddr, _: Option<Instant>) -> bool {
        self.dialable.lock().contains(&addr.to_string())
    }

    fn is_connected(&self, _: Option<&PeerId>, _: &Multiaddr, _: Option<Instant>) -> bool {
        false
    }
}

#[test]
fn unreachable_candidates_are_stored_until_they_verify() -> Result<(), Box<dyn std::error::Error>> {
    const NEAR: &str = "/ip4/10.0.0.1/tcp/4001";
    const FAR: &str = "/ip4/10.0.0.9/tcp/4001";

    let dialer = Arc::new(SwitchDialer {
        dialable: Mutex::new(HashSet::new()),
    });
    dialer.allow(NEAR);
    let store = Store::new(Grammar::standard().with_reachability(dialer.clone()));
    let p = PeerId::new("writerP");

    let written = Dict::new().with("addrs", Predicate::new("reachable").arg(NEAR).arg(FAR));
    store.update(&p, "k", Node::dict(written))?;

    let stored = store.get("k").remove(&p).ok_or("missing document")?;
    let expected = Predicate::new("reachable")
        .arg(NEAR)
        .named("check", "dial")
        .named("unverified", Set::new().with(FAR));
    assert_eq!(stored.get_str("addrs"), Some(&Node::predicate(expected)));

    // the writer re-sends what it read once the far address comes up
    dialer.allow(FAR);
    store.update(&p, "k", Node::dict(stored))?;

    let stored = store.get("k").remove(&p).ok_or("missing document")?;
    let expected = Predicate::new("reachable")
        .arg(NEAR)
        .arg(FAR)
        .named("check", "dial");
    assert_eq!(stored.get_str("addrs"), Some(&Node::predicate(expected)));
    Ok(())
}

/// Upper-cases the single argument of `shout(..)`.
struct ShoutAssembler;

impl Assembler for ShoutAssembler {
    fn name(&self) -> &str {
        "shout"
    }

    fn assemble(
        &self,
        _: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> smartrecord::Result<Option<Node>> {
        let Value::Predicate(p) = &plain.value else {
            return Ok(None);
        };
        match p.positional.first().and_then(Node::as_str) {
            Some(s) => Ok(Some(Node::string(s.to_uppercase()).with_meta(ctx.meta.clone()))),
            None => Ok(None),
        }
    }
}

#[test]
fn registered_tags_extend_the_grammar() -> Result<(), Box<dyn std::error::Error>> {
    let mut grammar = Grammar::standard();
    assert!(!grammar.is_registered("shout"));
    grammar.register("shout", ShoutAssembler);
    assert!(grammar.is_registered("shout"));

    let doc = Node::dict(Dict::new().with("msg", Predicate::new("shout").arg("hi")));
    let assembled = grammar.assemble(&doc, &MetadataOptions::default())?;
    assert_eq!(assembled, Node::dict(Dict::new().with("msg", "HI")));

    // a declined tag falls through to the generic predicate rule
    let empty = Node::predicate(Predicate::new("shout"));
    assert_eq!(grammar.assemble(&empty, &MetadataOptions::default())?, empty);
    Ok(())
}

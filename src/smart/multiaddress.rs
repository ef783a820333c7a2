use super::peer::PeerId;
use super::{
    SmartNode, downcast, downcast_ref, plain_predicate, predicate_of, resolve, single_string,
    update_user, user_fields,
};
use crate::error::{Result, SmartRecordError};
use crate::grammar::{Assembler, AssemblyContext, Grammar};
use crate::merge::{MergeContext, merge_dicts};
use crate::node::{Dict, Node, Value};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ip4,
    Ip6,
    Dns,
    Dns4,
    Dns6,
    Tcp,
    Udp,
    P2p,
    Quic,
    QuicV1,
    Ws,
    Wss,
}

impl Protocol {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ip4" => Protocol::Ip4,
            "ip6" => Protocol::Ip6,
            "dns" => Protocol::Dns,
            "dns4" => Protocol::Dns4,
            "dns6" => Protocol::Dns6,
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            "p2p" => Protocol::P2p,
            "quic" => Protocol::Quic,
            "quic-v1" => Protocol::QuicV1,
            "ws" => Protocol::Ws,
            "wss" => Protocol::Wss,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Ip4 => "ip4",
            Protocol::Ip6 => "ip6",
            Protocol::Dns => "dns",
            Protocol::Dns4 => "dns4",
            Protocol::Dns6 => "dns6",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::P2p => "p2p",
            Protocol::Quic => "quic",
            Protocol::QuicV1 => "quic-v1",
            Protocol::Ws => "ws",
            Protocol::Wss => "wss",
        }
    }

    fn takes_value(self) -> bool {
        !matches!(
            self,
            Protocol::Quic | Protocol::QuicV1 | Protocol::Ws | Protocol::Wss
        )
    }

    fn check_value(self, value: &str) -> bool {
        match self {
            Protocol::Ip4 => value.parse::<Ipv4Addr>().is_ok(),
            Protocol::Ip6 => value.parse::<Ipv6Addr>().is_ok(),
            Protocol::Tcp | Protocol::Udp => value.parse::<u16>().is_ok(),
            Protocol::P2p => value.parse::<PeerId>().is_ok(),
            Protocol::Dns | Protocol::Dns4 | Protocol::Dns6 => {
                !value.is_empty()
                    && value
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            }
            _ => true,
        }
    }
}

/// A parsed network address such as `/ip4/10.0.0.1/tcp/4001/p2p/QmPeer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multiaddr {
    components: Vec<(Protocol, Option<String>)>,
}

impl Multiaddr {
    pub fn components(&self) -> &[(Protocol, Option<String>)] {
        &self.components
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.components.iter().find_map(|(proto, value)| match proto {
            Protocol::P2p => value.as_deref().map(PeerId::new),
            _ => None,
        })
    }
}

impl FromStr for Multiaddr {
    type Err = SmartRecordError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            |reason: &str| SmartRecordError::InvalidMultiaddress(format!("{}: {}", s, reason));
        let rest = s.strip_prefix('/').ok_or_else(|| invalid("must start with '/'"))?;
        let mut segments = rest.split('/');
        let mut components = Vec::new();
        while let Some(name) = segments.next() {
            let proto = Protocol::from_name(name)
                .ok_or_else(|| invalid(&format!("unknown protocol {:?}", name)))?;
            let value = if proto.takes_value() {
                let value = segments
                    .next()
                    .ok_or_else(|| invalid(&format!("{} needs a value", name)))?;
                if !proto.check_value(value) {
                    return Err(invalid(&format!("bad {} value {:?}", name, value)));
                }
                Some(value.to_string())
            } else {
                None
            };
            components.push((proto, value));
        }
        if components.is_empty() {
            return Err(invalid("empty"));
        }
        Ok(Multiaddr { components })
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (proto, value) in &self.components {
            write!(f, "/{}", proto.name())?;
            if let Some(v) = value {
                write!(f, "/{}", v)?;
            }
        }
        Ok(())
    }
}

/// `multiaddress(addr, ..user)`
#[derive(Debug, Clone)]
pub struct Multiaddress {
    pub addr: Multiaddr,
    pub user: Dict,
}

impl SmartNode for Multiaddress {
    fn kind(&self) -> &'static str {
        "multiaddress"
    }

    fn disassemble(&self) -> Value {
        plain_predicate(
            "multiaddress",
            vec![Node::string(self.addr.to_string())],
            vec![],
            &self.user,
        )
    }

    fn update(&mut self, new: Box<dyn SmartNode>) -> Result<()> {
        let new = downcast::<Multiaddress>(new, "multiaddress")?;
        self.addr = new.addr;
        update_user(&mut self.user, new.user)
    }

    fn merge(&self, other: &dyn SmartNode, ctx: &dyn MergeContext) -> Result<Value> {
        let theirs = downcast_ref::<Multiaddress>(other, "multiaddress")?;
        if theirs.addr != self.addr {
            return resolve(self, other, ctx);
        }
        Ok(Value::Smart(Box::new(Multiaddress {
            addr: self.addr.clone(),
            user: merge_dicts(&self.user, &theirs.user, ctx)?,
        })))
    }
}

pub struct MultiaddressAssembler;

impl Assembler for MultiaddressAssembler {
    fn name(&self) -> &str {
        "multiaddress"
    }

    fn assemble(
        &self,
        grammar: &Grammar,
        ctx: &AssemblyContext,
        plain: &Node,
    ) -> Result<Option<Node>> {
        let Some(p) = predicate_of(plain, "multiaddress") else {
            return Ok(None);
        };
        let addr = single_string(p)?.parse::<Multiaddr>()?;
        let user = user_fields(grammar, ctx, &p.named, &[])?;
        Ok(Some(ctx.stamp(Value::Smart(Box::new(Multiaddress { addr, user })))))
    }
}

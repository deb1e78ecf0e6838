//! Configuration blocks and their ordering contract.
//!
//! A node's configuration is a sequence of blocks. Each block states the
//! named objects it defines and the ones it refers to; [`Assembly`] accepts
//! a block only when everything it refers to was defined by an earlier
//! block, so a reference can never precede its definition in the text.

use std::collections::HashSet;
use std::fmt;

use crate::error::SynthesisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Preamble,
    Vrfs,
    RsaKey,
    Trustpoint,
    PkiServer,
    OverlayCrypto,
    Loopback,
    Interfaces,
    Tunnel,
    Routing,
    Routes,
    Access,
    Ntp,
    Applets,
    End,
    /// Shell configuration of the DNS host
    HostScript,
    /// External connector mode
    Connector,
}

impl BlockKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Preamble => "preamble",
            BlockKind::Vrfs => "vrfs",
            BlockKind::RsaKey => "rsa-key",
            BlockKind::Trustpoint => "trustpoint",
            BlockKind::PkiServer => "pki-server",
            BlockKind::OverlayCrypto => "overlay-crypto",
            BlockKind::Loopback => "loopback",
            BlockKind::Interfaces => "interfaces",
            BlockKind::Tunnel => "tunnel",
            BlockKind::Routing => "routing",
            BlockKind::Routes => "routes",
            BlockKind::Access => "access",
            BlockKind::Ntp => "ntp",
            BlockKind::Applets => "applets",
            BlockKind::End => "end",
            BlockKind::HostScript => "host-script",
            BlockKind::Connector => "connector",
        }
    }
}

/// A named configuration object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Vrf(String),
    RsaKey(String),
    Trustpoint(String),
    PkiServer(String),
    Keyring(String),
    IpsecProfile(String),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Vrf(name) => write!(f, "VRF {name}"),
            Symbol::RsaKey(name) => write!(f, "RSA key {name}"),
            Symbol::Trustpoint(name) => write!(f, "trustpoint {name}"),
            Symbol::PkiServer(name) => write!(f, "PKI server {name}"),
            Symbol::Keyring(name) => write!(f, "IKEv2 keyring {name}"),
            Symbol::IpsecProfile(name) => write!(f, "IPsec profile {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub defines: Vec<Symbol>,
    pub requires: Vec<Symbol>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Block {
            kind,
            defines: Vec::new(),
            requires: Vec::new(),
        }
    }

    pub fn defines(mut self, symbol: Symbol) -> Self {
        self.defines.push(symbol);
        self
    }

    pub fn requires(mut self, symbol: Symbol) -> Self {
        self.requires.push(symbol);
        self
    }

    pub fn requires_all(mut self, symbols: impl IntoIterator<Item = Symbol>) -> Self {
        self.requires.extend(symbols);
        self
    }
}

/// Ordered blocks of one node.
#[derive(Debug)]
pub struct Assembly {
    node: String,
    blocks: Vec<Block>,
    defined: HashSet<Symbol>,
}

impl Assembly {
    pub fn new(node: &str) -> Self {
        Assembly {
            node: node.to_string(),
            blocks: Vec::new(),
            defined: HashSet::new(),
        }
    }

    /// Append `block`, failing on the first requirement nothing has
    /// defined yet.
    pub fn push(&mut self, block: Block) -> Result<(), SynthesisError> {
        if let Some(missing) = block.requires.iter().find(|s| !self.defined.contains(*s)) {
            return Err(SynthesisError::UndefinedReference {
                node: self.node.clone(),
                block: block.kind.name(),
                symbol: missing.to_string(),
            });
        }
        self.defined.extend(block.defines.iter().cloned());
        self.blocks.push(block);
        Ok(())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[cfg(test)]
    pub fn kinds(&self) -> Vec<BlockKind> {
        self.blocks.iter().map(|b| b.kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_before_definition_rejected() {
        let mut assembly = Assembly::new("R7");
        let tp = Symbol::Trustpoint("CA-ROOT-SELF".to_string());
        let err = assembly
            .push(Block::new(BlockKind::OverlayCrypto).requires(tp.clone()))
            .unwrap_err();
        match err {
            SynthesisError::UndefinedReference { node, block, symbol } => {
                assert_eq!(node, "R7");
                assert_eq!(block, "overlay-crypto");
                assert_eq!(symbol, "trustpoint CA-ROOT-SELF");
            }
            other => panic!("unexpected error {other:?}"),
        }

        assembly.push(Block::new(BlockKind::Trustpoint).defines(tp.clone())).unwrap();
        assembly
            .push(Block::new(BlockKind::OverlayCrypto).requires(tp))
            .unwrap();
        assert_eq!(assembly.kinds(), vec![BlockKind::Trustpoint, BlockKind::OverlayCrypto]);
    }
}

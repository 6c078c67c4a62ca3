pub mod network;
pub mod node;

use blocksim_core::{Block, ChainFault, ChainSnapshot, LedgerError};
use serde::Serialize;
use thiserror::Error;

pub use network::{BroadcastReport, CanonicalChain, ConsensusReport, Network};
pub use node::Node;

pub type NodeId = String;

/// What peers exchange. The in-process `Network` routes these directly; a
/// socket transport would carry the same messages.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    NewBlock(Block),
    ChainRequest,
    ChainResponse(ChainSnapshot),
}

/// Outcome of delivering a block or chain to a peer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Delivery {
    Appended,
    /// The block is already in the local chain.
    Known,
    /// The block implies a longer chain than the local one; the sender's
    /// full chain is needed.
    Behind,
    Replaced { from_len: usize, to_len: usize },
    Rejected(Rejection),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Rejection {
    /// The block failed checks against the local tip.
    Block(ChainFault),
    /// A different block already occupies this height and the sender's chain
    /// is not longer.
    Stale { index: u64, local_len: usize },
    /// The offered chain failed full validation.
    InvalidChain(ChainFault),
    NotLonger { local_len: usize, offered_len: usize },
    Malformed(String),
}

/// Reply produced by a peer for one message.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Delivered(Delivery),
    Reply(Message),
}

/// A participant reachable through the network.
pub trait Peer {
    fn id(&self) -> &str;
    fn is_reachable(&self) -> bool;
    fn handle(&mut self, from: &str, msg: Message) -> Result<Response, NetworkError>;
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("unknown node `{0}`")]
    UnknownNode(String),

    #[error("node `{0}` already exists")]
    DuplicateNode(String),

    #[error("node `{0}` is offline")]
    NodeOffline(String),

    #[error("protocol violation from `{peer}`: {detail}")]
    Protocol { peer: String, detail: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Delivers `block` from `origin` to `target`, fetching the origin's whole
/// chain when the target reports it is behind.
pub fn deliver_block(
    origin: &mut dyn Peer,
    target: &mut dyn Peer,
    block: &Block,
) -> Result<Delivery, NetworkError> {
    match target.handle(origin.id(), Message::NewBlock(block.clone()))? {
        Response::Delivered(Delivery::Behind) => sync_chain(origin, target),
        Response::Delivered(delivery) => Ok(delivery),
        Response::Reply(msg) => Err(unexpected(target.id(), &msg)),
    }
}

/// Offers `source`'s full chain to `target`.
pub fn sync_chain(source: &mut dyn Peer, target: &mut dyn Peer) -> Result<Delivery, NetworkError> {
    let chain = match source.handle(target.id(), Message::ChainRequest)? {
        Response::Reply(msg @ Message::ChainResponse(_)) => msg,
        Response::Reply(msg) => return Err(unexpected(source.id(), &msg)),
        Response::Delivered(delivery) => {
            return Err(NetworkError::Protocol {
                peer: source.id().to_string(),
                detail: format!("answered chain request with {delivery:?}"),
            })
        }
    };
    match target.handle(source.id(), chain)? {
        Response::Delivered(delivery) => Ok(delivery),
        Response::Reply(msg) => Err(unexpected(target.id(), &msg)),
    }
}

fn unexpected(peer: &str, msg: &Message) -> NetworkError {
    let kind = match msg {
        Message::NewBlock(_) => "NewBlock",
        Message::ChainRequest => "ChainRequest",
        Message::ChainResponse(_) => "ChainResponse",
    };
    NetworkError::Protocol {
        peer: peer.to_string(),
        detail: format!("unexpected {kind} reply"),
    }
}

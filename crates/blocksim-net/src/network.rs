use blocksim_core::{Block, ChainFault, LedgerConfig, Transaction};
use serde::Serialize;
use tracing::{info, warn};

use crate::{deliver_block, Delivery, NetworkError, Node, NodeId, Rejection};

/// Per-peer outcome of one broadcast.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BroadcastReport {
    pub origin: NodeId,
    pub block_index: u64,
    pub deliveries: Vec<(NodeId, Delivery)>,
}

impl BroadcastReport {
    pub fn delivery(&self, peer: &str) -> Option<&Delivery> {
        self.deliveries
            .iter()
            .find(|(id, _)| id == peer)
            .map(|(_, d)| d)
    }

    /// Peers that now hold the block.
    pub fn accepted(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|(_, d)| {
                matches!(
                    d,
                    Delivery::Appended | Delivery::Known | Delivery::Replaced { .. }
                )
            })
            .count()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CanonicalChain {
    pub node: NodeId,
    pub length: usize,
    pub tip_hash: String,
}

/// Result of one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConsensusReport {
    /// `None` when no online node holds a valid chain.
    pub canonical: Option<CanonicalChain>,
    pub kept: Vec<NodeId>,
    pub replaced: Vec<NodeId>,
    /// Nodes whose chains failed validation and were left out of the vote.
    pub excluded: Vec<(NodeId, ChainFault)>,
    /// Nodes that could not accept the canonical chain under their own
    /// difficulty. They keep their current chain.
    pub refused: Vec<(NodeId, Rejection)>,
}

/// A fully connected set of nodes simulated in-process.
#[derive(Debug, Default)]
pub struct Network {
    nodes: Vec<Node>,
    config: LedgerConfig,
}

impl Network {
    /// New nodes start from `config`.
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            nodes: Vec::new(),
            config,
        }
    }

    pub fn add_node(&mut self, id: impl Into<NodeId>) -> Result<&mut Node, NetworkError> {
        let config = self.config.clone();
        self.add_node_with(id, config)
    }

    pub fn add_node_with(
        &mut self,
        id: impl Into<NodeId>,
        config: LedgerConfig,
    ) -> Result<&mut Node, NetworkError> {
        let id = id.into();
        if self.position(&id).is_ok() {
            return Err(NetworkError::DuplicateNode(id));
        }
        let node = Node::new(id, config)?;
        info!("Node {} joined the network", node.id());
        self.nodes.push(node);
        let last = self.nodes.len() - 1;
        Ok(&mut self.nodes[last])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id() == id)
    }

    fn position(&self, id: &str) -> Result<usize, NetworkError> {
        self.nodes
            .iter()
            .position(|n| n.id() == id)
            .ok_or_else(|| NetworkError::UnknownNode(id.to_string()))
    }

    pub fn set_online(&mut self, id: &str, online: bool) -> Result<(), NetworkError> {
        let i = self.position(id)?;
        self.nodes[i].set_online(online);
        info!("Node {id} is now {}", if online { "online" } else { "offline" });
        Ok(())
    }

    pub fn submit_transaction(&mut self, id: &str, tx: Transaction) -> Result<(), NetworkError> {
        let i = self.position(id)?;
        self.nodes[i].add_transaction(tx)?;
        Ok(())
    }

    /// Mines `origin`'s pool and announces the block to every other node.
    pub fn mine_and_broadcast(
        &mut self,
        origin: &str,
        miner: &str,
    ) -> Result<(Block, BroadcastReport), NetworkError> {
        let i = self.position(origin)?;
        if !self.nodes[i].is_online() {
            return Err(NetworkError::NodeOffline(origin.to_string()));
        }
        let block = self.nodes[i].mine_pending_transactions(miner)?;
        let report = self.broadcast(origin, &block)?;
        Ok((block, report))
    }

    /// Delivers `block` to every other online node in turn. Any error aborts
    /// the remaining deliveries.
    pub fn broadcast(&mut self, origin: &str, block: &Block) -> Result<BroadcastReport, NetworkError> {
        let from = self.position(origin)?;
        if !self.nodes[from].is_online() {
            return Err(NetworkError::NodeOffline(origin.to_string()));
        }
        info!("Node {origin} broadcasting block #{}", block.index);

        let mut report = BroadcastReport {
            origin: origin.to_string(),
            block_index: block.index,
            deliveries: Vec::new(),
        };
        for to in 0..self.nodes.len() {
            if to == from || !self.nodes[to].is_online() {
                continue;
            }
            let (sender, receiver) = pair_mut(&mut self.nodes, from, to);
            let delivery = deliver_block(sender, receiver, block)?;
            match &delivery {
                Delivery::Rejected(why) => warn!("block rejected by {}: {why:?}", receiver.id()),
                other => info!("block delivered to {}: {other:?}", receiver.id()),
            }
            report.deliveries.push((receiver.id().to_string(), delivery));
        }
        Ok(report)
    }

    /// Elects the longest valid chain among online nodes (ties go to the
    /// smallest tip hash) and offers it to every online node that differs.
    /// A node adopts it only if it validates under that node's difficulty.
    ///
    /// Only block count matters; cumulative work is not weighed. Invalid
    /// chains never win, whatever their length.
    pub fn resolve_consensus(&mut self) -> ConsensusReport {
        let mut report = ConsensusReport::default();

        let mut best: Option<usize> = None;
        for (i, node) in self.nodes.iter().enumerate() {
            if !node.is_online() {
                continue;
            }
            if let Err(fault) = node.ledger().validate() {
                warn!("excluding chain of {}: {fault}", node.id());
                report.excluded.push((node.id().to_string(), fault));
                continue;
            }
            best = match best {
                Some(b) if !outranks(node, &self.nodes[b]) => Some(b),
                _ => Some(i),
            };
        }

        let Some(winner) = best else {
            warn!("no online node holds a valid chain");
            return report;
        };

        let canonical = self.nodes[winner].ledger().export();
        report.canonical = Some(CanonicalChain {
            node: self.nodes[winner].id().to_string(),
            length: canonical.blocks.len(),
            tip_hash: self.nodes[winner].ledger().tip().hash.clone(),
        });

        // Each node re-judges the winner under its own difficulty and config.
        for node in self.nodes.iter_mut().filter(|n| n.is_online()) {
            if node.ledger().blocks() == canonical.blocks.as_slice() {
                report.kept.push(node.id().to_string());
                continue;
            }
            match node.judge_chain(canonical.clone()) {
                Ok(ledger) => {
                    node.replace_ledger(ledger);
                    report.replaced.push(node.id().to_string());
                }
                Err(rejection) => {
                    warn!("{} refused the canonical chain: {rejection:?}", node.id());
                    report.refused.push((node.id().to_string(), rejection));
                }
            }
        }

        info!(
            "consensus: canonical chain from {} ({} blocks), {} kept, {} replaced, {} refused",
            self.nodes[winner].id(),
            canonical.blocks.len(),
            report.kept.len(),
            report.replaced.len(),
            report.refused.len()
        );
        report
    }

    /// True when every online node has the same length and tip hash.
    pub fn is_converged(&self) -> bool {
        let mut online = self.nodes.iter().filter(|n| n.is_online());
        let Some(first) = online.next() else {
            return true;
        };
        let (len, tip) = (first.ledger().len(), &first.ledger().tip().hash);
        online.all(|n| n.ledger().len() == len && &n.ledger().tip().hash == tip)
    }
}

fn outranks(challenger: &Node, holder: &Node) -> bool {
    let (c, h) = (challenger.ledger(), holder.ledger());
    c.len() > h.len() || (c.len() == h.len() && c.tip().hash < h.tip().hash)
}

fn pair_mut(nodes: &mut [Node], a: usize, b: usize) -> (&mut Node, &mut Node) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = nodes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = nodes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(ids: &[&str]) -> Network {
        let mut net = Network::new(LedgerConfig::with_difficulty(1));
        for id in ids {
            net.add_node(*id).unwrap();
        }
        net
    }

    #[test]
    fn duplicate_and_unknown_nodes_error() {
        let mut net = network(&["a"]);
        assert!(matches!(
            net.add_node("a"),
            Err(NetworkError::DuplicateNode(id)) if id == "a"
        ));
        assert!(matches!(
            net.set_online("zed", false),
            Err(NetworkError::UnknownNode(_))
        ));
        let block = net.node_mut("a").unwrap().add_block_direct("x").unwrap();
        assert!(matches!(
            net.broadcast("zed", &block),
            Err(NetworkError::UnknownNode(_))
        ));
    }

    #[test]
    fn pair_mut_returns_requested_order() {
        let mut nodes = vec![
            Node::new("a", LedgerConfig::with_difficulty(1)).unwrap(),
            Node::new("b", LedgerConfig::with_difficulty(1)).unwrap(),
            Node::new("c", LedgerConfig::with_difficulty(1)).unwrap(),
        ];
        let (x, y) = pair_mut(&mut nodes, 2, 0);
        assert_eq!((x.id(), y.id()), ("c", "a"));
        let (x, y) = pair_mut(&mut nodes, 0, 1);
        assert_eq!((x.id(), y.id()), ("a", "b"));
    }

    #[test]
    fn broadcast_reaches_every_online_peer() {
        let mut net = network(&["a", "b", "c"]);
        net.set_online("c", false).unwrap();
        net.submit_transaction("a", Transaction::new("a", "b", 5.0))
            .unwrap();
        let (block, report) = net.mine_and_broadcast("a", "a").unwrap();

        assert_eq!(report.block_index, block.index);
        assert_eq!(report.delivery("b"), Some(&Delivery::Appended));
        assert_eq!(report.delivery("c"), None);
        assert_eq!(report.accepted(), 1);
        assert_eq!(net.node("b").unwrap().ledger().tip(), &block);
        assert_eq!(net.node("c").unwrap().ledger().len(), 1);
    }

    #[test]
    fn offline_origin_cannot_broadcast() {
        let mut net = network(&["a", "b"]);
        net.set_online("a", false).unwrap();
        assert!(matches!(
            net.mine_and_broadcast("a", "a"),
            Err(NetworkError::NodeOffline(_))
        ));
    }

    #[test]
    fn outranks_prefers_length_then_smaller_tip_hash() {
        let mut net = network(&["a", "b"]);
        net.node_mut("a").unwrap().add_block_direct("a1").unwrap();
        net.node_mut("b").unwrap().add_block_direct("b1").unwrap();
        let (a, b) = (net.node("a").unwrap(), net.node("b").unwrap());
        let a_smaller = a.ledger().tip().hash < b.ledger().tip().hash;
        assert_eq!(outranks(a, b), a_smaller);
        assert_eq!(outranks(b, a), !a_smaller);

        net.node_mut("b").unwrap().add_block_direct("b2").unwrap();
        let (a, b) = (net.node("a").unwrap(), net.node("b").unwrap());
        assert!(outranks(b, a));
        assert!(!outranks(a, b));
    }

    #[test]
    fn consensus_with_no_valid_chain_changes_nothing() {
        let mut net = network(&["a"]);
        let node = net.node_mut("a").unwrap();
        node.add_block_direct("a1").unwrap();
        node.ledger_mut()
            .tamper_with_block(1, "forged".into())
            .unwrap();
        let report = net.resolve_consensus();
        assert_eq!(report.canonical, None);
        assert_eq!(report.excluded.len(), 1);
        assert!(report.replaced.is_empty());
    }

    #[test]
    fn empty_network_is_converged() {
        let net = Network::default();
        assert!(net.is_empty());
        assert!(net.is_converged());
    }
}

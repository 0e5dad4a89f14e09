/// Node ranking and round-robin rotation for upload placement.
///
/// Candidates are pinged in parallel and sorted ascending by
/// latency / reliability. Unmeasurable latency sorts last (infinite
/// score); zero reliability is clamped so the ratio stays finite.
use std::time::Duration;

use tracing::debug;

use super::transport::NodeClient;
use super::NodeDescriptor;

/// Floor for normalized reliability; keeps the ranking score finite.
const RELIABILITY_EPSILON: f64 = 0.01;

/// A candidate node with its measured latency and ranking score.
#[derive(Debug, Clone)]
pub struct RankedNode {
    pub node: NodeDescriptor,
    /// None when the probe failed or timed out.
    pub latency: Option<Duration>,
    pub score: f64,
}

/// Normalize the directory's reliability value to (0, 1].
///
/// The directory is ambiguous about its scale; anything >= 2 is read
/// as a percentage.
pub fn normalize_reliability(raw: f64) -> f64 {
    let fraction = if raw >= 2.0 { raw / 100.0 } else { raw };
    fraction.clamp(RELIABILITY_EPSILON, 1.0)
}

fn score(latency: Option<Duration>, reliability: f64) -> f64 {
    match latency {
        Some(l) => l.as_secs_f64() * 1000.0 / normalize_reliability(reliability),
        None => f64::INFINITY,
    }
}

/// Probe every candidate in parallel and return them ranked best-first.
pub async fn probe_and_rank(client: &NodeClient, nodes: Vec<NodeDescriptor>) -> Vec<RankedNode> {
    let mut probes = Vec::with_capacity(nodes.len());
    for node in nodes {
        let client = client.clone();
        probes.push(tokio::spawn(async move {
            let latency = client.ping(&node.base_url()).await.ok();
            (node, latency)
        }));
    }

    let mut ranked = Vec::with_capacity(probes.len());
    for probe in probes {
        // A panicked probe task counts as an unreachable node.
        let Ok((node, latency)) = probe.await else {
            continue;
        };
        let score = score(latency, node.reliability);
        debug!(
            node = %node.id,
            latency_ms = latency.map(|l| l.as_millis() as u64),
            score,
            "Probed node"
        );
        ranked.push(RankedNode {
            node,
            latency,
            score,
        });
    }

    ranked.sort_by(|a, b| a.score.total_cmp(&b.score));
    ranked
}

/// Deterministic round-robin over a ranked node list.
pub struct NodeRotation {
    nodes: Vec<RankedNode>,
    cursor: usize,
}

impl NodeRotation {
    pub fn new(nodes: Vec<RankedNode>) -> Self {
        Self { nodes, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Next node in rotation order, wrapping around.
    pub fn next(&mut self) -> &RankedNode {
        assert!(!self.nodes.is_empty(), "rotation over an empty node list");
        let node = &self.nodes[self.cursor % self.nodes.len()];
        self.cursor += 1;
        node
    }
}

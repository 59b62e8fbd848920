use std::collections::BTreeMap;

use contracts::{Agent, AgentName};

/// Cluster-based turn scheduling. Two agents land in the same cluster when
/// their Chebyshev distance is at most `cluster_radius`; clusters execute in
/// parallel while agents inside one cluster act sequentially. The radius
/// carries a buffer over vision so approaching agents coalesce one tick
/// before they can interact.
#[derive(Debug, Default)]
pub struct Scheduler {
    forced_next: Option<AgentName>,
    skip_counts: BTreeMap<AgentName, u32>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union-find over the acting agents; each connected component becomes a
    /// cluster. Cluster member order follows the roster's name order, which
    /// keeps intra-cluster execution stable across runs.
    pub fn compute_clusters(
        &self,
        agents: &BTreeMap<AgentName, &Agent>,
        cluster_radius: i32,
    ) -> Vec<Vec<AgentName>> {
        if agents.is_empty() {
            return Vec::new();
        }

        let names: Vec<&AgentName> = agents.keys().collect();
        let mut parent: Vec<usize> = (0..names.len()).collect();

        fn find(parent: &mut Vec<usize>, x: usize) -> usize {
            if parent[x] != x {
                let next = parent[x];
                let root = find(parent, next);
                parent[x] = root;
            }
            parent[x]
        }

        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let a = agents[names[i]];
                let b = agents[names[j]];
                if a.position.chebyshev_distance(b.position) <= cluster_radius {
                    let (ra, rb) = (find(&mut parent, i), find(&mut parent, j));
                    if ra != rb {
                        parent[ra] = rb;
                    }
                }
            }
        }

        let mut clusters: BTreeMap<usize, Vec<AgentName>> = BTreeMap::new();
        for (index, name) in names.iter().enumerate() {
            let root = find(&mut parent, index);
            clusters.entry(root).or_default().push((*name).clone());
        }

        let mut out: Vec<Vec<AgentName>> = clusters.into_values().collect();
        if let Some(forced) = &self.forced_next {
            for cluster in &mut out {
                if let Some(index) = cluster.iter().position(|name| name == forced) {
                    let agent = cluster.remove(index);
                    cluster.insert(0, agent);
                    break;
                }
            }
        }
        out
    }

    /// Observer command: move the agent to the head of its cluster for one
    /// tick. Also ends journey trance for that agent (the movement phase
    /// emits the interrupt).
    pub fn force_next(&mut self, agent: AgentName) {
        self.forced_next = Some(agent);
    }

    pub fn take_forced(&mut self) -> Option<AgentName> {
        self.forced_next.take()
    }

    pub fn forced(&self) -> Option<&AgentName> {
        self.forced_next.as_ref()
    }

    /// Observer command: suppress the agent's next `turns` turns.
    pub fn skip_turns(&mut self, agent: AgentName, turns: u32) {
        if turns == 0 {
            return;
        }
        *self.skip_counts.entry(agent).or_insert(0) += turns;
    }

    /// Consumes one skip for the agent; true when the turn should be skipped.
    pub fn consume_skip(&mut self, agent: &str) -> bool {
        match self.skip_counts.get_mut(agent) {
            Some(remaining) => {
                *remaining -= 1;
                if *remaining == 0 {
                    self.skip_counts.remove(agent);
                }
                true
            }
            None => false,
        }
    }
}

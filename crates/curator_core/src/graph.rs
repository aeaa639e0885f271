//! The dependency graph engine.
//!
//! Two directed graphs are kept over assets and plain files: the transform
//! graph (edges `A -> D` when D's content affects A's transform) and the
//! reference graph (weak links used only for "find uses" queries). Edges
//! point from the dependent to the dependency, so outgoing neighbours answer
//! "what does X need" and incoming neighbours answer "what breaks if X
//! changes".

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use curator_common::{AssetGuid, FileId};
use parking_lot::Mutex;
use petgraph::algo::tarjan_scc;
use petgraph::dot::{Config, Dot};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction::{Incoming, Outgoing};

/// A node of the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepNode {
    /// An asset, known or not yet discovered.
    Asset(AssetGuid),
    /// A plain file.
    File(FileId),
}

impl DepNode {
    /// Returns the GUID if this is an asset node.
    pub fn as_asset(self) -> Option<AssetGuid> {
        match self {
            DepNode::Asset(guid) => Some(guid),
            DepNode::File(_) => None,
        }
    }
}

/// Kind of an edge in an exported graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Transform dependency.
    Dependency,
    /// Weak reference.
    Reference,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Dependency => f.write_str("dependency"),
            EdgeKind::Reference => f.write_str("reference"),
        }
    }
}

/// Transform order for a set of requested assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Topological generations: every asset's dependencies inside the
    /// closure sit in earlier generations. Assets within one generation are
    /// independent of each other.
    pub generations: Vec<Vec<AssetGuid>>,
    /// Assets that are part of a cycle or depend on one.
    pub blocked: Vec<AssetGuid>,
}

impl Schedule {
    /// Total number of assets in the closure.
    pub fn len(&self) -> usize {
        self.generations.iter().map(Vec::len).sum::<usize>() + self.blocked.len()
    }

    /// Returns `true` if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct DependentsMemo {
    epoch: u64,
    entries: HashMap<DepNode, Arc<[AssetGuid]>>,
}

/// Forward and reverse adjacency of assets and files.
#[derive(Default)]
pub struct DependencyGraph {
    transform: DiGraphMap<DepNode, ()>,
    references: DiGraphMap<DepNode, ()>,
    cyclic: HashSet<AssetGuid>,
    epoch: u64,
    memo: Mutex<DependentsMemo>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the transform dependencies of `guid`.
    ///
    /// Old and new edge sets are diffed so that unrelated edges are left
    /// untouched. Every added edge is checked for closing a cycle; the first
    /// cycle found is returned as a node path starting and ending at `guid`.
    pub fn set_dependencies(&mut self, guid: AssetGuid, deps: &[DepNode]) -> Option<Vec<DepNode>> {
        let node = DepNode::Asset(guid);
        self.transform.add_node(node);
        self.references.add_node(node);

        let old: HashSet<DepNode> = self.transform.neighbors_directed(node, Outgoing).collect();
        let new: HashSet<DepNode> = deps.iter().copied().collect();
        if old == new {
            return None;
        }

        let mut removed_any = false;
        for gone in old.difference(&new) {
            self.transform.remove_edge(node, *gone);
            self.prune(*gone);
            removed_any = true;
        }

        let mut cycle = None;
        let mut added: Vec<DepNode> = new.difference(&old).copied().collect();
        added.sort();
        for dep in added {
            self.transform.add_edge(node, dep, ());
            if cycle.is_none() {
                if let Some(mut path) = self.find_path(dep, node) {
                    path.insert(0, node);
                    cycle = Some(path);
                }
            }
        }

        if cycle.is_some() || (removed_any && !self.cyclic.is_empty()) {
            self.recompute_cyclic();
        }
        self.bump();
        cycle
    }

    /// Replaces the weak references of `guid`.
    pub fn set_references(&mut self, guid: AssetGuid, refs: &[DepNode]) {
        let node = DepNode::Asset(guid);
        self.references.add_node(node);
        self.transform.add_node(node);

        let old: HashSet<DepNode> = self.references.neighbors_directed(node, Outgoing).collect();
        let new: HashSet<DepNode> = refs.iter().copied().collect();
        if old == new {
            return;
        }
        for gone in old.difference(&new) {
            self.references.remove_edge(node, *gone);
            self.prune(*gone);
        }
        for added in new.difference(&old) {
            self.references.add_edge(node, *added, ());
        }
        self.bump();
    }

    /// Removes the outgoing edges of `guid`.
    ///
    /// Incoming edges stay: assets depending on a removed asset keep a
    /// dangling edge that resolves again if the asset reappears.
    pub fn remove_asset(&mut self, guid: AssetGuid) {
        let node = DepNode::Asset(guid);
        let deps: Vec<DepNode> = self.transform.neighbors_directed(node, Outgoing).collect();
        let refs: Vec<DepNode> = self.references.neighbors_directed(node, Outgoing).collect();
        for dep in deps {
            self.transform.remove_edge(node, dep);
            self.prune(dep);
        }
        for r in refs {
            self.references.remove_edge(node, r);
            self.prune(r);
        }
        self.prune(node);
        if self.cyclic.contains(&guid) {
            self.recompute_cyclic();
        }
        self.bump();
    }

    /// Returns `true` if `node` appears in either graph.
    pub fn contains(&self, node: DepNode) -> bool {
        self.transform.contains_node(node) || self.references.contains_node(node)
    }

    /// Direct transform dependencies of `guid`, sorted.
    pub fn direct_dependencies(&self, guid: AssetGuid) -> Vec<DepNode> {
        sorted(self.neighbors(&self.transform, DepNode::Asset(guid), Outgoing))
    }

    /// Direct references of `guid`, sorted.
    pub fn direct_references(&self, guid: AssetGuid) -> Vec<DepNode> {
        sorted(self.neighbors(&self.references, DepNode::Asset(guid), Outgoing))
    }

    /// Everything `guid` transitively depends on, in breadth-first order.
    pub fn transitive_dependencies(&self, guid: AssetGuid) -> Vec<DepNode> {
        bfs(&self.transform, DepNode::Asset(guid), Outgoing)
    }

    /// Every asset whose transform is affected by `node`, in breadth-first
    /// order.
    ///
    /// Results are memoized until the next structural change, so a burst of
    /// change notifications does not rescan the graph for each one.
    pub fn transitive_dependents(&self, node: DepNode) -> Arc<[AssetGuid]> {
        let mut memo = self.memo.lock();
        if memo.epoch != self.epoch {
            memo.entries.clear();
            memo.epoch = self.epoch;
        }
        if let Some(hit) = memo.entries.get(&node) {
            return Arc::clone(hit);
        }
        let dependents: Arc<[AssetGuid]> = bfs(&self.transform, node, Incoming)
            .into_iter()
            .filter_map(DepNode::as_asset)
            .collect();
        memo.entries.insert(node, Arc::clone(&dependents));
        dependents
    }

    /// Assets that depend on or reference `node`; transitively if requested.
    pub fn users(&self, node: DepNode, transitive: bool) -> BTreeSet<AssetGuid> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([node]);
        while let Some(current) = queue.pop_front() {
            let incoming = self
                .neighbors(&self.transform, current, Incoming)
                .chain(self.neighbors(&self.references, current, Incoming));
            for user in incoming.filter_map(DepNode::as_asset) {
                if seen.insert(user) && transitive {
                    queue.push_back(DepNode::Asset(user));
                }
            }
        }
        if let Some(own) = node.as_asset() {
            seen.remove(&own);
        }
        seen
    }

    /// Returns `true` if any asset's transform depends on `node`.
    pub fn has_dependents(&self, node: DepNode) -> bool {
        self.neighbors(&self.transform, node, Incoming).next().is_some()
    }

    /// Returns `true` if `guid` is part of a dependency cycle.
    pub fn is_cyclic(&self, guid: AssetGuid) -> bool {
        self.cyclic.contains(&guid)
    }

    /// All assets that are part of a dependency cycle.
    pub fn cyclic_assets(&self) -> &HashSet<AssetGuid> {
        &self.cyclic
    }

    /// Searches the whole transform graph for a cycle.
    ///
    /// Returns one cycle as a node path whose first and last element are the
    /// same node.
    pub fn detect_cycle(&self) -> Option<Vec<DepNode>> {
        for component in tarjan_scc(&self.transform) {
            let Some(&start) = component.iter().min() else {
                continue;
            };
            if component.len() == 1 && !self.transform.contains_edge(start, start) {
                continue;
            }
            let mut path = vec![start];
            let mut successors: Vec<DepNode> =
                self.transform.neighbors_directed(start, Outgoing).collect();
            successors.sort();
            for next in successors {
                if let Some(rest) = self.find_path(next, start) {
                    path.extend(rest);
                    return Some(path);
                }
            }
        }
        None
    }

    /// Computes the transform order for `roots` and their dependency closure.
    ///
    /// Uses Kahn's algorithm over the asset nodes of the closure. Nodes left
    /// over once no more progress is possible are cycle members or depend on
    /// one; they are returned as `blocked` while everything else is
    /// scheduled.
    pub fn schedule(&self, roots: &[AssetGuid]) -> Schedule {
        let mut closure: HashSet<AssetGuid> = HashSet::new();
        let mut queue: VecDeque<AssetGuid> = roots.iter().copied().collect();
        while let Some(guid) = queue.pop_front() {
            if !closure.insert(guid) {
                continue;
            }
            queue.extend(
                self.neighbors(&self.transform, DepNode::Asset(guid), Outgoing)
                    .filter_map(DepNode::as_asset),
            );
        }

        let mut pending: HashMap<AssetGuid, usize> = closure
            .iter()
            .map(|&guid| {
                let count = self
                    .neighbors(&self.transform, DepNode::Asset(guid), Outgoing)
                    .filter_map(DepNode::as_asset)
                    .filter(|d| closure.contains(d))
                    .count();
                (guid, count)
            })
            .collect();

        let mut ready: Vec<AssetGuid> = pending
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&guid, _)| guid)
            .collect();
        let mut generations = Vec::new();
        while !ready.is_empty() {
            ready.sort();
            let mut next = Vec::new();
            for guid in &ready {
                pending.remove(guid);
                for dependent in self
                    .neighbors(&self.transform, DepNode::Asset(*guid), Incoming)
                    .filter_map(DepNode::as_asset)
                {
                    if let Some(count) = pending.get_mut(&dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(dependent);
                        }
                    }
                }
            }
            generations.push(std::mem::replace(&mut ready, next));
        }

        let mut blocked: Vec<AssetGuid> = pending.into_keys().collect();
        blocked.sort();
        Schedule {
            generations,
            blocked,
        }
    }

    /// Renders the dependency and reference hull of `guid` as Graphviz DOT.
    ///
    /// Reference edges are dashed. `label` names each node.
    pub fn to_dot(&self, guid: AssetGuid, label: impl Fn(DepNode) -> String) -> String {
        let root = DepNode::Asset(guid);
        let mut order = vec![root];
        let mut seen: HashSet<DepNode> = HashSet::from([root]);
        let mut edges: Vec<(DepNode, DepNode, EdgeKind)> = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            let outgoing = sorted(self.neighbors(&self.transform, current, Outgoing))
                .into_iter()
                .map(|n| (n, EdgeKind::Dependency))
                .chain(
                    sorted(self.neighbors(&self.references, current, Outgoing))
                        .into_iter()
                        .map(|n| (n, EdgeKind::Reference)),
                );
            for (next, kind) in outgoing {
                edges.push((current, next, kind));
                if seen.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }

        let mut graph: petgraph::Graph<String, EdgeKind> = petgraph::Graph::new();
        let index: HashMap<DepNode, _> = order
            .iter()
            .map(|&node| (node, graph.add_node(label(node))))
            .collect();
        for (from, to, kind) in edges {
            graph.add_edge(index[&from], index[&to], kind);
        }

        let dot = Dot::with_attr_getters(
            &graph,
            &[Config::EdgeNoLabel],
            &|_, edge| match edge.weight() {
                EdgeKind::Reference => "style = dashed".to_string(),
                EdgeKind::Dependency => String::new(),
            },
            &|_, _| String::new(),
        );
        format!("{dot}")
    }

    fn neighbors<'a>(
        &'a self,
        graph: &'a DiGraphMap<DepNode, ()>,
        node: DepNode,
        dir: petgraph::Direction,
    ) -> impl Iterator<Item = DepNode> + 'a {
        graph
            .contains_node(node)
            .then(|| graph.neighbors_directed(node, dir))
            .into_iter()
            .flatten()
    }

    /// Breadth-first path from `from` to `to` along outgoing transform edges.
    fn find_path(&self, from: DepNode, to: DepNode) -> Option<Vec<DepNode>> {
        let mut parent: HashMap<DepNode, DepNode> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        let mut seen: HashSet<DepNode> = HashSet::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![current];
                let mut cursor = current;
                while let Some(&prev) = parent.get(&cursor) {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.transform.neighbors_directed(current, Outgoing) {
                if seen.insert(next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    fn recompute_cyclic(&mut self) {
        self.cyclic.clear();
        for component in tarjan_scc(&self.transform) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| self.transform.contains_edge(n, n));
            if is_cycle {
                self.cyclic
                    .extend(component.into_iter().filter_map(DepNode::as_asset));
            }
        }
    }

    /// Drops `node` from a graph once nothing links to or from it.
    fn prune(&mut self, node: DepNode) {
        for graph in [&mut self.transform, &mut self.references] {
            if graph.contains_node(node)
                && graph.neighbors_directed(node, Incoming).next().is_none()
                && graph.neighbors_directed(node, Outgoing).next().is_none()
            {
                graph.remove_node(node);
            }
        }
    }

    fn bump(&mut self) {
        self.epoch += 1;
    }
}

fn sorted(iter: impl Iterator<Item = DepNode>) -> Vec<DepNode> {
    let mut nodes: Vec<DepNode> = iter.collect();
    nodes.sort();
    nodes
}

fn bfs(graph: &DiGraphMap<DepNode, ()>, start: DepNode, dir: petgraph::Direction) -> Vec<DepNode> {
    if !graph.contains_node(start) {
        return Vec::new();
    }
    let mut seen: HashSet<DepNode> = HashSet::from([start]);
    let mut order = Vec::new();
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        let mut next: Vec<DepNode> = graph.neighbors_directed(current, dir).collect();
        next.sort();
        for n in next {
            if seen.insert(n) {
                order.push(n);
                queue.push_back(n);
            }
        }
    }
    order
}

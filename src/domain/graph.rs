//! Condition/logic/action graph compilation and per-bar evaluation.
//!
//! The graph is stored as an arena: nodes live in a `Vec`, edges become
//! per-node input index lists, and a topological order is computed once at
//! compile time. Each bar evaluates every node in that order into a fresh
//! result array indexed by node position.
//!
//! # Evaluation Semantics
//!
//! - Condition: the entry/exit state of its Signal Library evaluator
//! - `AND`: both channels are the conjunction of the inputs
//! - `OR`: both channels are the disjunction of the inputs
//! - `NOT`: negates both channels of its single input
//! - Buy action: fires when every input's entry channel is true and the
//!   position is flat
//! - Sell action: fires when every input's exit channel is true and the
//!   position is long
//! - Hold action: never trades
//! - Nodes without inputs evaluate false
//! - The first firing action in topological order wins the bar

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::domain::error::EngineError;
use crate::domain::ohlcv::BarSeries;
use crate::domain::signal::{Action, PositionState, Signal, SignalSpec, SignalState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Condition,
    Logic,
    Action,
}

/// A node as declared in strategy JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDef {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Buy { quantity: Option<i64> },
    Sell,
    Hold,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeOp {
    Condition(SignalSpec),
    Logic(LogicOp),
    Action(ActionKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub op: NodeOp,
}

/// A validated, topologically ordered strategy graph.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    nodes: Vec<GraphNode>,
    inputs: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl CompiledGraph {
    pub fn compile(nodes: &[NodeDef], edges: &[EdgeDef]) -> Result<Self, EngineError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
        let mut compiled = Vec::with_capacity(nodes.len());
        for def in nodes {
            if index.insert(def.id.as_str(), compiled.len()).is_some() {
                return Err(EngineError::strategy(format!("duplicate node id '{}'", def.id)));
            }
            compiled.push(GraphNode {
                id: def.id.clone(),
                op: parse_op(def)?,
            });
        }

        let mut inputs = vec![Vec::new(); compiled.len()];
        let mut has_output = vec![false; compiled.len()];
        for edge in edges {
            let lookup = |id: &str| {
                index
                    .get(id)
                    .copied()
                    .ok_or_else(|| EngineError::strategy(format!("edge references unknown node '{id}'")))
            };
            let source = lookup(&edge.source)?;
            let target = lookup(&edge.target)?;
            if matches!(compiled[source].op, NodeOp::Action(_)) {
                return Err(EngineError::strategy(format!(
                    "action node '{}' cannot feed other nodes",
                    edge.source
                )));
            }
            inputs[target].push(source);
            has_output[source] = true;
        }

        for (i, node) in compiled.iter().enumerate() {
            if node.op == NodeOp::Logic(LogicOp::Not) && inputs[i].len() != 1 {
                return Err(EngineError::strategy(format!(
                    "NOT node '{}' needs exactly one input, has {}",
                    node.id,
                    inputs[i].len()
                )));
            }
        }

        // Without explicit actions, the sinks drive an implicit buy and sell.
        let has_actions = compiled.iter().any(|n| matches!(n.op, NodeOp::Action(_)));
        if !has_actions {
            let sinks: Vec<usize> = (0..compiled.len()).filter(|&i| !has_output[i]).collect();
            if !sinks.is_empty() {
                for (id, kind) in [
                    ("__buy", ActionKind::Buy { quantity: None }),
                    ("__sell", ActionKind::Sell),
                ] {
                    compiled.push(GraphNode {
                        id: id.to_string(),
                        op: NodeOp::Action(kind),
                    });
                    inputs.push(sinks.clone());
                }
            }
        }

        let order = topological_order(&inputs)?;
        Ok(Self {
            nodes: compiled,
            inputs,
            order,
        })
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn condition_count(&self) -> usize {
        self.count(|op| matches!(op, NodeOp::Condition(_)))
    }

    pub fn logic_count(&self) -> usize {
        self.count(|op| matches!(op, NodeOp::Logic(_)))
    }

    pub fn action_count(&self) -> usize {
        self.count(|op| matches!(op, NodeOp::Action(_)))
    }

    fn count(&self, pred: impl Fn(&NodeOp) -> bool) -> usize {
        self.nodes.iter().filter(|n| pred(&n.op)).count()
    }

    /// The first declared condition node's signal spec.
    pub fn first_condition(&self) -> Option<&SignalSpec> {
        self.nodes.iter().find_map(|n| match &n.op {
            NodeOp::Condition(spec) => Some(spec),
            _ => None,
        })
    }
}

/// Kahn's algorithm over the input lists. Ties keep declaration order.
fn topological_order(inputs: &[Vec<usize>]) -> Result<Vec<usize>, EngineError> {
    let n = inputs.len();
    let mut outputs = vec![Vec::new(); n];
    let mut pending: Vec<usize> = inputs.iter().map(Vec::len).collect();
    for (target, sources) in inputs.iter().enumerate() {
        for &source in sources {
            outputs[source].push(target);
        }
    }

    let mut ready: VecDeque<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(node) = ready.pop_front() {
        order.push(node);
        for &next in &outputs[node] {
            pending[next] -= 1;
            if pending[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() != n {
        return Err(EngineError::strategy("strategy graph contains a cycle"));
    }
    Ok(order)
}

fn data_str<'a>(data: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| data.get(*k).and_then(|v| v.as_str()))
}

fn parse_op(def: &NodeDef) -> Result<NodeOp, EngineError> {
    match def.kind {
        NodeKind::Condition => {
            let sub_type = data_str(&def.data, &["subType", "type"]).unwrap_or("ma");
            match SignalSpec::from_condition(sub_type, &def.data)? {
                Some(spec) => Ok(NodeOp::Condition(spec)),
                None => {
                    warn!(
                        "condition '{}' has unknown sub-type '{}', using MA cross",
                        def.id, sub_type
                    );
                    let spec = SignalSpec::from_condition("ma", &def.data)?
                        .unwrap_or_default();
                    Ok(NodeOp::Condition(spec))
                }
            }
        }
        NodeKind::Logic => {
            let op = data_str(&def.data, &["subType", "type", "logic", "operator"]).unwrap_or("AND");
            match op.to_ascii_uppercase().as_str() {
                "AND" => Ok(NodeOp::Logic(LogicOp::And)),
                "OR" => Ok(NodeOp::Logic(LogicOp::Or)),
                "NOT" => Ok(NodeOp::Logic(LogicOp::Not)),
                other => Err(EngineError::strategy(format!(
                    "logic node '{}' has unknown operator '{}'",
                    def.id, other
                ))),
            }
        }
        NodeKind::Action => {
            let action = data_str(&def.data, &["subType", "type", "action"]).ok_or_else(|| {
                EngineError::strategy(format!("action node '{}' has no action type", def.id))
            })?;
            let quantity = def
                .data
                .get("quantity")
                .and_then(|q| q.as_f64())
                .filter(|q| *q > 0.0)
                .map(|q| q.floor() as i64);
            match action.to_ascii_lowercase().as_str() {
                "buy" => Ok(NodeOp::Action(ActionKind::Buy { quantity })),
                "sell" => Ok(NodeOp::Action(ActionKind::Sell)),
                "hold" => Ok(NodeOp::Action(ActionKind::Hold)),
                other => Err(EngineError::strategy(format!(
                    "action node '{}' has unknown action '{}'",
                    def.id, other
                ))),
            }
        }
    }
}

/// Outcome of one bar's evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    /// Entry/exit conditions observed this bar, before position gating.
    pub state: SignalState,
}

/// Evaluates a compiled graph bar by bar against one series.
#[derive(Debug)]
pub struct GraphEvaluator {
    graph: CompiledGraph,
    signals: Vec<Option<Box<dyn Signal>>>,
    start: usize,
}

impl GraphEvaluator {
    pub fn new(graph: CompiledGraph, series: &BarSeries) -> Self {
        let signals: Vec<Option<Box<dyn Signal>>> = graph
            .nodes
            .iter()
            .map(|n| match &n.op {
                NodeOp::Condition(spec) => Some(spec.build(series)),
                _ => None,
            })
            .collect();
        let start = signals
            .iter()
            .flatten()
            .map(|s| s.start_index())
            .max()
            .unwrap_or(0);
        debug!(
            "graph evaluator: {} nodes, {} conditions, start index {}",
            graph.nodes.len(),
            graph.condition_count(),
            start
        );
        Self {
            graph,
            signals,
            start,
        }
    }

    pub fn start_index(&self) -> usize {
        self.start
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    pub fn evaluate(&self, index: usize, position: PositionState) -> Decision {
        let mut results = vec![SignalState::NONE; self.graph.nodes.len()];
        let mut action = Action::Hold;
        let mut observed = SignalState::NONE;

        for &node in &self.graph.order {
            let inputs = &self.graph.inputs[node];
            let states: Vec<SignalState> = inputs.iter().map(|&i| results[i]).collect();
            results[node] = match &self.graph.nodes[node].op {
                NodeOp::Condition(_) => self.signals[node]
                    .as_ref()
                    .map_or(SignalState::NONE, |s| s.state(index)),
                NodeOp::Logic(_) if inputs.is_empty() => SignalState::NONE,
                NodeOp::Logic(LogicOp::And) => SignalState::new(
                    states.iter().all(|s| s.entry),
                    states.iter().all(|s| s.exit),
                ),
                NodeOp::Logic(LogicOp::Or) => SignalState::new(
                    states.iter().any(|s| s.entry),
                    states.iter().any(|s| s.exit),
                ),
                NodeOp::Logic(LogicOp::Not) => {
                    let s = states[0];
                    SignalState::new(!s.entry, !s.exit)
                }
                NodeOp::Action(kind) => {
                    let ready = !inputs.is_empty()
                        && match kind {
                            ActionKind::Buy { .. } => states.iter().all(|s| s.entry),
                            ActionKind::Sell => states.iter().all(|s| s.exit),
                            ActionKind::Hold => false,
                        };
                    if ready {
                        match *kind {
                            ActionKind::Buy { quantity } => {
                                observed.entry = true;
                                if position == PositionState::Flat && action == Action::Hold {
                                    action = Action::Buy { quantity };
                                }
                            }
                            ActionKind::Sell => {
                                observed.exit = true;
                                if position == PositionState::Long && action == Action::Hold {
                                    action = Action::Sell;
                                }
                            }
                            ActionKind::Hold => {}
                        }
                    }
                    SignalState::NONE
                }
            };
        }

        Decision {
            action,
            state: observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::test_support::series;
    use serde_json::json;

    fn node(id: &str, kind: NodeKind, data: serde_json::Value) -> NodeDef {
        NodeDef {
            id: id.into(),
            kind,
            data,
        }
    }

    fn edge(source: &str, target: &str) -> EdgeDef {
        EdgeDef {
            source: source.into(),
            target: target.into(),
        }
    }

    fn step_closes() -> Vec<f64> {
        (0..60).map(|i| if i < 30 { 100.0 } else { 110.0 }).collect()
    }

    #[test]
    fn cycle_is_rejected() {
        let nodes = vec![
            node("a", NodeKind::Logic, json!({"type": "AND"})),
            node("b", NodeKind::Logic, json!({"type": "OR"})),
        ];
        let edges = vec![edge("a", "b"), edge("b", "a")];
        assert!(matches!(
            CompiledGraph::compile(&nodes, &edges),
            Err(EngineError::StrategyInvalid { .. })
        ));
    }

    #[test]
    fn unknown_edge_endpoint_is_rejected() {
        let nodes = vec![node("a", NodeKind::Condition, json!({"subType": "rsi"}))];
        let edges = vec![edge("a", "ghost")];
        assert!(CompiledGraph::compile(&nodes, &edges).is_err());
    }

    #[test]
    fn not_requires_single_input() {
        let nodes = vec![
            node("c1", NodeKind::Condition, json!({"subType": "rsi"})),
            node("c2", NodeKind::Condition, json!({"subType": "ma"})),
            node("n", NodeKind::Logic, json!({"type": "NOT"})),
        ];
        let edges = vec![edge("c1", "n"), edge("c2", "n")];
        assert!(CompiledGraph::compile(&nodes, &edges).is_err());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let nodes = vec![
            node("a", NodeKind::Condition, json!({})),
            node("a", NodeKind::Condition, json!({})),
        ];
        assert!(CompiledGraph::compile(&nodes, &[]).is_err());
    }

    #[test]
    fn topological_order_respects_edges() {
        let nodes = vec![
            node("buy", NodeKind::Action, json!({"type": "buy"})),
            node("and", NodeKind::Logic, json!({"type": "AND"})),
            node("c", NodeKind::Condition, json!({"subType": "ma"})),
        ];
        let edges = vec![edge("c", "and"), edge("and", "buy")];
        let graph = CompiledGraph::compile(&nodes, &edges).unwrap();
        let pos = |id: &str| {
            let idx = graph.nodes().iter().position(|n| n.id == id).unwrap();
            graph.order().iter().position(|&o| o == idx).unwrap()
        };
        assert!(pos("c") < pos("and"));
        assert!(pos("and") < pos("buy"));
    }

    #[test]
    fn unknown_condition_falls_back_to_ma() {
        let nodes = vec![node("c", NodeKind::Condition, json!({"subType": "kdj", "period": 30}))];
        let graph = CompiledGraph::compile(&nodes, &[]).unwrap();
        assert_eq!(
            graph.first_condition(),
            Some(&SignalSpec::MaCross(crate::domain::signal::MaCrossParams { period: 30 }))
        );
    }

    #[test]
    fn implicit_actions_are_synthesized_from_sinks() {
        let nodes = vec![node("c", NodeKind::Condition, json!({"subType": "ma"}))];
        let graph = CompiledGraph::compile(&nodes, &[]).unwrap();
        assert_eq!(graph.action_count(), 2);
        assert_eq!(graph.condition_count(), 1);
    }

    #[test]
    fn condition_to_buy_fires_on_cross_while_flat() {
        let closes = step_closes();
        let s = series(&closes);
        let nodes = vec![
            node("c", NodeKind::Condition, json!({"subType": "ma", "period": 20})),
            node("buy", NodeKind::Action, json!({"type": "buy", "quantity": 300})),
        ];
        let graph = CompiledGraph::compile(&nodes, &[edge("c", "buy")]).unwrap();
        let eval = GraphEvaluator::new(graph, &s);

        assert_eq!(eval.start_index(), 20);
        let fired: Vec<usize> = (0..closes.len())
            .filter(|&i| eval.evaluate(i, PositionState::Flat).action != Action::Hold)
            .collect();
        assert_eq!(fired, vec![30]);
        assert_eq!(
            eval.evaluate(30, PositionState::Flat).action,
            Action::Buy { quantity: Some(300) }
        );
        // already long: the condition is observed but the buy is gated
        let decision = eval.evaluate(30, PositionState::Long);
        assert_eq!(decision.action, Action::Hold);
        assert!(decision.state.entry);
    }

    #[test]
    fn and_requires_all_inputs() {
        let closes = step_closes();
        let s = series(&closes);
        let nodes = vec![
            node("ma", NodeKind::Condition, json!({"subType": "ma"})),
            // volume never surges on constant volume
            node("vol", NodeKind::Condition, json!({"subType": "volume"})),
            node("and", NodeKind::Logic, json!({"type": "AND"})),
            node("or", NodeKind::Logic, json!({"type": "OR"})),
            node("buy_and", NodeKind::Action, json!({"type": "buy"})),
            node("buy_or", NodeKind::Action, json!({"type": "buy", "quantity": 7})),
        ];
        let edges = vec![
            edge("ma", "and"),
            edge("vol", "and"),
            edge("ma", "or"),
            edge("vol", "or"),
            edge("and", "buy_and"),
            edge("or", "buy_or"),
        ];
        let graph = CompiledGraph::compile(&nodes, &edges).unwrap();
        let eval = GraphEvaluator::new(graph, &s);
        assert_eq!(
            eval.evaluate(30, PositionState::Flat).action,
            Action::Buy { quantity: Some(7) }
        );
    }

    #[test]
    fn not_negates_its_input() {
        let closes = step_closes();
        let s = series(&closes);
        let nodes = vec![
            node("vol", NodeKind::Condition, json!({"subType": "volume"})),
            node("not", NodeKind::Logic, json!({"type": "NOT"})),
            node("sell", NodeKind::Action, json!({"type": "sell"})),
        ];
        let edges = vec![edge("vol", "not"), edge("not", "sell")];
        let graph = CompiledGraph::compile(&nodes, &edges).unwrap();
        let eval = GraphEvaluator::new(graph, &s);
        // volume has no exit rule, so NOT(volume) always wants to exit
        assert_eq!(eval.evaluate(10, PositionState::Long).action, Action::Sell);
        assert_eq!(eval.evaluate(10, PositionState::Flat).action, Action::Hold);
    }

    #[test]
    fn action_without_inputs_never_fires() {
        let closes = step_closes();
        let s = series(&closes);
        let nodes = vec![
            node("c", NodeKind::Condition, json!({"subType": "ma"})),
            node("buy", NodeKind::Action, json!({"type": "buy"})),
        ];
        let graph = CompiledGraph::compile(&nodes, &[]).unwrap();
        let eval = GraphEvaluator::new(graph, &s);
        assert!((0..closes.len()).all(|i| eval.evaluate(i, PositionState::Flat).action == Action::Hold));
    }

    #[test]
    fn action_cannot_feed_nodes() {
        let nodes = vec![
            node("buy", NodeKind::Action, json!({"type": "buy"})),
            node("and", NodeKind::Logic, json!({"type": "AND"})),
        ];
        assert!(CompiledGraph::compile(&nodes, &[edge("buy", "and")]).is_err());
    }
}

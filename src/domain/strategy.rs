//! Strategy definitions and their compiled, runnable form.
//!
//! A definition is either a flat signal record (`signal`) or a node graph.
//! Graphs with no condition nodes run the default MA trend strategy.

use log::info;
use serde::{Deserialize, Serialize};

use crate::domain::error::EngineError;
use crate::domain::graph::{CompiledGraph, Decision, EdgeDef, GraphEvaluator, NodeDef, NodeOp};
use crate::domain::ohlcv::BarSeries;
use crate::domain::signal::{Action, PositionState, Signal, SignalSpec};

/// How a graph with condition nodes is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Run only the first condition node's signal, with its own entry and
    /// exit rules, and ignore the rest of the graph.
    #[default]
    FirstCondition,
    /// Evaluate every node each bar in topological order. Sells happen only
    /// through sell actions.
    Topological,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLossKind {
    Pct,
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLossAction {
    #[default]
    SellAll,
    ReduceHalf,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopLoss {
    #[serde(rename = "type")]
    pub kind: StopLossKind,
    pub value: f64,
    #[serde(default)]
    pub action: StopLossAction,
}

impl StopLoss {
    /// True once the unrealized loss against `cost_basis` reaches the threshold.
    /// A non-positive `value` disables the stop.
    pub fn is_triggered(&self, cost_basis: f64, market_value: f64) -> bool {
        if self.value <= 0.0 {
            return false;
        }
        let loss = (cost_basis - market_value).max(0.0);
        match self.kind {
            StopLossKind::Pct => loss >= cost_basis * self.value / 100.0,
            StopLossKind::Amount => loss >= self.value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "stopLoss")]
    pub stop_loss: Option<StopLoss>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
    #[serde(default)]
    pub signal: Option<SignalSpec>,
    #[serde(default)]
    pub meta: StrategyMeta,
    #[serde(default)]
    pub mode: EvaluationMode,
}

/// What a definition resolves to before it is bound to a series.
#[derive(Debug, Clone)]
pub enum StrategyPlan {
    Signal(SignalSpec),
    Graph(CompiledGraph),
}

impl StrategyDefinition {
    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        serde_json::from_str(text).map_err(|e| EngineError::strategy(e.to_string()))
    }

    /// Validate the definition and decide which evaluator runs it.
    pub fn plan(&self) -> Result<StrategyPlan, EngineError> {
        if let Some(spec) = &self.signal {
            spec.validate()?;
            return Ok(StrategyPlan::Signal(spec.clone()));
        }

        let graph = CompiledGraph::compile(&self.nodes, &self.edges)?;
        if graph.condition_count() == 0 {
            info!("no condition nodes, using default MA trend strategy");
            return Ok(StrategyPlan::Signal(SignalSpec::default()));
        }
        for node in graph.nodes() {
            if let NodeOp::Condition(spec) = &node.op {
                spec.validate()?;
            }
        }

        match self.mode {
            EvaluationMode::Topological => Ok(StrategyPlan::Graph(graph)),
            EvaluationMode::FirstCondition => {
                let spec = graph.first_condition().cloned().unwrap_or_default();
                Ok(StrategyPlan::Signal(spec))
            }
        }
    }

    pub fn stop_loss(&self) -> Option<StopLoss> {
        self.meta.stop_loss
    }
}

impl StrategyPlan {
    pub fn bind(self, series: &BarSeries) -> Strategy {
        match self {
            StrategyPlan::Signal(spec) => Strategy::Signal(spec.build(series)),
            StrategyPlan::Graph(graph) => Strategy::Graph(GraphEvaluator::new(graph, series)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            StrategyPlan::Signal(spec) => format!("signal {}", spec.kind()),
            StrategyPlan::Graph(graph) => format!(
                "graph ({} conditions, {} logic, {} actions)",
                graph.condition_count(),
                graph.logic_count(),
                graph.action_count()
            ),
        }
    }
}

/// A strategy bound to one bar series.
#[derive(Debug)]
pub enum Strategy {
    Signal(Box<dyn Signal>),
    Graph(GraphEvaluator),
}

impl Strategy {
    pub fn start_index(&self) -> usize {
        match self {
            Strategy::Signal(signal) => signal.start_index(),
            Strategy::Graph(graph) => graph.start_index(),
        }
    }

    pub fn decide(&self, index: usize, position: PositionState) -> Decision {
        match self {
            Strategy::Signal(signal) => {
                let state = signal.state(index);
                Decision {
                    action: Action::gate(state, position),
                    state,
                }
            }
            Strategy::Graph(graph) => graph.evaluate(index, position),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Signal(signal) => signal.name(),
            Strategy::Graph(_) => "graph",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(value: serde_json::Value) -> StrategyDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn empty_definition_uses_default_ma_trend() {
        let plan = definition(json!({})).plan().unwrap();
        assert!(matches!(plan, StrategyPlan::Signal(SignalSpec::MaTrend(_))));
    }

    #[test]
    fn graph_without_conditions_uses_default() {
        let def = definition(json!({
            "nodes": [{"id": "a", "type": "action", "data": {"type": "buy"}}]
        }));
        assert!(matches!(
            def.plan().unwrap(),
            StrategyPlan::Signal(SignalSpec::MaTrend(_))
        ));
    }

    #[test]
    fn flat_signal_takes_precedence() {
        let def = definition(json!({
            "signal": {"type": "volume", "multiplier": 2.0},
            "nodes": [{"id": "c", "type": "condition", "data": {"subType": "rsi"}}]
        }));
        assert!(matches!(
            def.plan().unwrap(),
            StrategyPlan::Signal(SignalSpec::Volume(_))
        ));
    }

    #[test]
    fn graph_defaults_to_first_condition() {
        let def = definition(json!({
            "nodes": [
                {"id": "c", "type": "condition", "data": {"subType": "ma", "period": 20}},
                {"id": "a", "type": "action", "data": {"type": "buy"}}
            ],
            "edges": [{"source": "c", "target": "a"}]
        }));
        assert_eq!(def.mode, EvaluationMode::FirstCondition);
        assert!(matches!(
            def.plan().unwrap(),
            StrategyPlan::Signal(SignalSpec::MaCross(ref p)) if p.period == 20
        ));
    }

    #[test]
    fn first_condition_mode_selects_first_node() {
        let def = definition(json!({
            "mode": "first_condition",
            "nodes": [
                {"id": "c1", "type": "condition", "data": {"subType": "bollinger"}},
                {"id": "c2", "type": "condition", "data": {"subType": "rsi"}}
            ]
        }));
        assert!(matches!(
            def.plan().unwrap(),
            StrategyPlan::Signal(SignalSpec::Bollinger(_))
        ));
    }

    #[test]
    fn topological_mode_keeps_graph() {
        let def = definition(json!({
            "mode": "topological",
            "nodes": [
                {"id": "c1", "type": "condition", "data": {"subType": "rsi"}},
                {"id": "buy", "type": "action", "data": {"type": "buy"}}
            ],
            "edges": [{"source": "c1", "target": "buy"}]
        }));
        let plan = def.plan().unwrap();
        assert!(matches!(plan, StrategyPlan::Graph(_)));
        assert_eq!(plan.describe(), "graph (1 conditions, 0 logic, 1 actions)");
    }

    #[test]
    fn zero_period_condition_rejected() {
        let def = definition(json!({
            "nodes": [{"id": "c1", "type": "condition", "data": {"subType": "rsi", "period": 0}}]
        }));
        assert!(matches!(def.plan(), Err(EngineError::StrategyInvalid { .. })));
    }

    #[test]
    fn stop_loss_parses_from_meta() {
        let def = definition(json!({
            "meta": {"stop_loss": {"type": "pct", "value": 5, "action": "reduce_half"}}
        }));
        let sl = def.stop_loss().unwrap();
        assert_eq!(sl.kind, StopLossKind::Pct);
        assert_eq!(sl.action, StopLossAction::ReduceHalf);
    }

    #[test]
    fn stop_loss_thresholds() {
        let pct = StopLoss {
            kind: StopLossKind::Pct,
            value: 10.0,
            action: StopLossAction::SellAll,
        };
        assert!(!pct.is_triggered(1000.0, 901.0));
        assert!(pct.is_triggered(1000.0, 900.0));

        let amount = StopLoss {
            kind: StopLossKind::Amount,
            value: 50.0,
            ..pct
        };
        assert!(amount.is_triggered(1000.0, 950.0));
        assert!(!amount.is_triggered(1000.0, 1200.0));

        let disabled = StopLoss { value: 0.0, ..pct };
        assert!(!disabled.is_triggered(1000.0, 1.0));
    }

    #[test]
    fn malformed_json_is_strategy_error() {
        assert!(matches!(
            StrategyDefinition::from_json("{ nodes: "),
            Err(EngineError::StrategyInvalid { .. })
        ));
    }
}

//! 规则执行器
//!
//! 顶层条件按隐式 AND 组合；全部满足时把动作参数复制为 [`ResolvedAction`]。
//! 执行器只负责“解析”动作，从不执行动作。

use crate::error::DiagnosticKind;
use crate::evaluator::{ConditionEvaluator, DEFAULT_MAX_DEPTH, Diagnostics};
use crate::models::{ActionSpec, ConditionNode, Payload, ResolvedAction, Rule};
use crate::report::EvaluationReport;
use crate::resolver::{FieldResolver, PathResolver};
use erp_shared::config::EngineConfig;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// 规则执行器
///
/// 不持有任何可变状态，可在多个线程间共享（`Clone` 只复制解析器的 `Arc`）。
#[derive(Clone)]
pub struct RuleExecutor {
    resolver: Arc<dyn FieldResolver>,
    max_depth: usize,
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(PathResolver),
            max_depth: DEFAULT_MAX_DEPTH,
            trace_enabled: false,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            trace_enabled: config.trace_enabled,
            ..Self::new()
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 替换字段解析器
    pub fn with_resolver(mut self, resolver: Arc<dyn FieldResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// 评估一条规则定义
    pub fn execute(&self, rule: &Rule, payload: &Payload) -> EvaluationReport {
        self.evaluate_rule(&rule.conditions, &rule.actions, payload)
    }

    /// 评估条件列表并解析动作
    ///
    /// 从不 panic、从不返回错误：所有问题都进入报告的 `error` / `warnings`，
    /// 且出现致命诊断时 `matched` 一定为 false。
    #[instrument(skip_all, fields(conditions = conditions.len(), actions = actions.len()))]
    pub fn evaluate_rule(
        &self,
        conditions: &[ConditionNode],
        actions: &[ActionSpec],
        payload: &Payload,
    ) -> EvaluationReport {
        let start = Instant::now();
        let mut diagnostics = Diagnostics::new(self.trace_enabled);

        if !payload.is_object() {
            diagnostics.record(
                DiagnosticKind::InvalidPayload,
                "payload",
                "payload is not an object; every field resolves to undefined",
            );
        }

        let evaluator = ConditionEvaluator::new(self.resolver.as_ref(), self.max_depth);
        let condition_results: Vec<_> = conditions
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let path = format!("conditions[{}]", i);
                evaluator.evaluate_at(node, payload, 0, &path, &mut diagnostics)
            })
            .collect();

        let matched = !diagnostics.is_fatal() && condition_results.iter().all(|r| r.result);

        let resolved_actions =
            matched.then(|| actions.iter().map(ResolvedAction::from).collect::<Vec<_>>());

        let report = EvaluationReport {
            matched,
            condition_results,
            resolved_actions,
            error: diagnostics.error,
            warnings: diagnostics.warnings,
            trace: diagnostics.trace,
        };

        let outcome = report.outcome();
        let elapsed = start.elapsed();
        metrics::counter!("rule_evaluations_total", "outcome" => outcome.as_label()).increment(1);
        metrics::histogram!("rule_evaluation_duration_seconds").record(elapsed.as_secs_f64());

        debug!(
            outcome = outcome.as_label(),
            warnings = report.warnings.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "规则评估完成"
        );

        report
    }
}

impl Default for RuleExecutor {
    fn default() -> Self {
        Self::new()
    }
}

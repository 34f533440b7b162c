//! 条件评估器
//!
//! 递归评估条件树。逻辑组会评估全部子节点以便报告展示每个分支的结果，
//! 组结果再按 AND（全部为真）/ OR（任一为真）合并。空组遵循空真/空假：
//! 空 AND 为 true，空 OR 为 false。
//!
//! 评估从不失败：结构问题、未知操作符、深度超限和解析器错误都只让对应
//! 节点判定为 false，并在 [`Diagnostics`] 中留下记录。

use crate::error::{DiagnosticKind, EvaluationError, EvaluationWarning, Result, RuleError};
use crate::models::{Condition, ConditionNode, LogicalGroup, Payload};
use crate::operators::{self, LogicalOperator};
use crate::report::ConditionResult;
use crate::resolver::FieldResolver;
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

/// 默认最大递归深度
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// 一次评估中累积的诊断与追踪
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// 第一条致命诊断
    pub error: Option<EvaluationError>,
    /// 非致命诊断，以及第一条之后的致命诊断
    pub warnings: Vec<EvaluationWarning>,
    pub trace: Vec<String>,
    trace_enabled: bool,
}

impl Diagnostics {
    pub fn new(trace_enabled: bool) -> Self {
        Self {
            trace_enabled,
            ..Default::default()
        }
    }

    pub fn record(&mut self, kind: DiagnosticKind, path: &str, message: impl Into<String>) {
        let message = message.into();

        if kind.is_fatal() && self.error.is_none() {
            self.error = Some(EvaluationError {
                kind,
                path: path.to_string(),
                message,
            });
        } else {
            self.warnings.push(EvaluationWarning {
                kind,
                path: path.to_string(),
                message,
            });
        }
    }

    /// 是否出现过致命诊断
    pub fn is_fatal(&self) -> bool {
        self.error.is_some()
    }

    fn trace(&mut self, line: impl FnOnce() -> String) {
        if self.trace_enabled {
            self.trace.push(line());
        }
    }
}

/// 条件评估器
pub struct ConditionEvaluator<'r> {
    resolver: &'r dyn FieldResolver,
    max_depth: usize,
}

impl<'r> ConditionEvaluator<'r> {
    pub fn new(resolver: &'r dyn FieldResolver, max_depth: usize) -> Self {
        Self {
            resolver,
            max_depth,
        }
    }

    /// 评估以 `node` 为根的子树
    ///
    /// `depth` 是该节点所在的深度，顶层条件为 0。
    pub fn evaluate(
        &self,
        node: &ConditionNode,
        payload: &Payload,
        depth: usize,
        diagnostics: &mut Diagnostics,
    ) -> ConditionResult {
        self.evaluate_at(node, payload, depth, "root", diagnostics)
    }

    pub(crate) fn evaluate_at(
        &self,
        node: &ConditionNode,
        payload: &Payload,
        depth: usize,
        path: &str,
        diagnostics: &mut Diagnostics,
    ) -> ConditionResult {
        if depth > self.max_depth {
            warn!(
                path,
                depth,
                max_depth = self.max_depth,
                node = %node.describe(),
                "条件树超过最大深度，子树判定为不匹配"
            );
            diagnostics.record(
                DiagnosticKind::MaxDepthExceeded,
                path,
                format!("depth {} exceeds the limit of {}", depth, self.max_depth),
            );
            diagnostics.trace(|| format!("{}: MAX_DEPTH_EXCEEDED", path));
            return ConditionResult::failed(node.clone(), DiagnosticKind::MaxDepthExceeded);
        }

        match node {
            ConditionNode::Leaf(cond) => {
                self.evaluate_condition(node, cond, payload, path, diagnostics)
            }
            ConditionNode::Group(group) => {
                self.evaluate_group(node, group, payload, depth, path, diagnostics)
            }
        }
    }

    /// 评估叶子条件
    fn evaluate_condition(
        &self,
        node: &ConditionNode,
        cond: &Condition,
        payload: &Payload,
        path: &str,
        diagnostics: &mut Diagnostics,
    ) -> ConditionResult {
        if cond.field.trim().is_empty() {
            warn!(path, "条件缺少字段");
            diagnostics.record(DiagnosticKind::MalformedRule, path, "condition has no field");
            return ConditionResult::failed(node.clone(), DiagnosticKind::MalformedRule);
        }

        if cond.operator.trim().is_empty() {
            warn!(path, field = %cond.field, "条件缺少操作符");
            diagnostics.record(DiagnosticKind::MalformedRule, path, "condition has no operator");
            return ConditionResult::failed(node.clone(), DiagnosticKind::MalformedRule);
        }

        let Some(predicate) = operators::lookup(&cond.operator) else {
            warn!(path, operator = %cond.operator, "未知操作符，条件判定为不匹配");
            diagnostics.record(
                DiagnosticKind::UnknownOperator,
                path,
                format!("unknown operator '{}'", cond.operator),
            );
            diagnostics.trace(|| {
                format!("{}: {} {} => UNKNOWN_OPERATOR", path, cond.field, cond.operator)
            });
            return ConditionResult::failed(node.clone(), DiagnosticKind::UnknownOperator);
        };

        let field_value = match self.resolve_field(payload, &cond.field) {
            Ok(value) => value,
            Err(e) => {
                warn!(path, field = %cond.field, error = %e, "字段解析失败");
                diagnostics.record(DiagnosticKind::ResolverFailure, path, e.to_string());
                return ConditionResult::failed(node.clone(), DiagnosticKind::ResolverFailure);
            }
        };

        let matched = predicate(field_value.as_ref(), &cond.value);

        diagnostics.trace(|| {
            format!(
                "{}: {} {} {} => {}",
                path,
                cond.field,
                cond.operator,
                cond.value,
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            )
        });

        ConditionResult::leaf(node.clone(), matched)
    }

    /// 调用解析器取值；自定义解析器 panic 时转换为 ResolverError
    fn resolve_field(&self, payload: &Payload, field: &str) -> Result<Option<Value>> {
        panic::catch_unwind(AssertUnwindSafe(|| self.resolver.resolve(payload, field)))
            .unwrap_or_else(|cause| {
                Err(RuleError::ResolverError {
                    path: field.to_string(),
                    message: format!("resolver panicked: {}", panic_message(cause.as_ref())),
                })
            })
    }

    /// 评估逻辑组：先收集全部子节点结果，再合并
    fn evaluate_group(
        &self,
        node: &ConditionNode,
        group: &LogicalGroup,
        payload: &Payload,
        depth: usize,
        path: &str,
        diagnostics: &mut Diagnostics,
    ) -> ConditionResult {
        let children: Vec<ConditionResult> = group
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| {
                let child_path = format!("{}.children[{}]", path, i);
                self.evaluate_at(child, payload, depth + 1, &child_path, diagnostics)
            })
            .collect();

        let matched = match &group.logical_operator {
            LogicalOperator::And => children.iter().all(|c| c.result),
            LogicalOperator::Or => children.iter().any(|c| c.result),
            LogicalOperator::Unrecognized(op) => {
                warn!(path, logical_operator = %op, "无法识别的逻辑操作符");
                diagnostics.record(
                    DiagnosticKind::MalformedRule,
                    path,
                    format!("unrecognized logical operator '{}'", op),
                );
                return ConditionResult {
                    node: node.clone(),
                    result: false,
                    children: Some(children),
                    error: Some(DiagnosticKind::MalformedRule),
                };
            }
        };

        diagnostics.trace(|| {
            format!(
                "{}: {} 组 {}/{} 子节点匹配 => {}",
                path,
                group.logical_operator,
                children.iter().filter(|c| c.result).count(),
                children.len(),
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            )
        });

        ConditionResult::group(node.clone(), matched, children)
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    cause
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{MockFieldResolver, PathResolver};
    use serde_json::json;

    fn eval(node: &ConditionNode, payload: &Value) -> (ConditionResult, Diagnostics) {
        let resolver = PathResolver;
        let evaluator = ConditionEvaluator::new(&resolver, DEFAULT_MAX_DEPTH);
        let mut diagnostics = Diagnostics::new(true);
        let result = evaluator.evaluate(node, payload, 0, &mut diagnostics);
        (result, diagnostics)
    }

    fn truthy() -> ConditionNode {
        ConditionNode::leaf("flag", "eq", true)
    }

    fn falsy() -> ConditionNode {
        ConditionNode::leaf("flag", "eq", false)
    }

    fn flag_payload() -> Value {
        json!({ "flag": true })
    }

    #[test]
    fn test_and_group() {
        let payload = flag_payload();

        let (r, _) = eval(&ConditionNode::and(vec![falsy(), truthy()]), &payload);
        assert!(!r.result);
        let (r, _) = eval(&ConditionNode::and(vec![truthy(), falsy()]), &payload);
        assert!(!r.result);
        let (r, _) = eval(&ConditionNode::and(vec![truthy(), truthy()]), &payload);
        assert!(r.result);
    }

    #[test]
    fn test_or_group() {
        let payload = flag_payload();

        let (r, _) = eval(&ConditionNode::or(vec![falsy(), falsy()]), &payload);
        assert!(!r.result);
        let (r, _) = eval(&ConditionNode::or(vec![falsy(), truthy()]), &payload);
        assert!(r.result);
    }

    #[test]
    fn test_empty_groups_are_vacuous() {
        let payload = flag_payload();

        let (r, d) = eval(&ConditionNode::and(vec![]), &payload);
        assert!(r.result);
        assert_eq!(r.children, Some(vec![]));
        assert!(d.error.is_none());

        let (r, _) = eval(&ConditionNode::or(vec![]), &payload);
        assert!(!r.result);
    }

    #[test]
    fn test_group_evaluates_every_child() {
        let payload = flag_payload();
        let node = ConditionNode::or(vec![truthy(), falsy(), truthy()]);

        let (r, _) = eval(&node, &payload);
        let children = r.children.expect("group has children");

        assert_eq!(children.len(), 3);
        assert_eq!(
            children.iter().map(|c| c.result).collect::<Vec<_>>(),
            vec![true, false, true]
        );
        assert_eq!(children[1].node, falsy());
    }

    #[test]
    fn test_unknown_operator_is_a_warning() {
        let payload = flag_payload();
        let node = ConditionNode::or(vec![ConditionNode::leaf("flag", "bogus", true), truthy()]);

        let (r, d) = eval(&node, &payload);

        assert!(r.result);
        assert!(d.error.is_none());
        assert_eq!(d.warnings.len(), 1);
        assert_eq!(d.warnings[0].kind, DiagnosticKind::UnknownOperator);
        assert_eq!(d.warnings[0].path, "root.children[0]");
        let children = r.children.unwrap();
        assert_eq!(children[0].error, Some(DiagnosticKind::UnknownOperator));
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let payload = flag_payload();
        let node = ConditionNode::leaf("", "eq", true);

        let (r, d) = eval(&node, &payload);

        assert!(!r.result);
        assert_eq!(r.error, Some(DiagnosticKind::MalformedRule));
        assert_eq!(d.error.unwrap().kind, DiagnosticKind::MalformedRule);
    }

    #[test]
    fn test_unrecognized_logical_operator_keeps_children() {
        let payload = flag_payload();
        let node = ConditionNode::Group(LogicalGroup::new(
            LogicalOperator::Unrecognized("XOR".to_string()),
            vec![truthy()],
        ));

        let (r, d) = eval(&node, &payload);

        assert!(!r.result);
        assert_eq!(r.error, Some(DiagnosticKind::MalformedRule));
        assert_eq!(r.children.unwrap().len(), 1);
        assert!(d.is_fatal());
    }

    #[test]
    fn test_depth_guard() {
        let mut node = truthy();
        for _ in 0..1_000 {
            node = ConditionNode::and(vec![node]);
        }
        let payload = flag_payload();
        let resolver = PathResolver;
        let evaluator = ConditionEvaluator::new(&resolver, 64);
        let mut diagnostics = Diagnostics::new(false);

        let r = evaluator.evaluate(&node, &payload, 0, &mut diagnostics);

        assert!(!r.result);
        let tripped = r
            .find_error(DiagnosticKind::MaxDepthExceeded)
            .expect("depth guard tripped");
        assert!(tripped.node.is_group());
        assert_eq!(diagnostics.error.unwrap().kind, DiagnosticKind::MaxDepthExceeded);
    }

    #[test]
    fn test_tree_at_the_limit_evaluates() {
        let mut node = truthy();
        for _ in 0..4 {
            node = ConditionNode::and(vec![node]);
        }
        let payload = flag_payload();
        let resolver = PathResolver;
        let evaluator = ConditionEvaluator::new(&resolver, 4);
        let mut diagnostics = Diagnostics::new(false);

        let r = evaluator.evaluate(&node, &payload, 0, &mut diagnostics);

        assert!(r.result);
        assert!(diagnostics.error.is_none());
    }

    #[test]
    fn test_resolver_failure_fails_closed() {
        let mut resolver = MockFieldResolver::new();
        resolver.expect_resolve().returning(|_, path| {
            Err(RuleError::ResolverError {
                path: path.to_string(),
                message: "lookup service unavailable".to_string(),
            })
        });
        let evaluator = ConditionEvaluator::new(&resolver, DEFAULT_MAX_DEPTH);
        let mut diagnostics = Diagnostics::new(false);

        let r = evaluator.evaluate(&truthy(), &flag_payload(), 0, &mut diagnostics);

        assert!(!r.result);
        assert_eq!(r.error, Some(DiagnosticKind::ResolverFailure));
        let error = diagnostics.error.unwrap();
        assert_eq!(error.kind, DiagnosticKind::ResolverFailure);
        assert!(error.message.contains("lookup service unavailable"));
    }

    struct PanickingResolver;

    impl FieldResolver for PanickingResolver {
        fn resolve(&self, _payload: &Value, path: &str) -> Result<Option<Value>> {
            panic!("lookup table for {} not loaded", path);
        }
    }

    #[test]
    fn test_resolver_panic_fails_closed() {
        let resolver = PanickingResolver;
        let evaluator = ConditionEvaluator::new(&resolver, DEFAULT_MAX_DEPTH);
        let mut diagnostics = Diagnostics::new(false);
        let node = ConditionNode::or(vec![truthy(), truthy()]);

        let r = evaluator.evaluate(&node, &flag_payload(), 0, &mut diagnostics);

        assert!(!r.result);
        let children = r.children.unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.error == Some(DiagnosticKind::ResolverFailure)));
        let error = diagnostics.error.unwrap();
        assert_eq!(error.kind, DiagnosticKind::ResolverFailure);
        assert_eq!(error.path, "root.children[0]");
        assert!(error.message.contains("lookup table for flag not loaded"));
        assert_eq!(diagnostics.warnings.len(), 1);
    }

    #[test]
    fn test_trace_lines() {
        let payload = flag_payload();
        let node = ConditionNode::and(vec![truthy(), falsy()]);

        let (_, d) = eval(&node, &payload);

        assert_eq!(d.trace.len(), 3);
        assert!(d.trace[0].ends_with("=> MATCHED"));
        assert!(d.trace[1].ends_with("=> NOT_MATCHED"));
        assert!(d.trace[2].starts_with("root: AND"));
    }
}

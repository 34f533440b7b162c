//! 业务规则评估引擎
//!
//! 对任意业务事件（订单创建、库存变动等）评估用户在规则构建器中编写的条件树，
//! 决定规则是否触发以及应交给动作分发器的参数：
//! - 条件树模型与 JSON 解析
//! - 点号路径字段解析
//! - 静态操作符表（类型不匹配时失败关闭）
//! - 带深度保护的递归评估与可解释的评估报告
//! - 发布前规则校验与内存规则缓存
//!
//! 评估是纯函数：不执行动作、不做 I/O、不在调用之间保留状态。

pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod models;
pub mod operators;
pub mod report;
pub mod resolver;
pub mod store;

pub use compiler::{CompiledRule, RuleCompiler, ValidationIssue};
pub use error::{DiagnosticKind, EvaluationError, EvaluationWarning, Result, RuleError};
pub use evaluator::{ConditionEvaluator, DEFAULT_MAX_DEPTH, Diagnostics};
pub use executor::RuleExecutor;
pub use models::{
    ActionSpec, Condition, ConditionNode, LogicalGroup, Payload, ResolvedAction, Rule,
};
pub use operators::{LogicalOperator, Operator};
pub use report::{ConditionResult, EvaluationReport, Outcome};
pub use resolver::{FieldResolver, PathResolver};
pub use store::{RuleEvaluation, RuleSource, RuleStore};

/// 使用默认配置评估一条规则
pub fn evaluate_rule(
    conditions: &[ConditionNode],
    actions: &[ActionSpec],
    payload: &Payload,
) -> EvaluationReport {
    RuleExecutor::new().evaluate_rule(conditions, actions, payload)
}

//! 评估报告
//!
//! 报告是纯数据：每次评估新建，与调用方传入的规则和载荷没有共享引用。

use crate::error::{DiagnosticKind, EvaluationError, EvaluationWarning};
use crate::models::{ConditionNode, ResolvedAction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 单个条件节点的评估结果，结构与条件树一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionResult {
    pub node: ConditionNode,
    pub result: bool,
    /// 仅完成评估的逻辑组有值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ConditionResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DiagnosticKind>,
}

impl ConditionResult {
    pub fn leaf(node: ConditionNode, result: bool) -> Self {
        Self {
            node,
            result,
            children: None,
            error: None,
        }
    }

    pub fn group(node: ConditionNode, result: bool, children: Vec<ConditionResult>) -> Self {
        Self {
            node,
            result,
            children: Some(children),
            error: None,
        }
    }

    /// 失败关闭的节点结果
    pub fn failed(node: ConditionNode, kind: DiagnosticKind) -> Self {
        Self {
            node,
            result: false,
            children: None,
            error: Some(kind),
        }
    }

    /// 深度优先查找第一个带有指定诊断的节点
    pub fn find_error(&self, kind: DiagnosticKind) -> Option<&ConditionResult> {
        if self.error == Some(kind) {
            return Some(self);
        }
        self.children
            .iter()
            .flatten()
            .find_map(|child| child.find_error(kind))
    }
}

/// 规则评估报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    pub matched: bool,
    pub condition_results: Vec<ConditionResult>,
    /// 仅在规则命中时存在；存在即表示规则触发
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_actions: Option<Vec<ResolvedAction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EvaluationError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<EvaluationWarning>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl EvaluationReport {
    pub fn outcome(&self) -> Outcome {
        match (&self.error, self.matched) {
            (Some(_), _) => Outcome::Invalid,
            (None, true) => Outcome::Matched,
            (None, false) => Outcome::NotMatched,
        }
    }

    pub fn has_warning(&self, kind: DiagnosticKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// 面向规则测试界面的评估结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Matched,
    NotMatched,
    Invalid,
}

impl Outcome {
    /// 指标标签
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::NotMatched => "not_matched",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Matched => "Rule Matched",
            Self::NotMatched => "Rule Not Matched",
            Self::Invalid => "Invalid Rule",
        };
        f.write_str(s)
    }
}

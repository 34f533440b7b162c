//! 规则引擎错误类型
//!
//! `RuleError` 用于可失败的 API（解析、编译、存储、自定义解析器）。
//! 评估过程本身从不返回错误，所有问题都以 [`EvaluationError`] / [`EvaluationWarning`]
//! 的形式写入评估报告。

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("规则结构无效: {path}: {message}")]
    MalformedRule { path: String, message: String },

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("字段解析失败: {path}: {message}")]
    ResolverError { path: String, message: String },

    #[error("规则来源读取失败: {0}")]
    SourceError(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;

/// 诊断类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DiagnosticKind {
    /// 条件树违反结构约束（叶子缺少 field、未知的逻辑操作符等）
    MalformedRule,
    /// 叶子使用了操作符表中不存在的操作符
    UnknownOperator,
    /// 子树超过最大递归深度
    MaxDepthExceeded,
    /// 事件载荷不是对象，字段一律解析为不存在
    InvalidPayload,
    /// 字段解析器返回错误
    ResolverFailure,
}

impl DiagnosticKind {
    /// 该类诊断是否使整条规则判定为不匹配
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::UnknownOperator | Self::InvalidPayload)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MalformedRule => "MalformedRule",
            Self::UnknownOperator => "UnknownOperator",
            Self::MaxDepthExceeded => "MaxDepthExceeded",
            Self::InvalidPayload => "InvalidPayload",
            Self::ResolverFailure => "ResolverFailure",
        };
        write!(f, "{}", s)
    }
}

/// 报告中的致命诊断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationError {
    pub kind: DiagnosticKind,
    /// 出错节点在条件树中的路径，如 `conditions[0].children[2]`
    pub path: String,
    pub message: String,
}

/// 报告中的非致命诊断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationWarning {
    pub kind: DiagnosticKind,
    pub path: String,
    pub message: String,
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.path, self.message)
    }
}

impl fmt::Display for EvaluationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.path, self.message)
    }
}

//! 规则编译器
//!
//! 规则发布前的严格校验，并预先提取规则引用的字段路径。
//! 评估本身不要求规则经过编译：未编译的规则在评估时按失败关闭处理。

use crate::error::{Result, RuleError};
use crate::evaluator::DEFAULT_MAX_DEPTH;
use crate::models::{Condition, ConditionNode, Rule};
use crate::operators::{self, LogicalOperator, Operator};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// 编译后的规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// 原始规则
    pub rule: Rule,
    /// 规则中使用的所有字段路径
    pub required_fields: HashSet<String>,
    /// 编译版本号（用于缓存失效）
    pub compile_version: u64,
}

impl CompiledRule {
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn name(&self) -> &str {
        &self.rule.name
    }
}

/// 校验发现的问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl From<ValidationIssue> for RuleError {
    fn from(issue: ValidationIssue) -> Self {
        RuleError::MalformedRule {
            path: issue.path,
            message: issue.message,
        }
    }
}

/// 规则编译器
pub struct RuleCompiler {
    compile_version: u64,
    max_depth: usize,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self {
            compile_version: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 从 JSON 字符串编译规则
    pub fn compile_from_json(&mut self, json: &str) -> Result<CompiledRule> {
        let rule: Rule = serde_json::from_str(json)?;
        self.compile(rule)
    }

    /// 编译规则，遇到第一个问题即返回错误
    pub fn compile(&mut self, rule: Rule) -> Result<CompiledRule> {
        if let Some(issue) = self.validate(&rule).into_iter().next() {
            return Err(issue.into());
        }

        let required_fields = Self::extract_fields(&rule.conditions);

        self.compile_version += 1;

        Ok(CompiledRule {
            rule,
            required_fields,
            compile_version: self.compile_version,
        })
    }

    /// 校验规则，返回全部问题（为空表示可以发布）
    pub fn validate(&self, rule: &Rule) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if rule.id.trim().is_empty() {
            issues.push(issue("id", "规则 ID 不能为空"));
        }

        if rule.name.trim().is_empty() {
            issues.push(issue("name", "规则名称不能为空"));
        }

        for (i, node) in rule.conditions.iter().enumerate() {
            self.validate_node(node, &format!("conditions[{}]", i), 0, &mut issues);
        }

        for (i, action) in rule.actions.iter().enumerate() {
            if action.action_type.trim().is_empty() {
                issues.push(issue(format!("actions[{}]", i), "动作类型不能为空"));
            }
        }

        issues
    }

    /// 校验规则节点
    fn validate_node(
        &self,
        node: &ConditionNode,
        path: &str,
        depth: usize,
        issues: &mut Vec<ValidationIssue>,
    ) {
        if depth > self.max_depth {
            issues.push(issue(path, format!("嵌套深度超过上限 {}", self.max_depth)));
            return;
        }

        match node {
            ConditionNode::Leaf(cond) => Self::validate_condition(cond, path, issues),
            ConditionNode::Group(group) => {
                if let LogicalOperator::Unrecognized(op) = &group.logical_operator {
                    issues.push(issue(path, format!("无法识别的逻辑操作符 '{}'", op)));
                }

                if group.children.is_empty() {
                    issues.push(issue(path, "逻辑组不能为空"));
                }

                for (i, child) in group.children.iter().enumerate() {
                    let child_path = format!("{}.children[{}]", path, i);
                    self.validate_node(child, &child_path, depth + 1, issues);
                }
            }
        }
    }

    /// 校验条件
    fn validate_condition(cond: &Condition, path: &str, issues: &mut Vec<ValidationIssue>) {
        if cond.field.trim().is_empty() {
            issues.push(issue(path, "条件的字段不能为空"));
        }

        let Some(operator) = Operator::from_id(&cond.operator) else {
            issues.push(issue(path, format!("未知操作符 '{}'", cond.operator)));
            return;
        };

        // 验证操作符和值的兼容性
        match operator {
            Operator::Between => {
                let valid = matches!(
                    cond.value.as_array().map(Vec::as_slice),
                    Some([Value::Number(_), Value::Number(_)])
                );
                if !valid {
                    issues.push(issue(path, "between 操作符需要 [min, max] 数值数组"));
                }
            }
            Operator::In | Operator::NotIn => {
                if !cond.value.is_array() {
                    issues.push(issue(path, format!("{} 操作符需要数组值", operator)));
                }
            }
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                if !cond.value.is_number() {
                    issues.push(issue(path, format!("{} 操作符需要数值", operator)));
                }
            }
            Operator::Contains
            | Operator::NotContains
            | Operator::StartsWith
            | Operator::EndsWith => {
                if !cond.value.is_string() {
                    issues.push(issue(path, format!("{} 操作符需要字符串值", operator)));
                }
            }
            Operator::Regex => match cond.value.as_str() {
                Some(pattern) => {
                    if let Err(e) = regex::Regex::new(pattern) {
                        issues.push(issue(path, format!("正则表达式无效: {}", e)));
                    }
                }
                None => issues.push(issue(path, "regex 操作符需要字符串值")),
            },
            Operator::Before | Operator::After => {
                if operators::parse_datetime(&cond.value).is_none() {
                    issues.push(issue(path, format!("{} 操作符需要日期时间值", operator)));
                }
            }
            Operator::Eq
            | Operator::Ne
            | Operator::Exists
            | Operator::NotExists
            | Operator::IsEmpty
            | Operator::IsNotEmpty => {}
        }
    }

    /// 提取规则中使用的所有字段
    pub fn extract_fields(conditions: &[ConditionNode]) -> HashSet<String> {
        let mut fields = HashSet::new();
        let mut stack: Vec<&ConditionNode> = conditions.iter().collect();

        while let Some(node) = stack.pop() {
            match node {
                ConditionNode::Leaf(cond) => {
                    if !cond.field.is_empty() {
                        fields.insert(cond.field.clone());
                    }
                }
                ConditionNode::Group(group) => stack.extend(group.children.iter()),
            }
        }

        fields
    }
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}

fn issue(path: impl Into<String>, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        path: path.into(),
        message: message.into(),
    }
}

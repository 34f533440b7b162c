//! 规则引擎领域模型
//!
//! 条件树在 JSON 中不带类型标签：含 `logicalOperator` 键的对象是逻辑组，
//! 其余对象都是叶子条件。叶子的各字段缺失时取默认值，交由评估器按
//! MalformedRule 失败关闭，而不是在反序列化阶段拒绝整条规则。

use crate::operators::LogicalOperator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// 事件载荷：任意 JSON 值，通常是对象
pub type Payload = Value;

/// 规则定义
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    /// 触发事件类型，如 "order_created"；为空时对所有事件生效
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 顶层条件，隐式 AND
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        conditions: Vec<ConditionNode>,
        actions: Vec<ActionSpec>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            trigger: None,
            enabled: true,
            conditions,
            actions,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// 规则是否响应给定的事件类型
    pub fn listens_to(&self, trigger: &str) -> bool {
        self.trigger.as_deref().is_none_or(|t| t == trigger)
    }
}

/// 条件节点（叶子条件或逻辑组）
///
/// 变体顺序决定反序列化的尝试顺序：先尝试逻辑组，失败再按叶子解析。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Group(LogicalGroup),
    Leaf(Condition),
}

impl ConditionNode {
    pub fn leaf(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self::Leaf(Condition::new(field, operator, value))
    }

    pub fn and(children: Vec<ConditionNode>) -> Self {
        Self::Group(LogicalGroup::and(children))
    }

    pub fn or(children: Vec<ConditionNode>) -> Self {
        Self::Group(LogicalGroup::or(children))
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// 节点的简短描述，用于日志和追踪
    pub fn describe(&self) -> String {
        match self {
            Self::Leaf(cond) => format!("{} {} {}", cond.field, cond.operator, cond.value),
            Self::Group(group) => {
                format!("{} ({} children)", group.logical_operator, group.children.len())
            }
        }
    }
}

impl From<Condition> for ConditionNode {
    fn from(cond: Condition) -> Self {
        Self::Leaf(cond)
    }
}

impl From<LogicalGroup> for ConditionNode {
    fn from(group: LogicalGroup) -> Self {
        Self::Group(group)
    }
}

/// 叶子条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// 点号分隔的字段路径，如 "order.status"
    #[serde(default)]
    pub field: String,
    /// 操作符标识，如 "eq"；未知标识在评估时产生警告而非错误
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// 逻辑组节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalGroup {
    pub logical_operator: LogicalOperator,
    #[serde(default, alias = "conditions")]
    pub children: Vec<ConditionNode>,
}

impl LogicalGroup {
    pub fn new(logical_operator: LogicalOperator, children: Vec<ConditionNode>) -> Self {
        Self {
            logical_operator,
            children,
        }
    }

    pub fn and(children: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::And, children)
    }

    pub fn or(children: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::Or, children)
    }
}

/// 动作声明：规则命中后交给动作分发器的 (类型, 参数)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ActionSpec {
    pub fn new(action_type: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            action_type: action_type.into(),
            parameters,
        }
    }
}

/// 已解析的动作，参数是 ActionSpec 的独立副本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub parameters: Map<String, Value>,
}

impl From<&ActionSpec> for ResolvedAction {
    fn from(spec: &ActionSpec) -> Self {
        Self {
            action_type: spec.action_type.clone(),
            parameters: spec.parameters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_deserialization() {
        let json = r#"
        {
            "id": "rule-001",
            "name": "pending_order_alert",
            "trigger": "order_created",
            "conditions": [
                {
                    "logicalOperator": "AND",
                    "children": [
                        { "field": "order.status", "operator": "eq", "value": "PENDING" },
                        { "field": "order.total", "operator": "gte", "value": 500 }
                    ]
                }
            ],
            "actions": [
                { "type": "send_notification", "parameters": { "to": "ops" } }
            ]
        }
        "#;

        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.id, "rule-001");
        assert!(rule.enabled);
        assert!(rule.listens_to("order_created"));
        assert!(!rule.listens_to("inventory_changed"));
        assert_eq!(rule.actions[0].action_type, "send_notification");

        match &rule.conditions[0] {
            ConditionNode::Group(group) => {
                assert_eq!(group.logical_operator, LogicalOperator::And);
                assert_eq!(group.children.len(), 2);
                assert!(!group.children[0].is_group());
            }
            ConditionNode::Leaf(_) => panic!("expected group"),
        }
    }

    #[test]
    fn test_conditions_alias_for_children() {
        let node: ConditionNode = serde_json::from_value(json!({
            "logicalOperator": "or",
            "conditions": [{ "field": "sku.quantity", "operator": "lt", "value": 10 }]
        }))
        .unwrap();

        assert_eq!(
            node,
            ConditionNode::or(vec![ConditionNode::leaf("sku.quantity", "lt", 10)])
        );
    }

    #[test]
    fn test_malformed_leaf_still_deserializes() {
        let node: ConditionNode = serde_json::from_value(json!({ "operator": "eq" })).unwrap();

        match node {
            ConditionNode::Leaf(cond) => {
                assert!(cond.field.is_empty());
                assert_eq!(cond.value, Value::Null);
            }
            ConditionNode::Group(_) => panic!("expected leaf"),
        }
    }

    #[test]
    fn test_unrecognized_logical_operator_is_preserved() {
        let node: ConditionNode = serde_json::from_value(json!({
            "logicalOperator": "XOR",
            "children": []
        }))
        .unwrap();

        assert_eq!(
            node,
            ConditionNode::Group(LogicalGroup::new(
                LogicalOperator::Unrecognized("XOR".to_string()),
                vec![]
            ))
        );
    }

    #[test]
    fn test_node_serialization_shape() {
        let node = ConditionNode::and(vec![ConditionNode::leaf("order.status", "eq", "PENDING")]);
        let value = serde_json::to_value(&node).unwrap();

        assert_eq!(
            value,
            json!({
                "logicalOperator": "AND",
                "children": [{ "field": "order.status", "operator": "eq", "value": "PENDING" }]
            })
        );
    }

    #[test]
    fn test_action_parameters_default_to_empty() {
        let action: ActionSpec = serde_json::from_value(json!({ "type": "flag_order" })).unwrap();
        assert!(action.parameters.is_empty());
    }
}

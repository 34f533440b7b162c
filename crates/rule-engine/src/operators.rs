//! 规则操作符定义
//!
//! 操作符表在首次使用时构建一次，之后只读，可被任意线程并发查询。
//! 每个操作符都是全函数：类型不匹配时返回 false，从不报错。

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// 操作符谓词：(字段值, 条件值) -> 是否满足。字段不存在时为 None
pub type OperatorFn = fn(Option<&Value>, &Value) -> bool;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // 通用比较
    Eq,
    Ne,

    // 数值比较
    Gt,
    Gte,
    Lt,
    Lte,
    Between,

    // 包含检查
    Contains,
    NotContains,
    In,
    NotIn,

    // 字符串操作
    StartsWith,
    EndsWith,
    Regex,

    // 时间操作
    Before,
    After,

    // 存在与空值检查
    Exists,
    NotExists,
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    pub const ALL: [Operator; 20] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::Between,
        Self::Contains,
        Self::NotContains,
        Self::In,
        Self::NotIn,
        Self::StartsWith,
        Self::EndsWith,
        Self::Regex,
        Self::Before,
        Self::After,
        Self::Exists,
        Self::NotExists,
        Self::IsEmpty,
        Self::IsNotEmpty,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Between => "between",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Regex => "regex",
            Self::Before => "before",
            Self::After => "after",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
        }
    }

    /// 按标识查找操作符，支持别名（如 "neq"）
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "neq" => Some(Self::Ne),
            _ => Self::ALL.into_iter().find(|op| op.as_str() == id),
        }
    }

    fn predicate(self) -> OperatorFn {
        match self {
            Self::Eq => eq,
            Self::Ne => ne,
            Self::Gt => gt,
            Self::Gte => gte,
            Self::Lt => lt,
            Self::Lte => lte,
            Self::Between => between,
            Self::Contains => contains,
            Self::NotContains => not_contains,
            Self::In => in_list,
            Self::NotIn => not_in_list,
            Self::StartsWith => starts_with,
            Self::EndsWith => ends_with,
            Self::Regex => regex_match,
            Self::Before => before,
            Self::After => after,
            Self::Exists => exists,
            Self::NotExists => not_exists,
            Self::IsEmpty => is_empty,
            Self::IsNotEmpty => is_not_empty,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static OPERATOR_TABLE: OnceLock<HashMap<&'static str, OperatorFn>> = OnceLock::new();

/// 全局操作符表
fn table() -> &'static HashMap<&'static str, OperatorFn> {
    OPERATOR_TABLE.get_or_init(|| {
        let mut table: HashMap<&'static str, OperatorFn> = Operator::ALL
            .into_iter()
            .map(|op| (op.as_str(), op.predicate()))
            .collect();
        table.insert("neq", ne);
        table
    })
}

/// 按操作符标识查找谓词，未注册的标识返回 None
pub fn lookup(id: &str) -> Option<OperatorFn> {
    table().get(id).copied()
}

/// 已注册的操作符标识（含别名），按字典序排列
pub fn registered_ids() -> Vec<&'static str> {
    let mut ids: Vec<_> = table().keys().copied().collect();
    ids.sort_unstable();
    ids
}

/// 逻辑操作符
///
/// 大小写不敏感地识别 AND / OR；其他取值原样保留，评估时按 MalformedRule 处理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    Unrecognized(String),
}

impl LogicalOperator {
    pub fn as_str(&self) -> &str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Unrecognized(s) => s,
        }
    }
}

impl From<&str> for LogicalOperator {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("and") {
            Self::And
        } else if s.eq_ignore_ascii_case("or") {
            Self::Or
        } else {
            Self::Unrecognized(s.to_string())
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LogicalOperator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogicalOperator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

// ==================== 谓词实现 ====================

/// 严格相等：不做类型转换；数值按数学值比较（100 与 100.0 相等），
/// 数组与对象逐元素递归比较
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(i), Some(j)) => i == j,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| strict_eq(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| strict_eq(x, y)))
        }
        _ => a == b,
    }
}

fn eq(field: Option<&Value>, expected: &Value) -> bool {
    field.is_some_and(|v| strict_eq(v, expected))
}

// 缺失字段与任何 JSON 值都不相等
fn ne(field: Option<&Value>, expected: &Value) -> bool {
    !eq(field, expected)
}

fn numbers(field: Option<&Value>, expected: &Value) -> Option<(f64, f64)> {
    match (field?, expected) {
        (Value::Number(a), Value::Number(b)) => Some((a.as_f64()?, b.as_f64()?)),
        _ => None,
    }
}

fn gt(field: Option<&Value>, expected: &Value) -> bool {
    numbers(field, expected).is_some_and(|(a, b)| a > b)
}

fn gte(field: Option<&Value>, expected: &Value) -> bool {
    numbers(field, expected).is_some_and(|(a, b)| a >= b)
}

fn lt(field: Option<&Value>, expected: &Value) -> bool {
    numbers(field, expected).is_some_and(|(a, b)| a < b)
}

fn lte(field: Option<&Value>, expected: &Value) -> bool {
    numbers(field, expected).is_some_and(|(a, b)| a <= b)
}

/// 闭区间 [min, max]
fn between(field: Option<&Value>, expected: &Value) -> bool {
    let Some(Value::Number(n)) = field else {
        return false;
    };
    match expected.as_array().map(Vec::as_slice) {
        Some([Value::Number(min), Value::Number(max)]) => {
            match (n.as_f64(), min.as_f64(), max.as_f64()) {
                (Some(n), Some(min), Some(max)) => n >= min && n <= max,
                _ => false,
            }
        }
        _ => false,
    }
}

fn strings<'a>(field: Option<&'a Value>, expected: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((field?.as_str()?, expected.as_str()?))
}

fn contains(field: Option<&Value>, expected: &Value) -> bool {
    strings(field, expected).is_some_and(|(s, sub)| s.contains(sub))
}

// 非字符串字段返回 false 而不是 true，与 contains 一样失败关闭
fn not_contains(field: Option<&Value>, expected: &Value) -> bool {
    strings(field, expected).is_some_and(|(s, sub)| !s.contains(sub))
}

fn in_list(field: Option<&Value>, expected: &Value) -> bool {
    match (field, expected) {
        (Some(v), Value::Array(items)) => items.iter().any(|item| strict_eq(v, item)),
        _ => false,
    }
}

// 条件值不是数组时返回 false，与 in 一样失败关闭
fn not_in_list(field: Option<&Value>, expected: &Value) -> bool {
    match expected {
        Value::Array(_) => !in_list(field, expected),
        _ => false,
    }
}

fn starts_with(field: Option<&Value>, expected: &Value) -> bool {
    strings(field, expected).is_some_and(|(s, prefix)| s.starts_with(prefix))
}

fn ends_with(field: Option<&Value>, expected: &Value) -> bool {
    strings(field, expected).is_some_and(|(s, suffix)| s.ends_with(suffix))
}

/// 正则匹配；无效的正则表达式视为不匹配
fn regex_match(field: Option<&Value>, expected: &Value) -> bool {
    let Some((s, pattern)) = strings(field, expected) else {
        return false;
    };
    Regex::new(pattern).is_ok_and(|re| re.is_match(s))
}

/// 解析 RFC 3339 时间或 YYYY-MM-DD 日期
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

fn datetimes(field: Option<&Value>, expected: &Value) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    Some((parse_datetime(field?)?, parse_datetime(expected)?))
}

fn before(field: Option<&Value>, expected: &Value) -> bool {
    datetimes(field, expected).is_some_and(|(a, b)| a < b)
}

fn after(field: Option<&Value>, expected: &Value) -> bool {
    datetimes(field, expected).is_some_and(|(a, b)| a > b)
}

fn exists(field: Option<&Value>, _expected: &Value) -> bool {
    !matches!(field, None | Some(Value::Null))
}

fn not_exists(field: Option<&Value>, expected: &Value) -> bool {
    !exists(field, expected)
}

/// 空值：'' / null / 字段不存在。空数组与空对象不算空
fn is_empty(field: Option<&Value>, _expected: &Value) -> bool {
    match field {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn is_not_empty(field: Option<&Value>, expected: &Value) -> bool {
    !is_empty(field, expected)
}

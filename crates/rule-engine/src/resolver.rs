//! 字段解析
//!
//! 按点号路径在事件载荷中取值。路径任一段缺失、遇到 null 或遇到不可索引的值时
//! 返回 None，从不报错，也从不修改载荷。

use crate::error::Result;
use serde_json::Value;

/// 字段解析器
///
/// 默认实现是 [`PathResolver`]。自定义实现返回错误或 panic 时，评估器都会把问题
/// 写入报告并判定规则不匹配，不会向调用方传播。
#[cfg_attr(test, mockall::automock)]
pub trait FieldResolver: Send + Sync {
    fn resolve(&self, payload: &Value, path: &str) -> Result<Option<Value>>;
}

/// 点号路径解析器
///
/// 载荷根必须是对象。根以下的纯数字段可索引数组（如 `order.items.0.sku`），
/// 其他段作用于数组时解析失败。
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl PathResolver {
    /// 借用式解析，不复制取到的值
    pub fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
        if path.is_empty() || !payload.is_object() {
            return None;
        }

        let mut current = payload;
        for part in path.split('.') {
            if part.is_empty() {
                return None;
            }
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(arr) => arr.get(array_index(part)?)?,
                _ => return None,
            };
        }

        Some(current)
    }
}

/// 只接受规范的十进制下标：纯 ASCII 数字且无前导零，"+1"、"01" 都不是下标
fn array_index(part: &str) -> Option<usize> {
    if !part.bytes().all(|b| b.is_ascii_digit()) || (part.len() > 1 && part.starts_with('0')) {
        return None;
    }
    part.parse().ok()
}

impl FieldResolver for PathResolver {
    fn resolve(&self, payload: &Value, path: &str) -> Result<Option<Value>> {
        Ok(Self::lookup(payload, path).cloned())
    }
}

/// 便捷函数：用默认解析器取值
pub fn resolve<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    PathResolver::lookup(payload, path)
}

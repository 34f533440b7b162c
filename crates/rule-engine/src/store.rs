//! 规则存储管理
//!
//! 使用 DashMap 提供线程安全的已编译规则缓存。规则的持久化由外部的
//! [`RuleSource`] 负责，这里只缓存并按事件批量评估。

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::{Result, RuleError};
use crate::executor::RuleExecutor;
use crate::models::{Payload, Rule};
use crate::report::EvaluationReport;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则来源（外部持久化层的接口）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// 读取全部规则定义，由调用方筛选启用状态
    async fn load_rules(&self) -> Result<Vec<Rule>>;
}

/// 单条规则对某个事件的评估结果
#[derive(Debug, Clone)]
pub struct RuleEvaluation {
    pub rule_id: String,
    pub rule_name: String,
    pub report: EvaluationReport,
}

/// 规则存储
#[derive(Clone)]
pub struct RuleStore {
    /// 编译后的规则缓存
    rules: Arc<DashMap<String, CompiledRule>>,
    /// 规则编译器
    compiler: Arc<parking_lot::Mutex<RuleCompiler>>,
    executor: RuleExecutor,
}

impl RuleStore {
    /// 创建新的规则存储
    pub fn new() -> Self {
        Self::with_executor(RuleExecutor::new())
    }

    /// 使用指定执行器创建存储，编译器的深度上限与执行器保持一致
    pub fn with_executor(executor: RuleExecutor) -> Self {
        let compiler = RuleCompiler::new().with_max_depth(executor.max_depth());
        Self {
            rules: Arc::new(DashMap::new()),
            compiler: Arc::new(parking_lot::Mutex::new(compiler)),
            executor,
        }
    }

    /// 获取当前存储的规则数量
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 加载规则（从 Rule 对象）
    #[instrument(skip(self, rule), fields(rule_id = %rule.id, rule_name = %rule.name))]
    pub fn load(&self, rule: Rule) -> Result<()> {
        let compiled = {
            let mut compiler = self.compiler.lock();
            compiler.compile(rule)?
        };

        let rule_id = compiled.id().to_string();
        self.rules.insert(rule_id.clone(), compiled);

        info!("规则已加载: {}", rule_id);
        Ok(())
    }

    /// 加载规则（从 JSON 字符串）
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<String> {
        let rule: Rule = serde_json::from_str(json)?;
        let rule_id = rule.id.clone();
        self.load(rule)?;
        Ok(rule_id)
    }

    /// 更新规则
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub fn update(&self, rule: Rule) -> Result<()> {
        if !self.rules.contains_key(&rule.id) {
            warn!("更新不存在的规则: {}", rule.id);
            return Err(RuleError::RuleNotFound(rule.id));
        }

        self.load(rule)
    }

    /// 删除规则
    #[instrument(skip(self))]
    pub fn delete(&self, rule_id: &str) -> Result<()> {
        if self.rules.remove(rule_id).is_some() {
            info!("规则已删除: {}", rule_id);
            Ok(())
        } else {
            warn!("删除不存在的规则: {}", rule_id);
            Err(RuleError::RuleNotFound(rule_id.to_string()))
        }
    }

    /// 获取规则
    pub fn get(&self, rule_id: &str) -> Option<CompiledRule> {
        self.rules.get(rule_id).map(|r| r.clone())
    }

    /// 检查规则是否存在
    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    /// 获取所有规则 ID（排序后返回）
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rules.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// 批量加载规则，单条失败只记录日志
    #[instrument(skip(self, rules))]
    pub fn load_batch(&self, rules: Vec<Rule>) -> Vec<String> {
        let mut loaded_ids = Vec::with_capacity(rules.len());
        let mut failed = 0usize;

        for rule in rules {
            let rule_id = rule.id.clone();
            match self.load(rule) {
                Ok(()) => loaded_ids.push(rule_id),
                Err(e) => {
                    failed += 1;
                    warn!(rule_id = %rule_id, error = %e, "规则加载失败");
                }
            }
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded_ids.len(), failed);
        loaded_ids
    }

    /// 从外部来源重新加载全部启用的规则，替换当前缓存
    ///
    /// 先编译全部规则，再逐条覆盖写入，最后移除来源中已不存在的规则。
    /// 重载期间并发的 [`evaluate_event`](Self::evaluate_event) 总能看到仍然有效的规则。
    #[instrument(skip(self, source))]
    pub async fn reload_from(&self, source: &dyn RuleSource) -> Result<usize> {
        let rules = source.load_rules().await?;

        let staged: Vec<CompiledRule> = {
            let mut compiler = self.compiler.lock();
            rules
                .into_iter()
                .filter(|r| r.enabled)
                .filter_map(|rule| {
                    let rule_id = rule.id.clone();
                    compiler
                        .compile(rule)
                        .inspect_err(|e| warn!(rule_id = %rule_id, error = %e, "规则加载失败"))
                        .ok()
                })
                .collect()
        };

        let live: HashSet<String> = staged.iter().map(|c| c.id().to_string()).collect();
        for compiled in staged {
            self.rules.insert(compiled.id().to_string(), compiled);
        }
        self.rules.retain(|rule_id, _| live.contains(rule_id));

        info!("规则重载完成: {} 条生效", live.len());
        Ok(live.len())
    }

    /// 清空所有规则
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rules.len();
        self.rules.clear();
        info!("已清空 {} 条规则", count);
    }

    /// 用某个事件评估所有响应该事件的启用规则
    ///
    /// 每条规则独立评估，结果按规则 ID 排序。
    #[instrument(skip(self, payload))]
    pub fn evaluate_event(&self, trigger: &str, payload: &Payload) -> Vec<RuleEvaluation> {
        let candidates: Vec<CompiledRule> = self
            .rules
            .iter()
            .filter(|r| r.rule.enabled && r.rule.listens_to(trigger))
            .map(|r| r.value().clone())
            .collect();

        let mut evaluations: Vec<RuleEvaluation> = candidates
            .into_iter()
            .map(|compiled| RuleEvaluation {
                report: self.executor.execute(&compiled.rule, payload),
                rule_id: compiled.rule.id,
                rule_name: compiled.rule.name,
            })
            .collect();

        evaluations.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));

        let fired = evaluations.iter().filter(|e| e.report.matched).count();
        info!(trigger, evaluated = evaluations.len(), fired, "事件评估完成");

        evaluations
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

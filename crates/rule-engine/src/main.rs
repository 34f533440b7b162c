//! 规则测试工具
//!
//! 用样例事件载荷评估规则，输出完整的评估报告，供规则发布前人工检查。
//! 退出码：0 命中，1 未命中，2 规则无效。

use anyhow::{Context, Result};
use clap::Parser;
use erp_shared::config::AppConfig;
use erp_shared::observability;
use rule_engine::{ActionSpec, ConditionNode, Outcome, Rule, RuleCompiler, RuleExecutor};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

/// 规则测试命令行
#[derive(Parser, Debug)]
#[command(name = "rule-tester")]
#[command(version, about = "用样例事件评估业务规则")]
struct Cli {
    /// 测试用例文件，格式为 {"rule": {...}, "payload": {...}}
    #[arg(short, long, conflicts_with_all = ["rule", "payload"], required_unless_present = "rule")]
    case: Option<PathBuf>,

    /// 规则文件（完整规则定义或 {"conditions": [...], "actions": [...]}）
    #[arg(long, requires = "payload")]
    rule: Option<PathBuf>,

    /// 事件载荷文件
    #[arg(long, requires = "rule")]
    payload: Option<PathBuf>,

    /// 在报告中输出逐节点追踪
    #[arg(long)]
    trace: bool,

    /// 覆盖配置中的最大递归深度
    #[arg(long)]
    max_depth: Option<usize>,

    /// 同时执行发布前校验并打印全部问题
    #[arg(long)]
    validate: bool,
}

/// 规则草稿：只关心条件与动作，其他字段忽略
#[derive(Debug, Deserialize)]
struct RuleDraft {
    #[serde(default)]
    conditions: Vec<ConditionNode>,
    #[serde(default)]
    actions: Vec<ActionSpec>,
}

#[derive(Debug, Deserialize)]
struct TestCase {
    rule: Value,
    #[serde(default)]
    payload: Value,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = AppConfig::load("rule-tester").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    observability::init(&config.observability)?;

    let (rule_json, payload) = load_inputs(&cli)?;
    let draft: RuleDraft =
        serde_json::from_value(rule_json.clone()).context("rule is not a valid condition tree")?;

    let mut executor = RuleExecutor::from_config(&config.engine);
    if let Some(max_depth) = cli.max_depth {
        executor = executor.with_max_depth(max_depth);
    }
    if cli.trace {
        executor = executor.with_trace();
    }

    if cli.validate {
        let rule = serde_json::from_value::<Rule>(rule_json).unwrap_or_else(|_| {
            Rule::new("draft", draft.conditions.clone(), draft.actions.clone())
        });
        let issues = RuleCompiler::new()
            .with_max_depth(executor.max_depth())
            .validate(&rule);

        if issues.is_empty() {
            info!("Rule passed validation");
        }
        for issue in &issues {
            warn!(path = %issue.path, "{}", issue.message);
        }
    }

    let report = executor.evaluate_rule(&draft.conditions, &draft.actions, &payload);

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("{}", report.outcome());
    if let Some(error) = &report.error {
        println!("{}", error);
    }

    Ok(match report.outcome() {
        Outcome::Matched => ExitCode::SUCCESS,
        Outcome::NotMatched => ExitCode::from(1),
        Outcome::Invalid => ExitCode::from(2),
    })
}

/// 读取规则与载荷；JSON 解析错误在这里报告，不进入引擎
fn load_inputs(cli: &Cli) -> Result<(Value, Value)> {
    if let Some(case) = &cli.case {
        let case: TestCase = read_json(case)?;
        return Ok((case.rule, case.payload));
    }

    match (&cli.rule, &cli.payload) {
        (Some(rule), Some(payload)) => Ok((read_json(rule)?, read_json(payload)?)),
        _ => anyhow::bail!("either --case or both --rule and --payload are required"),
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

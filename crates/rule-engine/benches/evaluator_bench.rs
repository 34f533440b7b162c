//! 规则评估性能基准测试
//!
//! 测试覆盖：
//! - 单条件评估
//! - 顶层条件数量与嵌套深度对评估耗时的影响
//! - 规则校验
//! - 按事件批量评估

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rule_engine::{ActionSpec, ConditionNode, Rule, RuleCompiler, RuleExecutor, RuleStore};
use serde_json::{Map, Value, json};
use std::hint::black_box;

fn notify_action() -> Vec<ActionSpec> {
    let mut parameters = Map::new();
    parameters.insert("to".to_string(), json!("ops"));
    vec![ActionSpec::new("send_notification", parameters)]
}

/// 订单事件载荷，附带若干填充字段
fn create_payload(field_count: usize) -> Value {
    let mut data = Map::new();
    for i in 0..field_count {
        data.insert(format!("field_{}", i), json!(format!("value_{}", i)));
    }

    data.insert(
        "order".to_string(),
        json!({
            "status": "PENDING",
            "total": 1840.25,
            "priority": "rush order",
            "items": [{ "sku": "SKU-001", "quantity": 2 }]
        }),
    );
    data.insert("customer".to_string(), json!({ "tier": "gold" }));

    Value::Object(data)
}

/// 平铺的顶层条件（隐式 AND）
fn create_flat_conditions(count: usize) -> Vec<ConditionNode> {
    (0..count)
        .map(|i| ConditionNode::leaf(format!("field_{}", i), "eq", format!("value_{}", i)))
        .collect()
}

/// 交替 AND/OR 的满树
fn create_nested_condition(depth: usize, breadth: usize) -> ConditionNode {
    if depth == 0 {
        return ConditionNode::leaf("order.status", "eq", "PENDING");
    }

    let children = (0..breadth)
        .map(|_| create_nested_condition(depth - 1, breadth))
        .collect();

    if depth % 2 == 0 {
        ConditionNode::and(children)
    } else {
        ConditionNode::or(children)
    }
}

fn create_mixed_conditions() -> Vec<ConditionNode> {
    vec![
        ConditionNode::leaf("order.status", "eq", "PENDING"),
        ConditionNode::and(vec![
            ConditionNode::leaf("order.priority", "contains", "rush"),
            ConditionNode::leaf("order.items.0.sku", "starts_with", "SKU-"),
            ConditionNode::or(vec![
                ConditionNode::leaf("order.total", "gte", 1000),
                ConditionNode::leaf("customer.tier", "in", json!(["gold", "platinum"])),
            ]),
        ]),
        ConditionNode::leaf("order.cancelled_at", "not_exists", Value::Null),
    ]
}

// ============================================================================
// 基准测试函数
// ============================================================================

fn bench_simple_condition(c: &mut Criterion) {
    let executor = RuleExecutor::new();
    let conditions = vec![ConditionNode::leaf("order.status", "eq", "PENDING")];
    let actions = notify_action();
    let payload = create_payload(0);

    c.bench_function("simple_condition_evaluation", |b| {
        b.iter(|| {
            let report = executor.evaluate_rule(
                black_box(&conditions),
                black_box(&actions),
                black_box(&payload),
            );
            black_box(report)
        })
    });
}

fn bench_flat_conditions(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_conditions");
    let executor = RuleExecutor::new();
    let actions = notify_action();

    for count in [2, 5, 10, 20, 50].iter() {
        let conditions = create_flat_conditions(*count);
        let payload = create_payload(*count);

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                let report = executor.evaluate_rule(
                    black_box(&conditions),
                    black_box(&actions),
                    black_box(&payload),
                );
                black_box(report)
            })
        });
    }

    group.finish();
}

fn bench_nested_conditions(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_conditions");
    let executor = RuleExecutor::new();
    let actions = notify_action();
    let payload = create_payload(100);

    // (depth, breadth) 组合
    let configs = [(1, 2), (2, 2), (4, 2), (6, 2), (2, 4), (3, 3)];

    for (depth, breadth) in configs.iter() {
        let conditions = vec![create_nested_condition(*depth, *breadth)];
        let total_nodes = (breadth.pow(*depth as u32 + 1) - 1) / (breadth - 1);

        group.throughput(Throughput::Elements(total_nodes as u64));
        group.bench_with_input(
            BenchmarkId::new("depth_breadth", format!("{}x{}", depth, breadth)),
            &(depth, breadth),
            |b, _| {
                b.iter(|| {
                    let report = executor.evaluate_rule(
                        black_box(&conditions),
                        black_box(&actions),
                        black_box(&payload),
                    );
                    black_box(report)
                })
            },
        );
    }

    group.finish();
}

fn bench_trace(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace");
    let conditions = create_mixed_conditions();
    let actions = notify_action();
    let payload = create_payload(10);

    for (label, executor) in [
        ("disabled", RuleExecutor::new()),
        ("enabled", RuleExecutor::new().with_trace()),
    ] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let report = executor.evaluate_rule(
                    black_box(&conditions),
                    black_box(&actions),
                    black_box(&payload),
                );
                black_box(report)
            })
        });
    }

    group.finish();
}

fn bench_rule_validation(c: &mut Criterion) {
    let compiler = RuleCompiler::new();
    let rule = Rule::new("mixed", create_mixed_conditions(), notify_action());

    c.bench_function("rule_validation", |b| {
        b.iter(|| black_box(compiler.validate(black_box(&rule))))
    });
}

fn bench_event_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_evaluation");
    let payload = create_payload(10);

    for rule_count in [10, 50, 100, 500].iter() {
        let store = RuleStore::new();
        for i in 0..*rule_count {
            let mut rule =
                Rule::new(format!("rule_{}", i), create_mixed_conditions(), notify_action())
                    .with_trigger("order_created");
            rule.id = format!("rule_{}", i);
            store.load(rule).unwrap();
        }

        group.throughput(Throughput::Elements(*rule_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(rule_count),
            rule_count,
            |b, _| {
                b.iter(|| {
                    let results =
                        store.evaluate_event(black_box("order_created"), black_box(&payload));
                    black_box(results)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_simple_condition,
    bench_flat_conditions,
    bench_nested_conditions,
    bench_trace,
    bench_rule_validation,
    bench_event_evaluation,
);

criterion_main!(benches);

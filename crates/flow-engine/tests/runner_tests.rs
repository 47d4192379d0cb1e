//! End-to-end runner tests against scripted collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    ActionExecutor, ActionOutcome, EngineConfig, FlowError, FlowPlugin, FlowRunner, HookContext,
    HookDecision, NullPageEvents, PluginManager, WaitConfig,
};
use flow_locator::{ElementHandle, LocatorError, PageProbe};
use parking_lot::Mutex;
use pageflow_core_types::{
    Flow, FlowEdge, FlowNode, RetrySpec, RunOptions, SelectorCandidate, SelectorKind, Step,
    StepKind, StepStatus, Subflow, TargetLocator, VariableDecl,
};
use pageflow_store::{InMemoryRunStore, RunStore};
use serde_json::{json, Value};

/// Executor that records every invocation and serves scripted outcomes.
#[derive(Default)]
struct ScriptedExecutor {
    calls: Mutex<Vec<(String, Value)>>,
    failures: Mutex<HashMap<String, u32>>,
    responses: Mutex<HashMap<String, String>>,
}

impl ScriptedExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn fail_times(&self, action: &str, times: u32) {
        self.failures.lock().insert(action.to_string(), times);
    }

    fn respond(&self, action: &str, text: &str) {
        self.responses
            .lock()
            .insert(action.to_string(), text.to_string());
    }

    fn calls_for(&self, action: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == action)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn invoke(&self, action: &str, args: Value) -> Result<ActionOutcome, FlowError> {
        self.calls.lock().push((action.to_string(), args));

        if let Some(remaining) = self.failures.lock().get_mut(action) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(ActionOutcome::error(format!("{} refused", action)));
            }
        }

        match self.responses.lock().get(action) {
            Some(text) => Ok(ActionOutcome::text(text.clone())),
            None => Ok(ActionOutcome::ok()),
        }
    }
}

/// Probe backed by static selector tables.
#[derive(Default)]
struct StaticProbe {
    css: HashMap<String, String>,
    text: HashMap<String, String>,
}

impl StaticProbe {
    fn with_css(selectors: &[(&str, &str)]) -> Arc<Self> {
        let mut probe = Self::default();
        for (selector, handle) in selectors {
            probe.css.insert(selector.to_string(), handle.to_string());
        }
        Arc::new(probe)
    }
}

#[async_trait]
impl PageProbe for StaticProbe {
    async fn ref_alive(&self, _ephemeral_ref: &str) -> Result<bool, LocatorError> {
        Ok(false)
    }

    async fn query_css(&self, selector: &str) -> Result<Option<ElementHandle>, LocatorError> {
        Ok(self.css.get(selector).map(ElementHandle::new))
    }

    async fn query_xpath(&self, _expression: &str) -> Result<Option<ElementHandle>, LocatorError> {
        Ok(None)
    }

    async fn find_by_text(&self, text: &str) -> Result<Option<ElementHandle>, LocatorError> {
        Ok(self.text.get(text).map(ElementHandle::new))
    }
}

/// Fast wait windows so tests never sit in real page waits.
fn test_config() -> EngineConfig {
    EngineConfig {
        wait: WaitConfig {
            navigation_timeout_ms: 20,
            idle_timeout_ms: 20,
            network_quiet_ms: 5,
            sniff_window_ms: 5,
        },
        element_poll_ms: 10,
        ..EngineConfig::default()
    }
}

fn runner(executor: Arc<ScriptedExecutor>, probe: Arc<StaticProbe>) -> FlowRunner {
    FlowRunner::new(executor, probe, NullPageEvents::new()).with_config(test_config())
}

fn css_target(selector: &str) -> TargetLocator {
    TargetLocator::css(selector)
}

fn script_node(id: &str, code: &str) -> FlowNode {
    FlowNode::new(id, "script", json!({ "code": code }))
}

#[tokio::test]
async fn linear_flow_retries_then_succeeds_and_extracts() {
    let executor = ScriptedExecutor::new();
    executor.fail_times("click", 1);
    executor.respond("extract", "hello");
    let probe = StaticProbe::with_css(&[("#btn", "el-btn"), ("#out", "el-out")]);
    let run_store = Arc::new(InMemoryRunStore::new());

    let flow = Flow::new("retry demo").with_steps(vec![
        Step::new(
            "nav",
            StepKind::Navigate {
                url: "https://a.example".into(),
            },
        ),
        Step::new(
            "click",
            StepKind::Click {
                target: css_target("#btn"),
            },
        )
        .with_retry(RetrySpec::new(2, 10)),
        Step::new(
            "grab",
            StepKind::Extract {
                target: css_target("#out"),
                attribute: None,
                save_as: Some("x".into()),
            },
        ),
    ]);

    let result = runner(executor.clone(), probe)
        .with_run_store(run_store.clone())
        .run(&flow, RunOptions::default())
        .await;

    assert!(result.success);
    assert_eq!(result.summary.total, 3);
    assert_eq!(result.summary.failed, 0);
    assert_eq!(result.outputs.get("x"), Some(&json!("hello")));

    // One retrying entry for the click, before its success entry.
    let logs = result.logs.unwrap();
    let click_entries: Vec<_> = logs.iter().filter(|e| e.step_id == "click").collect();
    assert_eq!(click_entries.len(), 2);
    assert_eq!(click_entries[0].status, StepStatus::Retrying);
    assert_eq!(click_entries[1].status, StepStatus::Success);

    // Two click attempts reached the executor.
    assert_eq!(executor.calls_for("click").len(), 2);

    // The run record was persisted.
    let records = run_store.runs_for_flow(&flow.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
}

#[tokio::test]
async fn while_directive_runs_exactly_max_iterations() {
    let executor = ScriptedExecutor::new();
    let probe = Arc::new(StaticProbe::default());

    let flow = Flow::new("bounded loop")
        .with_steps(vec![Step::new(
            "loop",
            StepKind::While {
                condition: "true".into(),
                subflow_id: "body".into(),
                max_iterations: Some(3),
            },
        )])
        .with_subflow("body", Subflow::new(vec![script_node("tick", "tick()")], vec![]));

    let result = runner(executor.clone(), probe)
        .run(&flow, RunOptions::default())
        .await;

    assert!(result.success);
    // Always-true condition: the clamp is the only terminator.
    assert_eq!(executor.calls_for("evaluate").len(), 3);
}

#[tokio::test]
async fn foreach_directive_binds_each_element() {
    let executor = ScriptedExecutor::new();
    let probe = Arc::new(StaticProbe::default());

    let flow = Flow::new("per item")
        .with_variable(VariableDecl::new("items").with_default(json!(["a", "b", "c"])))
        .with_steps(vec![Step::new(
            "each",
            StepKind::Foreach {
                list_var: "items".into(),
                item_var: "item".into(),
                subflow_id: "body".into(),
            },
        )])
        .with_subflow(
            "body",
            Subflow::new(vec![script_node("use-item", "handle('{{item}}')")], vec![]),
        );

    let result = runner(executor.clone(), probe)
        .run(&flow, RunOptions::default())
        .await;

    assert!(result.success);
    let codes: Vec<String> = executor
        .calls_for("evaluate")
        .iter()
        .map(|args| args["code"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        codes,
        vec!["handle('a')", "handle('b')", "handle('c')"]
    );
}

#[tokio::test]
async fn graph_failure_jumps_to_on_error_edge() {
    let executor = ScriptedExecutor::new();
    // No selectors resolve: the click fails with a resolution error.
    let probe = Arc::new(StaticProbe::default());

    let flow = Flow::new("recoverable").with_graph(
        vec![
            FlowNode::new(
                "a",
                "click",
                json!({ "target": { "candidates": [
                    { "kind": "css", "value": "#missing", "priority": 0 }
                ]}}),
            ),
            script_node("b", "main()"),
            script_node("recover", "recover()"),
        ],
        vec![
            FlowEdge::new("a", "b"),
            FlowEdge::new("a", "recover").labeled("onError"),
        ],
    );

    let result = runner(executor.clone(), probe)
        .run(&flow, RunOptions::default())
        .await;

    // The run recovered along the onError edge.
    assert!(result.success);
    assert_eq!(result.summary.failed, 1);

    let codes: Vec<String> = executor
        .calls_for("evaluate")
        .iter()
        .map(|args| args["code"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes, vec!["recover()"]);
}

#[tokio::test]
async fn graph_failure_without_on_error_edge_fails_run() {
    let executor = ScriptedExecutor::new();
    let probe = Arc::new(StaticProbe::default());

    let flow = Flow::new("unrecoverable").with_graph(
        vec![
            FlowNode::new(
                "a",
                "click",
                json!({ "target": { "candidates": [
                    { "kind": "css", "value": "#missing", "priority": 0 }
                ]}}),
            ),
            script_node("b", "main()"),
        ],
        vec![FlowEdge::new("a", "b")],
    );

    let result = runner(executor.clone(), probe)
        .run(&flow, RunOptions::default())
        .await;

    assert!(!result.success);
    assert_eq!(result.summary.failed, 1);
    assert!(executor.calls_for("evaluate").is_empty());
}

#[tokio::test]
async fn global_timeout_terminates_run() {
    let executor = ScriptedExecutor::new();
    let probe = Arc::new(StaticProbe::default());

    let flow = Flow::new("slow").with_steps(vec![
        Step::new(
            "stall",
            StepKind::Wait {
                ms: Some(500),
                target: None,
            },
        ),
        Step::new("after", StepKind::Script {
            code: "never()".into(),
            save_as: None,
            defer: false,
        }),
    ]);

    let result = runner(executor.clone(), probe)
        .run(&flow, RunOptions::default().with_timeout(50))
        .await;

    assert!(!result.success);
    let logs = result.logs.unwrap();
    assert!(logs
        .iter()
        .any(|e| e.status == StepStatus::Failed && e.message.contains("global run timeout")));
    // The remaining step never ran.
    assert!(executor.calls_for("evaluate").is_empty());
}

#[tokio::test]
async fn before_step_pause_stops_run_without_executing() {
    struct PauseAtStep;

    #[async_trait]
    impl FlowPlugin for PauseAtStep {
        fn name(&self) -> &str {
            "pause-at-s2"
        }

        async fn before_step(&self, ctx: &HookContext) -> Result<HookDecision, FlowError> {
            if ctx.step_id == "s2" {
                return Ok(HookDecision::pause());
            }
            Ok(HookDecision::default())
        }
    }

    let executor = ScriptedExecutor::new();
    let probe = Arc::new(StaticProbe::default());
    let mut plugins = PluginManager::new();
    plugins.register(Arc::new(PauseAtStep));

    let steps: Vec<Step> = ["s1", "s2", "s3"]
        .iter()
        .map(|id| {
            Step::new(
                *id,
                StepKind::Script {
                    code: format!("{}()", id),
                    save_as: None,
                    defer: false,
                },
            )
        })
        .collect();
    let flow = Flow::new("pausable").with_steps(steps);

    let result = FlowRunner::new(executor.clone(), probe, NullPageEvents::new())
        .with_config(test_config())
        .with_plugins(plugins)
        .run(&flow, RunOptions::default())
        .await;

    assert!(!result.success);
    let logs = result.logs.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].status, StepStatus::Success);
    assert_eq!(logs[1].step_id, "s2");
    assert_eq!(logs[1].status, StepStatus::Paused);
    // Only s1 reached the executor.
    assert_eq!(executor.calls_for("evaluate").len(), 1);
}

#[tokio::test]
async fn plugin_hook_error_downgrades_to_warning() {
    struct BrokenAfterStep;

    #[async_trait]
    impl FlowPlugin for BrokenAfterStep {
        fn name(&self) -> &str {
            "broken"
        }

        async fn after_step(
            &self,
            _ctx: &HookContext,
            _status: StepStatus,
        ) -> Result<(), FlowError> {
            Err(FlowError::Internal("hook exploded".into()))
        }
    }

    let executor = ScriptedExecutor::new();
    let probe = Arc::new(StaticProbe::default());
    let mut plugins = PluginManager::new();
    plugins.register(Arc::new(BrokenAfterStep));

    let flow = Flow::new("tolerant").with_steps(vec![Step::new(
        "only",
        StepKind::Script {
            code: "run()".into(),
            save_as: None,
            defer: false,
        },
    )]);

    let result = FlowRunner::new(executor, probe, NullPageEvents::new())
        .with_config(test_config())
        .with_plugins(plugins)
        .run(&flow, RunOptions::default())
        .await;

    // Plugin misbehavior never fails the run.
    assert!(result.success);
    let logs = result.logs.unwrap();
    assert!(logs
        .iter()
        .any(|e| e.status == StepStatus::Warning && e.message.contains("hook exploded")));
}

#[tokio::test]
async fn sensitive_variables_stay_out_of_outputs() {
    let executor = ScriptedExecutor::new();
    executor.respond("evaluate", "42");
    let probe = Arc::new(StaticProbe::default());

    let flow = Flow::new("secrets")
        .with_variable(
            VariableDecl::new("token")
                .with_default(json!("hunter2"))
                .sensitive(),
        )
        .with_steps(vec![Step::new(
            "compute",
            StepKind::Script {
                code: "compute()".into(),
                save_as: Some("result".into()),
                defer: false,
            },
        )]);

    let result = runner(executor, probe)
        .run(&flow, RunOptions::default())
        .await;

    assert!(result.success);
    assert_eq!(result.outputs.get("result"), Some(&json!(42)));
    assert!(!result.outputs.contains_key("token"));
}

#[tokio::test]
async fn selector_fallback_is_annotated_in_log() {
    let executor = ScriptedExecutor::new();
    let mut probe = StaticProbe::default();
    probe.text.insert("Go".to_string(), "el-go".to_string());

    let flow = Flow::new("fallback").with_steps(vec![Step::new(
        "press",
        StepKind::Click {
            target: TargetLocator::default()
                .with_candidate(
                    SelectorCandidate::new(SelectorKind::Css, "#missing").with_priority(0),
                )
                .with_candidate(SelectorCandidate::new(SelectorKind::Text, "Go").with_priority(1)),
        },
    )]);

    let result = runner(executor, Arc::new(probe))
        .run(&flow, RunOptions::default())
        .await;

    assert!(result.success);
    let logs = result.logs.unwrap();
    let entry = logs.iter().find(|e| e.step_id == "press").unwrap();
    assert_eq!(entry.status, StepStatus::Success);
    assert_eq!(entry.fallback_used.as_deref(), Some("text"));
}

#[tokio::test]
async fn if_branch_follows_case_edge() {
    let executor = ScriptedExecutor::new();
    let probe = Arc::new(StaticProbe::default());

    let flow = Flow::new("branching")
        .with_variable(VariableDecl::new("flag").with_default(json!(true)))
        .with_graph(
            vec![
                FlowNode::new(
                    "decide",
                    "if",
                    json!({ "branches": [ { "id": "yes", "condition": "flag" } ] }),
                ),
                script_node("yes-path", "yes()"),
                script_node("no-path", "no()"),
            ],
            vec![
                FlowEdge::new("decide", "yes-path").labeled("case:yes"),
                FlowEdge::new("decide", "no-path"),
            ],
        );

    let result = runner(executor.clone(), probe)
        .run(&flow, RunOptions::default())
        .await;

    assert!(result.success);
    let codes: Vec<String> = executor
        .calls_for("evaluate")
        .iter()
        .map(|args| args["code"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes, vec!["yes()"]);
}

#[tokio::test]
async fn unbound_required_variable_fails_before_any_step() {
    let executor = ScriptedExecutor::new();
    let probe = Arc::new(StaticProbe::default());

    let flow = Flow::new("strict")
        .with_variable(VariableDecl::new("token").required())
        .with_steps(vec![Step::new(
            "s1",
            StepKind::Script {
                code: "run()".into(),
                save_as: None,
                defer: false,
            },
        )]);

    let result = runner(executor.clone(), probe)
        .run(&flow, RunOptions::default())
        .await;

    assert!(!result.success);
    assert!(executor.calls_for("evaluate").is_empty());
    let logs = result.logs.unwrap();
    assert!(logs[0].message.contains("token"));
}

#[tokio::test]
async fn deferred_script_logs_its_own_entry() {
    let executor = ScriptedExecutor::new();
    let probe = Arc::new(StaticProbe::default());

    let flow = Flow::new("deferred").with_steps(vec![Step::new(
        "later",
        StepKind::Script {
            code: "cleanup()".into(),
            save_as: None,
            defer: true,
        },
    )]);

    let result = runner(executor.clone(), probe)
        .run(&flow, RunOptions::default())
        .await;

    assert!(result.success);
    let logs = result.logs.unwrap();
    // Exactly one entry for the step, written by the deferred flush.
    let entries: Vec<_> = logs.iter().filter(|e| e.step_id == "later").collect();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].message.contains("deferred script"));
    assert_eq!(executor.calls_for("evaluate").len(), 1);
}

#[tokio::test]
async fn start_at_override_skips_earlier_steps() {
    let executor = ScriptedExecutor::new();
    let probe = Arc::new(StaticProbe::default());

    let steps: Vec<Step> = ["s1", "s2", "s3"]
        .iter()
        .map(|id| {
            Step::new(
                *id,
                StepKind::Script {
                    code: format!("{}()", id),
                    save_as: None,
                    defer: false,
                },
            )
        })
        .collect();
    let flow = Flow::new("resume").with_steps(steps);

    let mut options = RunOptions::default();
    options.start_at = Some("s2".into());
    let result = runner(executor.clone(), probe).run(&flow, options).await;

    assert!(result.success);
    let codes: Vec<String> = executor
        .calls_for("evaluate")
        .iter()
        .map(|args| args["code"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes, vec!["s2()", "s3()"]);
}

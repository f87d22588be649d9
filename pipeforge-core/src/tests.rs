use crate::*;
use pipeforge_context::{PipelineState, StageStatus};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

proptest! {
    #[test]
    fn argument_vector_preserves_insertion_order(
        pairs in proptest::collection::vec(("[a-zA-Z_]{1,10}", "\\PC{0,12}"), 0..12)
    ) {
        let mut seen = HashSet::new();
        let unique: Vec<(String, String)> = pairs
            .into_iter()
            .filter(|(key, _)| seen.insert(key.clone()))
            .collect();

        let spec = unique.iter().fold(
            ExecutionSpec::new("scrape.py"),
            |spec, (key, value)| spec.arg(key.clone(), value.clone()),
        );
        let argv = spec.argument_vector();

        prop_assert_eq!(argv.len(), 2 * unique.len() + 1);
        prop_assert_eq!(&argv[0], "scrape.py");
        for (i, (key, value)) in unique.iter().enumerate() {
            prop_assert_eq!(&argv[1 + 2 * i], &format!("--{key}"));
            prop_assert_eq!(&argv[2 + 2 * i], value);
        }
    }
}

#[test]
fn scrape_arguments_match_expected_command() {
    let spec = ExecutionSpec::new("scrape.py")
        .arg("source", "news_site")
        .arg("maxPages", "5");
    assert_eq!(
        spec.argument_vector(),
        vec!["scrape.py", "--source", "news_site", "--maxPages", "5"]
    );
}

#[test]
fn failed_results_map_to_error_taxonomy() {
    let err = ExecutionResult::non_zero_exit(1, "boom")
        .into_output("train.py")
        .unwrap_err();
    assert_eq!(err.kind(), "NonZeroExit");
    assert!(err.is_execution_failure());

    let timed_out = ExecutionResult::timed_out("after 5s");
    assert_eq!(timed_out.exit_code, SENTINEL_EXIT_CODE);
    assert_eq!(timed_out.stderr_text.as_deref(), Some("TimedOut: after 5s"));
    assert_eq!(timed_out.into_output("x").unwrap_err().kind(), "TimedOut");

    let launch = ExecutionResult::launch_failed("No such file");
    assert!(launch.stdout_text.is_none());
    assert_eq!(launch.into_output("x").unwrap_err().kind(), "LaunchFailed");
}

#[test]
fn successful_output_decodes_json_payload() {
    let output = ExecutionResult::success(r#"{"accuracy": 0.91, "loss": 0.2, "note": "ok"}"#)
        .into_output("evaluate.py")
        .unwrap();
    let metrics = output.numeric_metrics();
    assert_eq!(metrics.get("accuracy"), Some(&0.91));
    assert_eq!(metrics.len(), 2);

    let nested = ExecutionResult::success(r#"{"metrics": {"accuracy": 0.5}, "epochs": 3}"#)
        .into_output("train.py")
        .unwrap();
    assert_eq!(nested.numeric_metrics().len(), 1);

    let text = ExecutionResult::success("plain text")
        .into_output("analyze.py")
        .unwrap();
    assert_eq!(text.payload(), &serde_json::json!("plain text"));
    assert!(text.numeric_metrics().is_empty());
}

#[test]
fn destination_tags_pick_store() {
    assert_eq!(DestinationTag::Raw.store(), StoreKind::Document);
    assert_eq!(DestinationTag::Metric.store(), StoreKind::Document);
    assert_eq!(DestinationTag::Event.store(), StoreKind::Document);
    assert_eq!(DestinationTag::Processed.store(), StoreKind::Relational);
    assert_eq!(DestinationTag::TaskResult.store(), StoreKind::Relational);
}

#[test]
fn domain_round_trips_through_str() {
    for domain in Domain::ALL {
        assert_eq!(domain.as_str().parse::<Domain>().unwrap(), domain);
    }
    assert!("billing".parse::<Domain>().is_err());
}

#[test]
fn request_validation_rejects_bad_identifiers() {
    let ok = TaskRequest::new(Domain::Automated, "cleanup", ConfigMap::new());
    assert!(ok.validate().is_ok());
    let empty = TaskRequest::new(Domain::Analytics, "  ", ConfigMap::new());
    assert!(empty.validate().is_err());
    let traversal = TaskRequest::new(Domain::Automated, "../etc", ConfigMap::new());
    assert!(traversal.validate().is_err());
}

#[test]
fn model_status_transitions_are_forward_only() {
    assert!(ModelStatus::Registered.can_transition_to(ModelStatus::Trained));
    assert!(ModelStatus::Evaluated.can_transition_to(ModelStatus::Deployed));
    assert!(!ModelStatus::Registered.can_transition_to(ModelStatus::Deployed));
    assert!(!ModelStatus::Deployed.can_transition_to(ModelStatus::Registered));
}

#[tokio::test]
async fn chain_runs_stages_in_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let (o1, o2) = (order.clone(), order.clone());

    let (context, result) = ChainBuilder::new()
        .stage("first", move |_ctx| async move {
            o1.lock().await.push("first");
            Ok(())
        })
        .stage("second", move |_ctx| async move {
            o2.lock().await.push("second");
            Ok(())
        })
        .build()
        .execute()
        .await;

    assert!(result.is_ok());
    assert_eq!(*order.lock().await, vec!["first", "second"]);
    assert_eq!(context.state, PipelineState::Complete);
}

#[tokio::test]
async fn chain_short_circuits_on_failure() {
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = ran.clone();

    let (context, result) = ChainBuilder::new()
        .stage("train", |_ctx| async move {
            Err(PipelineError::NonZeroExit {
                executable: "train.py".to_string(),
                code: 2,
                stderr: "bad data".to_string(),
            })
        })
        .stage("evaluate", move |_ctx| async move {
            ran_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build()
        .execute()
        .await;

    assert_eq!(result.unwrap_err().kind(), "NonZeroExit");
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(
        context.state,
        PipelineState::Failed {
            stage: "train".to_string()
        }
    );
}

#[tokio::test]
async fn conditional_stage_is_skipped() {
    let (context, result) = ChainBuilder::new()
        .stage("evaluate", |ctx| async move {
            ctx.lock()
                .await
                .set_variable("accuracy", serde_json::json!(0.5));
            Ok(())
        })
        .stage_if(
            "deploy",
            |ctx| {
                ctx.get_variable("accuracy")
                    .and_then(|v| v.as_f64())
                    .is_some_and(|accuracy| accuracy > 0.85)
            },
            |_ctx| async move { Ok(()) },
        )
        .build()
        .execute()
        .await;

    assert!(result.is_ok());
    assert_eq!(context.count_by_status(StageStatus::Skipped), 1);
    assert_eq!(context.state, PipelineState::Complete);
}

#[tokio::test]
async fn cancellation_aborts_running_stage() {
    let cancel = CancellationToken::new();
    let context = Arc::new(Mutex::new(pipeforge_context::PipelineContext::default()));

    let chain = ChainBuilder::new()
        .stage("slow", |_ctx| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .build();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = chain.run(context.clone(), cancel).await;
    assert_eq!(result.unwrap_err().kind(), "Cancelled");
    assert!(matches!(
        context.lock().await.state,
        PipelineState::Failed { .. }
    ));
}

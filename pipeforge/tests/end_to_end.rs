#![cfg(unix)]

use pipeforge::prelude::*;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

struct Engine {
    _dir: tempfile::TempDir,
    orchestrator: PipelineOrchestrator,
    documents: Arc<MemoryDocumentStore>,
    relational: Arc<MemoryRelationalStore>,
}

fn write_script(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), format!("{body}\n")).unwrap();
}

fn engine(scripts: &[(&str, &str)]) -> Engine {
    let dir = tempfile::tempdir().unwrap();
    for (name, body) in scripts {
        write_script(dir.path(), name, body);
    }

    let yaml = format!(
        r#"
executor:
  interpreter: sh
  applications_root: "{root}"
  max_concurrent_processes: 2
  timeout_secs: 5
scripts:
  scraping: scrape.sh
  analytics: analyze.sh
  training: train.sh
  evaluation: evaluate.sh
  automated: "tasks/{{task_type}}.sh"
"#,
        root = dir.path().display()
    );
    let config = ConfigLoader::from_yaml_str(&yaml).unwrap();

    let documents = Arc::new(MemoryDocumentStore::new());
    let relational = Arc::new(MemoryRelationalStore::new());
    let orchestrator = PipelineOrchestrator::from_config(
        config.clone(),
        Arc::new(ProcessExecutor::with_config((&config.executor).into())),
        documents.clone(),
        relational.clone(),
    );

    Engine {
        _dir: dir,
        orchestrator,
        documents,
        relational,
    }
}

fn max_pages(pages: u64) -> ConfigMap {
    let mut config = ConfigMap::new();
    config.insert("maxPages".to_string(), json!(pages));
    config
}

#[tokio::test]
async fn test_scrape_success_lands_in_document_store() {
    let engine = engine(&[(
        "scrape.sh",
        r#"printf '{"flag":"%s","source":"%s","pages":%s}' "$1" "$2" "$4""#,
    )]);

    let report = engine
        .orchestrator
        .run(TaskRequest::new(Domain::DataCollection, "news_site", max_pages(5)))
        .await;
    engine.orchestrator.metrics().flush().await;

    assert!(report.succeeded(), "{:?}", report.errors());
    assert_eq!(
        engine.documents.documents("scraped_data").await,
        vec![json!({"flag": "--source", "source": "news_site", "pages": 5})]
    );
    assert!(!engine.documents.documents("system_metrics").await.is_empty());
}

#[tokio::test]
async fn test_scrape_failure_writes_nothing_but_a_metric() {
    let engine = engine(&[("scrape.sh", "echo 'blocked by robots.txt' >&2; exit 1")]);

    let report = engine
        .orchestrator
        .run(TaskRequest::new(Domain::DataCollection, "news_site", max_pages(5)))
        .await;
    engine.orchestrator.metrics().flush().await;

    assert!(!report.succeeded());
    assert!(engine.documents.documents("scraped_data").await.is_empty());

    let metrics = engine.documents.documents("system_metrics").await;
    let failure = metrics
        .iter()
        .find(|doc| {
            doc["component"] == json!("scraping_execution")
                && doc["attributes"]["error"] == json!("NonZeroExit")
        })
        .expect("failure metric recorded");
    assert_eq!(failure["attributes"]["source"], json!("news_site"));
    assert_eq!(failure["attributes"]["exit_code"], json!(1));
}

#[tokio::test]
async fn test_ml_chain_with_real_scripts_deploys() {
    let engine = engine(&[
        ("train.sh", r#"echo '{"metrics": {"loss": 0.08}}'"#),
        ("evaluate.sh", r#"echo '{"accuracy": 0.91, "f1": 0.88}'"#),
    ]);

    let report = engine
        .orchestrator
        .run(TaskRequest::new(Domain::MlTraining, "sentiment", ConfigMap::new()))
        .await;
    engine.orchestrator.metrics().flush().await;

    assert!(report.succeeded(), "{:?}", report.errors());
    let record = engine.orchestrator.model_status("sentiment").await.unwrap();
    assert_eq!(record.status, ModelStatus::Deployed);
    assert_eq!(record.metrics.get("loss"), Some(&0.08));
    assert_eq!(
        engine.relational.rows("model_evaluations").await,
        vec![json!({"accuracy": 0.91, "f1": 0.88})]
    );

    let events = engine.documents.documents("events").await;
    assert!(events
        .iter()
        .any(|doc| doc["component"] == json!("model_deployed")));
}

#[tokio::test]
async fn test_missing_automated_script_is_launch_failure() {
    let engine = engine(&[]);

    let report = engine
        .orchestrator
        .run(TaskRequest::new(Domain::Automated, "cleanup", ConfigMap::new()))
        .await;

    // sh starts but cannot open the script, so it exits non-zero
    assert_eq!(report.errors()[0].kind(), "NonZeroExit");
    assert_eq!(engine.relational.total_rows().await, 0);
}

#[tokio::test]
async fn test_dispatcher_runs_in_background() {
    let engine = engine(&[("analyze.sh", r#"echo "{\"pipeline\": \"$2\"}""#)]);
    let dispatcher = TaskDispatcher::new(engine.orchestrator.clone());

    let ack = dispatcher.submit(Domain::Analytics, "daily", ConfigMap::new());
    assert_eq!(ack.domain, Domain::Analytics);

    dispatcher.drain().await;
    assert_eq!(
        engine.relational.rows("analytics_results").await,
        vec![json!({"pipeline": "daily"})]
    );
}

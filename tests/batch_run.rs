mod common;

use std::sync::Arc;

use chrono::Utc;
use common::*;
use obligation_sweep::datastore::{MemoryDatastore, ProgressStore};
use obligation_sweep::models::obligation::{ACTIVE, NO_OBLIGATION};
use obligation_sweep::models::{
    Entity, ErrorResult, FailureKind, ObligationCategory, ObligationRecord, RunProgress,
    RunResult, RunStatus,
};
use obligation_sweep::services::{ReportTable, Tint};
use obligation_sweep::RunOutcome;
use pretty_assertions::assert_eq;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

/// 运行中写入的进度百分比（不含抢占时的 0 与完成时的重复 100）
fn running_percents(store: &MemoryDatastore) -> Vec<u8> {
    store
        .progress_history()
        .iter()
        .filter(|p| p.status == RunStatus::Running && !p.results.is_empty())
        .map(|p| p.percent)
        .collect()
}

#[tokio::test]
async fn test_three_entities_with_missing_identifier() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let portal = standard_portal();
    let store = Arc::new(MemoryDatastore::with_entities(three_entities()));

    let outcome = runner(&portal, &store, &config)
        .run(&CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run");
    };
    let progress = summary.progress;
    assert_eq!(progress.status, RunStatus::Completed);
    assert_eq!(progress.percent, 100);
    assert_eq!(progress.results.len(), 3);
    assert_eq!(running_percents(&store), vec![33, 66, 100]);

    // 只有第 2 个实体失败，且从未尝试登录
    assert_eq!(progress.error_count(), 1);
    assert_eq!(
        progress.results[1],
        RunResult::Error(ErrorResult::new(
            "Beta Traders",
            FailureKind::MissingIdentifier,
            "missing external identifier",
        ))
    );
    assert_eq!(portal.submissions_for("  "), 0);
    assert_eq!(portal.total_submissions(), 2);
    assert_eq!(portal.answers(), vec![19, 19]);

    // 成功的实体 6 个类别都有值
    let records = store.records();
    assert_eq!(records.len(), 2);
    let acme = &records["Acme Ltd"];
    assert_eq!(acme.obligations.len(), 6);
    let company = acme.get(ObligationCategory::IncomeTaxCompany).unwrap();
    assert_eq!(company.effective_to, ACTIVE);
    let vat = acme.get(ObligationCategory::Vat).unwrap();
    assert_eq!(vat.status, "Cancelled");
    assert_eq!(vat.effective_to, "31/12/2019");
    let rent = acme.get(ObligationCategory::RentIncome).unwrap();
    assert_eq!(rent.status, NO_OBLIGATION);
    let cargo = &records["Cargo Co"];
    assert_eq!(
        cargo.get(ObligationCategory::RentIncome).unwrap().status,
        "Active"
    );

    // 报表：3 行，第 2 行整行标红
    let files = report_files(&dir);
    assert_eq!(files.len(), 1);
    assert_eq!(summary.report_path.as_ref(), Some(&files[0]));
    let written = std::fs::read(&files[0]).unwrap();
    assert!(written.starts_with(b"PK"), "报表应为 xlsx (zip) 文件");
    let table = ReportTable::build(&progress.results);
    assert_eq!(table.rows.len(), 3);
    let beta = &table.rows[1];
    assert_eq!(beta[0].text, "Beta Traders");
    assert!(beta[..beta.len() - 1].iter().all(|c| c.tint == Tint::Red));
    assert_eq!(beta.last().unwrap().tint, Tint::ErrorFill);

    // 失败清单与运行日志
    let ledger = std::fs::read_to_string(&config.failure_log_file).unwrap();
    assert_eq!(ledger.lines().count(), 1);
    assert!(ledger.contains("Beta Traders"));
    let run_log = std::fs::read_to_string(&config.output_log_file).unwrap();
    assert!(run_log.contains("| Cargo Co | ok"));

    assert!(portal.is_closed());
}

#[tokio::test]
async fn test_second_run_overwrites_records() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let portal = standard_portal();
    let store = Arc::new(MemoryDatastore::with_entities(three_entities()));

    runner(&portal, &store, &config)
        .run(&CancellationToken::new())
        .await
        .unwrap();
    let first = store.records();
    let writes_after_first = store.progress_history().len();

    let outcome = runner(&portal, &store, &config)
        .run(&CancellationToken::new())
        .await
        .unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(summary.progress.results.len(), 3);

    // 第二次运行从一行干净的进度开始
    let claimed = &store.progress_history()[writes_after_first];
    assert_eq!(claimed.status, RunStatus::Running);
    assert_eq!(claimed.percent, 0);
    assert!(claimed.results.is_empty());
    assert_eq!(claimed.message, None);

    let second = store.records();
    assert_eq!(first, second);
    assert_eq!(second.len(), 2);
    assert_eq!(report_files(&dir).len(), 1);
}

#[tokio::test]
async fn test_exhausted_login_still_advances_progress() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let portal = standard_portal().rejecting("P051111111A", usize::MAX);
    let store = Arc::new(MemoryDatastore::with_entities(vec![
        Entity::new(1, "Acme Ltd", Some("P051111111A")),
        Entity::new(3, "Cargo Co", Some("P053333333C")),
    ]));

    let outcome = runner(&portal, &store, &config)
        .run(&CancellationToken::new())
        .await
        .unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run");
    };

    assert_eq!(portal.submissions_for("P051111111A"), 5);
    assert_eq!(running_percents(&store), vec![50, 100]);
    match &summary.progress.results[0] {
        RunResult::Error(error) => {
            assert_eq!(error.kind, FailureKind::LoginAttemptsExhausted);
            assert!(error.error_message.contains("5 attempts"));
        }
        other => panic!("expected an error result, got {:?}", other),
    }
    assert!(!summary.progress.results[1].is_error());
}

#[tokio::test]
async fn test_start_is_noop_while_another_run_is_active() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let portal = standard_portal();

    let in_flight = RunProgress {
        status: RunStatus::Running,
        percent: 40,
        results: vec![RunResult::Record(ObligationRecord::new("Acme Ltd"))],
        message: None,
        last_updated: Utc::now(),
    };
    let store = Arc::new(
        MemoryDatastore::with_entities(three_entities()).with_progress(in_flight.clone()),
    );

    let runner = runner(&portal, &store, &config);
    let outcome = runner.run(&CancellationToken::new()).await.unwrap();

    assert!(matches!(outcome, RunOutcome::AlreadyRunning));
    assert_eq!(store.load().await.unwrap(), Some(in_flight.clone()));
    assert_eq!(runner.tracker().get_status().await.unwrap(), in_flight);
    assert!(store.progress_history().is_empty());
    assert_eq!(portal.total_submissions(), 0);
    assert!(portal.is_closed());
}

#[tokio::test]
async fn test_cancellation_stops_at_entity_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let cancel = CancellationToken::new();
    let portal = standard_portal().cancelling_after(1, cancel.clone());
    let store = Arc::new(MemoryDatastore::with_entities(three_entities()));

    let outcome = assert_ok!(runner(&portal, &store, &config).run(&cancel).await);

    let RunOutcome::Cancelled(summary) = outcome else {
        panic!("expected a cancelled run");
    };
    // 第 1 个实体已完整处理并保留
    assert_eq!(summary.progress.results.len(), 1);
    assert_eq!(summary.progress.percent, 33);
    assert_eq!(summary.progress.status, RunStatus::Error);
    assert_eq!(summary.progress.message.as_deref(), Some("run cancelled"));
    assert_eq!(store.records().len(), 1);
    assert!(portal.is_closed());
}

#[tokio::test]
async fn test_session_loss_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let portal = standard_portal().losing_session_on("P053333333C");
    let store = Arc::new(MemoryDatastore::with_entities(three_entities()));

    let err = assert_err!(
        runner(&portal, &store, &config)
            .run(&CancellationToken::new())
            .await
    );
    assert!(err.is_session_fatal());

    let progress = store.load().await.unwrap().unwrap();
    assert_eq!(progress.status, RunStatus::Error);
    assert_eq!(progress.results.len(), 2);
    assert_eq!(progress.percent, 66);
    assert!(progress.message.unwrap().contains("会话"));
    assert!(portal.is_closed());
}

#[tokio::test]
async fn test_explicit_id_subset() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.entity_ids = vec![3];
    let portal = standard_portal();
    let store = Arc::new(MemoryDatastore::with_entities(three_entities()));

    let outcome = runner(&portal, &store, &config)
        .run(&CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(summary.progress.results.len(), 1);
    assert_eq!(summary.progress.results[0].entity_name(), "Cargo Co");
    assert_eq!(running_percents(&store), vec![100]);
}

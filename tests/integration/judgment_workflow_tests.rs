/*!
 * Integration tests for judgment runs against scripted providers
 */

use anyhow::Result;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ambisent::errors::ProviderError;
use ambisent::judgment::{AutoPolicy, ConsolePolicy};
use ambisent::providers::mock::MockProvider;
use ambisent::sentence_loader::IndexedSentence;
use ambisent::Controller;
use crate::common;
use crate::common::mock_providers::{self, FIRST_ANSWER, SECOND_ANSWER};

fn no_retry() -> AutoPolicy {
    AutoPolicy { retry: false, cont: true }
}

/// Both answers land in the table, both logs reflect the run
#[tokio::test]
async fn test_run_withTwoAnswers_shouldFillTableAndLogs() -> Result<()> {
    common::init_logger();
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);
    let provider = mock_providers::sample_answers();
    let controller = Controller::with_client(config.clone(), common::as_client(&provider));

    let summary = controller.run(&mut no_retry()).await?;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 2);
    assert!(summary.failed.is_empty());
    assert!(!summary.stopped_early);
    assert_eq!(
        common::read(&csv),
        "原句,ai判断,ai理解\n天气很好。,对,解释A\n明天.,错,\"解释B\n续\"\n"
    );

    let success_log = common::read(&config.output.success_log);
    assert!(success_log.contains("[行号 1] 天气很好。\nAI判断: 对\nAI理解: 解释A\n"));
    assert!(success_log.contains("[行号 2] 明天.\nAI判断: 错\nAI理解: 解释B\n续\n"));
    assert_eq!(common::read(&config.output.failed_log), "");

    let mut prompts = provider.received_prompts();
    prompts.sort();
    assert_eq!(prompts, vec!["判断：天气很好。".to_string(), "判断：明天.".to_string()]);
    Ok(())
}

/// A sentence that keeps failing is retried up to the bound, then logged as failed
#[tokio::test]
async fn test_run_withPersistentFailure_shouldLogOnlyFailedSentence() -> Result<()> {
    common::init_logger();
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);
    let provider = mock_providers::failing_on("明天");
    let controller = Controller::with_client(config.clone(), common::as_client(&provider));

    let summary = controller.run(&mut no_retry()).await?;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, vec![IndexedSentence::new(2, "明天.")]);
    assert_eq!(common::read(&config.output.failed_log), "[2] 明天.\n");

    let success_log = common::read(&config.output.success_log);
    assert_eq!(success_log.matches("[行号 ").count(), 1);
    assert!(success_log.starts_with("[行号 1] 天气很好。"));

    assert_eq!(common::read(&csv), "原句,ai判断,ai理解\n天气很好。,对,解释A\n明天.,,\n");

    // one call for the first sentence, three attempts for the second
    let attempts = provider.received_prompts().iter().filter(|p| p.contains("明天")).count();
    assert_eq!(attempts, 3);
    assert_eq!(provider.request_count(), 4);
    Ok(())
}

/// Results completing out of order are still written to their own rows
#[tokio::test]
async fn test_run_withReversedCompletionOrder_shouldKeepRowsAligned() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let mut config = common::test_config(dir, &csv, &template);
    config.batch.max_workers = 2;
    let provider = mock_providers::sample_answers().with_delay(mock_providers::first_sentence_slowest);
    let controller = Controller::with_client(config, common::as_client(&provider));

    controller.run(&mut no_retry()).await?;

    assert_eq!(
        common::read(&csv),
        "原句,ai判断,ai理解\n天气很好。,对,解释A\n明天.,错,\"解释B\n续\"\n"
    );
    Ok(())
}

/// Rows shorter than the header are padded, other columns kept
#[tokio::test]
async fn test_run_withShortRows_shouldPadAndKeepOtherColumns() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_test_file(dir, "sentences.csv", "原句,备注\n天气很好。\n明天.,x\n")?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);
    let provider = mock_providers::sample_answers();
    let controller = Controller::with_client(config, common::as_client(&provider));

    controller.run(&mut no_retry()).await?;

    assert_eq!(
        common::read(&csv),
        "原句,备注,ai判断,ai理解\n天气很好。,,对,解释A\n明天.,x,错,\"解释B\n续\"\n"
    );
    Ok(())
}

/// Replaying the failure log fixes the row and empties the log
#[tokio::test]
async fn test_runFailed_afterFailedRun_shouldResolveLoggedSentences() -> Result<()> {
    common::init_logger();
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);

    let failing = mock_providers::failing_on("明天");
    Controller::with_client(config.clone(), common::as_client(&failing))
        .run(&mut no_retry())
        .await?;
    assert_eq!(common::read(&config.output.failed_log), "[2] 明天.\n");

    let working = mock_providers::sample_answers();
    let summary = Controller::with_client(config.clone(), common::as_client(&working))
        .run_failed(&mut no_retry())
        .await?;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(summary.failed.is_empty());
    assert_eq!(working.received_prompts(), vec!["判断：明天.".to_string()]);
    assert_eq!(common::read(&config.output.failed_log), "");
    assert_eq!(
        common::read(&csv),
        "原句,ai判断,ai理解\n天气很好。,对,解释A\n明天.,错,\"解释B\n续\"\n"
    );
    assert_eq!(common::read(&config.output.success_log).matches("[行号 ").count(), 2);
    Ok(())
}

/// A multi-line sentence is replayed whole, not as its first logged line
#[tokio::test]
async fn test_runFailed_withMultiLineSentence_shouldReplayFullText() -> Result<()> {
    common::init_logger();
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_test_file(dir, "sentences.csv", "原句\n\"第一行\n第二行。\"\n")?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);

    let failing = MockProvider::failing();
    Controller::with_client(config.clone(), common::as_client(&failing))
        .run(&mut no_retry())
        .await?;
    assert_eq!(common::read(&config.output.failed_log), "[1] 第一行\n第二行。\n");

    let working = MockProvider::scripted(|_| Ok("是\n两行读法".to_string()));
    let summary = Controller::with_client(config.clone(), common::as_client(&working))
        .run_failed(&mut no_retry())
        .await?;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(working.received_prompts(), vec!["判断：第一行\n第二行。".to_string()]);
    assert!(common::read(&config.output.success_log).starts_with("[行号 1] 第一行\n第二行。\nAI判断: 是\n"));
    assert_eq!(common::read(&csv), "原句,ai判断,ai理解\n\"第一行\n第二行。\",是,两行读法\n");
    assert_eq!(common::read(&config.output.failed_log), "");
    Ok(())
}

/// Logged rows missing from the table are replayed with the logged text
#[tokio::test]
async fn test_runFailed_withRowMissingFromTable_shouldUseLoggedText() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);
    std::fs::create_dir_all(dir.join("results"))?;
    std::fs::write(&config.output.failed_log, "[2] 旧文本。\n[5] 表外句子。\n")?;
    let provider = mock_providers::sample_answers();

    Controller::with_client(config, common::as_client(&provider))
        .run_failed(&mut no_retry())
        .await?;

    let mut prompts = provider.received_prompts();
    prompts.sort();
    assert_eq!(prompts, vec!["判断：明天.".to_string(), "判断：表外句子。".to_string()]);
    Ok(())
}

/// A blank line shifts loader and table alike, so answers land on their own rows
#[tokio::test]
async fn test_run_withBlankLine_shouldKeepRowsAligned() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_test_file(dir, "sentences.csv", "原句\n天气很好。\n\n明天.\n")?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);
    let provider = mock_providers::sample_answers();

    Controller::with_client(config, common::as_client(&provider))
        .run(&mut no_retry())
        .await?;

    assert_eq!(
        common::read(&csv),
        "原句,ai判断,ai理解\n天气很好。,对,解释A\n明天.,错,\"解释B\n续\"\n"
    );
    Ok(())
}

/// Nothing to replay means no requests
#[tokio::test]
async fn test_runFailed_withEmptyLog_shouldNotCallProvider() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);
    let provider = MockProvider::working();

    let summary = Controller::with_client(config, common::as_client(&provider))
        .run_failed(&mut no_retry())
        .await?;

    assert_eq!(summary.total, 0);
    assert_eq!(provider.request_count(), 0);
    Ok(())
}

/// A fresh run starts from an empty failure log
#[tokio::test]
async fn test_run_withStaleFailureLog_shouldResetIt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);
    std::fs::create_dir_all(dir.join("results"))?;
    std::fs::write(&config.output.failed_log, "[9] 旧句子。\n")?;
    let provider = mock_providers::sample_answers();

    Controller::with_client(config.clone(), common::as_client(&provider))
        .run(&mut no_retry())
        .await?;

    assert_eq!(common::read(&config.output.failed_log), "");
    Ok(())
}

/// Declining to continue stops after the current batch
#[tokio::test]
async fn test_run_whenPolicyDeclinesToContinue_shouldStopEarly() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let mut config = common::test_config(dir, &csv, &template);
    config.batch.batch_size = 1;
    let provider = mock_providers::sample_answers();
    let controller = Controller::with_client(config, common::as_client(&provider));

    let summary = controller.run(&mut AutoPolicy { retry: false, cont: false }).await?;

    assert!(summary.stopped_early);
    assert_eq!(summary.batches_run, 1);
    assert_eq!(summary.batches_total, 2);
    assert_eq!(provider.request_count(), 1);
    assert_eq!(common::read(&csv), "原句,ai判断,ai理解\n天气很好。,对,解释A\n明天.,,\n");
    Ok(())
}

/// An accepted retry round recovers a sentence whose first attempts all failed
#[tokio::test]
async fn test_run_withRetryRound_shouldRecoverFailedSentence() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let provider = MockProvider::scripted(move |prompt| {
        if prompt.contains("明天") && counter.fetch_add(1, Ordering::SeqCst) < 3 {
            return Err(ProviderError::Timeout(5));
        }
        Ok(if prompt.contains("明天") { SECOND_ANSWER } else { FIRST_ANSWER }.to_string())
    });
    let controller = Controller::with_client(config.clone(), common::as_client(&provider));

    let summary = controller.run(&mut AutoPolicy::unattended()).await?;

    assert!(summary.failed.is_empty());
    assert_eq!(summary.succeeded, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(common::read(&config.output.failed_log), "");
    assert!(common::read(&csv).ends_with("明天.,错,\"解释B\n续\"\n"));
    Ok(())
}

/// The console policy is asked between batches and after failures
#[tokio::test]
async fn test_run_withConsolePolicy_shouldAskBothQuestions() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let mut config = common::test_config(dir, &csv, &template);
    config.batch.batch_size = 1;
    let provider = mock_providers::failing_on("明天");
    let controller = Controller::with_client(config.clone(), common::as_client(&provider));
    let mut policy = ConsolePolicy::new(Cursor::new(b"y\nn\n".to_vec()), Vec::new(), None, None);

    let summary = controller.run(&mut policy).await?;

    assert_eq!(summary.batches_run, 2);
    assert_eq!(summary.failed.len(), 1);
    let transcript = String::from_utf8(policy.into_output())?;
    assert!(transcript.contains("Continue with batch 2/2? (y/n): "));
    assert!(transcript.contains("[2] 明天."));
    assert!(transcript.contains("Retry the failed sentences? (y/n): "));
    assert_eq!(common::read(&config.output.failed_log), "[2] 明天.\n");
    Ok(())
}

/// Blank replies count as failures and are not written to the table
#[tokio::test]
async fn test_run_withEmptyReplies_shouldRecordEveryRowAsFailed() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);
    let provider = MockProvider::empty();

    let summary = Controller::with_client(config.clone(), common::as_client(&provider))
        .run(&mut no_retry())
        .await?;

    assert_eq!(summary.succeeded, 0);
    assert_eq!(common::read(&config.output.failed_log), "[1] 天气很好。\n[2] 明天.\n");
    assert_eq!(common::read(&csv), "原句\n天气很好。\n明天.\n");
    assert!(!config.output.success_log.exists());
    Ok(())
}

/// A panicking request only loses its own sentence
#[test]
fn test_run_withPanickingProvider_shouldFailWithoutAborting() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let config = common::test_config(dir, &csv, &template);
    let provider = MockProvider::panicking();
    let controller = Controller::with_client(config.clone(), common::as_client(&provider));

    let summary = tokio_test::block_on(async { controller.run(&mut no_retry()).await })?;

    assert_eq!(summary.failed.len(), 2);
    assert_eq!(common::read(&config.output.failed_log), "[1] 天气很好。\n[2] 明天.\n");
    Ok(())
}

/// A separate output table leaves the input untouched
#[tokio::test]
async fn test_run_withSeparateOutputTable_shouldNotModifyInput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let template = common::create_template(dir)?;
    let mut config = common::test_config(dir, &csv, &template);
    let output = dir.join("results").join("judged.csv");
    config.output.result_csv = Some(output.clone());
    let provider = mock_providers::sample_answers();

    Controller::with_client(config, common::as_client(&provider))
        .run(&mut no_retry())
        .await?;

    assert_eq!(common::read(&csv), "原句\n天气很好。\n明天.\n");
    assert!(common::read(&output).starts_with("原句,ai判断,ai理解\n"));
    Ok(())
}

/// Missing inputs are reported before any request
#[tokio::test]
async fn test_run_withMissingTemplate_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_sentence_table(dir)?;
    let config = common::test_config(dir, &csv, &dir.join("missing.txt"));
    let provider = MockProvider::working();

    let result = Controller::with_client(config, common::as_client(&provider))
        .run(&mut no_retry())
        .await;

    assert!(result.is_err());
    assert_eq!(provider.request_count(), 0);
    Ok(())
}

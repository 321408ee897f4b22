//! 页面改写管道集成测试
//!
//! 从打开页面到替换、还原的端到端行为

use std::time::Duration;

use serde_json::json;

use lexa::parsers::html::text_content;
use lexa::rewrite::analyzer::{AnalysisResult, RawMatch};
use lexa::rewrite::config::{constants, RewriteConfig};
use lexa::rewrite::error::RewriteError;
use lexa::rewrite::pipeline::{extract_blocks, might_match};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{HtmlTestHelper, RecordingAnalyzer, RuleHelper, TestEnvironment};

/// 段落文本（按文档顺序）
fn block_texts(env: &TestEnvironment, tab_id: &str) -> Vec<String> {
    let session = env.service.session(tab_id).expect("session should exist");
    extract_blocks(session.document().expect("session should be alive"))
        .into_iter()
        .map(|block| block.text)
        .collect()
}

#[tokio::test]
async fn test_second_pass_reports_already_processed() {
    let env = TestEnvironment::new(RecordingAnalyzer::literal());
    let tab = env
        .open("1", &HtmlTestHelper::paragraphs(&["I am happy", "Nothing here"]))
        .await;

    let first = env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(first.replacements_made, 1);
    assert!(!first.already_processed);

    let html_after_first = env.service.snapshot(&tab).unwrap();
    let second = env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(second.replacements_made, 0);
    assert!(second.already_processed);

    assert_eq!(env.service.snapshot(&tab).unwrap(), html_after_first);
    assert_eq!(env.analyzer.request_count(), 1, "second pass must not call the analyzer");
}

#[tokio::test]
async fn test_block_order_is_preserved_in_request() {
    let analyzer = RecordingAnalyzer::scripted(vec![Ok(AnalysisResult::new(vec![RawMatch::new(
        2, "1", "happy", "ecstatic",
    )]))]);
    let env = TestEnvironment::new(analyzer);
    let tab = env
        .open(
            "1",
            &HtmlTestHelper::paragraphs(&["happy zero", "happy one", "happy two"]),
        )
        .await;

    let outcome = env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(outcome.replacements_made, 1);

    let requests = env.analyzer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].blocks, vec!["happy zero", "happy one", "happy two"]);

    // 匹配按 paragraph_index 回到第三个段落
    let texts = block_texts(&env, &tab);
    assert_eq!(texts, vec!["happy zero", "happy one", "ecstatic two"]);
}

#[tokio::test]
async fn test_longest_phrase_wins() {
    let analyzer = RecordingAnalyzer::scripted(vec![Ok(AnalysisResult::new(vec![
        RawMatch::new(0, "1", "happy", "ecstatic"),
        RawMatch::new(0, "1", "very happy", "ecstatic"),
    ]))]);
    let env = TestEnvironment::new(analyzer);
    let tab = env
        .open("1", &HtmlTestHelper::paragraphs(&["I am very happy today"]))
        .await;

    let outcome = env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(outcome.replacements_made, 1);
    assert_eq!(block_texts(&env, &tab), vec!["I am ecstatic today"]);

    let html = env.service.snapshot(&tab).unwrap();
    assert!(html.contains(&format!("{}=\"very happy\"", constants::ORIGINAL_ATTR)));
    assert_eq!(html.matches(constants::ORIGINAL_ATTR).count(), 1);
}

#[tokio::test]
async fn test_revert_restores_text_and_allows_reprocessing() {
    let env = TestEnvironment::new(RecordingAnalyzer::literal());
    let html = HtmlTestHelper::page(
        "<p>So <b>happy</b> and happy again.</p><p style=\"color: red\">Very happy people</p>",
    );
    let tab = env.open("1", &html).await;
    let before = block_texts(&env, &tab);

    let processed = env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(processed.replacements_made, 3);
    assert_ne!(block_texts(&env, &tab), before);

    let reverted = env.service.revert_page(&tab).await.unwrap();
    assert_eq!(reverted.reverted_count, 3);
    assert_eq!(block_texts(&env, &tab), before);
    assert!(!env.service.snapshot(&tab).unwrap().contains(constants::ORIGINAL_ATTR));

    let again = env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert!(!again.already_processed);
    assert_eq!(again.replacements_made, 3);
}

#[test]
fn test_candidate_filter_soundness() {
    let rules = vec![RuleHelper::rule("1", &["happy"], "ecstatic")];
    assert!(!might_match("The weather was sunny", &rules));
    assert!(might_match("I felt very happy", &rules));
}

#[tokio::test]
async fn test_out_of_range_index_is_discarded() {
    let analyzer = RecordingAnalyzer::scripted(vec![Ok(AnalysisResult::new(vec![RawMatch::new(
        99, "1", "happy", "ecstatic",
    )]))]);
    let env = TestEnvironment::new(analyzer);
    let tab = env
        .open("1", &HtmlTestHelper::paragraphs(&["happy a", "happy b"]))
        .await;

    let outcome = env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(outcome.replacements_made, 0);
    assert!(!outcome.already_processed);

    let session = env.service.session(&tab).unwrap();
    assert_eq!(session.processed_count(), 2);
    assert_eq!(block_texts(&env, &tab), vec!["happy a", "happy b"]);
}

#[tokio::test]
async fn test_missing_results_array_is_discarded() {
    let analyzer =
        RecordingAnalyzer::scripted(vec![Ok(AnalysisResult::from_json(&json!({ "answer": 42 })))]);
    let env = TestEnvironment::new(analyzer);
    let tab = env
        .open("1", &HtmlTestHelper::paragraphs(&["happy a", "happy b"]))
        .await;

    let outcome = env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(outcome.replacements_made, 0);
    assert_eq!(env.service.session(&tab).unwrap().processed_count(), 2);
}

#[tokio::test]
async fn test_failed_chunk_does_not_stop_later_chunks() {
    let analyzer = RecordingAnalyzer::scripted(vec![Err(RewriteError::ServiceError(
        "API request failed: 500".to_string(),
    ))]);
    let env = TestEnvironment::new(analyzer);
    let tab = env
        .open("1", &HtmlTestHelper::numbered_paragraphs(7, "happy"))
        .await;

    let outcome = env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(env.analyzer.request_count(), 2);
    assert_eq!(outcome.replacements_made, 2, "only the second chunk is applied");
    assert_eq!(env.service.session(&tab).unwrap().processed_count(), 7);
    assert!(env.service.settings().is_tab_processed(&tab).await.unwrap());
}

#[tokio::test]
async fn test_request_count_is_independent_of_rule_count() {
    for rule_count in [1, 5, 20] {
        let env = TestEnvironment::new(RecordingAnalyzer::literal());
        let tab = env
            .open("1", &HtmlTestHelper::numbered_paragraphs(12, "happy"))
            .await;

        let outcome = env
            .service
            .process_page(&tab, Some(RuleHelper::many(rule_count)))
            .await
            .unwrap();
        assert_eq!(outcome.replacements_made, 12);

        let requests = env.analyzer.requests();
        assert_eq!(requests.len(), 3, "{} rules", rule_count);
        let sizes: Vec<usize> = requests.iter().map(|r| r.blocks.len()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        assert!(requests.iter().all(|r| r.rule_count == rule_count));
    }
}

#[tokio::test]
async fn test_blocks_without_candidates_are_not_sent() {
    let env = TestEnvironment::new(RecordingAnalyzer::literal());
    let tab = env
        .open(
            "1",
            &HtmlTestHelper::paragraphs(&["The weather was sunny", "I am happy", "Cloudy later"]),
        )
        .await;

    env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    let requests = env.analyzer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].blocks, vec!["I am happy"]);
}

#[tokio::test]
async fn test_concurrent_triggers_run_a_single_pass() {
    let env = TestEnvironment::new(
        RecordingAnalyzer::literal().with_delay(Duration::from_millis(30)),
    );
    let tab = env
        .open("1", &HtmlTestHelper::paragraphs(&["I am happy"]))
        .await;

    let (first, second) = tokio::join!(
        env.service.process_page(&tab, Some(RuleHelper::happy())),
        env.service.process_page(&tab, Some(RuleHelper::happy())),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.replacements_made + second.replacements_made, 1);
    assert!(first.already_processed ^ second.already_processed);
    assert_eq!(env.analyzer.request_count(), 1);
}

#[tokio::test]
async fn test_navigation_during_request_aborts_quietly() {
    let env = TestEnvironment::new(
        RecordingAnalyzer::literal().with_delay(Duration::from_millis(50)),
    );
    let tab = env
        .open("1", &HtmlTestHelper::paragraphs(&["I am happy"]))
        .await;
    let old_session = env.service.session(&tab).unwrap();
    let old_blocks = extract_blocks(old_session.document().unwrap());

    let navigate = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        env.service
            .open_page(&tab, HtmlTestHelper::paragraphs(&["Fresh page"]).as_bytes(), None)
            .await
    };
    let (outcome, navigated) = tokio::join!(
        env.service.process_page(&tab, Some(RuleHelper::happy())),
        navigate
    );
    navigated.unwrap();

    let outcome = outcome.unwrap();
    assert_eq!(outcome.replacements_made, 0);
    assert!(!outcome.already_processed);
    assert!(!env.service.settings().is_tab_processed(&tab).await.unwrap());
    assert!(!old_session.is_alive());

    // 旧文档未被修改
    assert_eq!(text_content(&old_blocks[0].node), "I am happy");
}

#[tokio::test]
async fn test_stylesheet_injected_once() {
    let env = TestEnvironment::new(RecordingAnalyzer::literal());
    let tab = env
        .open("1", &HtmlTestHelper::paragraphs(&["happy one", "happy two"]))
        .await;

    env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    env.service.append_content(&tab, "<p>happy three</p>").unwrap();
    let added = env.service.process_new_blocks(&tab).await.unwrap();
    assert_eq!(added.replacements_made, 1);

    let html = env.service.snapshot(&tab).unwrap();
    assert_eq!(html.matches(constants::STYLE_ELEMENT_ID).count(), 1);
}

#[tokio::test]
async fn test_hidden_blocks_are_skipped() {
    let env = TestEnvironment::new(RecordingAnalyzer::literal());
    let html = HtmlTestHelper::page(
        "<p hidden>happy hidden</p><div style=\"display: none\"><p>happy nested</p></div>\
         <script>var p = '<p>happy</p>';</script><p>happy visible</p>",
    );
    let tab = env.open("1", &html).await;

    let outcome = env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(outcome.replacements_made, 1);
    assert_eq!(env.analyzer.requests()[0].blocks, vec!["happy visible"]);
}

#[tokio::test]
async fn test_custom_chunk_size_is_honored() {
    let mut config = RewriteConfig::default();
    config.chunk_size = 2;
    let env = TestEnvironment::with_config(RecordingAnalyzer::literal(), config);
    let tab = env
        .open("1", &HtmlTestHelper::numbered_paragraphs(5, "happy"))
        .await;

    env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(env.analyzer.request_count(), 3);
}

#[tokio::test]
async fn test_new_markers_wait_for_visibility_registration() {
    let env = TestEnvironment::new(RecordingAnalyzer::literal());
    let tab = env
        .open("1", &HtmlTestHelper::paragraphs(&["I am happy, happy"]))
        .await;

    let outcome = env.service.process_page(&tab, Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(outcome.replacements_made, 2);

    let session = env.service.session(&tab).unwrap();
    let markers = session.take_pending_markers();
    assert_eq!(markers.len(), outcome.replacements_made);
    assert!(markers
        .iter()
        .all(|marker| text_content(marker) == "ecstatic"));
    assert!(session.take_pending_markers().is_empty());
}

#[tokio::test]
async fn test_legacy_charset_page_round_trips_as_utf8() {
    let env = TestEnvironment::new(RecordingAnalyzer::literal());
    let page: &[u8] = b"<html><head><meta charset=\"windows-1252\"><title>t</title></head>\
        <body><p>caf\xe9 is happy</p></body></html>";
    env.service
        .open_page("1", page, Some("https://example.com/menu"))
        .await
        .unwrap();

    let outcome = env.service.process_page("1", Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(outcome.replacements_made, 1);
    assert_eq!(env.analyzer.requests()[0].blocks, vec!["café is happy"]);

    let html = env.service.snapshot("1").unwrap();
    assert!(html.contains("café is "));
    assert!(!html.contains('\u{FFFD}'));
    assert!(html.contains("<meta charset=\"utf-8\">"));

    env.service.revert_page("1").await.unwrap();
    assert!(env.service.snapshot("1").unwrap().contains("<p>café is happy</p>"));
}

//! 设置存储集成测试
//!
//! 文件存储的持久化、变更通知，以及服务与存储之间的标记交互

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use lexa::rewrite::analyzer::LiteralAnalyzer;
use lexa::rewrite::config::{constants, RewriteConfig};
use lexa::rewrite::storage::{FileStore, Settings, SettingsStore};
use lexa::rewrite::RewriteService;

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{HtmlTestHelper, RuleHelper};

async fn file_settings(dir: &TempDir) -> Settings {
    let store = FileStore::open(dir.path().join("store.json"))
        .await
        .expect("store should open");
    Settings::new(Arc::new(store))
}

fn literal_service(settings: Settings) -> RewriteService {
    let analyzer = Arc::new(LiteralAnalyzer::new());
    RewriteService::new(RewriteConfig::default(), settings, analyzer.clone(), analyzer)
        .expect("default config should be valid")
}

#[tokio::test]
async fn test_settings_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let settings = file_settings(&dir).await;
        settings.set_api_key("secret").await.unwrap();
        settings.set_auto_process(true).await.unwrap();
        settings
            .save_rules(&RuleHelper::happy().into())
            .await
            .unwrap();
    }

    let settings = file_settings(&dir).await;
    assert!(settings.auto_process().await.unwrap());
    assert_eq!(settings.rules().await.unwrap().as_slice(), RuleHelper::happy().as_slice());
    if std::env::var("LEXA_API_KEY").is_err() {
        assert_eq!(settings.api_key().await.unwrap().as_deref(), Some("secret"));
    }
}

#[tokio::test]
async fn test_legacy_single_string_rules_are_read() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("store.json"),
        json!({
            "replacements": [
                { "id": "1700000000000", "original": "happy", "replacement": "ecstatic" },
                { "id": "1700000000001", "original": ["sad", "unhappy"], "replacement": "forlorn" }
            ]
        })
        .to_string(),
    )
    .unwrap();

    let rules = file_settings(&dir).await.rules().await.unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules.as_slice()[0].original, vec!["happy".to_string()]);
    assert_eq!(rules.as_slice()[1].original.len(), 2);
}

#[tokio::test]
async fn test_corrupt_store_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("store.json"), "[1, 2, 3]").unwrap();
    assert!(FileStore::open(dir.path().join("store.json")).await.is_err());
}

#[tokio::test]
async fn test_change_notifications_carry_old_and_new_values() {
    let dir = TempDir::new().unwrap();
    let settings = file_settings(&dir).await;
    let mut changes = settings.subscribe();

    settings.set_auto_process(true).await.unwrap();
    settings.set_auto_process(true).await.unwrap();
    settings.set_auto_process(false).await.unwrap();

    let first = changes.recv().await.unwrap();
    assert_eq!(first.key, constants::KEY_AUTO_PROCESS);
    assert_eq!(first.old_value, None);
    assert_eq!(first.new_value, Some(json!(true)));

    // 相同的值不会产生通知
    let second = changes.recv().await.unwrap();
    assert_eq!(second.old_value, Some(json!(true)));
    assert_eq!(second.new_value, Some(json!(false)));
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_processed_flag_is_persisted_and_cleared_on_navigation() {
    let dir = TempDir::new().unwrap();
    let settings = file_settings(&dir).await;
    let service = literal_service(settings.clone());

    let html = HtmlTestHelper::paragraphs(&["I am happy"]);
    service.open_page("7", html.as_bytes(), None).await.unwrap();
    service.process_page("7", Some(RuleHelper::happy())).await.unwrap();

    let raw = settings.store().get(constants::KEY_PROCESSED_TABS).await.unwrap();
    assert_eq!(raw, Some(json!({ "7": true })));

    // 重新导航清除标记
    service.open_page("7", html.as_bytes(), None).await.unwrap();
    assert!(!settings.is_tab_processed("7").await.unwrap());
    let outcome = service.process_page("7", Some(RuleHelper::happy())).await.unwrap();
    assert_eq!(outcome.replacements_made, 1);
}

#[tokio::test]
async fn test_rule_maintenance_round_trip_through_store() {
    let dir = TempDir::new().unwrap();
    let service = literal_service(file_settings(&dir).await);

    let added = service.add_rule("ecstatic").await.unwrap();
    assert_eq!(added.original, vec!["ecstatic".to_string()]);
    let second = service.add_rule("forlorn").await.unwrap();
    assert_ne!(added.id, second.id);

    let reopened = file_settings(&dir).await.rules().await.unwrap();
    assert_eq!(reopened.len(), 2);

    assert!(service.remove_rule(&added.id).await.unwrap());
    assert!(!service.remove_rule(&added.id).await.unwrap());
    assert_eq!(file_settings(&dir).await.rules().await.unwrap().len(), 1);
}

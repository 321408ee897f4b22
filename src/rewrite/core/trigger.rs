//! 自动处理触发器
//!
//! 把页面加载、内容变化和设置变更转换为对 [`RewriteService`] 的处理调用：
//!
//! - `PageLoaded`: 等待 `initial_delay_ms` 后整页处理（受标签页标记约束）
//! - `ContentAdded`: 以 `auto_process_debounce_ms` 去抖，只处理新段落
//! - 开启 `autoProcess` 或修改规则：立即对所有打开的页面处理新段落
//! - 关闭 `autoProcess`: 取消所有待执行的处理
//!
//! 只有在自动处理已开启、规则非空且分析服务就绪时才会真正发起处理。
//! 后台触发的失败只记录日志。

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};

use super::service::RewriteService;
use crate::rewrite::config::constants;
use crate::rewrite::error::{helpers, RewriteResult};
use crate::rewrite::storage::StoreChange;

/// 触发事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// 页面加载完成
    PageLoaded { tab_id: String },
    /// 页面插入了新的段落
    ContentAdded { tab_id: String },
    /// 设置在存储通知之外被修改，重新检查所有页面
    SettingsChanged,
    Shutdown,
}

/// 向触发器发送事件的句柄
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    sender: mpsc::Sender<TriggerEvent>,
}

impl TriggerHandle {
    pub async fn send(&self, event: TriggerEvent) -> bool {
        self.sender.send(event).await.is_ok()
    }

    pub async fn page_loaded(&self, tab_id: &str) -> bool {
        self.send(TriggerEvent::PageLoaded {
            tab_id: tab_id.to_string(),
        })
        .await
    }

    pub async fn content_added(&self, tab_id: &str) -> bool {
        self.send(TriggerEvent::ContentAdded {
            tab_id: tab_id.to_string(),
        })
        .await
    }

    pub async fn shutdown(&self) -> bool {
        self.send(TriggerEvent::Shutdown).await
    }
}

enum Step {
    Event(Option<TriggerEvent>),
    Change(Result<StoreChange, broadcast::error::RecvError>),
    Due,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Page,
    NewBlocks,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    due: Instant,
    kind: PendingKind,
}

/// 自动处理触发器
pub struct AutoProcessTrigger {
    service: Rc<RewriteService>,
    events: mpsc::Receiver<TriggerEvent>,
    changes: broadcast::Receiver<StoreChange>,
    changes_open: bool,
    initial_delay: Duration,
    debounce: Duration,
    pending: HashMap<String, Pending>,
}

impl AutoProcessTrigger {
    /// 创建触发器及其事件句柄
    pub fn new(service: Rc<RewriteService>) -> (Self, TriggerHandle) {
        let (sender, events) = mpsc::channel(64);
        let changes = service.settings().subscribe();
        let initial_delay = service.config().initial_delay();
        let debounce = service.config().auto_process_debounce();

        let trigger = Self {
            service,
            events,
            changes,
            changes_open: true,
            initial_delay,
            debounce,
            pending: HashMap::new(),
        };
        (trigger, TriggerHandle { sender })
    }

    /// 待执行处理的标签页数量
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// 事件循环，直到收到 `Shutdown` 或所有句柄被丢弃
    pub async fn run(mut self) {
        tracing::debug!("自动处理触发器启动");
        loop {
            let next_deadline = self.next_deadline();

            let step = tokio::select! {
                event = self.events.recv() => Step::Event(event),
                change = self.changes.recv(), if self.changes_open => Step::Change(change),
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if next_deadline.is_some() => Step::Due,
            };

            match step {
                Step::Event(None) | Step::Event(Some(TriggerEvent::Shutdown)) => break,
                Step::Event(Some(event)) => self.on_event(event).await,
                Step::Change(Ok(change)) => self.on_store_change(change).await,
                Step::Change(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!("设置变更通知丢失 {} 条，重新检查所有页面", skipped);
                    self.process_open_pages().await;
                }
                Step::Change(Err(broadcast::error::RecvError::Closed)) => self.changes_open = false,
                Step::Due => self.fire_due().await,
            }
        }
        tracing::debug!("自动处理触发器停止");
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.due).min()
    }

    async fn on_event(&mut self, event: TriggerEvent) {
        match event {
            TriggerEvent::PageLoaded { tab_id } => {
                self.schedule(tab_id, PendingKind::Page, self.initial_delay);
            }
            TriggerEvent::ContentAdded { tab_id } => {
                self.schedule(tab_id, PendingKind::NewBlocks, self.debounce);
            }
            TriggerEvent::SettingsChanged => self.process_open_pages().await,
            TriggerEvent::Shutdown => {}
        }
    }

    /// 登记（或推迟）一次处理；整页处理不会被降级为新段落处理
    fn schedule(&mut self, tab_id: String, kind: PendingKind, delay: Duration) {
        let due = Instant::now() + delay;
        self.pending
            .entry(tab_id)
            .and_modify(|pending| {
                pending.due = pending.due.max(due);
                if kind == PendingKind::Page {
                    pending.kind = PendingKind::Page;
                }
            })
            .or_insert(Pending { due, kind });
    }

    async fn on_store_change(&mut self, change: StoreChange) {
        match change.key.as_str() {
            constants::KEY_AUTO_PROCESS => {
                if change.new_value.as_ref().and_then(|v| v.as_bool()) == Some(true) {
                    tracing::info!("自动处理已开启");
                    self.process_open_pages().await;
                } else {
                    tracing::info!("自动处理已关闭，取消 {} 个待处理页面", self.pending.len());
                    self.pending.clear();
                }
            }
            constants::KEY_RULES if change.new_value.is_some() => {
                tracing::debug!("替换规则已修改");
                self.process_open_pages().await;
            }
            _ => {}
        }
    }

    async fn fire_due(&mut self) {
        let now = Instant::now();
        let due: Vec<(String, PendingKind)> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.due <= now)
            .map(|(tab_id, pending)| (tab_id.clone(), pending.kind))
            .collect();

        for (tab_id, kind) in due {
            self.pending.remove(&tab_id);
            self.process(&tab_id, kind).await;
        }
    }

    async fn process_open_pages(&mut self) {
        for tab_id in self.service.open_tabs() {
            self.pending.remove(&tab_id);
            self.process(&tab_id, PendingKind::NewBlocks).await;
        }
    }

    async fn process(&self, tab_id: &str, kind: PendingKind) {
        match self.should_process().await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                helpers::log_error(&e);
                return;
            }
        }

        let result = match kind {
            PendingKind::Page => self.service.process_page(tab_id, None).await,
            PendingKind::NewBlocks => self.service.process_new_blocks(tab_id).await,
        };
        match result {
            Ok(outcome) if outcome.already_processed => {
                tracing::debug!("标签页 {} 已处理，自动处理跳过", tab_id);
            }
            Ok(outcome) => {
                tracing::info!("自动处理标签页 {}: {} 处替换", tab_id, outcome.replacements_made);
            }
            Err(e) => helpers::log_error(&e.with_context(format!("自动处理标签页 {}", tab_id))),
        }
    }

    /// 自动处理已开启、规则非空且分析服务就绪
    async fn should_process(&self) -> RewriteResult<bool> {
        let settings = self.service.settings();
        if !settings.auto_process().await? {
            return Ok(false);
        }
        if settings.rules().await?.is_empty() {
            return Ok(false);
        }
        Ok(self.service.check_ready().await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::analyzer::LiteralAnalyzer;
    use crate::rewrite::config::RewriteConfig;
    use crate::rewrite::rules::{ReplacementRule, RuleList};
    use crate::rewrite::storage::{MemoryStore, Settings};
    use std::sync::Arc;

    fn service() -> Rc<RewriteService> {
        let analyzer = Arc::new(LiteralAnalyzer::new());
        let settings = Settings::new(Arc::new(MemoryStore::new()));
        let mut config = RewriteConfig::default();
        config.initial_delay_ms = 10;
        config.auto_process_debounce_ms = 20;
        Rc::new(RewriteService::new(config, settings, analyzer.clone(), analyzer).unwrap())
    }

    fn rules() -> RuleList {
        RuleList::from_rules(vec![ReplacementRule::new(
            "1",
            vec!["happy".to_string()],
            "ecstatic",
        )])
    }

    #[tokio::test]
    async fn test_page_loaded_is_processed_when_enabled() {
        let service = service();
        service.settings().save_rules(&rules()).await.unwrap();
        service.settings().set_auto_process(true).await.unwrap();
        service.open_page("1", b"<p>happy</p>", None).await.unwrap();

        let (trigger, handle) = AutoProcessTrigger::new(service.clone());
        let driver = async {
            handle.page_loaded("1").await;
            time::sleep(Duration::from_millis(100)).await;
            handle.shutdown().await;
        };
        tokio::join!(trigger.run(), driver);

        assert!(service.snapshot("1").unwrap().contains("ecstatic"));
        assert!(service.settings().is_tab_processed("1").await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_auto_process_does_nothing() {
        let service = service();
        service.settings().save_rules(&rules()).await.unwrap();
        service.open_page("1", b"<p>happy</p>", None).await.unwrap();

        let (trigger, handle) = AutoProcessTrigger::new(service.clone());
        let driver = async {
            handle.page_loaded("1").await;
            time::sleep(Duration::from_millis(100)).await;
            handle.shutdown().await;
        };
        tokio::join!(trigger.run(), driver);

        assert!(!service.snapshot("1").unwrap().contains("ecstatic"));
    }

    #[tokio::test]
    async fn test_enabling_auto_process_processes_open_pages() {
        let service = service();
        service.settings().save_rules(&rules()).await.unwrap();
        service.open_page("1", b"<p>happy</p>", None).await.unwrap();
        service.open_page("2", b"<p>so happy</p>", None).await.unwrap();

        let (trigger, handle) = AutoProcessTrigger::new(service.clone());
        let settings = service.settings().clone();
        let driver = async {
            settings.set_auto_process(true).await.unwrap();
            time::sleep(Duration::from_millis(50)).await;
            handle.shutdown().await;
        };
        tokio::join!(trigger.run(), driver);

        assert!(service.snapshot("1").unwrap().contains("ecstatic"));
        assert!(service.snapshot("2").unwrap().contains("ecstatic"));
    }

    #[tokio::test]
    async fn test_content_added_is_debounced() {
        let service = service();
        service.settings().save_rules(&rules()).await.unwrap();
        service.settings().set_auto_process(true).await.unwrap();
        service.open_page("1", b"<p>plain</p>", None).await.unwrap();

        let (mut trigger, handle) = AutoProcessTrigger::new(service.clone());
        trigger.schedule("1".to_string(), PendingKind::NewBlocks, Duration::from_millis(20));
        trigger.schedule("1".to_string(), PendingKind::NewBlocks, Duration::from_millis(40));
        assert_eq!(trigger.pending_count(), 1);

        service.append_content("1", "<p>happy news</p>").unwrap();
        let driver = async {
            handle.content_added("1").await;
            time::sleep(Duration::from_millis(120)).await;
            handle.shutdown().await;
        };
        tokio::join!(trigger.run(), driver);

        assert_eq!(service.snapshot("1").unwrap().matches("ecstatic").count(), 1);
    }
}

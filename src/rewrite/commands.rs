//! 命令接口
//!
//! 所有外部调用（弹出面板、内容脚本、命令行、测试）都通过一个带标签的命令枚举进入服务，
//! 由 [`RewriteService::dispatch`] 穷尽匹配。新增命令时编译器会指出所有需要处理的位置。

use serde::{Deserialize, Serialize};

use crate::rewrite::analyzer::PhrasePair;
use crate::rewrite::core::{ProcessOutcome, RevertOutcome, RewriteService};
use crate::rewrite::error::RewriteResult;
use crate::rewrite::rules::ReplacementRule;

/// 服务命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    OpenPage {
        tab_id: String,
        html: String,
        #[serde(default)]
        url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ClosePage { tab_id: String },
    /// `rules` 缺省时使用已保存的规则
    #[serde(rename_all = "camelCase")]
    ProcessPage {
        tab_id: String,
        #[serde(default)]
        rules: Option<Vec<ReplacementRule>>,
    },
    #[serde(rename_all = "camelCase")]
    RevertPage { tab_id: String },
    #[serde(rename_all = "camelCase")]
    Snapshot { tab_id: String },
    AnalyzeText {
        text: String,
        concepts: Vec<String>,
        replacement: String,
    },
    AddRule { word: String },
    #[serde(rename_all = "camelCase")]
    RemoveRule { rule_id: String },
    ListRules,
    #[serde(rename_all = "camelCase")]
    SetApiKey { api_key: String },
    SetAutoProcess { enabled: bool },
}

/// 命令结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CommandOutcome {
    PageOpened,
    #[serde(rename_all = "camelCase")]
    PageClosed { existed: bool },
    Processed(ProcessOutcome),
    Reverted(RevertOutcome),
    Snapshot { html: String },
    Phrases { replacements: Vec<PhrasePair> },
    RuleAdded { rule: ReplacementRule },
    RuleRemoved { removed: bool },
    Rules { rules: Vec<ReplacementRule> },
    SettingsUpdated,
}

impl RewriteService {
    /// 执行一条命令
    pub async fn dispatch(&self, command: Command) -> RewriteResult<CommandOutcome> {
        tracing::debug!("执行命令: {}", command.name());
        match command {
            Command::OpenPage { tab_id, html, url } => {
                self.open_page(&tab_id, html.as_bytes(), url.as_deref()).await?;
                Ok(CommandOutcome::PageOpened)
            }
            Command::ClosePage { tab_id } => Ok(CommandOutcome::PageClosed {
                existed: self.close_page(&tab_id).await?,
            }),
            Command::ProcessPage { tab_id, rules } => {
                Ok(CommandOutcome::Processed(self.process_page(&tab_id, rules).await?))
            }
            Command::RevertPage { tab_id } => {
                Ok(CommandOutcome::Reverted(self.revert_page(&tab_id).await?))
            }
            Command::Snapshot { tab_id } => Ok(CommandOutcome::Snapshot {
                html: self.snapshot(&tab_id)?,
            }),
            Command::AnalyzeText {
                text,
                concepts,
                replacement,
            } => Ok(CommandOutcome::Phrases {
                replacements: self.analyze_text(&text, &concepts, &replacement).await?,
            }),
            Command::AddRule { word } => Ok(CommandOutcome::RuleAdded {
                rule: self.add_rule(&word).await?,
            }),
            Command::RemoveRule { rule_id } => Ok(CommandOutcome::RuleRemoved {
                removed: self.remove_rule(&rule_id).await?,
            }),
            Command::ListRules => Ok(CommandOutcome::Rules {
                rules: self.list_rules().await?.into_vec(),
            }),
            Command::SetApiKey { api_key } => {
                self.settings().set_api_key(&api_key).await?;
                Ok(CommandOutcome::SettingsUpdated)
            }
            Command::SetAutoProcess { enabled } => {
                self.settings().set_auto_process(enabled).await?;
                Ok(CommandOutcome::SettingsUpdated)
            }
        }
    }
}

impl Command {
    /// 命令名（用于日志）
    pub fn name(&self) -> &'static str {
        match self {
            Command::OpenPage { .. } => "openPage",
            Command::ClosePage { .. } => "closePage",
            Command::ProcessPage { .. } => "processPage",
            Command::RevertPage { .. } => "revertPage",
            Command::Snapshot { .. } => "snapshot",
            Command::AnalyzeText { .. } => "analyzeText",
            Command::AddRule { .. } => "addRule",
            Command::RemoveRule { .. } => "removeRule",
            Command::ListRules => "listRules",
            Command::SetApiKey { .. } => "setApiKey",
            Command::SetAutoProcess { .. } => "setAutoProcess",
        }
    }
}

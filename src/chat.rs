// チャットの進行管理
//
// ユーザー発言 → LLM呼び出し → 応答解析 → (任意で) コミット、の順に処理する。
// 失敗はすべて履歴上のメッセージとして残し、会話は継続できる。
use anyhow::{Result, anyhow};
use log::{error, warn};

use crate::config::DEFAULT_MODEL_NAME;
use crate::github::{GitHubClient, RepoTarget};
use crate::llm::client::LlmClient;
use crate::llm::prompts::system_message;
use crate::llm::reply::ParsedReply;
use crate::llm::schemas::action_response::{AiActionResponse, CodeAction};
use crate::llm::schemas::github_response::CommitResponse;
use crate::llm::schemas::openai_response::{ChatCompletionRequest, ChatMessage};

pub const TEMPERATURE: f32 = 0.7;

const NO_CHOICE_REPLY: &str = "申し訳ありません。リクエストの処理中に問題が発生しました。";

/// 1回の送信結果
#[derive(Clone, Debug)]
pub enum TurnOutcome {
    Answered {
        response: AiActionResponse,
        structured: bool,
    },
    Failed {
        reason: String,
    },
}

pub struct ChatSession {
    llm: LlmClient,
    history: Vec<ChatMessage>,
    current_response: Option<AiActionResponse>,
    max_tokens: Option<u32>,
}

impl ChatSession {
    pub fn new(llm: LlmClient) -> Self {
        ChatSession {
            llm,
            history: Vec::new(),
            current_response: None,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn current_response(&self) -> Option<&AiActionResponse> {
        self.current_response.as_ref()
    }

    /// 直近の応答に含まれるファイル書き込み指示
    pub fn actions(&self) -> &[CodeAction] {
        self.current_response
            .as_ref()
            .map(|r| r.actions.as_slice())
            .unwrap_or_default()
    }

    /// キャッシュ済み設定のモデル名。未取得ならデフォルト
    pub fn model_name(&self) -> String {
        self.llm
            .rewriter()
            .cache()
            .snapshot()
            .map(|config| config.model_name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string())
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.current_response = None;
    }

    /// 画面に表示するシステムメッセージを追加する
    pub fn note(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::system(text));
    }

    fn build_request(&self) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(system_message());
        messages.extend(self.history.iter().cloned());

        ChatCompletionRequest {
            model: self.model_name(),
            messages,
            temperature: TEMPERATURE,
            max_tokens: self.max_tokens,
            stream: false,
        }
    }

    pub async fn send_message(&mut self, text: &str) -> TurnOutcome {
        self.history.push(ChatMessage::user(text));
        let request = self.build_request();

        match self.llm.chat_completion(&request).await {
            Ok(completion) => {
                let (response, structured) = match completion.choices.into_iter().next() {
                    Some(choice) => {
                        let parsed = ParsedReply::parse(&choice.message.content);
                        let structured = parsed.is_structured();
                        (parsed.into_response(), structured)
                    }
                    None => {
                        warn!("⚠️ 応答に選択肢がありません: {}", completion.id);
                        let fallback = AiActionResponse {
                            explanation: NO_CHOICE_REPLY.to_string(),
                            actions: Vec::new(),
                        };
                        (fallback, false)
                    }
                };

                self.history
                    .push(ChatMessage::assistant(response.explanation.clone()));
                self.current_response = Some(response.clone());
                TurnOutcome::Answered {
                    response,
                    structured,
                }
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!("❌ チャット送信エラー: {}", reason);
                self.note(format!("エラー: {}", reason));
                TurnOutcome::Failed { reason }
            }
        }
    }

    /// 直近の応答の `index` 番目のアクションをコミットし、結果を履歴に残す
    pub async fn push_action(
        &mut self,
        github: &GitHubClient,
        target: &RepoTarget,
        index: usize,
    ) -> Result<CommitResponse> {
        let action = self
            .actions()
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("アクション {} はありません", index + 1))?;

        let result = github
            .commit_to(
                target,
                &action.file_name,
                &action.code_content,
                &action.commit_message,
            )
            .await;

        match &result {
            Ok(_) => self.note(format!("✅ {} をGitHubへプッシュしました", action.file_name)),
            Err(e) => self.note(format!("❌ {} のプッシュに失敗: {:#}", action.file_name, e)),
        }
        result
    }
}

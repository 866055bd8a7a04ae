// LLM関連のスキーマ定義

// GitHub Contents API 応答に関するスキーマ
pub mod github_response {
    use serde::{Deserialize, Serialize};

    // 既存ファイルの取得結果 (GET contents)
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct GitHubFileResponse {
        pub sha: Option<String>,
        pub content: Option<String>,
        pub encoding: Option<String>,
    }

    // ファイル作成・更新リクエスト (PUT contents)
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct CommitRequest {
        pub message: String,
        // Base64エンコード済み
        pub content: String,
        // 新規ファイルの場合は省略
        #[serde(skip_serializing_if = "Option::is_none")]
        pub sha: Option<String>,
    }

    // ファイル作成・更新の応答
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct CommitResponse {
        pub content: Option<GitHubFileContent>,
        pub commit: CommitInfo,
    }

    // コミット後のファイル情報
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct GitHubFileContent {
        pub name: String,
        pub path: String,
        pub sha: String,
        // PUTの応答ではcontent/encodingが返らないことがある
        pub content: Option<String>,
        pub encoding: Option<String>,
    }

    // コミット情報
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct CommitInfo {
        pub sha: String,
        pub message: String,
        pub author: Option<AuthorInfo>,
        pub committer: Option<AuthorInfo>,
    }

    // コミットの作成者情報
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct AuthorInfo {
        pub name: String,
        pub email: String,
    }
}

// OpenAI互換API 応答に関するスキーマ
pub mod openai_response {
    use serde::{Deserialize, Serialize};

    // メッセージの役割
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        System,
        User,
        Assistant,
    }

    // チャットメッセージ
    #[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
    pub struct ChatMessage {
        pub role: Role,
        pub content: String,
    }

    impl ChatMessage {
        pub fn system(content: impl Into<String>) -> Self {
            ChatMessage {
                role: Role::System,
                content: content.into(),
            }
        }

        pub fn user(content: impl Into<String>) -> Self {
            ChatMessage {
                role: Role::User,
                content: content.into(),
            }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            ChatMessage {
                role: Role::Assistant,
                content: content.into(),
            }
        }
    }

    // チャット補完リクエスト
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct ChatCompletionRequest {
        pub model: String,
        pub messages: Vec<ChatMessage>,
        pub temperature: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub max_tokens: Option<u32>,
        pub stream: bool,
    }

    // OpenAI APIレスポンス
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct ChatCompletionResponse {
        pub id: String,
        pub object: String,
        pub created: u64,
        pub model: String,
        pub choices: Vec<OpenAIChoice>,
        pub usage: Option<OpenAIUsage>,
    }

    // OpenAI API選択肢
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct OpenAIChoice {
        pub index: usize,
        pub message: ChatMessage,
        pub finish_reason: Option<String>,
    }

    // OpenAI APIトークン使用量
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct OpenAIUsage {
        pub prompt_tokens: usize,
        pub completion_tokens: usize,
        pub total_tokens: usize,
    }
}

// アシスタントが返す構造化応答のスキーマ
pub mod action_response {
    use serde::{Deserialize, Serialize};

    /// アシスタントの応答本体
    #[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
    pub struct AiActionResponse {
        pub explanation: String,
        pub actions: Vec<CodeAction>,
    }

    /// 1ファイル分の書き込み指示
    #[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CodeAction {
        pub file_name: String,
        pub code_content: String,
        pub commit_message: String,
    }
}

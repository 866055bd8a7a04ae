// アシスタント応答の解析
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use super::schemas::action_response::AiActionResponse;

/// 応答の解析結果
///
/// JSONとして解釈できた場合は `Structured`、できなかった場合は受信テキストを
/// そのまま `RawText` として保持する。どちらもエラーではない。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedReply {
    Structured(AiActionResponse),
    RawText(String),
}

impl ParsedReply {
    pub fn parse(raw: &str) -> Self {
        let candidate = strip_code_fence(raw);
        match serde_json::from_str::<AiActionResponse>(candidate) {
            Ok(response) => ParsedReply::Structured(response),
            Err(e) => {
                debug!("📝 応答をJSONとして解析できません: {}", e);
                ParsedReply::RawText(raw.to_string())
            }
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ParsedReply::Structured(_))
    }

    /// UIに渡す応答へ変換する。生テキストは説明文に埋め込み、アクションは空
    pub fn into_response(self) -> AiActionResponse {
        match self {
            ParsedReply::Structured(response) => response,
            ParsedReply::RawText(raw) => AiActionResponse {
                explanation: format!(
                    "応答の形式を解釈できませんでした。受信した内容をそのまま表示します:\n\n{}",
                    raw
                ),
                actions: Vec::new(),
            },
        }
    }
}

// ```json ... ``` で囲まれている場合は中身だけを取り出す
fn strip_code_fence(raw: &str) -> &str {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)\A\s*```[\w-]*\s*(.*?)\s*```\s*\z").ok());

    // パターンが使えない場合は前後の空白だけ落とす
    match fence
        .as_ref()
        .and_then(|fence| fence.captures(raw))
        .and_then(|caps| caps.get(1))
    {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

// 会話履歴の保存
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::llm::schemas::openai_response::ChatMessage;

// 保存用データ
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transcript {
    pub timestamp: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// 会話をJSONファイルとして保存し、保存先のパスを返す
pub async fn save_transcript(
    base_dir: &Path,
    model: &str,
    messages: &[ChatMessage],
) -> Result<PathBuf> {
    // ディレクトリがなければ作成
    fs::create_dir_all(base_dir)
        .await
        .map_err(|e| anyhow!("保存先 {} の作成に失敗: {}", base_dir.display(), e))?;

    let now = Utc::now();
    let transcript = Transcript {
        timestamp: now.to_rfc3339(),
        model: model.to_string(),
        messages: messages.to_vec(),
    };
    let json_data = serde_json::to_string_pretty(&transcript)?;

    // 同じ時刻のファイルがあれば連番を付ける。既存ファイルは上書きしない
    let stem = format!("transcript_{}", now.format("%Y%m%d_%H%M%S_%3f"));
    let mut suffix = 0;
    let (filename, mut file) = loop {
        let filename = if suffix == 0 {
            base_dir.join(format!("{}.json", stem))
        } else {
            base_dir.join(format!("{}_{}.json", stem, suffix))
        };
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&filename)
            .await
        {
            Ok(file) => break (filename, file),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(anyhow!("会話履歴 {} の保存に失敗: {}", filename.display(), e)),
        }
    };

    file.write_all(json_data.as_bytes())
        .await
        .map_err(|e| anyhow!("会話履歴 {} の保存に失敗: {}", filename.display(), e))?;
    file.flush().await?;

    info!("💾 会話履歴を保存: {}", filename.display());
    Ok(filename)
}

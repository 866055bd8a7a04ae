// エンドポイント設定の永続化と配信
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, watch};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL_NAME: &str = "gpt-3.5-turbo";

/// 接続先LLMエンドポイントの設定
///
/// 保存ファイルのキー名 (`base_url`, `api_key`, `model_name`) とフィールド名が一致する。
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            base_url: default_base_url(),
            api_key: String::new(),
            model_name: default_model_name(),
        }
    }
}

impl EndpointConfig {
    /// 3項目すべてが空でない場合のみ有効
    pub fn is_valid(&self) -> bool {
        !self.base_url.trim().is_empty()
            && !self.api_key.trim().is_empty()
            && !self.model_name.trim().is_empty()
    }

    pub fn masked_api_key(&self) -> String {
        mask_secret(&self.api_key)
    }

    /// 指定された項目だけを差し替えた設定を返す
    pub fn with_overrides(
        &self,
        base_url: Option<String>,
        api_key: Option<String>,
        model_name: Option<String>,
    ) -> Self {
        EndpointConfig {
            base_url: base_url.unwrap_or_else(|| self.base_url.clone()),
            api_key: api_key.unwrap_or_else(|| self.api_key.clone()),
            model_name: model_name.unwrap_or_else(|| self.model_name.clone()),
        }
    }

    /// プリセットの接続先とモデルを適用する。APIキーはそのまま
    pub fn with_preset(&self, preset: Preset) -> Self {
        let (base_url, model_name) = preset.endpoint();
        self.with_overrides(Some(base_url.to_string()), None, Some(model_name.to_string()))
    }

    // 前後の空白は保存時に取り除く
    fn normalized(self) -> Self {
        EndpointConfig {
            base_url: self.base_url.trim().to_string(),
            api_key: self.api_key.trim().to_string(),
            model_name: self.model_name.trim().to_string(),
        }
    }
}

/// よく使う接続先のプリセット
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Openai,
    Deepseek,
    Ollama,
}

impl Preset {
    /// (base_url, model_name)
    pub fn endpoint(self) -> (&'static str, &'static str) {
        match self {
            Preset::Openai => (DEFAULT_BASE_URL, DEFAULT_MODEL_NAME),
            Preset::Deepseek => ("https://api.deepseek.com", "deepseek-chat"),
            Preset::Ollama => ("http://localhost:11434", "llama2"),
        }
    }
}

// APIキーをログや画面に出さない
impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.masked_api_key())
            .field("model_name", &self.model_name)
            .finish()
    }
}

fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count == 0 {
        "(未設定)".to_string()
    } else if count <= 8 {
        "*".repeat(count)
    } else {
        let tail: String = secret.chars().skip(count - 4).collect();
        format!("****{}", tail)
    }
}

/// 設定ファイルの読み書きと変更通知
///
/// 保存のたびに値全体を置き換えて購読者へ配信する。
pub struct ConfigStore {
    path: PathBuf,
    tx: watch::Sender<Arc<EndpointConfig>>,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// 設定ファイルを開く
    ///
    /// ファイルが無い、または読めない場合はデフォルト値で開始する。
    /// 壊れたファイルは次の保存で上書きされる。
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match read_config(&path).await {
            Ok(config) => {
                info!("⚙️ 設定読み込み: {} ({})", path.display(), config.model_name);
                config
            }
            Err(e) => {
                warn!("⚠️ {:#}。デフォルト設定で開始します", e);
                EndpointConfig::default()
            }
        };

        let (tx, _rx) = watch::channel(Arc::new(config));
        ConfigStore {
            path,
            tx,
            write_lock: Mutex::new(()),
        }
    }

    /// プラットフォーム標準の設定ディレクトリ配下の保存先
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("設定ディレクトリを特定できません"))?;

        Ok(config_dir.join("llm-commit-chat").join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Arc<EndpointConfig> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<EndpointConfig>> {
        self.tx.subscribe()
    }

    /// 設定全体を1回で保存して配信する
    pub async fn save(&self, config: EndpointConfig) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let config = config.normalized();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("設定ディレクトリ {} の作成に失敗: {}", parent.display(), e)
                })?;
            }
        }

        // 一時ファイルに書いてから置き換える
        let json_data = serde_json::to_string_pretty(&config)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json_data)
            .await
            .map_err(|e| anyhow!("設定ファイル {} の保存に失敗: {}", tmp_path.display(), e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| anyhow!("設定ファイル {} の保存に失敗: {}", self.path.display(), e))?;

        info!("💾 設定保存: {}", self.path.display());
        self.tx.send_replace(Arc::new(config));
        Ok(())
    }

    /// 外部で編集されたファイルを読み直して配信する
    pub async fn reload(&self) -> Result<Arc<EndpointConfig>> {
        let _guard = self.write_lock.lock().await;
        let config = Arc::new(read_config(&self.path).await?);
        self.tx.send_replace(config.clone());
        info!("🔄 設定再読み込み: {}", self.path.display());
        Ok(config)
    }
}

async fn read_config(path: &Path) -> Result<EndpointConfig> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(EndpointConfig::default());
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("設定ファイル {} の読み込みに失敗: {}", path.display(), e))?;
    let config: EndpointConfig = serde_json::from_str(&content)
        .map_err(|e| anyhow!("設定ファイル {} の解析に失敗: {}", path.display(), e))?;
    Ok(config.normalized())
}

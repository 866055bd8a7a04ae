// 送信リクエストの接続先書き換えと認証ヘッダー付与
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Result, anyhow};
use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Request, Url};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::EndpointConfig;

/// 最新の設定を保持する共有キャッシュ
///
/// 読み取りは同期的でI/Oを待たない。書き込みは値全体の置き換えのみ。
#[derive(Clone, Default)]
pub struct ConfigCache {
    inner: Arc<RwLock<Option<Arc<EndpointConfig>>>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Arc<EndpointConfig>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, config: Arc<EndpointConfig>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(config);
    }

    /// 受信側の現在値でキャッシュを埋め、以降の更新をバックグラウンドで反映する
    pub fn follow(&self, mut rx: watch::Receiver<Arc<EndpointConfig>>) -> JoinHandle<()> {
        let initial = rx.borrow_and_update().clone();
        self.set(initial);

        let cache = self.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let config = rx.borrow_and_update().clone();
                debug!("🔁 設定キャッシュ更新: {:?}", config);
                cache.set(config);
            }
            debug!("設定の購読を終了");
        })
    }
}

/// チャット補完リクエストの書き換え
///
/// 有効な設定がキャッシュされていればスキーム・ホスト・ポートを `base_url` のものに
/// 置き換え、`Authorization: Bearer <api_key>` を付与する。パス・クエリ・メソッド・
/// ボディは変更しない。設定が無い・無効・解析できない場合は元のリクエストをそのまま返す。
#[derive(Clone)]
pub struct RequestRewriter {
    cache: ConfigCache,
}

impl RequestRewriter {
    pub fn new(cache: ConfigCache) -> Self {
        RequestRewriter { cache }
    }

    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    pub fn rewrite(&self, mut request: Request) -> Request {
        let Some(config) = self.cache.snapshot() else {
            debug!("設定未取得のため書き換えなし: {}", request.url());
            return request;
        };

        if !config.is_valid() {
            debug!("設定が無効なため書き換えなし: {:?}", config);
            return request;
        }

        match rewritten_parts(request.url(), &config) {
            Ok((url, authorization)) => {
                debug!("🔀 送信先書き換え: {} -> {}", request.url(), url);
                *request.url_mut() = url;
                if let Some(value) = authorization {
                    request.headers_mut().insert(AUTHORIZATION, value);
                }
                request
            }
            Err(e) => {
                warn!("⚠️ 送信先を書き換えられません ({}): {}", config.base_url, e);
                request
            }
        }
    }
}

// 書き換え後のURLとヘッダーを先にすべて組み立て、途中で失敗したら何も適用しない
fn rewritten_parts(original: &Url, config: &EndpointConfig) -> Result<(Url, Option<HeaderValue>)> {
    let base = Url::parse(config.base_url.trim())?;
    let host = base
        .host_str()
        .ok_or_else(|| anyhow!("ホスト名がありません"))?;

    let mut url = original.clone();
    url.set_scheme(base.scheme())
        .map_err(|_| anyhow!("スキーム {} を適用できません", base.scheme()))?;
    url.set_host(Some(host))?;
    url.set_port(base.port())
        .map_err(|_| anyhow!("ポートを適用できません"))?;

    let authorization = if config.api_key.is_empty() {
        None
    } else {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| anyhow!("APIキーにヘッダーとして使えない文字が含まれています"))?;
        value.set_sensitive(true);
        Some(value)
    };

    Ok((url, authorization))
}

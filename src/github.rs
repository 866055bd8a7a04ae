// GitHub Contents API クライアント
use std::fmt;
use std::time::Duration;

use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::{error, info};
use reqwest::{Method, StatusCode, Url, header};

use crate::llm::schemas::github_response::{CommitRequest, CommitResponse, GitHubFileResponse};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// コミット先のリポジトリと認証トークン
#[derive(Clone)]
pub struct RepoTarget {
    pub owner: String,
    pub repo: String,
    pub token: String,
}

impl fmt::Debug for RepoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoTarget")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &"****")
            .finish()
    }
}

// GitHubクライアント
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
}

impl GitHubClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| anyhow!("HTTPクライアントの作成に失敗: {}", e))?;

        Ok(Self::with_client(client, api_url))
    }

    pub fn with_client(client: reqwest::Client, api_url: &str) -> Self {
        GitHubClient {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// ファイルを作成または上書きする
    ///
    /// 既存ファイルがあればそのSHAを付けて更新し、404なら新規作成する。
    /// 失敗は再試行せずそのまま返す。
    pub async fn commit(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        token: &str,
    ) -> Result<CommitResponse> {
        let url = self.contents_url(owner, repo, path)?;

        // 既存ファイルのSHAを取得
        let sha = self
            .fetch_file(&url, token)
            .await?
            .and_then(|existing| existing.sha);
        match &sha {
            Some(sha) => info!("📄 既存ファイルを更新: {} (sha: {})", path, sha),
            None => info!("🆕 新規ファイルを作成: {}", path),
        }

        let body = CommitRequest {
            message: message.to_string(),
            content: encode_content(content),
            sha,
        };

        let response = self
            .request(Method::PUT, url, token)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            let commit: CommitResponse = response.json().await?;
            info!("✅ コミット成功: {}/{} {} ({})", owner, repo, path, commit.commit.sha);
            Ok(commit)
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("⚠️ コミット失敗: {}/{} {} - ステータス: {}", owner, repo, path, status);
            Err(anyhow!(
                "GitHub API エラー: ステータス {}, レスポンス: {}",
                status,
                error_text
            ))
        }
    }

    pub async fn commit_to(
        &self,
        target: &RepoTarget,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<CommitResponse> {
        self.commit(&target.owner, &target.repo, path, content, message, &target.token)
            .await
    }

    // 404はファイル無しとして扱う
    async fn fetch_file(&self, url: &Url, token: &str) -> Result<Option<GitHubFileResponse>> {
        let response = self
            .request(Method::GET, url.clone(), token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let file: GitHubFileResponse = response
                    .json()
                    .await
                    .map_err(|e| anyhow!("ファイル情報の解析に失敗 ({}): {}", url.path(), e))?;
                Ok(Some(file))
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(anyhow!(
                    "ファイル情報取得エラー: ステータス {}, レスポンス: {}",
                    status,
                    error_text
                ))
            }
        }
    }

    fn request(&self, method: Method, url: Url, token: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .header(header::USER_AGENT, concat!("llm-commit-chat/", env!("CARGO_PKG_VERSION")));

        if !token.is_empty() {
            builder = builder.header(header::AUTHORIZATION, format!("token {}", token));
        }
        builder
    }

    // パスは区切りごとにエンコードする
    fn contents_url(&self, owner: &str, repo: &str, path: &str) -> Result<Url> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| anyhow!("GitHub API URL {} が不正です: {}", self.api_url, e))?;

        let file_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if file_segments.is_empty() {
            return Err(anyhow!("ファイルパスが空です"));
        }

        url.path_segments_mut()
            .map_err(|_| anyhow!("GitHub API URL {} にパスを追加できません", self.api_url))?
            .pop_if_empty()
            .extend(["repos", owner, repo, "contents"])
            .extend(file_segments);

        Ok(url)
    }
}

pub fn encode_content(content: &str) -> String {
    BASE64.encode(content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;

    const COMMIT_OK: &str = r#"{
        "content": {"name": "main.rs", "path": "src/main.rs", "sha": "new-sha"},
        "commit": {"sha": "commit-sha", "message": "update main",
                   "author": {"name": "a", "email": "a@example.com"}, "committer": null}
    }"#;

    fn client_for(server: &StubServer) -> GitHubClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        GitHubClient::with_client(http, &server.base_url)
    }

    #[test]
    fn test_base64_round_trip() {
        for text in ["", "fn main() {}\n", "日本語のコメント ✓ émoji 🎉"] {
            let encoded = encode_content(text);
            let decoded = BASE64.decode(encoded).unwrap();
            assert_eq!(String::from_utf8(decoded).unwrap(), text);
        }
    }

    #[test]
    fn test_contents_url_encodes_segments() {
        let client = GitHubClient::with_client(reqwest::Client::new(), "https://ghe.example.com/api/v3/");
        let url = client
            .contents_url("octo", "demo", "/docs/read me.md")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/octo/demo/contents/docs/read%20me.md"
        );
        assert!(client.contents_url("octo", "demo", "/").is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_created_without_sha() {
        let server = StubServer::start(|req| match req.method.as_str() {
            "GET" => (404, r#"{"message":"Not Found"}"#.to_string()),
            _ => (201, COMMIT_OK.to_string()),
        })
        .await;

        let response = client_for(&server)
            .commit("octo", "demo", "src/main.rs", "fn main() {}", "add main", "tok")
            .await
            .unwrap();
        assert_eq!(response.commit.sha, "commit-sha");

        let recorded = server.requests();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].method, "GET");
        assert_eq!(recorded[0].path, "/repos/octo/demo/contents/src/main.rs");
        assert_eq!(recorded[0].header("authorization"), Some("token tok"));

        assert_eq!(recorded[1].method, "PUT");
        let body = recorded[1].json();
        assert!(body["sha"].is_null());
        assert_eq!(body["message"], "add main");
        assert_eq!(body["content"], encode_content("fn main() {}"));
    }

    #[tokio::test]
    async fn test_existing_file_uses_fetched_sha() {
        let server = StubServer::start(|req| match req.method.as_str() {
            "GET" => (
                200,
                r#"{"sha":"abc123","content":"b2xk\n","encoding":"base64"}"#.to_string(),
            ),
            _ => (200, COMMIT_OK.to_string()),
        })
        .await;

        client_for(&server)
            .commit("octo", "demo", "src/main.rs", "new", "update main", "tok")
            .await
            .unwrap();

        let recorded = server.requests();
        assert_eq!(recorded[1].method, "PUT");
        assert_eq!(recorded[1].json()["sha"], "abc123");
    }

    #[tokio::test]
    async fn test_lookup_failure_stops_before_write() {
        let server = StubServer::start(|_| (500, "boom".to_string())).await;

        let error = client_for(&server)
            .commit("octo", "demo", "a.txt", "x", "m", "tok")
            .await
            .unwrap_err();
        assert!(error.to_string().contains("500"));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_surfaced_verbatim() {
        let server = StubServer::start(|req| match req.method.as_str() {
            "GET" => (404, "{}".to_string()),
            _ => (409, r#"{"message":"sha does not match"}"#.to_string()),
        })
        .await;

        let target = RepoTarget {
            owner: "octo".to_string(),
            repo: "demo".to_string(),
            token: "tok".to_string(),
        };
        let error = client_for(&server)
            .commit_to(&target, "a.txt", "x", "m")
            .await
            .unwrap_err();
        let message = error.to_string();
        assert!(message.contains("409"));
        assert!(message.contains("sha does not match"));
        assert_eq!(server.requests().len(), 2);
    }
}

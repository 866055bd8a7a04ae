// llm-commit-chat - LLMと対話して生成したファイルをGitHubへコミットするCLI

mod chat;
mod config;
mod github;
mod llm;
mod rewriter;
mod transcript;

#[cfg(test)]
mod test_support;

use std::future::Future;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{info, warn};
use simple_logger::SimpleLogger;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::chat::{ChatSession, TurnOutcome};
use crate::config::{ConfigStore, EndpointConfig, Preset};
use crate::github::{DEFAULT_API_URL, GitHubClient, RepoTarget};
use crate::llm::client::LlmClient;
use crate::llm::schemas::action_response::CodeAction;
use crate::rewriter::{ConfigCache, RequestRewriter};

// コマンドライン引数の定義

#[derive(Parser, Debug)]
#[clap(
    name = "llm-commit-chat",
    about = "OpenAI互換APIと対話し、提案されたファイル変更をGitHubへコミットするツール",
    version
)]
struct Args {
    /// 設定ファイルのパス (省略時は設定ディレクトリ配下)
    #[clap(long, env = "LLM_COMMIT_CHAT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// ログレベル (error, warn, info, debug, trace)
    #[clap(long, default_value = "warn", global = true)]
    log_level: log::LevelFilter,

    #[clap(flatten)]
    chat: ChatOptions,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Args, Debug)]
struct ChatOptions {
    /// GitHubのアクセストークン
    #[clap(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// コミット先リポジトリの所有者
    #[clap(long, env = "GITHUB_OWNER")]
    github_owner: Option<String>,

    /// コミット先リポジトリ名
    #[clap(long, env = "GITHUB_REPO")]
    github_repo: Option<String>,

    /// GitHub APIのベースURL (GitHub Enterprise用)
    #[clap(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    github_api_url: String,

    /// 応答の最大トークン数
    #[clap(long)]
    max_tokens: Option<u32>,

    /// 会話履歴の保存先ディレクトリ
    #[clap(long, env = "TRANSCRIPT_DIR", default_value = "transcripts")]
    transcript_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// エンドポイント設定の表示・変更
    Config {
        #[clap(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// 現在の設定を表示
    Show,
    /// 指定した項目だけを更新
    Set {
        #[clap(long)]
        base_url: Option<String>,
        #[clap(long)]
        api_key: Option<String>,
        #[clap(long)]
        model_name: Option<String>,
    },
    /// よく使う接続先のURLとモデルをまとめて設定 (APIキーは変更しない)
    Preset {
        #[clap(value_enum)]
        name: Preset,
    },
}

// REPLの継続/終了
enum Flow {
    Continue,
    Quit,
}

const HELP: &str = "\
コマンド:
  /actions        直近の応答のファイル変更を一覧表示
  /show <番号>    ファイル変更の内容を表示
  /push <番号>    ファイル変更をGitHubへコミット (/push all で全件)
  /config         現在の設定を表示
  /reload         設定ファイルを再読み込み
  /save           会話履歴をJSONで保存
  /clear          会話履歴を消去
  /help           このヘルプを表示
  /quit           終了";

// メイン関数
#[tokio::main]
async fn main() -> Result<()> {
    // .envファイルを読み込み
    dotenv().ok();

    // コマンドライン引数を解析
    let args = Args::parse();

    // ロガー初期化
    SimpleLogger::new().with_level(args.log_level).init()?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => ConfigStore::default_path()?,
    };
    let store = ConfigStore::open(&config_path).await;

    match args.command {
        Some(Command::Config { action }) => run_config(&store, action).await,
        None => run_chat(&store, args.chat).await,
    }
}

async fn run_config(store: &ConfigStore, action: ConfigAction) -> Result<()> {
    let current = store.current();
    let updated = match action {
        ConfigAction::Show => None,
        ConfigAction::Set {
            base_url,
            api_key,
            model_name,
        } => {
            if base_url.is_none() && api_key.is_none() && model_name.is_none() {
                bail!("変更する項目を --base-url / --api-key / --model-name で指定してください");
            }
            Some(current.with_overrides(base_url, api_key, model_name))
        }
        ConfigAction::Preset { name } => Some(current.with_preset(name)),
    };

    // 変更は1回の保存でまとめて反映する
    if let Some(config) = updated {
        store.save(config).await?;
        println!("✅ 設定を保存しました");
    }

    print_config(store.path(), &store.current());
    Ok(())
}

// Ctrl-Cを待つ。監視できない環境では完了しない
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl-Cを監視できません: {}", e);
        std::future::pending::<()>().await;
    }
}

// 次の入力行を読む。入力の終わりか割り込みで None
async fn next_input<R>(lines: &mut Lines<R>, interrupt: impl Future<Output = ()>) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => Ok(line?),
        _ = interrupt => {
            println!();
            Ok(None)
        }
    }
}

async fn run_chat(store: &ConfigStore, options: ChatOptions) -> Result<()> {
    // 設定の変更はバックグラウンドでキャッシュへ反映する
    let cache = ConfigCache::new();
    let _config_sync = cache.follow(store.subscribe());

    let llm = LlmClient::new(RequestRewriter::new(cache))?;
    let mut session = ChatSession::new(llm).with_max_tokens(options.max_tokens);
    let github = GitHubClient::new(&options.github_api_url)?;
    let target = repo_target(&options);

    info!("🚀 チャット開始: {}", store.path().display());
    println!("💬 llm-commit-chat (モデル: {})", session.model_name());
    if !store.current().is_valid() {
        println!(
            "⚠️ 設定が不完全なため、リクエストは {} にそのまま送信されます。`config set` で設定してください",
            config::DEFAULT_BASE_URL
        );
    }
    match &target {
        Some(target) => println!("📦 コミット先: {}/{}", target.owner, target.repo),
        None => println!("📦 コミット先未設定 (GITHUB_OWNER / GITHUB_REPO / GITHUB_TOKEN)"),
    }
    println!("/help でコマンド一覧を表示します");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = next_input(&mut lines, interrupted()).await? else {
            break;
        };
        let text = line.trim().to_string();
        if text.is_empty() {
            continue;
        }

        if let Some(command) = text.strip_prefix('/') {
            let flow = tokio::select! {
                flow = handle_command(command, &mut session, store, &github, target.as_ref(), &options) => flow,
                _ = interrupted() => {
                    println!("\n⏹️ コマンドを中断しました");
                    Flow::Continue
                }
            };
            match flow {
                Flow::Continue => continue,
                Flow::Quit => break,
            }
        }

        // Ctrl-Cで送信中のリクエストを中断できる
        let outcome = tokio::select! {
            outcome = session.send_message(&text) => Some(outcome),
            _ = interrupted() => None,
        };
        match outcome {
            Some(outcome) => print_outcome(&outcome),
            None => {
                session.note("⏹️ 送信を中断しました");
                println!("⏹️ 送信を中断しました");
            }
        }
    }

    info!("👋 チャット終了");
    Ok(())
}

async fn handle_command(
    command: &str,
    session: &mut ChatSession,
    store: &ConfigStore,
    github: &GitHubClient,
    target: Option<&RepoTarget>,
    options: &ChatOptions,
) -> Flow {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let argument = parts.next();

    match name {
        "quit" | "exit" => return Flow::Quit,
        "help" => println!("{}", HELP),
        "actions" => match session.current_response() {
            Some(response) => print_actions(&response.actions),
            None => println!("まだ応答がありません"),
        },
        "show" => match argument.and_then(|arg| parse_index(arg, session.actions().len())) {
            Some(index) => {
                let action = &session.actions()[index];
                println!("--- {} ---\n{}", action.file_name, action.code_content);
            }
            None => println!("⚠️ 番号を指定してください (1〜{})", session.actions().len()),
        },
        "push" => push_actions(session, github, target, argument).await,
        "config" => print_config(store.path(), &store.current()),
        "reload" => match store.reload().await {
            Ok(config) => print_config(store.path(), &config),
            Err(e) => println!("❌ 再読み込みに失敗: {:#}", e),
        },
        "save" => {
            let model = session.model_name();
            match transcript::save_transcript(&options.transcript_dir, &model, session.history()).await {
                Ok(path) => println!("💾 保存しました: {}", path.display()),
                Err(e) => println!("❌ 保存に失敗: {:#}", e),
            }
        }
        "clear" => {
            session.clear();
            println!("🧹 会話履歴を消去しました");
        }
        _ => println!("⚠️ 不明なコマンドです: /{} (/help で一覧)", name),
    }
    Flow::Continue
}

async fn push_actions(
    session: &mut ChatSession,
    github: &GitHubClient,
    target: Option<&RepoTarget>,
    argument: Option<&str>,
) {
    let Some(target) = target else {
        println!("⚠️ コミット先が未設定です。--github-owner / --github-repo / --github-token を指定してください");
        return;
    };

    let count = session.actions().len();
    let indices: Vec<usize> = match argument {
        Some("all") => (0..count).collect(),
        Some(arg) => match parse_index(arg, count) {
            Some(index) => vec![index],
            None => {
                println!("⚠️ 番号は 1〜{} で指定してください", count);
                return;
            }
        },
        None => {
            println!("⚠️ /push <番号> または /push all を指定してください");
            return;
        }
    };
    if indices.is_empty() {
        println!("⚠️ コミットできるファイル変更がありません");
        return;
    }

    // 同じブランチへの書き込みなので1件ずつ順番に行う
    for index in indices {
        let file_name = session.actions()[index].file_name.clone();
        match session.push_action(github, target, index).await {
            Ok(response) => println!("✅ {} をコミットしました ({})", file_name, response.commit.sha),
            Err(e) => println!("❌ {} のコミットに失敗: {:#}", file_name, e),
        }
    }
}

// 1始まりの番号を0始まりに変換
fn parse_index(argument: &str, count: usize) -> Option<usize> {
    argument
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=count).contains(n))
        .map(|n| n - 1)
}

fn repo_target(options: &ChatOptions) -> Option<RepoTarget> {
    let owner = options.github_owner.as_deref().filter(|s| !s.is_empty())?;
    let repo = options.github_repo.as_deref().filter(|s| !s.is_empty())?;
    let token = options.github_token.clone().unwrap_or_default();
    if token.is_empty() {
        warn!("GitHubトークン未設定: {}/{} への書き込みは失敗する可能性があります", owner, repo);
    }

    Some(RepoTarget {
        owner: owner.to_string(),
        repo: repo.to_string(),
        token,
    })
}

fn print_outcome(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Answered {
            response,
            structured,
        } => {
            println!("\n{}\n", response.explanation);
            if !structured {
                println!("(応答がJSON形式ではなかったため、ファイル変更はありません)");
            }
            if !response.actions.is_empty() {
                print_actions(&response.actions);
                println!("/push <番号> でコミットできます");
            }
        }
        TurnOutcome::Failed { reason } => println!("❌ エラー: {}", reason),
    }
}

fn print_actions(actions: &[CodeAction]) {
    if actions.is_empty() {
        println!("ファイル変更はありません");
        return;
    }
    for (i, action) in actions.iter().enumerate() {
        println!(
            "  [{}] {} - {} ({}行)",
            i + 1,
            action.file_name,
            action.commit_message,
            action.code_content.lines().count()
        );
    }
}

fn print_config(path: &Path, config: &EndpointConfig) {
    println!("設定ファイル: {}", path.display());
    println!("  base_url  : {}", config.base_url);
    println!("  api_key   : {}", config.masked_api_key());
    println!("  model_name: {}", config.model_name);
    println!(
        "  状態      : {}",
        if config.is_valid() { "有効" } else { "無効 (未設定の項目があります)" }
    );
}

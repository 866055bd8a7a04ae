// LLMモジュール - 大規模言語モデル関連の機能をまとめたモジュール

// サブモジュールをエクスポート
pub mod client;
pub mod prompts;
pub mod reply;
pub mod schemas;

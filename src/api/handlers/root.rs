/*
 * Responsibility
 * - GET / (疎通用のプレーンテキスト)
 */
pub async fn root() -> &'static str {
    "Hello World from Rust\n"
}

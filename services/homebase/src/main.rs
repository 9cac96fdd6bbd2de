//! Home base 二进制入口：CLI 分发、日志初始化与应用启动。

mod api;
mod app;
mod auth;
mod cli;
mod commands;
mod config;
mod crypto;
mod errors;
mod logging;
mod nonce;
mod registry;
mod state;
mod telemetry;

#[tokio::main]
/// 启动 home base 服务。
async fn main() -> anyhow::Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<String>>();
    match cli::dispatch(&args)? {
        cli::CliDispatch::Run => {}
        cli::CliDispatch::Exit => return Ok(()),
    }

    let config = config::Config::from_env()?;
    let _log_runtime = logging::init("homebase")?;
    app::run(config).await
}

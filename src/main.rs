#[tokio::main]
async fn main() -> anyhow::Result<()> {
    codegradr_api::cli::run_with_sys_args().await
}

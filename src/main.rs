use anyhow::Result;
use tracing::error;
use rescuesync::{cli::run_cli, utils::runtime::single_thread_runtime};


fn main() -> Result<()> {
    single_thread_runtime()?
        .block_on(run_cli())
        .inspect_err(|e| {
            error!("Error running cli {e:?}");
        })
}

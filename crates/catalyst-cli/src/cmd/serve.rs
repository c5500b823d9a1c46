use super::{open_engine, runtime};
use std::path::Path;

pub fn run(config_path: &Path, listen: Option<String>) -> anyhow::Result<()> {
    let rt = runtime()?;

    rt.block_on(async move {
        let engine = open_engine(config_path)?;
        let addr = listen.unwrap_or_else(|| engine.config().listen.clone());

        let report = engine.start()?;
        for (id, err) in &report.failed {
            tracing::error!(reaction_id = %id, error = %err, "schedule job not registered");
        }

        let result = catalyst_server::serve(engine.clone(), &addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

        tracing::info!("shutting down");
        engine.shutdown().await;
        result
    })
}

use realm_server::server::bind_ephemeral;
use realm_shared::config::RealmConfig;

/// Smoke test: server can run a few ticks without panicking.
#[tokio::test]
async fn server_runs_few_ticks() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = RealmConfig {
        data_dir: dir.path().to_string_lossy().into_owned(),
        ..Default::default()
    };
    let (mut server, _cfg) = bind_ephemeral(cfg).await?;
    server.run_for_ticks(3).await?;
    Ok(())
}

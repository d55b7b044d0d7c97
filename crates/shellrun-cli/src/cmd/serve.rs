use shellrun_core::config::Config;
use shellrun_server::AppState;

pub fn run(mut config: Config, port: Option<u16>, memory: bool) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.http.port = port;
    }
    if memory {
        config.database = None;
    }
    config.validate()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let state = AppState::from_config(&config).await?;
        shellrun_server::serve(&config, state).await
    })
}

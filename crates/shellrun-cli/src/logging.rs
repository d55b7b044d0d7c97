use shellrun_core::config::Env;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the env default.
pub fn init(env: Env) {
    let default_level = match env {
        Env::Dev => tracing::Level::DEBUG,
        Env::Prod => tracing::Level::INFO,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match env {
        Env::Dev => builder.with_target(false).init(),
        Env::Prod => builder.json().init(),
    }
}

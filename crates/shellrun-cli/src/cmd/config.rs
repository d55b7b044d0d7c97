use shellrun_core::config::{Config, DatabaseConfig};

pub fn run(config: &Config) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if let Some(DatabaseConfig::Parts { password, .. }) = shown.database.as_mut() {
        *password = "********".to_string();
    }
    print!("{}", serde_yaml::to_string(&shown)?);
    Ok(())
}

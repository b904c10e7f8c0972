//! `agentexec config`: Print the default configuration or its path.

use agentexec_config::AppConfig;

pub fn run(path: bool) -> anyhow::Result<()> {
    if path {
        println!("{}", AppConfig::config_dir().join("config.toml").display());
    } else {
        print!("{}", AppConfig::default_toml());
    }
    Ok(())
}

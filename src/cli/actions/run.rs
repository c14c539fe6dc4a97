use crate::agent;
use crate::cli::actions::Action;
use crate::config::Config;
use anyhow::Result;
use std::path::Path;

/// Handle the `Run` action: load and validate the configuration, then
/// hand off to the agent's composition root.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Run { config_path, once } => {
            let config = Config::load(Path::new(&config_path))?;
            agent::run(&config, once).await
        }
    }
}

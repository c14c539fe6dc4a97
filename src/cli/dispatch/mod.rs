use crate::cli::actions::Action;
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Run {
        config_path: matches
            .get_one::<String>("config")
            .map(ToString::to_string)
            .unwrap_or_default(),
        once: matches.get_flag("once"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn handler_extracts_config_path_and_once() {
        let cmd = commands::new();
        let matches = cmd.get_matches_from(vec!["nodepulse-agent", "--config", "/tmp/a.toml", "--once"]);

        let Action::Run { config_path, once } = handler(&matches).unwrap();
        assert_eq!(config_path, "/tmp/a.toml");
        assert!(once);
    }
}

pub mod run;

#[derive(Debug, Clone)]
pub enum Action {
    Run { config_path: String, once: bool },
}

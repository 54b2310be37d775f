use clap::Args;
use common::RootConfig;

use crate::Result;

#[derive(Debug, Args)]
pub struct Config {}

impl Config {
    /// Renders the resolved configuration as YAML.
    pub fn render(&self, root: &RootConfig) -> Result<String> {
        Ok(serde_yaml::to_string(root)?)
    }

    pub fn run(self, root: &RootConfig) -> Result<()> {
        print!("{}", self.render(root)?);
        Ok(())
    }
}

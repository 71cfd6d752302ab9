//! Configuration commands.

use clap::Subcommand;

use crate::output;
use crate::GlobalOpts;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the resolved configuration.
    Show,
}

pub async fn run(action: ConfigAction, opts: &GlobalOpts) -> std::result::Result<(), String> {
    match action {
        ConfigAction::Show => {
            output::print_value(&opts.config, opts.json);
            Ok(())
        }
    }
}

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use skiff_utils::inspect_app;

#[derive(Debug, Args)]
#[command(arg_required_else_help = true)]
pub struct InspectArgs {
    /// Path to the app bundle or package to inspect (.app or .ipa)
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,
}

pub async fn execute(args: InspectArgs) -> Result<()> {
    let infos = inspect_app(&args.package)?;

    for info in infos {
        println!("{} ({})", info.name, info.identifier);
        for capability in &info.capabilities {
            println!("  capability: {capability}");
        }
    }

    Ok(())
}

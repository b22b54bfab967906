//! The `schema` subcommand: print JSON Schemas for our output formats.

use clap::Args;
use schemars::schema_for;

use crate::{batch::PageResult, prelude::*, split::SplitOutcome};

/// Options for the `schema` subcommand.
#[derive(Args, Debug)]
pub struct SchemaOpts {
    /// Write the schemas here instead of to standard output.
    #[clap(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Print the JSON Schemas of the records we emit.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(opts: &SchemaOpts) -> Result<()> {
    let schemas = serde_json::json!({
        "page_result": schema_for!(PageResult),
        "split_outcome": schema_for!(SplitOutcome),
    });
    let json =
        serde_json::to_string_pretty(&schemas).context("failed to serialize schemas")?;
    match &opts.output {
        Some(path) => tokio::fs::write(path, json + "\n")
            .await
            .with_context(|| format!("failed to write {:?}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

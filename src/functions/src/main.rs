// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::Parser;
use pipeline_functions::boundary::run_handler;
use pipeline_functions::config::Config;
use pipeline_functions::context::Context;
use pipeline_functions::handlers::{Handler, Pipeline};
use tokio::io::AsyncReadExt;

const DESCRIPTION: &str = concat!(
    "Runs one of the pipeline functions on a Pub/Sub event.",
    " The configuration is read from the PROJECT_ID, OUTPUT_TOPIC_NAME and",
    " ERROR_TOPIC_NAME environment variables."
);

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = DESCRIPTION)]
struct Args {
    /// The function to run.
    #[arg(long, value_enum)]
    handler: Handler,

    /// The file containing the event, `-` reads it from stdin.
    #[arg(long, default_value = "-")]
    event: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    enable_tracing()?;
    tracing::info!("Configuration: {args:?}");

    let config = Config::from_env()?;
    let context = Context::builder(config).build().await?;
    let raw = read_event(&args.event).await?;
    let pipeline = Pipeline::new(&context);
    run_handler(&pipeline, args.handler, &raw).await;
    Ok(())
}

async fn read_event(path: &str) -> anyhow::Result<Vec<u8>> {
    if path == "-" {
        let mut raw = Vec::new();
        tokio::io::stdin().read_to_end(&mut raw).await?;
        return Ok(raw);
    }
    Ok(tokio::fs::read(path).await?)
}

fn enable_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_level(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

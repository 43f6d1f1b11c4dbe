// Copyright 2024 Felix Engl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod cli;

use clap::Parser;
use cli::WeaverArgs;
use std::process::ExitCode;
use std::sync::Arc;
use weaver::config::CrawlerConfig;
use weaver::fetch::HttpFetcher;
use weaver::logging::{configure_logging, target_from_path};
use weaver::scheduler::Scheduler;

#[tokio::main]
async fn main() -> ExitCode {
    let args = WeaverArgs::parse();
    configure_logging(&target_from_path(args.log_file.as_deref()), args.log_level);

    let base = match CrawlerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let config = args.apply(base);
    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    let fetcher: Arc<dyn weaver::fetch::Fetch> = Arc::new(HttpFetcher::new(reqwest::Client::new()));

    let scheduler = match &args.resume_from {
        Some(path) => match Scheduler::load_checkpoint(config, fetcher, path).await {
            Ok(scheduler) => scheduler,
            Err(e) => {
                eprintln!("failed to load checkpoint {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Scheduler::new(config, fetcher),
    };

    let job = scheduler.run().await;
    let stats = scheduler.budget_stats().await;
    println!(
        "run {} finished: {} pages, {} bytes, {:?} elapsed",
        job.run_id, stats.pages_crawled, stats.bytes_downloaded, stats.elapsed
    );

    if let Some(path) = &args.checkpoint_to {
        if let Err(e) = scheduler.save_checkpoint(path).await {
            eprintln!("failed to write checkpoint {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

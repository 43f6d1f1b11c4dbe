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

//! Logging backend configuration: console or file appender, chosen by
//! the CLI, wired to log4rs.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;
use std::path::Path;

const PATTERN: &str = "{l}@Thread{I} - {d} - {m}{n}";

/// Where log output goes. Console is the default; file is for long
/// unattended runs.
#[derive(Debug, Clone)]
pub enum LogTarget {
    Console,
    File(std::path::PathBuf),
}

/// Configures the global log4rs logger. Safe to call once per process;
/// a second call is a no-op (log4rs refuses to re-init).
pub fn configure_logging(target: &LogTarget, level: LevelFilter) {
    let mut builder = Config::builder();

    builder = match target {
        LogTarget::Console => {
            let appender = ConsoleAppender::builder()
                .encoder(Box::new(PatternEncoder::new(PATTERN)))
                .build();
            builder.appender(Appender::builder().build("out", Box::new(appender)))
        }
        LogTarget::File(path) => {
            let appender = match FileAppender::builder()
                .encoder(Box::new(PatternEncoder::new(PATTERN)))
                .build(path)
            {
                Ok(appender) => appender,
                Err(e) => {
                    eprintln!("failed to open log file {}: {e}, falling back to console", path.display());
                    return configure_logging(&LogTarget::Console, level);
                }
            };
            builder.appender(Appender::builder().build("out", Box::new(appender)))
        }
    };

    let config = match builder
        .logger(Logger::builder().build("weaver", level))
        .build(Root::builder().appender("out").build(LevelFilter::Warn))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid logging configuration: {e}");
            return;
        }
    };

    if log4rs::init_config(config).is_err() {
        // Already initialized (e.g. a prior test in the same process); not fatal.
    }
}

/// Resolves a target from an optional `--log-file` path.
pub fn target_from_path(path: Option<&Path>) -> LogTarget {
    match path {
        Some(p) => LogTarget::File(p.to_path_buf()),
        None => LogTarget::Console,
    }
}

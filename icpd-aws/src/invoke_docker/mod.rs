use std::path::Path;

use clap::{value_parser, Arg, Command};
use icp_ops::{
    command::docker::DockerHelper, document, errors::Result, invoke::ProcessInvoker,
};
use serde::{Deserialize, Serialize};

pub const NAME: &str = "invoke-docker";

/// Defines "invoke-docker" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,

    pub command_file: String,
    /// Index of the first document to process.
    pub start: usize,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Invokes the docker command documents of a file until the first non-docker document")
        .arg(
            Arg::new("LOG_LEVEL")
                .long("log-level")
                .short('l')
                .help("Sets the log level")
                .required(false)
                .num_args(1)
                .value_parser(["debug", "info"])
                .default_value("info"),
        )
        .arg(
            Arg::new("COMMAND_FILE")
                .long("command-file")
                .short('f')
                .help("Multi-document YAML file of command documents")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("START")
                .long("start")
                .help("Index of the first document to process")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(usize))
                .default_value("0"),
        )
}

pub fn execute(opts: Flags) -> Result<()> {
    // ref. <https://github.com/env-logger-rs/env_logger/issues/47>
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, &opts.log_level),
    );
    log::info!("running '{}' with {:?}", NAME, opts);

    let mut docs = document::load_all(Path::new(&opts.command_file))?;
    let mut invoker = ProcessInvoker;
    let next = DockerHelper.invoke_commands(&mut docs, opts.start, &mut invoker)?;

    let processed = docs.iter().filter(|d| document::is_processed(d)).count();
    if next < docs.len() {
        log::info!(
            "processed {} docker command(s); resume at document {} of {}",
            processed,
            next,
            docs.len()
        );
    } else {
        log::info!("processed {} docker command(s); no documents left", processed);
    }
    Ok(())
}

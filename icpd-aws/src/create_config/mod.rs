use clap::{Arg, Command};
use icp_ops::{errors::Result, icp::config::ConfigureIcp, stack::StackParameters};
use serde::{Deserialize, Serialize};

pub const NAME: &str = "create-config";

/// Defines "create-config" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,

    pub stack_parameters_file: String,
    pub template_path: String,
    pub config_file_path: String,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Creates the ICP config.yaml from its template and the stack parameters")
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
            Arg::new("STACK_PARAMETERS_FILE")
                .long("stack-parameters-file")
                .short('s')
                .help("Stack parameters YAML file")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("TEMPLATE_PATH")
                .long("template-path")
                .short('t')
                .help("The config.yaml template")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("CONFIG_FILE_PATH")
                .long("config-file-path")
                .short('o')
                .help("Where to write the config.yaml")
                .required(true)
                .num_args(1),
        )
}

pub fn execute(opts: Flags) -> Result<()> {
    // ref. <https://github.com/env-logger-rs/env_logger/issues/47>
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, &opts.log_level),
    );
    log::info!("running '{}' with {:?}", NAME, opts);

    let stack = StackParameters::load(&opts.stack_parameters_file)?;
    let c = ConfigureIcp::new(&stack, &opts.template_path)?;
    c.create_config_file(&opts.config_file_path)?;

    log::info!(
        "created '{}' for stack {} (common name {})",
        opts.config_file_path,
        stack.stack_id,
        c.common_name()?
    );
    Ok(())
}

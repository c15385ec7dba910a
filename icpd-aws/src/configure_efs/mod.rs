use clap::{Arg, Command};
use icp_ops::{
    errors::Result,
    icp::efs::{self, ConfigureEfs},
    invoke::ProcessInvoker,
    stack::StackParameters,
};
use serde::{Deserialize, Serialize};

pub const NAME: &str = "configure-efs";

/// Defines "configure-efs" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,

    pub stack_parameters_file: String,
    pub playbook_path: String,
    pub var_template_path: String,
    pub var_file_path: String,
    pub inventory: String,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Configures the worker nodes to mount EFS with an Ansible playbook")
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
                .help("Boot stack parameters YAML file (EFSDNSName, ApplicationStorageMountPoint)")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("PLAYBOOK_PATH")
                .long("playbook-path")
                .help("The EFS configuration playbook")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("VAR_TEMPLATE_PATH")
                .long("var-template-path")
                .help("The EFS variable file template")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("VAR_FILE_PATH")
                .long("var-file-path")
                .help("Where to write the playbook variable file")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("INVENTORY")
                .long("inventory")
                .help("The Ansible inventory")
                .required(false)
                .num_args(1)
                .default_value(efs::DEFAULT_INVENTORY),
        )
}

pub fn execute(opts: Flags) -> Result<()> {
    // ref. <https://github.com/env-logger-rs/env_logger/issues/47>
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, &opts.log_level),
    );
    log::info!("running '{}' with {:?}", NAME, opts);

    let stack = StackParameters::load(&opts.stack_parameters_file)?;
    let c = ConfigureEfs::new(
        &stack,
        &opts.playbook_path,
        &opts.var_template_path,
        &opts.var_file_path,
    )?
    .with_inventory(&opts.inventory);

    let mut invoker = ProcessInvoker;
    c.configure_efs(&mut invoker)?;
    log::info!("configured EFS for stack {}", stack.stack_id);
    Ok(())
}

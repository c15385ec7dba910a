use clap::{Arg, ArgAction, Command};
use icp_ops::{
    errors::{Error, Result},
    invoke::ProcessInvoker,
    pipeline::{CommandHelper, KindFilter},
    stack::StackParameters,
    staging::Staging,
    variables::Values,
};
use serde::{Deserialize, Serialize};

pub const NAME: &str = "invoke-commands";

/// Defines "invoke-commands" option.
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq, Clone)]
pub struct Flags {
    pub log_level: String,

    pub command_dir: String,
    pub stack_parameters_file: String,
    /// "NAME=VALUE" caller overrides.
    pub set_values: Vec<String>,
    pub include_kinds: Vec<String>,
    pub exclude_kinds: Vec<String>,
    /// Empty to stage into a temporary directory.
    pub staging_dir: String,
}

pub fn command() -> Command {
    Command::new(NAME)
        .about("Renders and invokes every command template in a directory, in file name order")
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
            Arg::new("COMMAND_DIR")
                .long("command-dir")
                .short('d')
                .help("Directory of command templates and the variables file")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("STACK_PARAMETERS_FILE")
                .long("stack-parameters-file")
                .short('s')
                .help("Stack parameters YAML file, used as the intrinsic variables")
                .required(false)
                .num_args(1),
        )
        .arg(
            Arg::new("SET")
                .long("set")
                .help("Overrides a variable value (NAME=VALUE, repeatable)")
                .required(false)
                .num_args(1)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("INCLUDE_KIND")
                .long("include-kind")
                .help("Only invokes templates of this kind (repeatable)")
                .required(false)
                .num_args(1)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("EXCLUDE_KIND")
                .long("exclude-kind")
                .help("Skips templates of this kind (repeatable)")
                .required(false)
                .num_args(1)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("STAGING_DIR")
                .long("staging-dir")
                .help("Keeps rendered command files in this directory (default: temporary)")
                .required(false)
                .num_args(1),
        )
}

pub fn execute(opts: Flags) -> Result<()> {
    // ref. <https://github.com/env-logger-rs/env_logger/issues/47>
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, &opts.log_level),
    );
    log::info!("running '{}' with {:?}", NAME, opts);

    let intrinsic = if opts.stack_parameters_file.is_empty() {
        Values::new()
    } else {
        StackParameters::load(&opts.stack_parameters_file)?.as_values()
    };
    let overrides = parse_set_values(&opts.set_values)?;

    let staging = if opts.staging_dir.is_empty() {
        Staging::temporary()?
    } else {
        Staging::fixed(&opts.staging_dir)?
    };

    let mut helper = CommandHelper::new(&opts.command_dir, &intrinsic, &overrides)?.with_filter(
        KindFilter {
            include: opts.include_kinds.clone(),
            exclude: opts.exclude_kinds.clone(),
        },
    );

    let mut invoker = ProcessInvoker;
    let invoked = helper.invoke_commands(&Values::new(), &staging, &mut invoker)?;
    log::info!(
        "successfully invoked {} command(s) from {}",
        invoked.len(),
        opts.command_dir
    );
    Ok(())
}

/// Parses "NAME=VALUE" pairs. The value may be empty and may hold "=".
pub fn parse_set_values(set_values: &[String]) -> Result<Values> {
    let mut values = Values::new();
    for s in set_values {
        let (name, value) = match s.split_once('=') {
            Some((n, v)) if !n.trim().is_empty() => (n.trim(), v),
            _ => {
                return Err(Error::InvalidArgument {
                    message: format!("expected NAME=VALUE, got '{}'", s),
                })
            }
        };
        values.insert(name.to_string(), serde_yaml::Value::from(value));
    }
    Ok(values)
}

#[test]
fn test_parse_set_values() {
    let ret = parse_set_values(&[
        "ClusterName=mycluster".to_string(),
        "Args=a=b".to_string(),
        "Empty=".to_string(),
    ]);
    assert!(ret.is_ok());
    let values = ret.unwrap();
    assert_eq!(
        values.get("ClusterName"),
        Some(&serde_yaml::Value::from("mycluster"))
    );
    assert_eq!(values.get("Args"), Some(&serde_yaml::Value::from("a=b")));
    assert_eq!(values.get("Empty"), Some(&serde_yaml::Value::from("")));

    assert!(parse_set_values(&["novalue".to_string()]).is_err());
    assert!(parse_set_values(&["=x".to_string()]).is_err());
}

#[test]
fn test_command() {
    let m = command()
        .try_get_matches_from(vec![
            NAME,
            "--command-dir",
            "/opt/icp/cmds",
            "--set",
            "A=1",
            "--set",
            "B=2",
            "--exclude-kind",
            "helm",
        ])
        .unwrap();
    assert_eq!(m.get_one::<String>("LOG_LEVEL").unwrap(), "info");
    let sets: Vec<&String> = m.get_many::<String>("SET").unwrap().collect();
    assert_eq!(sets, vec!["A=1", "B=2"]);
    assert!(m.get_many::<String>("INCLUDE_KIND").is_none());

    assert!(command().try_get_matches_from(vec![NAME]).is_err());
}

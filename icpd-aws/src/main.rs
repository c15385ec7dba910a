mod configure_efs;
mod create_config;
mod invoke_commands;
mod invoke_docker;

use std::process;

use clap::{crate_version, ArgMatches, Command};

pub const APP_NAME: &str = "icpd-aws";

fn main() {
    let matches = Command::new(APP_NAME)
        .version(crate_version!())
        .about("Runs the ICP installation commands on the AWS boot node")
        .subcommands(vec![
            invoke_commands::command(),
            invoke_docker::command(),
            create_config::command(),
            configure_efs::command(),
        ])
        .get_matches();

    println!("{} version: {}", APP_NAME, crate_version!());

    let ret = match matches.subcommand() {
        Some((invoke_commands::NAME, sub_matches)) => {
            invoke_commands::execute(invoke_commands::Flags {
                log_level: string_arg(sub_matches, "LOG_LEVEL", "info"),
                command_dir: string_arg(sub_matches, "COMMAND_DIR", ""),
                stack_parameters_file: string_arg(sub_matches, "STACK_PARAMETERS_FILE", ""),
                set_values: string_args(sub_matches, "SET"),
                include_kinds: string_args(sub_matches, "INCLUDE_KIND"),
                exclude_kinds: string_args(sub_matches, "EXCLUDE_KIND"),
                staging_dir: string_arg(sub_matches, "STAGING_DIR", ""),
            })
        }

        Some((invoke_docker::NAME, sub_matches)) => invoke_docker::execute(invoke_docker::Flags {
            log_level: string_arg(sub_matches, "LOG_LEVEL", "info"),
            command_file: string_arg(sub_matches, "COMMAND_FILE", ""),
            start: *sub_matches.get_one::<usize>("START").unwrap_or(&0),
        }),

        Some((create_config::NAME, sub_matches)) => create_config::execute(create_config::Flags {
            log_level: string_arg(sub_matches, "LOG_LEVEL", "info"),
            stack_parameters_file: string_arg(sub_matches, "STACK_PARAMETERS_FILE", ""),
            template_path: string_arg(sub_matches, "TEMPLATE_PATH", ""),
            config_file_path: string_arg(sub_matches, "CONFIG_FILE_PATH", ""),
        }),

        Some((configure_efs::NAME, sub_matches)) => configure_efs::execute(configure_efs::Flags {
            log_level: string_arg(sub_matches, "LOG_LEVEL", "info"),
            stack_parameters_file: string_arg(sub_matches, "STACK_PARAMETERS_FILE", ""),
            playbook_path: string_arg(sub_matches, "PLAYBOOK_PATH", ""),
            var_template_path: string_arg(sub_matches, "VAR_TEMPLATE_PATH", ""),
            var_file_path: string_arg(sub_matches, "VAR_FILE_PATH", ""),
            inventory: string_arg(
                sub_matches,
                "INVENTORY",
                icp_ops::icp::efs::DEFAULT_INVENTORY,
            ),
        }),

        _ => unreachable!("unknown subcommand"),
    };

    if let Err(e) = ret {
        log::error!("{} failed: {}", APP_NAME, e);
        eprintln!("{} failed: {}", APP_NAME, e.message());
        process::exit(1);
    }
}

fn string_arg(m: &ArgMatches, id: &str, default: &str) -> String {
    m.get_one::<String>(id)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn string_args(m: &ArgMatches, id: &str) -> Vec<String> {
    m.get_many::<String>(id)
        .map(|vs| vs.cloned().collect())
        .unwrap_or_default()
}

use serde_yaml::Value;

use crate::{
    command::RenderedCommand,
    errors::{Error, Result},
    icp,
    invoke::{self, Invoker},
    stack::StackParameters,
    template::{self, Mode},
    variables::{KeywordMap, SpecialValues, Values},
};

/// Variable name to the macro keyword in the EFS variable template.
pub const TEMPLATE_KEYWORDS: &[(&str, &str)] = &[
    ("TargetNodes", "TARGET_NODES"),
    ("MountSource", "MOUNT_SOURCE"),
    ("MountPoint", "MOUNT_POINT"),
    ("MountOptions", "MOUNT_OPTIONS"),
];

/// Boot stack parameter name to the EFS variable name.
pub const STACK_PARAMETER_MAPPINGS: &[(&str, &str)] = &[
    ("ApplicationStorageMountPoint", "MountPoint"),
    ("EFSDNSName", "MountSource"),
];

pub const DEFAULT_TARGET_NODES: &str = "worker";
pub const DEFAULT_MOUNT_OPTIONS: &str =
    "rw,suid,dev,exec,auto,nouser,nfsvers=4.1,rsize=1048576,wsize=1048576,hard,timeo=600,retrans=2,noresvport";

pub const DEFAULT_INVENTORY: &str = "/etc/ansible/hosts";

/// The EFS mount source always names the root of the file system.
const MOUNT_SOURCE_KEYWORD: &str = "MOUNT_SOURCE";
const MOUNT_SOURCE_FORMAT: &str = "{}:/";

pub fn default_values() -> Values {
    let mut defaults = Values::new();
    defaults.insert("TargetNodes".to_string(), Value::from(DEFAULT_TARGET_NODES));
    defaults.insert("MountOptions".to_string(), Value::from(DEFAULT_MOUNT_OPTIONS));
    defaults
}

/// Configures the cluster worker nodes to mount EFS, by filling in the
/// Ansible variable file and running the playbook against the inventory.
#[derive(Debug, Clone)]
pub struct ConfigureEfs {
    pub stack_id: String,
    pub playbook_path: String,
    pub var_template_path: String,
    pub var_file_path: String,
    pub inventory: String,
    keyword_map: KeywordMap,
    parameters: Values,
}

impl ConfigureEfs {
    pub fn new(
        stack: &StackParameters,
        playbook_path: &str,
        var_template_path: &str,
        var_file_path: &str,
    ) -> Result<Self> {
        if stack.stack_id.is_empty() {
            return Err(Error::MissingArgument {
                message: String::from("the CloudFormation boot stack ID must be provided"),
            });
        }
        if playbook_path.is_empty() {
            return Err(Error::MissingArgument {
                message: String::from("a playbook path must be provided"),
            });
        }
        if var_template_path.is_empty() {
            return Err(Error::MissingArgument {
                message: String::from("an EFS configuration variable template file path must be provided"),
            });
        }
        if var_file_path.is_empty() {
            return Err(Error::MissingArgument {
                message: String::from("the path for the Ansible playbook variables file must be provided"),
            });
        }

        let mut given = Values::new();
        for (stack_name, var_name) in STACK_PARAMETER_MAPPINGS {
            if let Some(v) = stack.get(stack_name) {
                given.insert(var_name.to_string(), Value::from(v));
            }
        }

        let keyword_map = icp::keyword_map(TEMPLATE_KEYWORDS);
        let parameters = icp::fill_in_default_values(&keyword_map, &default_values(), &given);
        log::debug!("EFS parameters, including defaults: {:?}", parameters);

        Ok(Self {
            stack_id: stack.stack_id.clone(),
            playbook_path: playbook_path.to_string(),
            var_template_path: var_template_path.to_string(),
            var_file_path: var_file_path.to_string(),
            inventory: String::from(DEFAULT_INVENTORY),
            keyword_map,
            parameters,
        })
    }

    pub fn with_inventory(mut self, inventory: &str) -> Self {
        self.inventory = inventory.to_string();
        self
    }

    pub fn parameters(&self) -> &Values {
        &self.parameters
    }

    /// Writes the Ansible variable file from the template.
    /// The mount source is suffixed with ":/".
    pub fn create_var_file(&self, var_file_path: &str, template_path: &str) -> Result<()> {
        let mut special = SpecialValues::new();
        special.insert(
            MOUNT_SOURCE_KEYWORD.to_string(),
            MOUNT_SOURCE_FORMAT.to_string(),
        );
        template::create_file(
            var_file_path,
            template_path,
            &self.parameters,
            &self.keyword_map,
            &special,
            Mode::OncePerParameter,
        )
    }

    /// Creates the variable file, then runs the playbook with it.
    pub fn configure_efs(&self, invoker: &mut dyn Invoker) -> Result<()> {
        self.create_var_file(&self.var_file_path, &self.var_template_path)?;
        run_ansible_playbook(
            invoker,
            &self.playbook_path,
            &self.var_file_path,
            &self.inventory,
        )
    }
}

/// Runs "ansible-playbook <playbook> --extra-vars @<extra_vars> --inventory <inventory>".
pub fn run_ansible_playbook(
    invoker: &mut dyn Invoker,
    playbook: &str,
    extra_vars: &str,
    inventory: &str,
) -> Result<()> {
    if playbook.is_empty() {
        return Err(Error::MissingArgument {
            message: String::from("the playbook path must be provided"),
        });
    }

    let cmd = RenderedCommand::new(vec![
        String::from("ansible-playbook"),
        playbook.to_string(),
        String::from("--extra-vars"),
        format!("@{}", extra_vars),
        String::from("--inventory"),
        inventory.to_string(),
    ]);
    invoke::run(invoker, &cmd).map_err(|e| {
        log::error!("error calling ansible-playbook: {}", e);
        e
    })?;
    log::info!("ansible-playbook: {} completed", playbook);
    Ok(())
}

/// RUST_LOG=debug cargo test --package icp-ops --lib -- icp::efs::test_configure_efs --exact --show-output
#[test]
fn test_configure_efs() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut s = StackParameters::new("arn:aws:cloudformation:us-east-1:123:stack/boot/abc", "boot");
    s.parameters.insert(
        "EFSDNSName".to_string(),
        "fs-12345678.efs.us-east-1.amazonaws.com".to_string(),
    );
    s.parameters
        .insert("ApplicationStorageMountPoint".to_string(), "/data".to_string());

    let tmp_dir = tempfile::tempdir().unwrap();
    let template_path = tmp_dir.path().join("efs-config-vars.template");
    std::fs::write(
        &template_path,
        "# EFS on ${TARGET_NODES}
target_nodes: ${TARGET_NODES}
mount_source: ${MOUNT_SOURCE}
mount_point: ${MOUNT_POINT}
mount_options: ${MOUNT_OPTIONS}
",
    )
    .unwrap();
    let var_path = tmp_dir.path().join("efs-config-vars.yaml");

    let ret = ConfigureEfs::new(
        &s,
        "/opt/playbooks/efs.yaml",
        template_path.to_str().unwrap(),
        var_path.to_str().unwrap(),
    );
    assert!(ret.is_ok());
    let c = ret.unwrap().with_inventory("/tmp/hosts");

    let mut invoker = invoke::Recorder::with_codes(vec![0]);
    let ret = c.configure_efs(&mut invoker);
    assert!(ret.is_ok());

    assert_eq!(
        std::fs::read_to_string(&var_path).unwrap(),
        format!(
            "# EFS on ${{TARGET_NODES}}
target_nodes: worker
mount_source: fs-12345678.efs.us-east-1.amazonaws.com:/
mount_point: /data
mount_options: {}
",
            DEFAULT_MOUNT_OPTIONS
        )
    );
    assert_eq!(
        invoker.invoked(),
        vec![format!(
            "ansible-playbook /opt/playbooks/efs.yaml --extra-vars @{} --inventory /tmp/hosts",
            var_path.display()
        )]
    );
}

#[test]
fn test_run_ansible_playbook_failure() {
    let mut invoker = invoke::Recorder::with_codes(vec![2]);
    let ret = run_ansible_playbook(&mut invoker, "efs.yaml", "vars.yaml", DEFAULT_INVENTORY);
    assert!(matches!(
        ret,
        Err(Error::ExternalProcess { code: Some(2), .. })
    ));

    let ret = run_ansible_playbook(&mut invoker, "", "vars.yaml", DEFAULT_INVENTORY);
    assert!(matches!(ret, Err(Error::MissingArgument { .. })));
    assert_eq!(invoker.invoked().len(), 1);

    let s = StackParameters::new("boot", "boot");
    let ret = ConfigureEfs::new(&s, "efs.yaml", "", "vars.yaml");
    assert!(matches!(ret, Err(Error::MissingArgument { .. })));
}

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    command::{Registry, RenderedCommand},
    document,
    errors::{Error, Result},
    invoke::{self, Invoker},
    staging::Staging,
    template::{self, Mode},
    variables::{self, KeywordMap, SpecialValues, Values, VariablesFile},
};

/// Only files with this extension are considered in a command directory.
pub const TEMPLATE_EXTENSION: &str = "yaml";

/// Selects YAML files by the "kind" of their first document.
/// With both lists empty every file passes; otherwise files without a
/// "kind" never pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl KindFilter {
    pub fn include(kinds: &[&str]) -> Self {
        Self {
            include: kinds.iter().map(|k| k.to_string()).collect(),
            exclude: Vec::new(),
        }
    }

    pub fn exclude(kinds: &[&str]) -> Self {
        Self {
            include: Vec::new(),
            exclude: kinds.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn includes(&self, kind: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|k| k == kind);
        let excluded = self.exclude.iter().any(|k| k == kind);
        included && !excluded
    }
}

/// Lists the ".yaml" files in the directory that pass the filter,
/// in ascending file name order.
pub fn list_yaml(dir_path: &Path, filter: &KindFilter) -> Result<Vec<PathBuf>> {
    let label = dir_path.display().to_string();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir_path).map_err(|e| Error::io(&label, e))? {
        let entry = entry.map_err(|e| Error::io(&label, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
            continue;
        }
        files.push(path);
    }
    files.sort();

    if filter.is_empty() {
        return Ok(files);
    }

    log::debug!("yaml files to consider with {:?}: {:?}", filter, files);
    let mut included = Vec::new();
    for f in files {
        // only the first document decides
        let docs = document::load_all(&f)?;
        match docs.first().and_then(document::kind_of) {
            Some(kind) if filter.includes(kind) => included.push(f),
            Some(_) => {}
            None => log::warn!("skipping {} with no kind", f.display()),
        }
    }
    log::debug!("included yaml files: {:?}", included);
    Ok(included)
}

/// Turns a directory of command templates into an ordered sequence of
/// invoked processes.
///
/// The directory holds at most one "variables" document plus any number of
/// command templates. Templates run in ascending file name order, so name
/// them to encode the sequence (e.g., "01-load.yaml", "02-run.yaml").
/// All commands are built before the first one is invoked, and the first
/// non-zero exit code stops the sequence.
pub struct CommandHelper {
    command_dir: PathBuf,
    keyword_map: KeywordMap,
    values: Values,
    required: Vec<String>,
    filter: KindFilter,
    registry: Registry,
}

impl CommandHelper {
    /// Resolves the variables of the command directory. In increasing
    /// precedence: the "VariableValues" of the variables file, the
    /// framework "intrinsic" values, then the caller "overrides".
    pub fn new(command_dir: &str, intrinsic: &Values, overrides: &Values) -> Result<Self> {
        if command_dir.is_empty() {
            return Err(Error::MissingArgument {
                message: String::from("the command directory must be provided"),
            });
        }
        let dir = PathBuf::from(command_dir);
        if !dir.is_dir() {
            return Err(Error::MissingArgument {
                message: format!("command directory {} does not exist", command_dir),
            });
        }

        let mut helper = Self {
            command_dir: dir,
            keyword_map: KeywordMap::new(),
            values: Values::new(),
            required: Vec::new(),
            filter: KindFilter::default(),
            registry: Registry::default(),
        };

        let variables_files =
            list_yaml(&helper.command_dir, &KindFilter::include(&[variables::KIND]))?;
        let variables_path = match variables_files.first() {
            Some(p) => p.display().to_string(),
            None => {
                log::info!(
                    "no variables file in {}; static command set",
                    helper.command_dir.display()
                );
                return Ok(helper);
            }
        };
        if variables_files.len() > 1 {
            log::warn!(
                "multiple variables files in {} is not supported; only {} is used",
                helper.command_dir.display(),
                variables_path
            );
        }

        let vars = VariablesFile::load(&variables_path)?;
        log::debug!("variable keyword map: {:?}", vars.keyword_map);

        let mut values = vars.values;
        variables::merge_values(vars.keyword_map.keys(), &mut values, intrinsic);
        variables::merge_values(vars.keyword_map.keys(), &mut values, overrides);
        log::debug!("all variable values: {:?}", values);

        helper.keyword_map = vars.keyword_map;
        helper.values = values;
        helper.required = vars.intrinsic_variables;
        helper.check_resolved(&variables_path)?;
        Ok(helper)
    }

    /// Narrows the command templates by kind.
    /// The variables document is always excluded.
    pub fn with_filter(mut self, filter: KindFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn keyword_map(&self) -> &KeywordMap {
        &self.keyword_map
    }

    fn check_resolved(&self, source: &str) -> Result<()> {
        let missing = variables::unresolved(&self.required, &self.values);
        if missing.is_empty() {
            return Ok(());
        }
        let e = Error::InvalidConfiguration {
            message: format!(
                "intrinsic variables {:?} of {} have no value",
                missing, source
            ),
        };
        log::error!("{}", e);
        Err(e)
    }

    fn template_filter(&self) -> KindFilter {
        let mut f = self.filter.clone();
        if !f.exclude.iter().any(|k| k == variables::KIND) {
            f.exclude.push(variables::KIND.to_string());
        }
        f
    }

    /// Renders every command template into the staging directory and builds
    /// its command, in template file name order. Nothing is invoked.
    pub fn create_commands(&self, staging: &Staging) -> Result<Vec<RenderedCommand>> {
        let templates = list_yaml(&self.command_dir, &self.template_filter())?;
        if templates.is_empty() {
            log::warn!(
                "no command template files found in {}",
                self.command_dir.display()
            );
            return Ok(Vec::new());
        }

        let mut commands = Vec::with_capacity(templates.len());
        for template_path in templates {
            let cmd_file_path = staging.command_file_path(&template_path);
            let cmd_file = cmd_file_path.display().to_string();
            template::create_file(
                &cmd_file,
                &template_path.display().to_string(),
                &self.values,
                &self.keyword_map,
                &SpecialValues::new(),
                Mode::EveryLine,
            )?;

            let docs = document::load_all(&cmd_file_path)?;
            if docs.is_empty() {
                return Err(Error::InvalidConfigurationFile {
                    path: cmd_file,
                    message: String::from("expected at least one command document"),
                });
            }

            let cmd = self
                .registry
                .create_command(&docs, staging.path())
                .map_err(|e| {
                    log::error!("failed to create command from {}: {}", cmd_file, e);
                    e
                })?;
            log::info!("created command from {}: {}", template_path.display(), cmd);
            commands.push(cmd);
        }
        Ok(commands)
    }

    /// Merges the caller "overrides" into the resolved values, builds every
    /// command and invokes them in order. Returns the invoked commands.
    pub fn invoke_commands(
        &mut self,
        overrides: &Values,
        staging: &Staging,
        invoker: &mut dyn Invoker,
    ) -> Result<Vec<RenderedCommand>> {
        if !overrides.is_empty() {
            variables::merge_values(self.keyword_map.keys(), &mut self.values, overrides);
            log::debug!("using variable values: {:?}", self.values);
        }

        let commands = self.create_commands(staging)?;
        for cmd in commands.iter() {
            invoke::run(invoker, cmd).map_err(|e| {
                log::error!("ERROR: {}", e);
                e
            })?;
        }
        Ok(commands)
    }
}

#[cfg(test)]
fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn test_kind_filter() {
    let f = KindFilter::default();
    assert!(f.includes("docker"));

    let f = KindFilter::include(&["variables"]);
    assert!(f.includes("variables"));
    assert!(!f.includes("helm"));

    let f = KindFilter::exclude(&["variables"]);
    assert!(!f.includes("variables"));
    assert!(f.includes("helm"));

    let f = KindFilter {
        include: vec!["helm".to_string(), "kubectl".to_string()],
        exclude: vec!["kubectl".to_string()],
    };
    assert!(f.includes("helm"));
    assert!(!f.includes("kubectl"));
    assert!(!f.includes("docker"));
}

#[test]
fn test_list_yaml() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let d = tmp_dir.path();
    write(d, "02-b.yaml", "kind: helm\n");
    write(d, "01-a.yaml", "kind: kubectl\ncommand: get\n");
    write(d, "10-c.yaml", "command: orphan\n");
    write(d, "notes.txt", "kind: helm\n");
    write(d, "vars.yaml", "kind: variables\n");
    fs::create_dir(d.join("sub.yaml")).unwrap();

    let all = list_yaml(d, &KindFilter::default()).unwrap();
    let names: Vec<_> = all
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["01-a.yaml", "02-b.yaml", "10-c.yaml", "vars.yaml"]);

    let cmds = list_yaml(d, &KindFilter::exclude(&["variables"])).unwrap();
    let names: Vec<_> = cmds
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["01-a.yaml", "02-b.yaml"]);
}

/// RUST_LOG=debug cargo test --package icp-ops --lib -- pipeline::test_invoke_commands --exact --show-output
#[test]
fn test_invoke_commands() {
    let _ = env_logger::builder().is_test(true).try_init();

    let tmp_dir = tempfile::tempdir().unwrap();
    let d = tmp_dir.path();
    write(
        d,
        "00-variables.yaml",
        "kind: variables
VariableKeywordMap:
  Image: IMAGE_NAME
  ClusterName: CLUSTER_NAME
  Namespace: NAMESPACE
VariableValues:
  Image: nginx:1.14
  Namespace: default
IntrinsicVariables:
  - ClusterName
",
    );
    write(
        d,
        "02-apply.yaml",
        "# creates the pod
kind: kubectl
command: apply
options:
  f: ${CLUSTER_NAME}-pod
  namespace: ${NAMESPACE}
---
kind: Pod
apiVersion: v1
metadata:
  name: web
spec:
  containers:
    - name: web
      image: ${IMAGE_NAME}
",
    );
    write(
        d,
        "01-load.yaml",
        "kind: docker
command: load
options:
  i: /tmp/${CLUSTER_NAME}.tar
",
    );
    write(
        d,
        "03-install.yaml",
        "kind: helm
options:
  name: ${CLUSTER_NAME}-mq
set-values:
  image: ${IMAGE_NAME}
chart: ibm-charts/ibm-mqadvanced-server-dev
",
    );

    let mut intrinsic = Values::new();
    intrinsic.insert("ClusterName".to_string(), "mycluster".into());
    intrinsic.insert("Namespace".to_string(), "kube-system".into());
    let mut overrides = Values::new();
    overrides.insert("Namespace".to_string(), "services".into());

    let ret = CommandHelper::new(d.to_str().unwrap(), &intrinsic, &overrides);
    assert!(ret.is_ok());
    let mut helper = ret.unwrap();
    assert_eq!(
        helper.values().get("Namespace"),
        Some(&serde_yaml::Value::from("services"))
    );

    let staging_dir = d.join("staging");
    let staging = Staging::fixed(&staging_dir).unwrap();
    let mut invoker = invoke::Recorder::with_codes(vec![]);

    let mut last = Values::new();
    last.insert("Image".to_string(), "nginx:1.15".into());
    let ret = helper.invoke_commands(&last, &staging, &mut invoker);
    assert!(ret.is_ok());
    let commands = ret.unwrap();
    assert_eq!(commands.len(), 3);

    let pod_file = staging_dir.join("mycluster-pod.yaml");
    assert_eq!(
        invoker.invoked(),
        vec![
            "docker load -i /tmp/mycluster.tar".to_string(),
            format!(
                "kubectl apply -f {} --namespace services",
                pod_file.display()
            ),
            "helm install --name mycluster-mq --set image=nginx:1.15 ibm-charts/ibm-mqadvanced-server-dev"
                .to_string(),
        ]
    );
    assert_eq!(invoker.commands(), commands.as_slice());

    assert!(staging_dir.join("01-load-command.yaml").exists());
    assert!(staging_dir.join("02-apply-command.yaml").exists());
    let pod = fs::read_to_string(&pod_file).unwrap();
    assert!(pod.contains("nginx:1.15"));
    assert!(!pod.contains("${"));
}

#[test]
fn test_invoke_commands_halts_on_failure() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let d = tmp_dir.path();
    for i in 1..=4 {
        write(
            d,
            &format!("0{}-load.yaml", i),
            &format!("kind: docker\ncommand: load\noptions:\n  i: /tmp/{}.tar\n", i),
        );
    }

    let mut helper = CommandHelper::new(d.to_str().unwrap(), &Values::new(), &Values::new()).unwrap();
    let staging = Staging::fixed(d.join("staging")).unwrap();

    // the 2nd of 4 fails
    let mut invoker = invoke::Recorder::with_codes(vec![0, 3, 0, 0]);
    let ret = helper.invoke_commands(&Values::new(), &staging, &mut invoker);
    match ret {
        Err(Error::ExternalProcess { command, code }) => {
            assert_eq!(command, "docker load -i /tmp/2.tar");
            assert_eq!(code, Some(3));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        invoker.invoked(),
        vec![
            "docker load -i /tmp/1.tar".to_string(),
            "docker load -i /tmp/2.tar".to_string()
        ]
    );
}

#[test]
fn test_unknown_kind_invokes_nothing() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let d = tmp_dir.path();
    write(d, "01-load.yaml", "kind: docker\ncommand: load\noptions:\n  i: /tmp/a.tar\n");
    write(d, "02-plan.yaml", "kind: terraform\ncommand: plan\n");

    let mut helper = CommandHelper::new(d.to_str().unwrap(), &Values::new(), &Values::new()).unwrap();
    let staging = Staging::temporary().unwrap();
    let mut invoker = invoke::Recorder::with_codes(vec![]);
    let ret = helper.invoke_commands(&Values::new(), &staging, &mut invoker);
    assert!(matches!(ret, Err(Error::CommandInterpreter { .. })));
    assert!(invoker.invoked().is_empty());

    // filtered out, the rest runs
    let mut helper = helper.with_filter(KindFilter::exclude(&["terraform"]));
    let ret = helper.invoke_commands(&Values::new(), &staging, &mut invoker);
    assert!(ret.is_ok());
    assert_eq!(invoker.invoked(), vec!["docker load -i /tmp/a.tar".to_string()]);
}

#[test]
fn test_configuration_errors() {
    let ret = CommandHelper::new("", &Values::new(), &Values::new());
    assert!(matches!(ret, Err(Error::MissingArgument { .. })));

    // required intrinsic variable left unresolved
    let tmp_dir = tempfile::tempdir().unwrap();
    let d = tmp_dir.path();
    write(
        d,
        "variables.yaml",
        "kind: variables\nVariableKeywordMap:\n  ClusterName: CLUSTER_NAME\nIntrinsicVariables: [ClusterName]\n",
    );
    let ret = CommandHelper::new(d.to_str().unwrap(), &Values::new(), &Values::new());
    assert!(matches!(ret, Err(Error::InvalidConfiguration { .. })));

    // variables file without a keyword map
    let tmp_dir = tempfile::tempdir().unwrap();
    let d = tmp_dir.path();
    write(d, "variables.yaml", "kind: variables\nVariableValues:\n  A: 1\n");
    let ret = CommandHelper::new(d.to_str().unwrap(), &Values::new(), &Values::new());
    assert!(matches!(ret, Err(Error::InvalidConfigurationFile { .. })));

    // empty directory yields no commands
    let tmp_dir = tempfile::tempdir().unwrap();
    let mut helper =
        CommandHelper::new(tmp_dir.path().to_str().unwrap(), &Values::new(), &Values::new()).unwrap();
    let staging = Staging::temporary().unwrap();
    let mut invoker = invoke::Recorder::with_codes(vec![]);
    let ret = helper.invoke_commands(&Values::new(), &staging, &mut invoker);
    assert_eq!(ret.unwrap().len(), 0);
}

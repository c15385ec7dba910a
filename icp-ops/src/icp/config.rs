use serde_yaml::Value;

use crate::{
    errors::{Error, Result},
    icp,
    stack::StackParameters,
    template::{self, Mode},
    variables::{self, KeywordMap, SpecialValues, Values},
};

/// Stack parameter name to the macro keyword in the ICP "config.yaml" template.
/// Names must be alpha-numeric.
pub const TEMPLATE_KEYWORDS: &[(&str, &str)] = &[
    ("CalicoTunnelMTU", "CALICO_TUNNEL_MTU"),
    ("CloudProvider", "CLOUD_PROVIDER"),
    ("ClusterCADomain", "CLUSTER_CA_DOMAIN"),
    ("ClusterCIDR", "CLUSTER_CIDR"),
    ("ClusterDomain", "CLUSTER_DOMAIN"),
    ("ClusterLBAddress", "CLUSTER_LB_ADDRESS"),
    ("ClusterName", "CLUSTER_NAME"),
    ("KubletNodeName", "KUBLET_NODENAME"),
    ("ProxyLBAddress", "PROXY_LB_ADDRESS"),
    ("ServiceCIDR", "SERVICE_CIDR"),
];

pub const DEFAULT_CALICO_TUNNEL_MTU: u64 = 8981;
pub const DEFAULT_CLOUD_PROVIDER: &str = "aws";
pub const DEFAULT_KUBLET_NODE_NAME: &str = "fqdn";

pub fn aws_default_values() -> Values {
    let mut defaults = Values::new();
    defaults.insert(
        "CalicoTunnelMTU".to_string(),
        Value::from(DEFAULT_CALICO_TUNNEL_MTU),
    );
    defaults.insert("CloudProvider".to_string(), Value::from(DEFAULT_CLOUD_PROVIDER));
    defaults.insert(
        "KubletNodeName".to_string(),
        Value::from(DEFAULT_KUBLET_NODE_NAME),
    );
    defaults
}

/// Fills in the ICP "config.yaml" template used to drive the installation.
#[derive(Debug, Clone)]
pub struct ConfigureIcp {
    pub stack_id: String,
    pub template_path: String,
    keyword_map: KeywordMap,
    parameters: Values,
}

impl ConfigureIcp {
    /// Takes the configuration parameters from the stack, falling back to the
    /// AWS defaults, and resolves "ClusterCADomain" to the cluster common name.
    /// The load balancer addresses are expected as stack parameters.
    pub fn new(stack: &StackParameters, template_path: &str) -> Result<Self> {
        if stack.stack_id.is_empty() {
            return Err(Error::MissingArgument {
                message: String::from("the CloudFormation stack ID must be provided"),
            });
        }
        if template_path.is_empty() {
            return Err(Error::MissingArgument {
                message: String::from("the path to the config.yaml template file must be provided"),
            });
        }

        let keyword_map = icp::keyword_map(TEMPLATE_KEYWORDS);
        let parameters =
            icp::fill_in_default_values(&keyword_map, &aws_default_values(), &stack.as_values());
        log::debug!("all parameters, including defaults: {:?}", parameters);

        let mut c = Self {
            stack_id: stack.stack_id.clone(),
            template_path: template_path.to_string(),
            keyword_map,
            parameters,
        };
        let cn = c.common_name()?;
        c.parameters
            .insert("ClusterCADomain".to_string(), Value::from(cn));
        Ok(c)
    }

    pub fn parameters(&self) -> &Values {
        &self.parameters
    }

    /// Returns "ClusterCADomain" if set, else "<ClusterName>.<ClusterDomain>".
    pub fn common_name(&self) -> Result<String> {
        if let Some(cn) = self.parameter("ClusterCADomain")? {
            return Ok(cn);
        }
        match (self.parameter("ClusterName")?, self.parameter("ClusterDomain")?) {
            (Some(name), Some(domain)) => Ok(format!("{}.{}", name, domain)),
            _ => Err(Error::MissingArgument {
                message: String::from(
                    "either ClusterCADomain or both ClusterName and ClusterDomain must be provided",
                ),
            }),
        }
    }

    fn parameter(&self, name: &str) -> Result<Option<String>> {
        match self.parameters.get(name) {
            Some(v) => {
                let s = variables::scalar_string(v)?;
                Ok(if s.is_empty() { None } else { Some(s) })
            }
            None => Ok(None),
        }
    }

    /// Writes the ICP configuration file from the template.
    /// Each line holds at most one parameter, and each parameter appears once.
    pub fn create_config_file(&self, config_file_path: &str) -> Result<()> {
        if config_file_path.is_empty() {
            return Err(Error::MissingArgument {
                message: String::from("the ICP configuration file path must be provided"),
            });
        }
        template::create_file(
            config_file_path,
            &self.template_path,
            &self.parameters,
            &self.keyword_map,
            &SpecialValues::new(),
            Mode::OncePerParameter,
        )
    }
}

#[cfg(test)]
fn stack(pairs: &[(&str, &str)]) -> StackParameters {
    let mut s = StackParameters::new("arn:aws:cloudformation:us-east-1:123:stack/icp/abc", "icp");
    for (k, v) in pairs {
        s.parameters.insert(k.to_string(), v.to_string());
    }
    s
}

/// RUST_LOG=debug cargo test --package icp-ops --lib -- icp::config::test_create_config_file --exact --show-output
#[test]
fn test_create_config_file() {
    let _ = env_logger::builder().is_test(true).try_init();

    let s = stack(&[
        ("ClusterName", "mycluster"),
        ("ClusterDomain", "example.com"),
        ("ClusterCIDR", "10.1.0.0/16"),
        ("ServiceCIDR", "10.0.0.1/24"),
        ("ClusterLBAddress", "master-elb.amazonaws.com"),
        ("ProxyLBAddress", "proxy-elb.amazonaws.com"),
        ("KeyName", "unrelated"),
    ]);

    let tmp_dir = tempfile::tempdir().unwrap();
    let template_path = tmp_dir.path().join("config.yaml.template");
    std::fs::write(
        &template_path,
        "# Licensed ${CLUSTER_NAME}
network_type: calico
network_cidr: ${CLUSTER_CIDR}
service_cluster_ip_range: ${SERVICE_CIDR}
cluster_name: ${CLUSTER_NAME}
cluster_CA_domain: ${CLUSTER_CA_DOMAIN}
cluster_lb_address: ${CLUSTER_LB_ADDRESS}
proxy_lb_address: ${PROXY_LB_ADDRESS}
calico_tunnel_mtu: ${CALICO_TUNNEL_MTU}
cloud_provider: ${CLOUD_PROVIDER}
kubelet_nodename: ${KUBLET_NODENAME}
# once only
other_name: ${CLUSTER_NAME}
",
    )
    .unwrap();

    let ret = ConfigureIcp::new(&s, template_path.to_str().unwrap());
    assert!(ret.is_ok());
    let c = ret.unwrap();
    assert_eq!(c.common_name().unwrap(), "mycluster.example.com");
    assert!(!c.parameters().contains_key("KeyName"));

    let config_path = tmp_dir.path().join("config.yaml");
    let ret = c.create_config_file(config_path.to_str().unwrap());
    assert!(ret.is_ok());
    assert_eq!(
        std::fs::read_to_string(&config_path).unwrap(),
        "# Licensed ${CLUSTER_NAME}
network_type: calico
network_cidr: 10.1.0.0/16
service_cluster_ip_range: 10.0.0.1/24
cluster_name: mycluster
cluster_CA_domain: mycluster.example.com
cluster_lb_address: master-elb.amazonaws.com
proxy_lb_address: proxy-elb.amazonaws.com
calico_tunnel_mtu: 8981
cloud_provider: aws
kubelet_nodename: fqdn
# once only
other_name: ${CLUSTER_NAME}
"
    );
}

#[test]
fn test_common_name() {
    let c = ConfigureIcp::new(
        &stack(&[
            ("ClusterCADomain", "ca.example.com"),
            ("ClusterName", "mycluster"),
            ("ClusterDomain", "example.com"),
            ("CloudProvider", "none"),
        ]),
        "config.yaml.template",
    )
    .unwrap();
    assert_eq!(c.common_name().unwrap(), "ca.example.com");
    assert_eq!(
        c.parameters().get("CloudProvider"),
        Some(&Value::from("none"))
    );

    let ret = ConfigureIcp::new(&stack(&[("ClusterName", "mycluster")]), "config.yaml.template");
    assert!(matches!(ret, Err(Error::MissingArgument { .. })));

    let ret = ConfigureIcp::new(&stack(&[("ClusterCADomain", "ca.example.com")]), "");
    assert!(matches!(ret, Err(Error::MissingArgument { .. })));
}

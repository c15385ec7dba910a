pub mod config;
pub mod efs;

use serde_yaml::Value;

use crate::variables::{KeywordMap, Values};

/// Builds a keyword map from static (parameter name, macro keyword) pairs.
pub fn keyword_map(pairs: &[(&str, &str)]) -> KeywordMap {
    pairs
        .iter()
        .map(|(name, keyword)| (name.to_string(), keyword.to_string()))
        .collect()
}

/// For every parameter name in the keyword map, takes the given value, else
/// the default. Names with neither (or with an empty value) are left out.
pub fn fill_in_default_values(keyword_map: &KeywordMap, defaults: &Values, given: &Values) -> Values {
    let mut filled = Values::new();
    for name in keyword_map.keys() {
        let v = match given.get(name) {
            Some(v) if is_set(v) => v,
            _ => match defaults.get(name) {
                Some(v) if is_set(v) => v,
                _ => continue,
            },
        };
        filled.insert(name.clone(), v.clone());
    }
    filled
}

fn is_set(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[test]
fn test_fill_in_default_values() {
    let k = keyword_map(&[("A", "A_A"), ("B", "B_B"), ("C", "C_C"), ("D", "D_D")]);

    let mut defaults = Values::new();
    defaults.insert("A".to_string(), Value::from(8981));
    defaults.insert("B".to_string(), Value::from("aws"));

    let mut given = Values::new();
    given.insert("B".to_string(), Value::from("openstack"));
    given.insert("C".to_string(), Value::from(""));
    given.insert("Z".to_string(), Value::from("not mapped"));

    let filled = fill_in_default_values(&k, &defaults, &given);
    assert_eq!(filled.len(), 2);
    assert_eq!(filled.get("A"), Some(&Value::from(8981)));
    assert_eq!(filled.get("B"), Some(&Value::from("openstack")));
    assert!(!filled.contains_key("C"));
    assert!(!filled.contains_key("Z"));
}

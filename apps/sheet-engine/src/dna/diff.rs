//! Field-level deltas between two specifications, and consistency-lock checks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dna::models::DesignSpecification;
use crate::dna::normalize::ValidationError;

/// One changed leaf. `None` on either side means the path is absent there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDelta {
    pub path: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Deltas bucketed the way drift reports present them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnaDelta {
    pub dimensions: Vec<FieldDelta>,
    pub materials: Vec<FieldDelta>,
    /// Rooms, openings and roof: everything that shapes the drawn layout.
    pub layout: Vec<FieldDelta>,
    pub other: Vec<FieldDelta>,
    /// Consistency-rule paths whose value changed. Any entry here is a hard failure.
    pub locked_violations: Vec<String>,
}

impl DnaDelta {
    pub fn categorise(deltas: Vec<FieldDelta>) -> Self {
        let mut out = Self::default();
        for delta in deltas {
            let head = delta.path.split('.').next().unwrap_or_default();
            match head {
                "dimensions" => out.dimensions.push(delta),
                "materials" => out.materials.push(delta),
                "rooms" | "openings" | "roof" => out.layout.push(delta),
                _ => out.other.push(delta),
            }
        }
        out
    }

    pub fn total(&self) -> usize {
        self.dimensions.len() + self.materials.len() + self.layout.len() + self.other.len()
    }
}

/// Sorted field-level differences between `a` and `b`.
pub fn diff(a: &DesignSpecification, b: &DesignSpecification) -> Vec<FieldDelta> {
    let left = flatten(&to_value(a));
    let right = flatten(&to_value(b));

    let mut paths: Vec<&String> = left.keys().chain(right.keys()).collect();
    paths.sort();
    paths.dedup();

    paths
        .into_iter()
        .filter_map(|path| {
            let before = left.get(path);
            let after = right.get(path);
            (before != after).then(|| FieldDelta {
                path: path.clone(),
                before: before.cloned(),
                after: after.cloned(),
            })
        })
        .collect()
}

/// Lock paths whose canonical bytes differ between the baseline and the candidate.
pub fn locked_violations(
    baseline: &DesignSpecification,
    candidate: &DesignSpecification,
    rules: &[String],
) -> Vec<String> {
    let before = to_value(baseline);
    let after = to_value(candidate);
    rules
        .iter()
        .filter(|path| canonical_at(&before, path) != canonical_at(&after, path))
        .cloned()
        .collect()
}

/// Baseline lock rules that no candidate rule covers any more. A rule covers
/// itself and every path below it (`dimensions` covers `dimensions.length`).
pub fn relaxed_rules(baseline: &[String], candidate: &[String]) -> Vec<String> {
    baseline
        .iter()
        .filter(|rule| {
            !candidate.iter().any(|c| {
                rule.as_str() == c.as_str()
                    || rule.strip_prefix(c.as_str()).is_some_and(|rest| rest.starts_with('.'))
            })
        })
        .cloned()
        .collect()
}

/// Whether `candidate` may become the next version after `baseline`: the
/// design identity (`id`, `seed`) is fixed and the lock set can only grow.
pub fn check_lineage(
    baseline: &DesignSpecification,
    candidate: &DesignSpecification,
) -> Result<(), ValidationError> {
    let mut issues = Vec::new();
    if candidate.id != baseline.id {
        issues.push(format!(
            "id is fixed for the design's lifetime ('{}' cannot become '{}')",
            baseline.id, candidate.id
        ));
    }
    if candidate.seed != baseline.seed {
        issues.push(format!(
            "seed is fixed for the design's lifetime ({} cannot become {})",
            baseline.seed, candidate.seed
        ));
    }
    let relaxed = relaxed_rules(&baseline.consistency_rules, &candidate.consistency_rules);
    if !relaxed.is_empty() {
        issues.push(format!(
            "consistencyRules may only be extended; removing {} would unlock fixed facts",
            relaxed.join(", ")
        ));
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

fn to_value(spec: &DesignSpecification) -> Value {
    serde_json::to_value(spec).unwrap_or(Value::Null)
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn canonical_at(root: &Value, path: &str) -> Option<Vec<u8>> {
    lookup(root, path).map(|v| serde_json::to_vec(v).unwrap_or_default())
}

fn flatten(root: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into(root, String::new(), &mut out);
    out
}

fn flatten_into(node: &Value, prefix: String, out: &mut BTreeMap<String, Value>) {
    match node {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                flatten_into(v, join_path(&prefix, k), out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(v, join_path(&prefix, &i.to_string()), out);
            }
        }
        leaf => {
            out.insert(prefix, leaf.clone());
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

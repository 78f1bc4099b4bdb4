use std::{collections::BTreeMap, sync::LazyLock};

use kubecd_common::kube::{APP_NAME_LABEL, MONIKER_APPLICATION_ANNOTATION};
use regex::Regex;

static VERSION_SUFFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(.+)-v[0-9]+$").ok());

/// Strips a trailing `-v<digits>` version suffix, so `myapp-v003`
/// becomes `myapp`. Anything else after `-v` keeps the name unchanged.
pub fn artifact_name(name: &str) -> String {
    VERSION_SUFFIX
        .as_ref()
        .and_then(|re| re.captures(name))
        .and_then(|captures| captures.get(1))
        .map_or_else(|| name.to_string(), |base| base.as_str().to_string())
}

/// `Deployment` -> `deployment`, `ReplicaSet` -> `replicaSet`.
pub fn lower_first(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The cluster key grouping all versions of one artifact,
/// e.g. `replicaSet myapp`.
pub fn cluster_key(kind: &str, artifact_name: &str) -> String {
    format!("{} {}", lower_first(kind), artifact_name)
}

/// The application owning an object: the moniker annotation wins over
/// the conventional app name label. Empty values count as absent.
pub fn application(
    annotations: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
) -> String {
    annotations
        .get(MONIKER_APPLICATION_ANNOTATION)
        .filter(|app| !app.is_empty())
        .or_else(|| labels.get(APP_NAME_LABEL).filter(|app| !app.is_empty()))
        .cloned()
        .unwrap_or_default()
}

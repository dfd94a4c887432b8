//! Manifest classification.
//!
//! A heuristic text check, not a YAML parse: a file is a candidate when it
//! names an API version and one of a fixed set of workload kinds.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Resource kinds accepted as ingestion targets.
pub const KNOWN_KINDS: &[&str] = &[
    "Pod",
    "Service",
    "Deployment",
    "ConfigMap",
    "Secret",
    "Ingress",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "ServiceAccount",
    "Role",
    "RoleBinding",
    "ClusterRole",
    "ClusterRoleBinding",
    "Namespace",
    "DaemonSet",
    "StatefulSet",
    "Job",
    "CronJob",
    "HorizontalPodAutoscaler",
    "NetworkPolicy",
];

fn kind_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            let alternatives = KNOWN_KINDS.join("|");
            Regex::new(&format!(r"kind:[ \t]*[\x22']?(?:{alternatives})\b")).ok()
        })
        .as_ref()
}

/// Whether `content` looks like a manifest of a known kind.
///
/// Multi-document files are treated as one blob: a single matching document
/// makes the whole file a candidate.
pub fn is_candidate(content: &str) -> bool {
    if !content.contains("apiVersion:") || !content.contains("kind:") {
        return false;
    }
    kind_pattern().is_some_and(|re| {
        re.find_iter(content).any(|m| {
            // `\b` accepts `Service-x`; require the kind to end the token.
            let rest = &content[m.end()..];
            !rest.starts_with(['-', '.'])
        })
    })
}

/// `.yaml` / `.yml` extension, case-insensitive.
pub fn is_manifest_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_kind() {
        let doc = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n";
        assert!(is_candidate(doc));
    }

    #[test]
    fn rejects_unknown_kind() {
        let doc = "apiVersion: example.com/v1\nkind: Widget\nmetadata:\n  name: w\n";
        assert!(!is_candidate(doc));
    }

    #[test]
    fn kind_must_be_whole_token() {
        let doc = "apiVersion: monitoring.coreos.com/v1\nkind: ServiceMonitor\n";
        assert!(!is_candidate(doc));
        let doc = "apiVersion: v1\nkind: Service-ish\n";
        assert!(!is_candidate(doc));
    }

    #[test]
    fn requires_api_version() {
        assert!(!is_candidate("kind: Service\nmetadata:\n  name: x\n"));
        assert!(!is_candidate(""));
    }

    #[test]
    fn multi_document_blob() {
        let doc = "apiVersion: example.com/v1\nkind: Widget\n---\napiVersion: v1\nkind: Service\n";
        assert!(is_candidate(doc));
    }

    #[test]
    fn quoted_kind() {
        assert!(is_candidate("apiVersion: v1\nkind: \"ConfigMap\"\n"));
    }

    #[test]
    fn manifest_extensions() {
        assert!(is_manifest_file(Path::new("a/b/deploy.yaml")));
        assert!(is_manifest_file(Path::new("svc.YML")));
        assert!(!is_manifest_file(Path::new("README.md")));
        assert!(!is_manifest_file(Path::new("yaml")));
    }
}

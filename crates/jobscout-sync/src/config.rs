//! Run configuration: environment settings, the source registry and filter rules.

use std::env::VarError;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jobscout_adapters::{FilterPolicy, Organization, Pacing, RulesError};
use jobscout_core::Portal;
use jobscout_storage::{BackoffPolicy, HttpClientConfig};
use serde::Deserialize;
use thiserror::Error;
use tokio::fs;
use tracing::info;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; jobscout/0.1)";
pub const REGISTRY_FILE: &str = "sources.yaml";
pub const RULES_FILE: &str = "rules/filters.yaml";

/// Anything that stops a run before the first request goes out.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
    #[error("cannot read source registry {path}: {reason}")]
    Registry { path: PathBuf, reason: String },
    #[error("{portal} organization {key:?} is invalid: {reason}")]
    InvalidOrganization {
        portal: Portal,
        key: String,
        reason: &'static str,
    },
    #[error("no enabled source has any organizations")]
    NoSources,
    #[error("cannot load filter rules {path}: {source}")]
    Rules {
        path: PathBuf,
        #[source]
        source: RulesError,
    },
    #[error("cannot read filter rules {path}: {reason}")]
    RulesUnreadable { path: PathBuf, reason: String },
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub http_max_retries: usize,
    pub org_delay_ms: u64,
    pub page_delay_ms: u64,
    pub archive_raw: bool,
}

impl SyncConfig {
    /// Defaults rooted at `root`, with no environment involved.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join("jobs"),
            artifacts_dir: root.join("artifacts"),
            root,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 15,
            http_max_retries: 2,
            org_delay_ms: 2_000,
            page_delay_ms: 1_000,
            archive_raw: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        build_sync_config(|key| std::env::var(key))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    pub fn rules_path(&self) -> PathBuf {
        self.root.join(RULES_FILE)
    }

    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            backoff: BackoffPolicy {
                max_retries: self.http_max_retries,
                ..BackoffPolicy::default()
            },
            ..HttpClientConfig::default()
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            organization_delay: Duration::from_millis(self.org_delay_ms),
            page_delay: Duration::from_millis(self.page_delay_ms),
        }
    }
}

/// Build [`SyncConfig`] from an env-var lookup so tests never touch the process env.
pub fn build_sync_config<F>(lookup: F) -> Result<SyncConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };
    let non_empty = |var: &str| lookup(var).ok().filter(|v| !v.trim().is_empty());
    let parse_u64 = |var: &str, default: u64| -> Result<u64, ConfigError> {
        match non_empty(var) {
            Some(raw) => raw.trim().parse().map_err(|e: std::num::ParseIntError| invalid(var, e.to_string())),
            None => Ok(default),
        }
    };

    let root = non_empty("JOBSCOUT_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut config = SyncConfig::for_root(root);

    if let Some(dir) = non_empty("JOBSCOUT_DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(user_agent) = non_empty("JOBSCOUT_USER_AGENT") {
        config.user_agent = user_agent;
    }

    config.http_timeout_secs = parse_u64("JOBSCOUT_HTTP_TIMEOUT_SECS", config.http_timeout_secs)?;
    if config.http_timeout_secs == 0 {
        return Err(invalid("JOBSCOUT_HTTP_TIMEOUT_SECS", "must be at least 1".to_string()));
    }
    config.http_max_retries =
        parse_u64("JOBSCOUT_HTTP_MAX_RETRIES", config.http_max_retries as u64)? as usize;
    config.org_delay_ms = parse_u64("JOBSCOUT_ORG_DELAY_MS", config.org_delay_ms)?;
    config.page_delay_ms = parse_u64("JOBSCOUT_PAGE_DELAY_MS", config.page_delay_ms)?;

    if let Some(raw) = non_empty("JOBSCOUT_ARCHIVE_RAW") {
        config.archive_raw = parse_flag(&raw)
            .ok_or_else(|| invalid("JOBSCOUT_ARCHIVE_RAW", format!("expected a boolean, got {raw:?}")))?;
    }

    Ok(config)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortalSources {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub organizations: Vec<Organization>,
}

/// `sources.yaml`: organizations per portal, each portal switchable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceRegistry {
    #[serde(default)]
    pub greenhouse: PortalSources,
    #[serde(default)]
    pub lever: PortalSources,
    #[serde(default)]
    pub workday: PortalSources,
    #[serde(default)]
    pub career_page: PortalSources,
}

impl SourceRegistry {
    pub fn from_yaml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let registry: SourceRegistry =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Registry {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn portal(&self, portal: Portal) -> &PortalSources {
        match portal {
            Portal::Greenhouse => &self.greenhouse,
            Portal::Lever => &self.lever,
            Portal::Workday => &self.workday,
            Portal::CareerPage => &self.career_page,
        }
    }

    /// Enabled portals with at least one organization, in registry order.
    pub fn enabled(&self) -> Vec<(Portal, &[Organization])> {
        Portal::ALL
            .into_iter()
            .map(|portal| (portal, self.portal(portal)))
            .filter(|(_, sources)| sources.enabled && !sources.organizations.is_empty())
            .map(|(portal, sources)| (portal, sources.organizations.as_slice()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (portal, orgs) in self.enabled() {
            for org in orgs {
                let bad = |reason| ConfigError::InvalidOrganization {
                    portal,
                    key: org.key.clone(),
                    reason,
                };
                if org.key.trim().is_empty() {
                    return Err(bad("empty key"));
                }
                if org.name.trim().is_empty() {
                    return Err(bad("empty name"));
                }
                let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
                if portal == Portal::Workday && blank(&org.site) {
                    return Err(bad("workday organizations need a site"));
                }
                if portal == Portal::CareerPage && blank(&org.url) {
                    return Err(bad("career page organizations need a url"));
                }
            }
        }
        if self.enabled().is_empty() {
            return Err(ConfigError::NoSources);
        }
        Ok(())
    }
}

pub async fn load_registry(path: &Path) -> Result<SourceRegistry, ConfigError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Registry {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    SourceRegistry::from_yaml_str(&text, path)
}

/// Load filter rules; a missing file falls back to the built-in lists.
pub async fn load_filter_policy(path: &Path) -> Result<FilterPolicy, ConfigError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no filter rules file, using built-in lists");
            return Ok(FilterPolicy::default());
        }
        Err(err) => {
            return Err(ConfigError::RulesUnreadable {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })
        }
    };
    FilterPolicy::from_yaml_str(&text).map_err(|source| ConfigError::Rules {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from_map<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    #[test]
    fn empty_env_uses_defaults() {
        let map = HashMap::new();
        let config = build_sync_config(lookup_from_map(&map)).unwrap();
        assert_eq!(config.root, PathBuf::from("."));
        assert_eq!(config.data_dir, PathBuf::from("./jobs"));
        assert_eq!(config.http_timeout_secs, 15);
        assert_eq!(config.org_delay_ms, 2_000);
        assert_eq!(config.page_delay_ms, 1_000);
        assert!(!config.archive_raw);
        assert_eq!(config.registry_path(), PathBuf::from("./sources.yaml"));
    }

    #[test]
    fn env_overrides_are_applied() {
        let map = HashMap::from([
            ("JOBSCOUT_ROOT", "/srv/jobscout"),
            ("JOBSCOUT_DATA_DIR", "/var/lib/jobscout"),
            ("JOBSCOUT_HTTP_MAX_RETRIES", "5"),
            ("JOBSCOUT_ORG_DELAY_MS", "0"),
            ("JOBSCOUT_ARCHIVE_RAW", "yes"),
        ]);
        let config = build_sync_config(lookup_from_map(&map)).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/jobscout"));
        assert_eq!(config.artifacts_dir, PathBuf::from("/srv/jobscout/artifacts"));
        assert_eq!(config.http_max_retries, 5);
        assert_eq!(config.pacing().organization_delay, Duration::ZERO);
        assert!(config.archive_raw);
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let map = HashMap::from([("JOBSCOUT_HTTP_TIMEOUT_SECS", "soon")]);
        let result = build_sync_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "JOBSCOUT_HTTP_TIMEOUT_SECS"),
            "got: {result:?}"
        );

        let map = HashMap::from([("JOBSCOUT_HTTP_TIMEOUT_SECS", "0")]);
        assert!(build_sync_config(lookup_from_map(&map)).is_err());

        let map = HashMap::from([("JOBSCOUT_ARCHIVE_RAW", "maybe")]);
        assert!(build_sync_config(lookup_from_map(&map)).is_err());
    }

    const REGISTRY: &str = r#"
greenhouse:
  organizations:
    - { key: anthropic, name: Anthropic }
lever:
  enabled: false
  organizations:
    - { key: netflix, name: Netflix }
workday:
  organizations:
    - { key: nvidia, name: NVIDIA, site: NVIDIAExternalCareerSite }
"#;

    #[test]
    fn registry_lists_enabled_portals_in_order() {
        let registry = SourceRegistry::from_yaml_str(REGISTRY, Path::new("sources.yaml")).unwrap();
        let enabled: Vec<Portal> = registry.enabled().into_iter().map(|(p, _)| p).collect();
        assert_eq!(enabled, vec![Portal::Greenhouse, Portal::Workday]);
    }

    #[test]
    fn registry_without_organizations_is_fatal() {
        let yaml = "greenhouse:\n  organizations: []\nlever:\n  enabled: false\n  organizations:\n    - { key: a, name: A }\n";
        assert!(matches!(
            SourceRegistry::from_yaml_str(yaml, Path::new("sources.yaml")),
            Err(ConfigError::NoSources)
        ));
    }

    #[test]
    fn workday_organization_needs_site() {
        let yaml = "workday:\n  organizations:\n    - { key: acme, name: Acme }\n";
        assert!(matches!(
            SourceRegistry::from_yaml_str(yaml, Path::new("sources.yaml")),
            Err(ConfigError::InvalidOrganization { portal: Portal::Workday, .. })
        ));
    }

    #[test]
    fn bundled_registry_and_rules_are_valid() {
        let registry = SourceRegistry::from_yaml_str(
            include_str!("../../../sources.yaml"),
            Path::new(REGISTRY_FILE),
        )
        .unwrap();
        assert!(!registry.greenhouse.organizations.is_empty());
        assert!(registry
            .workday
            .organizations
            .iter()
            .all(|org| org.site.is_some()));

        let policy = FilterPolicy::from_yaml_str(include_str!("../../../rules/filters.yaml")).unwrap();
        assert_eq!(policy.version, 1);
        assert_eq!(policy.tech_keywords(), FilterPolicy::default().tech_keywords());
    }

    #[tokio::test]
    async fn missing_registry_is_fatal() {
        let dir = tempdir().unwrap();
        let result = load_registry(&dir.path().join(REGISTRY_FILE)).await;
        assert!(matches!(result, Err(ConfigError::Registry { .. })));
    }

    #[tokio::test]
    async fn missing_rules_fall_back_and_bad_rules_fail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(RULES_FILE);
        let policy = load_filter_policy(&path).await.unwrap();
        assert_eq!(policy, FilterPolicy::default());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "tech_keywords: {").unwrap();
        assert!(matches!(
            load_filter_policy(&path).await,
            Err(ConfigError::Rules { .. })
        ));
    }
}

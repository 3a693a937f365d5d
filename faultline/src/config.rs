use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

use faultline_core::{
    ConsumeConfig, CredentialPool, Credentials, DEFAULT_ERROR_SAMPLE_LIMIT, InteractConfig,
    MonitorConfig, ProduceConfig, ServiceConfig, TcpProbe, WorkflowConfig,
};

/// Everything a run needs, after the file and CLI overrides are merged and validated.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub service: ServiceConfig,
    /// `None` runs without a monitor; every record is tagged available.
    pub dependency: Option<DependencySettings>,
    pub workers: u64,
    pub concurrency: Option<usize>,
    pub error_sample_limit: usize,
    pub credentials: CredentialPool,
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone)]
pub(crate) struct DependencySettings {
    pub probe: TcpProbe,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ConfigYaml {
    #[serde(default)]
    pub service: ServiceYaml,
    #[serde(default)]
    pub dependency: DependencyYaml,
    pub workers: Option<u64>,
    pub concurrency: Option<usize>,
    pub error_sample_limit: Option<usize>,
    #[serde(default)]
    pub credentials: CredentialsYaml,
    #[serde(default)]
    pub workflow: WorkflowYaml,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ServiceYaml {
    pub base_url: Option<String>,
    pub storage_url: Option<String>,
    pub request_timeout: Option<YamlDuration>,
    pub connect_timeout: Option<YamlDuration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct DependencyYaml {
    /// `host:port` of the monitored dependency.
    pub address: Option<String>,
    /// Label used in log lines.
    pub name: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
    pub poll_interval: Option<YamlDuration>,
    pub probe_timeout: Option<YamlDuration>,
    /// Wait for the server greeting byte, not just the TCP handshake.
    #[serde(default)]
    pub expect_greeting: bool,
}

fn enabled() -> bool {
    true
}

impl Default for DependencyYaml {
    fn default() -> Self {
        Self {
            address: None,
            name: None,
            enabled: true,
            poll_interval: None,
            probe_timeout: None,
            expect_greeting: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CredentialsYaml {
    /// Explicit accounts; wins over `template` when non-empty.
    #[serde(default)]
    pub accounts: Vec<AccountYaml>,
    pub template: Option<TemplateYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct AccountYaml {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct TemplateYaml {
    /// `{i}` is replaced by the account number.
    pub email: String,
    pub password: String,
    #[serde(default = "first_account")]
    pub start: u64,
    pub count: u64,
}

fn first_account() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub(crate) enum WorkflowYaml {
    Consume(ConsumeYaml),
    Produce(ProduceYaml),
    Interact(InteractYaml),
}

impl Default for WorkflowYaml {
    fn default() -> Self {
        Self::Consume(ConsumeYaml::default())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConsumeYaml {
    pub resource_id: Option<i64>,
    pub range_bytes: Option<YamlSize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProduceYaml {
    pub payload_size: Option<YamlSize>,
    pub hash_ceiling: Option<YamlSize>,
    pub settle_delay: Option<YamlDuration>,
    #[serde(default)]
    pub styles: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InteractYaml {
    pub operations: Option<u64>,
    pub delay: Option<YamlDuration>,
    pub timeout: Option<YamlDuration>,
    #[serde(default)]
    pub pool: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for YamlDuration {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 2s, 200ms), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v < 0 {
                    return Err(E::custom("duration must not be negative"));
                }
                Ok(YamlDuration(Duration::from_secs(v as u64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|e| E::custom(format!("invalid duration {v}: {e}")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// Byte size: an integer, or a string with a binary unit (`512KiB`, `30MiB`, `1GiB`).
/// `K`/`KB`, `M`/`MB`, `G`/`GB` are read as binary units too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlSize(u64);

impl YamlSize {
    pub(crate) fn into_inner(self) -> u64 {
        self.0
    }
}

pub(crate) fn parse_size(input: &str) -> Result<u64, String> {
    let s = input.trim();
    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);
    if number_end == 0 {
        return Err(format!("invalid size '{s}' (expected e.g. 1048576, 1MiB, 30MiB)"));
    }

    let (number, unit) = s.split_at(number_end);
    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid size '{s}' (expected e.g. 1048576, 1MiB, 30MiB)"))?;
    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" | "KiB" => 1024,
        "M" | "MB" | "MiB" => 1024 * 1024,
        "G" | "GB" | "GiB" => 1024 * 1024 * 1024,
        other => return Err(format!("unknown size unit '{other}' in '{s}'")),
    };
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{s}' is too large"))
}

impl<'de> Deserialize<'de> for YamlSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlSize;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("size as integer bytes or string (e.g. 30MiB)")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlSize(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(YamlSize)
                    .map_err(|_| E::custom("size must not be negative"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                parse_size(v).map(YamlSize).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

pub(crate) async fn load(path: Option<&Path>) -> anyhow::Result<ConfigYaml> {
    let Some(path) = path else {
        return Ok(ConfigYaml::default());
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    parse(&bytes).with_context(|| format!("failed to parse config: {}", path.display()))
}

pub(crate) fn parse(bytes: &[u8]) -> anyhow::Result<ConfigYaml> {
    Ok(serde_yaml::from_slice(bytes)?)
}

const DEFAULT_DEPENDENCY_ADDRESS: &str = "localhost:3306";
const DEFAULT_WORKERS: u64 = 500;

impl ConfigYaml {
    /// Fill in defaults and validate.
    pub(crate) fn resolve(self) -> anyhow::Result<Settings> {
        let defaults = ServiceConfig::default();
        let service = ServiceConfig {
            base_url: self.service.base_url.unwrap_or(defaults.base_url),
            storage_url: self.service.storage_url.unwrap_or(defaults.storage_url),
            request_timeout: self
                .service
                .request_timeout
                .map(YamlDuration::into_inner)
                .or(defaults.request_timeout),
            connect_timeout: self
                .service
                .connect_timeout
                .map(YamlDuration::into_inner)
                .or(defaults.connect_timeout),
        };
        service.validate().context("invalid service config")?;

        let dependency = self.dependency.resolve().context("invalid dependency config")?;
        let credentials = self.credentials.resolve().context("invalid credentials")?;

        let workflow = self.workflow.resolve();
        workflow.validate().context("invalid workflow config")?;

        if self.concurrency == Some(0) {
            anyhow::bail!("`concurrency` must be a positive integer");
        }

        Ok(Settings {
            service,
            dependency,
            workers: self.workers.unwrap_or(DEFAULT_WORKERS),
            concurrency: self.concurrency.or_else(|| workflow.default_concurrency()),
            error_sample_limit: self.error_sample_limit.unwrap_or(DEFAULT_ERROR_SAMPLE_LIMIT),
            credentials,
            workflow,
        })
    }
}

impl DependencyYaml {
    pub(crate) fn resolve(self) -> anyhow::Result<Option<DependencySettings>> {
        if !self.enabled {
            return Ok(None);
        }
        let defaults = MonitorConfig::default();
        let address = self
            .address
            .unwrap_or_else(|| DEFAULT_DEPENDENCY_ADDRESS.to_string());
        let probe_timeout = self
            .probe_timeout
            .map_or(defaults.probe_timeout, YamlDuration::into_inner);
        let poll_interval = self
            .poll_interval
            .map_or(defaults.poll_interval, YamlDuration::into_inner);
        let monitor = MonitorConfig {
            dependency: self.name.unwrap_or_else(|| address.clone()),
            poll_interval,
            probe_timeout,
        };
        monitor.validate()?;

        let probe = TcpProbe::checked(address, probe_timeout)?.expect_greeting(self.expect_greeting);
        Ok(Some(DependencySettings { probe, monitor }))
    }
}

impl CredentialsYaml {
    fn resolve(self) -> anyhow::Result<CredentialPool> {
        if !self.accounts.is_empty() {
            let accounts = self
                .accounts
                .into_iter()
                .map(|a| Credentials {
                    email: a.email,
                    password: a.password,
                })
                .collect();
            return Ok(CredentialPool::new(accounts)?);
        }
        match self.template {
            Some(t) => Ok(CredentialPool::templated(
                &t.email, &t.password, t.start, t.count,
            )?),
            None => Ok(CredentialPool::default()),
        }
    }
}

impl WorkflowYaml {
    fn resolve(self) -> WorkflowConfig {
        match self {
            Self::Consume(c) => {
                let d = ConsumeConfig::default();
                WorkflowConfig::Consume(ConsumeConfig {
                    resource_id: c.resource_id,
                    range_bytes: c.range_bytes.map_or(d.range_bytes, YamlSize::into_inner),
                })
            }
            Self::Produce(p) => {
                let d = ProduceConfig::default();
                WorkflowConfig::Produce(ProduceConfig {
                    payload_size: p.payload_size.map_or(d.payload_size, YamlSize::into_inner),
                    hash_ceiling: p.hash_ceiling.map_or(d.hash_ceiling, YamlSize::into_inner),
                    settle_delay: p.settle_delay.map_or(d.settle_delay, YamlDuration::into_inner),
                    styles: if p.styles.is_empty() { d.styles } else { p.styles },
                })
            }
            Self::Interact(i) => {
                let d = InteractConfig::default();
                WorkflowConfig::Interact(InteractConfig {
                    operations: i.operations.unwrap_or(d.operations),
                    delay: i.delay.map_or(d.delay, YamlDuration::into_inner),
                    timeout: i.timeout.map_or(d.timeout, YamlDuration::into_inner),
                    pool: i.pool,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::MIB;

    fn settings(yaml: &str) -> anyhow::Result<Settings> {
        parse(yaml.as_bytes())?.resolve()
    }

    #[test]
    fn empty_document_uses_defaults() {
        let s = settings("{}").unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(s.workers, 500);
        assert_eq!(s.service.base_url, "http://localhost:8080");
        assert_eq!(s.credentials.len(), 500);
        assert_eq!(s.error_sample_limit, 10);
        assert!(matches!(s.workflow, WorkflowConfig::Consume(_)));
        let dep = s.dependency.unwrap_or_else(|| panic!("dependency expected"));
        assert_eq!(dep.probe.address(), "localhost:3306");
        assert_eq!(dep.monitor.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn full_document_is_honoured() {
        let yaml = r#"
service:
  baseUrl: http://svc:8080
  storageUrl: http://store:9000
  requestTimeout: 5s
dependency:
  address: db:3306
  name: mysql
  pollInterval: 500ms
  expectGreeting: true
workers: 12
concurrency: 4
errorSampleLimit: 3
credentials:
  template:
    email: "load{i}@test.com"
    password: secret
    count: 4
workflow:
  kind: produce
  payloadSize: 1MiB
  settleDelay: 0.5
  styles: [jazz]
"#;
        let s = settings(yaml).unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(s.service.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(s.service.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(s.workers, 12);
        assert_eq!(s.concurrency, Some(4));
        assert_eq!(s.error_sample_limit, 3);
        assert_eq!(s.credentials.for_worker(5).email, "load1@test.com");

        let dep = s.dependency.unwrap_or_else(|| panic!("dependency expected"));
        assert_eq!(dep.monitor.dependency, "mysql");
        assert_eq!(dep.monitor.poll_interval, Duration::from_millis(500));

        match s.workflow {
            WorkflowConfig::Produce(p) => {
                assert_eq!(p.payload_size, MIB);
                assert_eq!(p.hash_ceiling, 100 * MIB);
                assert_eq!(p.settle_delay, Duration::from_millis(500));
                assert_eq!(p.styles, vec!["jazz".to_string()]);
            }
            other => panic!("expected produce, got {other:?}"),
        }
    }

    #[test]
    fn interact_and_disabled_monitor() {
        let yaml = r#"
dependency:
  enabled: false
credentials:
  accounts:
    - { email: a@test.com, password: x }
workflow:
  kind: interact
  operations: 6
  delay: 50ms
  pool: [4, 5]
"#;
        let s = settings(yaml).unwrap_or_else(|e| panic!("{e:#}"));
        assert!(s.dependency.is_none());
        assert_eq!(s.credentials.len(), 1);
        match s.workflow {
            WorkflowConfig::Interact(i) => {
                assert_eq!(i.operations, 6);
                assert_eq!(i.delay, Duration::from_millis(50));
                assert_eq!(i.timeout, Duration::from_secs(30));
                assert_eq!(i.pool, vec![4, 5]);
            }
            other => panic!("expected interact, got {other:?}"),
        }
    }

    #[test]
    fn invalid_documents_are_rejected() {
        for yaml in [
            "workerz: 3",
            "service: { baseUrl: 'ftp://x' }",
            "dependency: { address: nohostport }",
            "concurrency: 0",
            "credentials: { template: { email: 'u{i}', password: p, count: 0 } }",
            "workflow: { kind: interact, operations: 0 }",
            "workflow: { kind: teleport }",
            "workflow: { kind: consume, rangeBytes: 3parsecs }",
            "dependency: { pollInterval: 1e30 }",
            "dependency: { pollInterval: -0.5 }",
            "dependency: { pollInterval: .nan }",
        ] {
            assert!(settings(yaml).is_err(), "{yaml}");
        }
    }

    #[test]
    fn produce_is_bounded_unless_configured() {
        let s = settings("workflow: { kind: produce }").unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(s.concurrency, Some(faultline_core::DEFAULT_PRODUCE_CONCURRENCY));

        let s = settings("concurrency: 4\nworkflow: { kind: produce }")
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(s.concurrency, Some(4));

        let s = settings("workflow: { kind: consume }").unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(s.concurrency, None);
    }

    #[test]
    fn zero_durations_are_rejected() {
        assert!(settings("dependency: { pollInterval: 0s }").is_err());
        assert!(settings("dependency: { probeTimeout: 0s }").is_err());
    }

    #[test]
    fn sizes_parse_with_binary_units() {
        assert_eq!(parse_size("1048576"), Ok(MIB));
        assert_eq!(parse_size("1MiB"), Ok(MIB));
        assert_eq!(parse_size("30MB"), Ok(30 * MIB));
        assert_eq!(parse_size("512KiB"), Ok(512 * 1024));
        assert!(parse_size("MiB").is_err());
        assert!(parse_size("1XB").is_err());
    }
}

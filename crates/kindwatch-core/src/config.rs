use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::fs;
use tokio::sync::RwLock;

use kindwatch_types::OperationClass;

use crate::backoff::BackoffPolicy;
use crate::routes::BackendRoutes;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8020";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Aggregate cluster status across environments.
    StatusAggregate,
    /// Dedicated cluster list endpoint.
    ClusterList,
    /// Node introspection for the named cluster.
    Nodes,
    /// Direct single-cluster lookup.
    Details,
}

impl ProbeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::StatusAggregate => "status_aggregate",
            ProbeKind::ClusterList => "cluster_list",
            ProbeKind::Nodes => "nodes",
            ProbeKind::Details => "details",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "status_aggregate" | "status" => Some(ProbeKind::StatusAggregate),
            "cluster_list" | "list" => Some(ProbeKind::ClusterList),
            "nodes" => Some(ProbeKind::Nodes),
            "details" => Some(ProbeKind::Details),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OracleMode {
    /// One probe at a time, in priority order.
    #[default]
    Sequential,
    /// All probes at once; the first positive wins.
    Concurrent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub submit_timeout_ms: u64,
    /// Consecutive failures before the client circuit breaker opens.
    pub breaker_max_failures: u32,
    pub breaker_cooldown_ms: u64,
    pub routes: BackendRoutes,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            api_token: None,
            submit_timeout_ms: 30_000,
            breaker_max_failures: 5,
            breaker_cooldown_ms: 10_000,
            routes: BackendRoutes::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollerProfile {
    pub attempt_timeout_ms: u64,
    pub max_attempts: u32,
    pub wall_clock_ms: u64,
    pub backoff: BackoffPolicy,
}

impl PollerProfile {
    pub fn lifecycle() -> Self {
        Self {
            attempt_timeout_ms: 10_000,
            max_attempts: 60,
            wall_clock_ms: 10 * 60 * 1_000,
            backoff: BackoffPolicy::with_base(3_000),
        }
    }

    pub fn update() -> Self {
        Self {
            attempt_timeout_ms: 8_000,
            max_attempts: 40,
            wall_clock_ms: 3 * 60 * 1_000,
            backoff: BackoffPolicy {
                base_ms: 2_000,
                max_interval_ms: 10_000,
                ..BackoffPolicy::default()
            },
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms.max(1))
    }

    pub fn wall_clock(&self) -> Duration {
        Duration::from_millis(self.wall_clock_ms)
    }
}

impl Default for PollerProfile {
    fn default() -> Self {
        Self::lifecycle()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollerSettings {
    pub lifecycle: PollerProfile,
    pub update: PollerProfile,
    /// Identical in-progress readings (baseline included) that make a stall.
    pub stall_threshold: u32,
    /// Consecutive `not_found` task lookups before giving up on the task id.
    pub not_found_threshold: u32,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            lifecycle: PollerProfile::lifecycle(),
            update: PollerProfile::update(),
            stall_threshold: 5,
            not_found_threshold: 3,
        }
    }
}

impl PollerSettings {
    pub fn profile(&self, class: OperationClass) -> &PollerProfile {
        match class {
            OperationClass::Lifecycle => &self.lifecycle,
            OperationClass::Update => &self.update,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleSettings {
    pub probe_timeout_ms: u64,
    pub overall_budget_ms: u64,
    pub probe_order: Vec<ProbeKind>,
    pub mode: OracleMode,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 8_000,
            overall_budget_ms: 20_000,
            probe_order: vec![
                ProbeKind::StatusAggregate,
                ProbeKind::ClusterList,
                ProbeKind::Nodes,
                ProbeKind::Details,
            ],
            mode: OracleMode::Sequential,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatcherSettings {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_attempts: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardSettings {
    /// Reject a second concurrent session for the same kind and target.
    pub enabled: bool,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KindwatchConfig {
    pub backend: BackendSettings,
    pub poller: PollerSettings,
    pub oracle: OracleSettings,
    pub watcher: WatcherSettings,
    pub guard: GuardSettings,
}

impl KindwatchConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = self.backend.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("backend.base_url must be an http(s) URL, got `{}`", url);
        }
        if self.oracle.probe_order.is_empty() {
            anyhow::bail!("oracle.probe_order must name at least one probe");
        }
        if self.oracle.overall_budget_ms == 0 || self.oracle.probe_timeout_ms == 0 {
            anyhow::bail!("oracle timeouts must be greater than zero");
        }
        for (name, profile) in [
            ("lifecycle", &self.poller.lifecycle),
            ("update", &self.poller.update),
        ] {
            if profile.max_attempts == 0 || profile.wall_clock_ms == 0 {
                anyhow::bail!("poller.{} budgets must be greater than zero", name);
            }
        }
        if self.watcher.interval_ms == 0 || self.watcher.max_attempts == 0 {
            anyhow::bail!("watcher interval and attempt ceiling must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct ConfigLayers {
    defaults: Value,
    global: Value,
    env: Value,
    runtime: Value,
    cli: Value,
}

/// Layered JSON configuration: defaults, global file, environment, runtime
/// patches and CLI overrides, merged in that order.
#[derive(Clone)]
pub struct ConfigStore {
    global_path: Option<PathBuf>,
    layers: Arc<RwLock<ConfigLayers>>,
}

impl ConfigStore {
    pub async fn load(path: Option<PathBuf>, cli_overrides: Option<Value>) -> anyhow::Result<Self> {
        let global_path = match path {
            Some(path) => Some(path),
            None => resolve_global_config_path(),
        };
        let global = match &global_path {
            Some(path) => read_json_file(path)
                .await
                .with_context(|| format!("failed to read config file {}", path.display()))?,
            None => empty_object(),
        };

        Self::from_layers(global_path, global, env_layer(), cli_overrides)
    }

    /// Builds a store without touching the filesystem or process environment.
    pub fn in_memory(cli_overrides: Option<Value>) -> anyhow::Result<Self> {
        Self::from_layers(None, empty_object(), empty_object(), cli_overrides)
    }

    fn from_layers(
        global_path: Option<PathBuf>,
        global: Value,
        env: Value,
        cli_overrides: Option<Value>,
    ) -> anyhow::Result<Self> {
        let defaults = serde_json::to_value(KindwatchConfig::default())?;
        let layers = ConfigLayers {
            defaults,
            global,
            env,
            runtime: empty_object(),
            cli: cli_overrides.unwrap_or_else(empty_object),
        };
        Ok(Self {
            global_path,
            layers: Arc::new(RwLock::new(layers)),
        })
    }

    pub fn global_path(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    pub async fn get(&self) -> anyhow::Result<KindwatchConfig> {
        let merged = self.get_effective_value().await;
        let config: KindwatchConfig =
            serde_json::from_value(merged).context("invalid kindwatch configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub async fn get_effective_value(&self) -> Value {
        let layers = self.layers.read().await.clone();
        let mut merged = empty_object();
        deep_merge(&mut merged, &layers.defaults);
        deep_merge(&mut merged, &layers.global);
        deep_merge(&mut merged, &layers.env);
        deep_merge(&mut merged, &layers.runtime);
        deep_merge(&mut merged, &layers.cli);
        merged
    }

    pub async fn get_layers_value(&self) -> Value {
        let layers = self.layers.read().await;
        json!({
            "global": layers.global,
            "env": layers.env,
            "runtime": layers.runtime,
            "cli": layers.cli
        })
    }

    pub async fn patch_runtime(&self, patch: Value) -> anyhow::Result<KindwatchConfig> {
        {
            let mut layers = self.layers.write().await;
            deep_merge(&mut layers.runtime, &patch);
        }
        self.get().await
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

async fn read_json_file(path: &Path) -> anyhow::Result<Value> {
    if !path.exists() {
        return Ok(empty_object());
    }
    let raw = fs::read_to_string(path).await?;
    if raw.trim().is_empty() {
        return Ok(empty_object());
    }
    Ok(serde_json::from_str::<Value>(&raw)?)
}

fn resolve_global_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KINDWATCH_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|dir| dir.join("kindwatch").join("config.json"))
}

fn env_layer() -> Value {
    env_layer_from(|key| std::env::var(key).ok())
}

fn env_layer_from(lookup: impl Fn(&str) -> Option<String>) -> Value {
    let mut root = empty_object();

    if let Some(url) = lookup("KINDWATCH_BASE_URL").filter(|v| !v.trim().is_empty()) {
        deep_merge(&mut root, &json!({ "backend": { "base_url": url.trim() } }));
    }
    if let Some(token) = lookup("KINDWATCH_API_TOKEN").filter(|v| !v.trim().is_empty()) {
        deep_merge(&mut root, &json!({ "backend": { "api_token": token.trim() } }));
    }
    if let Some(attempts) = parse_number::<u32>(&lookup, "KINDWATCH_POLL_MAX_ATTEMPTS") {
        deep_merge(
            &mut root,
            &json!({
                "poller": {
                    "lifecycle": { "max_attempts": attempts },
                    "update": { "max_attempts": attempts }
                }
            }),
        );
    }
    if let Some(ms) = parse_number::<u64>(&lookup, "KINDWATCH_ORACLE_BUDGET_MS") {
        deep_merge(&mut root, &json!({ "oracle": { "overall_budget_ms": ms } }));
    }
    if let Some(ms) = parse_number::<u64>(&lookup, "KINDWATCH_PROBE_TIMEOUT_MS") {
        deep_merge(&mut root, &json!({ "oracle": { "probe_timeout_ms": ms } }));
    }
    if let Some(raw) = lookup("KINDWATCH_PROBE_ORDER") {
        let order: Vec<&'static str> = parse_csv(&raw)
            .iter()
            .filter_map(|name| ProbeKind::parse(name))
            .map(ProbeKind::as_str)
            .collect();
        if !order.is_empty() {
            deep_merge(&mut root, &json!({ "oracle": { "probe_order": order } }));
        }
    }
    if let Some(ms) = parse_number::<u64>(&lookup, "KINDWATCH_WATCH_INTERVAL_MS") {
        deep_merge(&mut root, &json!({ "watcher": { "interval_ms": ms } }));
    }
    if let Some(enabled) = lookup("KINDWATCH_SESSION_GUARD").and_then(|v| parse_bool_like(&v)) {
        deep_merge(&mut root, &json!({ "guard": { "enabled": enabled } }));
    }

    root
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse::<T>().ok())
}

fn parse_bool_like(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn deep_merge(base: &mut Value, overlay: &Value) {
    if overlay.is_null() {
        return;
    }
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value.clone();
        }
    }
}

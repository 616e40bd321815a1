//! 配置管理
//!
//! 按 默认值 → 配置文件 → 环境变量 的顺序叠加加载，并在生效前统一验证。
//! 环境变量以 `CAREQUEUE_` 为前缀、`__` 分隔层级，例如 `CAREQUEUE_SERVER__PORT=9000`。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};
use anyhow::{Context, Result};
use tracing::{debug, error, info};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};

use carequeue_core::Department;

const ENV_PREFIX: &str = "CAREQUEUE";
const ENV_SEPARATOR: &str = "__";

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: Arc<RwLock<CareQueueConfig>>,
    validator: ConfigValidator,
}

/// 候诊队列系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CareQueueConfig {
    pub server: ServerConfig,
    pub engine: EngineSettings,
    pub simulation: SimulationSettings,
    /// 启动时注册的科室
    pub departments: Vec<DepartmentSettings>,
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 是否启动 HTTP 接口
    pub enable_http: bool,
}

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    /// 客户端读取截止时间（毫秒）
    pub read_timeout_ms: u64,
    /// 每个订阅者的事件缓冲上限
    pub notification_capacity: usize,
}

/// 模拟进度配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationSettings {
    pub enabled: bool,
    pub tick_interval_secs: u64,
    pub start_probability: f64,
    pub complete_probability: f64,
    /// 固定随机种子，便于复现
    pub seed: Option<u64>,
}

/// 科室配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepartmentSettings {
    pub id: String,
    pub name: String,
    pub average_wait_minutes: u32,
    #[serde(default)]
    pub current_load_percent: u8,
    #[serde(default)]
    pub fast_track_ceiling_minutes: Option<u32>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// 日志级别或过滤指令，可被 `RUST_LOG` 覆盖
    pub level: String,
    /// 输出 JSON 格式
    pub json: bool,
    /// 显示事件目标模块
    pub with_target: bool,
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    field_path: &'static str,
    validator: fn(&CareQueueConfig) -> Result<()>,
}

impl ConfigManager {
    /// 加载配置：默认值 → 可选配置文件 → 环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let config = Self::load_config(config_path)?;
        Self::with_config(config)
    }

    /// 从 TOML 文本加载，`env` 代替进程环境变量
    pub fn from_toml_str(content: &str, env: Option<HashMap<String, String>>) -> Result<Self> {
        let settings = Self::base_builder()?
            .add_source(File::from_str(content, FileFormat::Toml))
            .add_source(Self::environment(env))
            .build()
            .context("Failed to build configuration")?;

        let config: CareQueueConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        Self::with_config(config)
    }

    fn with_config(config: CareQueueConfig) -> Result<Self> {
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            validator,
        })
    }

    fn base_builder() -> Result<ConfigBuilder<DefaultState>> {
        let defaults = Config::try_from(&CareQueueConfig::default())
            .context("Failed to serialize default configuration")?;
        Ok(Config::builder().add_source(defaults))
    }

    fn environment(source: Option<HashMap<String, String>>) -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(source)
    }

    fn load_config(config_path: Option<&str>) -> Result<CareQueueConfig> {
        let mut builder = Self::base_builder()?;
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(Self::environment(None))
            .build()
            .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;

        let config: CareQueueConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match config_path {
            Some(path) => info!("Configuration loaded successfully from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 获取当前配置
    pub async fn get_config(&self) -> CareQueueConfig {
        self.config.read().await.clone()
    }

    /// 替换配置，新配置需通过验证
    pub async fn update_config(&self, new_config: CareQueueConfig) -> Result<()> {
        self.validator.validate(&new_config)?;
        *self.config.write().await = new_config;
        info!("Configuration updated");
        Ok(())
    }

    /// 按点分路径读取配置值，例如 `engine.read_timeout_ms`
    pub async fn get_value<T>(&self, path: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let config = self.config.read().await;
        let mut current = serde_json::to_value(&*config)
            .context("Failed to serialize config to JSON")?;

        for part in path.split('.') {
            current = match current {
                serde_json::Value::Object(mut map) => map
                    .remove(part)
                    .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", path))?,
                _ => return Err(anyhow::anyhow!("Invalid path at segment: {}", part)),
            };
        }

        serde_json::from_value(current).context("Failed to deserialize configuration value")
    }
}

impl CareQueueConfig {
    /// 客户端读取截止时间
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.read_timeout_ms)
    }

    /// 模拟触发间隔
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.simulation.tick_interval_secs)
    }

    /// 转换为科室模型
    pub fn departments(&self) -> Vec<Department> {
        self.departments.iter().map(DepartmentSettings::to_department).collect()
    }
}

impl DepartmentSettings {
    fn new(id: &str, name: &str, average_wait_minutes: u32, load: u8) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            average_wait_minutes,
            current_load_percent: load,
            fast_track_ceiling_minutes: None,
        }
    }

    pub fn to_department(&self) -> Department {
        let department = Department::new(&self.id, &self.name, self.average_wait_minutes)
            .with_load(self.current_load_percent);
        match self.fast_track_ceiling_minutes {
            Some(ceiling) => department.with_fast_track_ceiling(ceiling),
            None => department,
        }
    }
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| {
                    if config.server.port == 0 {
                        Err(anyhow::anyhow!("Server port cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "engine.read_timeout_ms",
                validator: |config| {
                    if config.engine.read_timeout_ms == 0 {
                        Err(anyhow::anyhow!("Read timeout cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "engine.notification_capacity",
                validator: |config| {
                    if config.engine.notification_capacity == 0 {
                        Err(anyhow::anyhow!("Notification capacity cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "simulation",
                validator: |config| {
                    let sim = &config.simulation;
                    if sim.tick_interval_secs == 0 {
                        return Err(anyhow::anyhow!("Tick interval cannot be 0"));
                    }
                    for (name, p) in [
                        ("start_probability", sim.start_probability),
                        ("complete_probability", sim.complete_probability),
                    ] {
                        if !(0.0..=1.0).contains(&p) {
                            return Err(anyhow::anyhow!("{} must be within [0, 1], got {}", name, p));
                        }
                    }
                    Ok(())
                },
            },
            ValidationRule {
                field_path: "departments",
                validator: |config| {
                    if config.departments.is_empty() {
                        return Err(anyhow::anyhow!("At least one department is required"));
                    }
                    let mut seen = HashSet::new();
                    for dept in &config.departments {
                        if !seen.insert(dept.id.as_str()) {
                            return Err(anyhow::anyhow!("Duplicate department id: {}", dept.id));
                        }
                        if dept.average_wait_minutes == 0 {
                            return Err(anyhow::anyhow!(
                                "Department {} must have a positive average wait",
                                dept.id
                            ));
                        }
                        if dept.current_load_percent > 100 {
                            return Err(anyhow::anyhow!(
                                "Department {} load {} exceeds 100",
                                dept.id,
                                dept.current_load_percent
                            ));
                        }
                        if dept.fast_track_ceiling_minutes == Some(0) {
                            return Err(anyhow::anyhow!(
                                "Department {} fast-track ceiling cannot be 0",
                                dept.id
                            ));
                        }
                    }
                    Ok(())
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &CareQueueConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(e.context(format!("Invalid configuration at {}", rule.field_path)));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for CareQueueConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            engine: EngineSettings::default(),
            simulation: SimulationSettings::default(),
            departments: vec![
                DepartmentSettings {
                    fast_track_ceiling_minutes: Some(5),
                    ..DepartmentSettings::new("emergency", "Emergency", 30, 75)
                },
                DepartmentSettings::new("radiology", "Radiology", 40, 40),
                DepartmentSettings::new("cardiology", "Cardiology", 20, 20),
                DepartmentSettings::new("orthopedics", "Orthopedics", 35, 60),
            ],
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            enable_http: false,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            read_timeout_ms: 2000,
            notification_capacity: 256,
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_interval_secs: 10,
            start_probability: 0.10,
            complete_probability: 0.05,
            seed: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = CareQueueConfig::default();
        ConfigValidator::new().validate(&config).unwrap();

        let departments = config.departments();
        assert_eq!(departments.len(), 4);
        assert_eq!(departments[0].fast_track_ceiling_minutes, Some(5));
        assert_eq!(departments[1].average_wait_minutes, 40);
        assert_eq!(config.read_timeout(), Duration::from_millis(2000));
        assert_eq!(config.tick_interval(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_file_overrides_defaults() {
        let toml = r#"
            [server]
            port = 9090

            [simulation]
            enabled = true
            seed = 42

            [[departments]]
            id = "lab"
            name = "Laboratory"
            average_wait_minutes = 15
        "#;
        let manager = ConfigManager::from_toml_str(toml, env(&[])).unwrap();
        let config = manager.get_config().await;

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.simulation.enabled);
        assert_eq!(config.simulation.seed, Some(42));
        assert_eq!(config.simulation.start_probability, 0.10);
        assert_eq!(config.departments.len(), 1);
        assert_eq!(config.departments[0].current_load_percent, 0);
        assert_eq!(config.departments[0].fast_track_ceiling_minutes, None);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("carequeue-{}.toml", std::process::id()));
        std::fs::write(&path, "[simulation]\ntick_interval_secs = 3\n").unwrap();

        let manager = ConfigManager::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        let config = manager.get_config().await;
        assert_eq!(config.tick_interval(), Duration::from_secs(3));
        assert_eq!(config.departments.len(), 4);
    }

    #[tokio::test]
    async fn test_environment_overrides_file() {
        let toml = "[server]\nport = 9090\n";
        let manager = ConfigManager::from_toml_str(
            toml,
            env(&[
                ("CAREQUEUE_SERVER__PORT", "7070"),
                ("CAREQUEUE_ENGINE__READ_TIMEOUT_MS", "500"),
                ("CAREQUEUE_LOGGING__JSON", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(manager.get_value::<u16>("server.port").await.unwrap(), 7070);
        assert_eq!(manager.get_value::<u64>("engine.read_timeout_ms").await.unwrap(), 500);
        assert!(manager.get_value::<bool>("logging.json").await.unwrap());
        assert!(manager.get_value::<u16>("server.missing").await.is_err());
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let cases = [
            "[server]\nport = 0\n",
            "[engine]\nread_timeout_ms = 0\n",
            "[engine]\nnotification_capacity = 0\n",
            "[simulation]\nstart_probability = 1.5\n",
            "[simulation]\ntick_interval_secs = 0\n",
            "departments = []\n",
            "[[departments]]\nid = \"a\"\nname = \"A\"\naverage_wait_minutes = 0\n",
            "[[departments]]\nid = \"a\"\nname = \"A\"\naverage_wait_minutes = 5\ncurrent_load_percent = 120\n",
            "[[departments]]\nid = \"a\"\nname = \"A\"\naverage_wait_minutes = 5\nfast_track_ceiling_minutes = 0\n",
            "[[departments]]\nid = \"a\"\nname = \"A\"\naverage_wait_minutes = 5\n[[departments]]\nid = \"a\"\nname = \"B\"\naverage_wait_minutes = 6\n",
        ];

        for toml in cases {
            assert!(
                ConfigManager::from_toml_str(toml, env(&[])).is_err(),
                "accepted invalid config: {}",
                toml
            );
        }
    }

    #[tokio::test]
    async fn test_update_config_validates() {
        let manager = ConfigManager::from_toml_str("", env(&[])).unwrap();

        let mut invalid = manager.get_config().await;
        invalid.engine.notification_capacity = 0;
        assert!(manager.update_config(invalid).await.is_err());

        let mut valid = manager.get_config().await;
        valid.server.enable_http = true;
        manager.update_config(valid).await.unwrap();
        assert!(manager.get_config().await.server.enable_http);
    }
}

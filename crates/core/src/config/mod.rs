use ::config::{Config as ConfigBuilder, Environment, File, FileFormat};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{DispatchError, DispatchResult};

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// 失败时成功率是否对称衰减（默认保持来源的非对称行为）
    pub symmetric_success_decay: bool,
    /// 已完成任务归档上限
    pub completed_archive_limit: usize,
}

impl DispatcherConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.completed_archive_limit == 0 {
            return Err(DispatchError::config_error(
                "dispatcher.completed_archive_limit 必须大于0",
            ));
        }
        Ok(())
    }
}

/// 消息通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// 消息默认最大重试次数
    pub max_retries: u32,
    /// 线性退避基础间隔（毫秒），第n次重试延迟 base * n
    pub retry_backoff_ms: u64,
    /// 消息历史上限
    pub history_limit: usize,
}

impl MessagingConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.retry_backoff_ms == 0 {
            return Err(DispatchError::config_error(
                "messaging.retry_backoff_ms 必须大于0",
            ));
        }
        if self.history_limit == 0 {
            return Err(DispatchError::config_error(
                "messaging.history_limit 必须大于0",
            ));
        }
        Ok(())
    }
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 审计轨迹保留条数
    pub audit_trail_limit: usize,
    /// 会话历史保留条数
    pub history_limit: usize,
}

impl SessionConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.audit_trail_limit == 0 {
            return Err(DispatchError::config_error(
                "session.audit_trail_limit 必须大于0",
            ));
        }
        Ok(())
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub dispatcher: DispatcherConfig,
    pub messaging: MessagingConfig,
    pub session: SessionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig {
                symmetric_success_decay: false,
                completed_archive_limit: 50,
            },
            messaging: MessagingConfig {
                max_retries: 3,
                retry_backoff_ms: 1000,
                history_limit: 1000,
            },
            session: SessionConfig {
                audit_trail_limit: 50,
                history_limit: 100,
            },
        }
    }
}

impl AppConfig {
    /// 嵌入式部署的默认配置
    pub fn embedded_default() -> Self {
        Self::default()
    }

    /// 加载配置：可选TOML文件 + DISPATCH_ 前缀环境变量覆盖
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            builder = builder
                .set_default("dispatcher.symmetric_success_decay", false)?
                .set_default("dispatcher.completed_archive_limit", 50)?
                .set_default("messaging.max_retries", 3)?
                .set_default("messaging.retry_backoff_ms", 1000)?
                .set_default("messaging.history_limit", 1000)?
                .set_default("session.audit_trail_limit", 50)?
                .set_default("session.history_limit", 100)?;
        }

        builder = builder.add_source(
            Environment::with_prefix("DISPATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> DispatchResult<()> {
        self.dispatcher.validate()?;
        self.messaging.validate()?;
        self.session.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let config = AppConfig::embedded_default();
        assert!(!config.dispatcher.symmetric_success_decay);
        assert_eq!(config.dispatcher.completed_archive_limit, 50);
        assert_eq!(config.messaging.max_retries, 3);
        assert_eq!(config.messaging.retry_backoff_ms, 1000);
        assert_eq!(config.session.audit_trail_limit, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_backoff() {
        let mut config = AppConfig::embedded_default();
        config.messaging.retry_backoff_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_archive_limit() {
        let mut config = AppConfig::embedded_default();
        config.dispatcher.completed_archive_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::embedded_default();
        let toml_str = config.to_toml().expect("序列化失败");
        let restored = AppConfig::from_toml(&toml_str).expect("解析失败");
        assert_eq!(
            restored.messaging.retry_backoff_ms,
            config.messaging.retry_backoff_ms
        );
        assert_eq!(
            restored.session.history_limit,
            config.session.history_limit
        );
    }

    #[test]
    fn test_from_toml_rejects_invalid_values() {
        let toml_str = r#"
[dispatcher]
symmetric_success_decay = false
completed_archive_limit = 0

[messaging]
max_retries = 3
retry_backoff_ms = 1000
history_limit = 1000

[session]
audit_trail_limit = 50
history_limit = 100
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_load_with_env_override() {
        std::env::set_var("DISPATCH_MESSAGING__MAX_RETRIES", "5");
        let config = AppConfig::load(None).expect("加载配置失败");
        assert_eq!(config.messaging.max_retries, 5);
        std::env::remove_var("DISPATCH_MESSAGING__MAX_RETRIES");
    }
}

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// `json` 或 `pretty`
    pub log_format: String,
    /// Prometheus 抓取地址，未配置时不启动导出器
    pub metrics_listen: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_listen: None,
        }
    }
}

impl ObservabilityConfig {
    /// Validate observability configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，有效值: {:?}",
                self.log_level,
                valid_log_levels
            ));
        }

        if !["json", "pretty"].contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!("不支持的日志格式: {}", self.log_format));
        }

        self.metrics_addr()?;
        Ok(())
    }

    pub fn metrics_addr(&self) -> anyhow::Result<Option<SocketAddr>> {
        match self.metrics_listen.as_deref() {
            None | Some("") => Ok(None),
            Some(addr) => addr
                .parse::<SocketAddr>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("无效的指标监听地址 {addr}: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_addr_parsing() {
        let mut config = ObservabilityConfig::default();
        assert_eq!(config.metrics_addr().unwrap(), None);

        config.metrics_listen = Some("0.0.0.0:9000".to_string());
        assert_eq!(
            config.metrics_addr().unwrap(),
            Some("0.0.0.0:9000".parse().unwrap())
        );

        config.metrics_listen = Some("not-an-addr".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let config = ObservabilityConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

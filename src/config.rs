use std::time::Duration;

use crate::error::{AppResult, ConfigError};

/// 浏览器获取方式
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrowserMode {
    /// 连接到已开启调试端口的浏览器
    Connect,
    /// 启动无头浏览器
    Headless,
}

/// 数据存储后端
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatastoreBackend {
    /// PostgREST 兼容的 REST 接口
    Rest,
    /// 本地 TOML 实体列表，结果与进度只保存在内存
    Toml,
    /// 纯内存（演练模式）
    Memory,
}

/// OCR 后端
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OcrBackend {
    Tesseract,
    Vision,
}

/// 门户页面选择器
#[derive(Clone, Debug)]
pub struct PortalSelectors {
    /// 实体标识输入框
    pub identifier_input: String,
    /// 验证码答案输入框
    pub answer_input: String,
    /// 提交按钮
    pub submit_button: String,
    /// 验证码图片
    pub captcha_image: String,
    /// 义务表格
    pub obligations_table: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            identifier_input: "#logid".to_string(),
            answer_input: "#captcahText".to_string(),
            submit_button: "#normalDiv a.btn".to_string(),
            captcha_image: "#captcha_img".to_string(),
            obligations_table: "#pinCheckerForm table.tab3".to_string(),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- 门户配置 ---
    pub portal_url: String,
    pub obligations_url: String,
    pub rejection_marker: String,
    /// 正向成功标记；设置后必须看到该标记才视为登录成功
    pub success_marker: Option<String>,
    pub selectors: PortalSelectors,
    // --- 浏览器配置 ---
    pub browser_mode: BrowserMode,
    pub browser_debug_port: u16,
    pub chrome_executable: Option<String>,
    // --- 数据存储配置 ---
    pub datastore_backend: DatastoreBackend,
    pub datastore_url: String,
    pub datastore_key: String,
    pub entity_table: String,
    pub result_table: String,
    pub progress_table: String,
    pub entity_file: String,
    /// 只处理这些实体（为空表示全部）
    pub entity_ids: Vec<i64>,
    // --- OCR 配置 ---
    pub ocr_backend: OcrBackend,
    pub tesseract_bin: String,
    pub vision_api_key: String,
    pub vision_api_base_url: String,
    pub vision_model: String,
    // --- 运行参数 ---
    pub max_login_attempts: u32,
    pub submit_wait: Duration,
    pub inter_entity_delay: Duration,
    // --- 输出 ---
    pub report_dir: String,
    pub output_log_file: String,
    pub failure_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_url: "https://itax.kra.go.ke/KRA-Portal/".to_string(),
            obligations_url: "pinChecker.htm".to_string(),
            rejection_marker: "Wrong result of the arithmetic operation.".to_string(),
            success_marker: None,
            selectors: PortalSelectors::default(),
            browser_mode: BrowserMode::Headless,
            browser_debug_port: 9222,
            chrome_executable: None,
            datastore_backend: DatastoreBackend::Rest,
            datastore_url: String::new(),
            datastore_key: String::new(),
            entity_table: "companies".to_string(),
            result_table: "tax_obligations".to_string(),
            progress_table: "run_progress".to_string(),
            entity_file: "entities.toml".to_string(),
            entity_ids: Vec::new(),
            ocr_backend: OcrBackend::Tesseract,
            tesseract_bin: "tesseract".to_string(),
            vision_api_key: String::new(),
            vision_api_base_url: "https://api.openai.com/v1".to_string(),
            vision_model: "gpt-4o-mini".to_string(),
            max_login_attempts: 5,
            submit_wait: Duration::from_millis(3000),
            inter_entity_delay: Duration::from_millis(2000),
            report_dir: "reports".to_string(),
            output_log_file: "run_log.txt".to_string(),
            failure_log_file: "failed_entities.txt".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量读取配置（先加载 `.env`，缺省值见 `Default`）
    ///
    /// 数值型变量取值无法解析时返回 `ConfigError::EnvVarParseFailed`，不会静默回退到默认值。
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let default = Self::default();
        let default_selectors = default.selectors.clone();

        Ok(Self {
            portal_url: env_or("PORTAL_URL", default.portal_url),
            obligations_url: env_or("PORTAL_OBLIGATIONS_URL", default.obligations_url),
            rejection_marker: env_or("PORTAL_REJECTION_MARKER", default.rejection_marker),
            success_marker: std::env::var("PORTAL_SUCCESS_MARKER")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            selectors: PortalSelectors {
                identifier_input: env_or(
                    "PORTAL_SELECTOR_IDENTIFIER",
                    default_selectors.identifier_input,
                ),
                answer_input: env_or("PORTAL_SELECTOR_ANSWER", default_selectors.answer_input),
                submit_button: env_or("PORTAL_SELECTOR_SUBMIT", default_selectors.submit_button),
                captcha_image: env_or("PORTAL_SELECTOR_CAPTCHA", default_selectors.captcha_image),
                obligations_table: env_or(
                    "PORTAL_SELECTOR_TABLE",
                    default_selectors.obligations_table,
                ),
            },
            browser_mode: match std::env::var("BROWSER_MODE").ok().as_deref() {
                Some("connect") => BrowserMode::Connect,
                Some("headless") => BrowserMode::Headless,
                _ => default.browser_mode,
            },
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", default.browser_debug_port)?,
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok(),
            datastore_backend: match std::env::var("DATASTORE_BACKEND").ok().as_deref() {
                Some("rest") => DatastoreBackend::Rest,
                Some("toml") => DatastoreBackend::Toml,
                Some("memory") => DatastoreBackend::Memory,
                _ => default.datastore_backend,
            },
            datastore_url: env_or("DATASTORE_URL", default.datastore_url),
            datastore_key: env_or("DATASTORE_KEY", default.datastore_key),
            entity_table: env_or("ENTITY_TABLE", default.entity_table),
            result_table: env_or("RESULT_TABLE", default.result_table),
            progress_table: env_or("PROGRESS_TABLE", default.progress_table),
            entity_file: env_or("ENTITY_FILE", default.entity_file),
            entity_ids: std::env::var("ENTITY_IDS")
                .ok()
                .map(|v| parse_id_list(&v))
                .unwrap_or(default.entity_ids),
            ocr_backend: match std::env::var("OCR_BACKEND").ok().as_deref() {
                Some("vision") => OcrBackend::Vision,
                Some("tesseract") => OcrBackend::Tesseract,
                _ => default.ocr_backend,
            },
            tesseract_bin: env_or("TESSERACT_BIN", default.tesseract_bin),
            vision_api_key: env_or("VISION_API_KEY", default.vision_api_key),
            vision_api_base_url: env_or("VISION_API_BASE_URL", default.vision_api_base_url),
            vision_model: env_or("VISION_MODEL", default.vision_model),
            max_login_attempts: env_parse("MAX_LOGIN_ATTEMPTS", default.max_login_attempts)?,
            submit_wait: env_millis("SUBMIT_WAIT_MS", default.submit_wait)?,
            inter_entity_delay: env_millis("INTER_ENTITY_DELAY_MS", default.inter_entity_delay)?,
            report_dir: env_or("REPORT_DIR", default.report_dir),
            output_log_file: env_or("OUTPUT_LOG_FILE", default.output_log_file),
            failure_log_file: env_or("FAILURE_LOG_FILE", default.failure_log_file),
        })
    }

    /// 检查配置能否支撑一次运行
    pub fn validate(&self) -> AppResult<()> {
        if self.datastore_backend == DatastoreBackend::Rest {
            if self.datastore_url.trim().is_empty() {
                return Err(ConfigError::EnvVarNotFound {
                    var_name: "DATASTORE_URL".to_string(),
                }
                .into());
            }
            if self.datastore_key.trim().is_empty() {
                return Err(ConfigError::EnvVarNotFound {
                    var_name: "DATASTORE_KEY".to_string(),
                }
                .into());
            }
        }
        if self.ocr_backend == OcrBackend::Vision && self.vision_api_key.trim().is_empty() {
            return Err(ConfigError::EnvVarNotFound {
                var_name: "VISION_API_KEY".to_string(),
            }
            .into());
        }
        if self.max_login_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_LOGIN_ATTEMPTS".to_string(),
                reason: "至少需要 1 次登录尝试".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// 义务页面的绝对地址
    pub fn obligations_page_url(&self) -> String {
        if self.obligations_url.starts_with("http://") || self.obligations_url.starts_with("https://")
        {
            return self.obligations_url.clone();
        }
        format!(
            "{}/{}",
            self.portal_url.trim_end_matches('/'),
            self.obligations_url.trim_start_matches('/')
        )
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> AppResult<T> {
    Ok(parse_env_value(name, std::env::var(name).ok())?.unwrap_or(default))
}

fn env_millis(name: &str, default: Duration) -> AppResult<Duration> {
    Ok(parse_env_value::<u64>(name, std::env::var(name).ok())?
        .map(Duration::from_millis)
        .unwrap_or(default))
}

/// 解析单个环境变量取值；未设置或为空时返回 `None`
fn parse_env_value<T: std::str::FromStr>(name: &str, raw: Option<String>) -> AppResult<Option<T>> {
    let Some(value) = raw.filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    let parsed = value.trim().parse::<T>();
    parsed.map(Some).map_err(|_| {
        ConfigError::EnvVarParseFailed {
            var_name: name.to_string(),
            value,
            expected_type: std::any::type_name::<T>().to_string(),
        }
        .into()
    })
}

/// 解析逗号分隔的实体 ID 列表，忽略无法解析的片段
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("3, 1,x,,7"), vec![3, 1, 7]);
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn test_malformed_numeric_value_is_reported() {
        let err = parse_env_value::<u32>("MAX_LOGIN_ATTEMPTS", Some("five".to_string())).unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::EnvVarParseFailed { ref var_name, ref value, .. })
                if var_name == "MAX_LOGIN_ATTEMPTS" && value == "five"
        ));
        assert!(parse_env_value::<u64>("SUBMIT_WAIT_MS", Some("-1".to_string())).is_err());
    }

    #[test]
    fn test_unset_or_blank_value_falls_back() {
        assert_eq!(parse_env_value::<u32>("MAX_LOGIN_ATTEMPTS", None).unwrap(), None);
        assert_eq!(parse_env_value::<u32>("MAX_LOGIN_ATTEMPTS", Some("  ".to_string())).unwrap(), None);
        assert_eq!(parse_env_value::<u64>("SUBMIT_WAIT_MS", Some(" 1500 ".to_string())).unwrap(), Some(1500));
    }

    #[test]
    fn test_rest_backend_requires_credentials() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let config = Config {
            datastore_url: "https://db.example.com".to_string(),
            datastore_key: "key".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = Config {
            datastore_backend: DatastoreBackend::Memory,
            max_login_attempts: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_obligations_page_url() {
        let config = Config::default();
        assert_eq!(
            config.obligations_page_url(),
            "https://itax.kra.go.ke/KRA-Portal/pinChecker.htm"
        );

        let config = Config {
            obligations_url: "https://other.example.com/view".to_string(),
            ..Config::default()
        };
        assert_eq!(config.obligations_page_url(), "https://other.example.com/view");
    }
}

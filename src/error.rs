use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 数据存储错误
    #[error("数据存储错误: {0}")]
    Datastore(#[from] DatastoreError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// OCR 识别错误
    #[error("OCR错误: {0}")]
    Ocr(#[from] OcrError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        #[source]
        source: chromiumoxide::error::CdpError,
    },
    /// 启动浏览器失败
    #[error("启动浏览器失败: {0}")]
    LaunchFailed(String),
    /// 浏览器会话已断开（websocket / 通道失效）
    #[error("浏览器会话已断开: {source}")]
    SessionLost {
        #[source]
        source: chromiumoxide::error::CdpError,
    },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: chromiumoxide::error::CdpError,
    },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        #[source]
        source: chromiumoxide::error::CdpError,
    },
    /// 页面元素不存在
    #[error("页面元素不存在: {selector}")]
    ElementNotFound { selector: String },
}

/// 数据存储错误
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// 网络请求失败
    #[error("请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// 服务端返回错误响应
    #[error("服务端返回错误响应 ({endpoint}): status={status}, body={body}")]
    BadResponse {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    JsonParseFailed(#[from] serde_json::Error),
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 报表写入失败
    #[error("报表写入失败 ({path}): {message}")]
    ReportFailed { path: String, message: String },
}

/// OCR 识别错误
#[derive(Debug, Error)]
pub enum OcrError {
    /// 无法启动识别进程
    #[error("无法启动 OCR 进程 ({program}): {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// 识别进程异常退出
    #[error("OCR 进程退出码 {code:?}: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },
    /// 视觉模型调用失败
    #[error("视觉模型调用失败 (模型: {model}): {message}")]
    VisionFailed { model: String, message: String },
    /// 临时图片写入失败
    #[error("临时图片写入失败: {0}")]
    TempImage(#[source] std::io::Error),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 必需的环境变量不存在
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },
    /// 取值不合法
    #[error("配置项 {name} 不合法: {reason}")]
    Invalid { name: String, reason: String },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        use chromiumoxide::error::CdpError;
        match err {
            CdpError::Ws(_) | CdpError::ChannelSendError(_) => {
                AppError::Browser(BrowserError::SessionLost { source: err })
            }
            other => AppError::Browser(BrowserError::ScriptExecutionFailed { source: other }),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Datastore(DatastoreError::JsonParseFailed(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: err,
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建数据存储请求失败错误
    pub fn request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Datastore(DatastoreError::RequestFailed {
            endpoint: endpoint.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 浏览器会话本身已不可用
    ///
    /// 只有这类错误会越过单个实体的处理边界并中止整个批次。
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, AppError::Browser(BrowserError::SessionLost { .. }))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

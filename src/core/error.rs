use thiserror::Error;

/// 硬失败分类。
///
/// “不归我管”不是错误：各 provider 用 `Ok(None)` 表达，调用方继续尝试下一个。
/// 只有 provider 已经认领了输入、却无法完成后续操作时才返回这里的错误。
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("malformed input for source provider '{provider}': {reason}")]
    MalformedInput { provider: String, reason: String },
    #[error("storage unavailable at '{path}': {reason}")]
    StorageUnavailable { path: String, reason: String },
    #[error("failed to decode data schema: {0}")]
    SchemaDecode(#[source] serde_json::Error),
    #[error("no index-capable source provider found for {0}")]
    Unsupported(String),
    #[error("unknown source provider builder '{0}'")]
    UnknownBuilder(String),
}

impl SourceError {
    pub fn malformed(provider: &str, reason: impl Into<String>) -> Self {
        SourceError::MalformedInput {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    pub fn storage(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        SourceError::StorageUnavailable {
            path: path.as_ref().to_string_lossy().into_owned(),
            reason: reason.to_string(),
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

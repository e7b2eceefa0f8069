use arc_swap::ArcSwap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 默认文件源支持格式的覆盖项（逗号分隔；非空时整体替换内置集合）
pub const SUPPORTED_FILE_FORMATS: &str =
    "spark.hyperspace.index.sources.defaultFileBasedSource.supportedFileFormats";

/// provider 注册顺序（逗号分隔的 builder 名）
pub const FILE_BASED_BUILDERS: &str = "spark.hyperspace.index.sources.fileBasedBuilders";

pub const DEFAULT_BUILDERS: &str = "default";

/// 会话配置
///
/// 读路径无锁（ArcSwap load），写入整体替换 map。
/// 所有 getter 每次都读最新值，不做缓存：覆盖项的即时生效是对外契约的一部分。
#[derive(Debug, Default)]
pub struct SessionConf {
    entries: ArcSwap<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
struct ConfFile {
    #[serde(default)]
    conf: BTreeMap<String, toml::Value>,
}

impl SessionConf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        Self {
            entries: ArcSwap::from_pointee(map),
        }
    }

    /// 解析 `[conf]` 表；键需加引号以保留点号
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let file: ConfFile = toml::from_str(s)?;
        let map = file
            .conf
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    toml::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();
        Ok(Self::from_map(map))
    }

    pub fn load_toml(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let conf = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded {} conf entries from {:?}", conf.len(), path);
        Ok(conf)
    }

    /// `<config_dir>/fd-sources/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("fd-sources").join("config.toml"))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.load().get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        let value = value.into();
        self.entries.rcu(|m| {
            let mut m = BTreeMap::clone(m);
            m.insert(key.to_string(), value.clone());
            m
        });
    }

    pub fn unset(&self, key: &str) {
        self.entries.rcu(|m| {
            let mut m = BTreeMap::clone(m);
            m.remove(key);
            m
        });
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 支持格式覆盖串（未设置时为空串）
    pub fn supported_file_formats(&self) -> String {
        self.get_or(SUPPORTED_FILE_FORMATS, "")
    }

    /// builder 注册顺序
    pub fn source_builders(&self) -> Vec<String> {
        split_csv(&self.get_or(FILE_BASED_BUILDERS, DEFAULT_BUILDERS))
    }
}

/// 逗号分隔列表：去空白、小写、丢弃空项
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_ascii_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_visible_immediately() {
        let conf = SessionConf::new();
        assert_eq!(conf.supported_file_formats(), "");
        conf.set(SUPPORTED_FILE_FORMATS, "csv");
        assert_eq!(conf.supported_file_formats(), "csv");
        conf.unset(SUPPORTED_FILE_FORMATS);
        assert_eq!(conf.supported_file_formats(), "");
    }

    #[test]
    fn toml_conf_table() {
        let conf = SessionConf::from_toml_str(
            r#"
[conf]
"spark.hyperspace.index.sources.fileBasedBuilders" = "custom, Default"
"some.flag" = true
"#,
        )
        .unwrap();
        assert_eq!(conf.source_builders(), vec!["custom", "default"]);
        assert_eq!(conf.get("some.flag").as_deref(), Some("true"));
    }

    #[test]
    fn builders_default_to_default_source() {
        assert_eq!(SessionConf::new().source_builders(), vec!["default"]);
    }

    #[test]
    fn split_csv_drops_empty_entries() {
        assert_eq!(split_csv(" CSV, ,parquet,"), vec!["csv", "parquet"]);
        assert!(split_csv("").is_empty());
    }
}

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::core::fingerprint::FileDescriptor;
use crate::core::lineage::FileIdTracker;

/// 保留选项键：落盘前必须剔除，否则重建时会重复读取同一批数据
pub const PATH_OPTION: &str = "path";

/// 规范化后的数据集描述（落盘形态）
///
/// 创建后不可变；刷新时由新实例整体替换。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub root_paths: Vec<String>,
    pub data_schema_json: String,
    pub file_format: String,
    pub options: BTreeMap<String, String>,
    pub source_properties: SourceProperties,
}

impl Relation {
    pub fn new(
        root_paths: Vec<String>,
        data_schema_json: String,
        file_format: impl Into<String>,
        options: BTreeMap<String, String>,
        source_properties: SourceProperties,
    ) -> Self {
        Self {
            root_paths,
            data_schema_json,
            file_format: file_format.into().to_ascii_lowercase(),
            options: strip_path_option(options),
            source_properties,
        }
    }

    /// 默认文件源的内容描述（其他 provider 的 Relation 返回 None）
    pub fn content(&self) -> Option<&Content> {
        match &self.source_properties {
            SourceProperties::FileContent(p) => Some(&p.content),
            SourceProperties::Custom { .. } => None,
        }
    }
}

/// 剔除保留键 "path"（大小写不敏感）
pub fn strip_path_option(mut options: BTreeMap<String, String>) -> BTreeMap<String, String> {
    options.retain(|k, _| !k.eq_ignore_ascii_case(PATH_OPTION));
    options
}

/// 各 provider 私有的内容描述
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceProperties {
    /// 默认文件源：叶子文件列表 + 可选增量
    FileContent(FileContentProperties),
    /// 第三方 provider：按 provider 名区分，payload 由其自行解释
    Custom {
        provider: String,
        payload: serde_json::Value,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContentProperties {
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Update>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub modified_time: i64,
    pub id: u64,
}

impl FileInfo {
    pub fn from_descriptor(file: &FileDescriptor, tracker: &FileIdTracker) -> Self {
        Self {
            name: file.path_string(),
            size: file.size,
            modified_time: file.modified_time,
            id: tracker.add_file(file),
        }
    }

    fn identity(&self) -> (&str, u64, i64) {
        (&self.name, self.size, self.modified_time)
    }
}

/// 叶子文件清单（保持列举顺序）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub files: Vec<FileInfo>,
}

impl Content {
    pub fn from_files(files: &[FileDescriptor], tracker: &FileIdTracker) -> Self {
        Self {
            files: files
                .iter()
                .map(|f| FileInfo::from_descriptor(f, tracker))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// 还原为 FileDescriptor（顺序不变）
    pub fn descriptors(&self) -> Vec<FileDescriptor> {
        self.files
            .iter()
            .map(|f| FileDescriptor::new(&f.name, f.size, f.modified_time))
            .collect()
    }

    /// 相对 `previous` 的增量：新出现的文件记为 appended，消失的记为 deleted。
    /// 内容被改写（size/mtime 变化）的文件同时出现在两侧。
    pub fn diff(&self, previous: &Content) -> Update {
        let prev: HashSet<_> = previous.files.iter().map(FileInfo::identity).collect();
        let cur: HashSet<_> = self.files.iter().map(FileInfo::identity).collect();

        let appended = self
            .files
            .iter()
            .filter(|f| !prev.contains(&f.identity()))
            .cloned()
            .collect();
        let deleted = previous
            .files
            .iter()
            .filter(|f| !cur.contains(&f.identity()))
            .cloned()
            .collect();

        Update { appended, deleted }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    pub appended: Vec<FileInfo>,
    pub deleted: Vec<FileInfo>,
}

impl Update {
    pub fn is_empty(&self) -> bool {
        self.appended.is_empty() && self.deleted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sample() -> Relation {
        let tracker = FileIdTracker::new();
        let files = vec![
            FileDescriptor::new("/t/a.parquet", 10, 1),
            FileDescriptor::new("/t/b.parquet", 20, 2),
        ];
        Relation::new(
            vec!["/t".into()],
            r#"{"fields":[{"name":"id","type":"long","nullable":true}]}"#.into(),
            "Parquet",
            opts(&[("path", "/t"), ("mergeSchema", "true")]),
            SourceProperties::FileContent(FileContentProperties {
                content: Content::from_files(&files, &tracker),
                update: None,
            }),
        )
    }

    #[test]
    fn new_strips_path_and_lowercases_format() {
        let r = sample();
        assert_eq!(r.file_format, "parquet");
        assert!(!r.options.contains_key("path"));
        assert_eq!(r.options.get("mergeSchema").map(String::as_str), Some("true"));

        let stripped = strip_path_option(opts(&[("PATH", "/x"), ("Path", "/y"), ("k", "v")]));
        assert_eq!(stripped.len(), 1);
    }

    #[test]
    fn relation_json_roundtrip() {
        let r = sample();
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"rootPaths\""));
        assert!(json.contains("\"dataSchemaJson\""));
        assert!(json.contains("\"kind\":\"fileContent\""));
        let back: Relation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn custom_properties_roundtrip() {
        let mut r = sample();
        r.source_properties = SourceProperties::Custom {
            provider: "delta".into(),
            payload: serde_json::json!({"version": 3}),
        };
        let back: Relation = serde_json::from_str(&serde_json::to_string(&r).unwrap()).unwrap();
        assert_eq!(back, r);
        assert!(back.content().is_none());
    }

    #[test]
    fn diff_reports_appended_and_deleted() {
        let tracker = FileIdTracker::new();
        let old = Content::from_files(
            &[
                FileDescriptor::new("/t/a", 1, 1),
                FileDescriptor::new("/t/b", 1, 1),
            ],
            &tracker,
        );
        let new = Content::from_files(
            &[
                FileDescriptor::new("/t/a", 1, 1),
                FileDescriptor::new("/t/b", 2, 5),
                FileDescriptor::new("/t/c", 1, 1),
            ],
            &tracker,
        );
        let u = new.diff(&old);
        let appended: Vec<_> = u.appended.iter().map(|f| f.name.as_str()).collect();
        let deleted: Vec<_> = u.deleted.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(appended, vec!["/t/b", "/t/c"]);
        assert_eq!(deleted, vec!["/t/b"]);
        assert!(old.diff(&old).is_empty());
    }

    #[test]
    fn descriptors_preserve_order() {
        let r = sample();
        let d = r.content().unwrap().descriptors();
        assert_eq!(d[0].path, std::path::PathBuf::from("/t/a.parquet"));
        assert_eq!(d[1].size, 20);
        assert_eq!(r.content().unwrap().total_size(), 30);
    }
}

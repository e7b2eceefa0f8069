use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{split_csv, SessionConf};
use crate::core::{
    signature, strip_path_option, Content, DataSchema, FileContentProperties, FileDescriptor,
    FileIdTracker, Relation, SourceError, SourceProperties, SourceResult,
};
use crate::source::handle::{DatasetHandle, FileIndex, FileRelation, InMemoryFileIndex};
use crate::source::reader::{ReadRequest, StorageReader};
use crate::source::{
    FileBasedRelationView, FileBasedSourceProvider, SourceContext, SourceProvider,
};

pub const DEFAULT_PROVIDER_NAME: &str = "default";

/// 内置支持的格式短名
pub const DEFAULT_SUPPORTED_FORMATS: [&str; 6] = ["avro", "csv", "json", "orc", "parquet", "text"];

const BASE_PATH_OPTION: &str = "basePath";

/// 内置文件源：avro/csv/json/orc/parquet/text
///
/// 只认领“可感知分区的内存文件索引 + 已注册且受支持的格式短名”。
/// 支持集合可被会话配置整体替换，且每次判断都重新读取配置。
pub struct DefaultFileBasedSource {
    conf: Arc<SessionConf>,
    reader: Arc<dyn StorageReader>,
}

impl DefaultFileBasedSource {
    pub fn new(ctx: &SourceContext) -> Self {
        Self {
            conf: ctx.conf.clone(),
            reader: ctx.reader.clone(),
        }
    }

    /// builder 入口（注册到 BuilderCatalog 的 "default"）
    pub fn build(ctx: &SourceContext) -> Arc<dyn FileBasedSourceProvider> {
        Arc::new(Self::new(ctx))
    }

    /// 大小写不敏感；覆盖串非空白时整体替换内置集合（哪怕拆不出任何格式名）
    pub fn is_supported_file_format_name(&self, name: &str) -> bool {
        let name = name.trim().to_ascii_lowercase();
        let raw = self.conf.supported_file_formats();
        if raw.trim().is_empty() {
            DEFAULT_SUPPORTED_FORMATS.contains(&name.as_str())
        } else {
            split_csv(&raw).iter().any(|f| *f == name)
        }
    }

    fn supported<'a>(&self, handle: &'a DatasetHandle) -> Option<DefaultFileBasedRelation<'a>> {
        let DatasetHandle::Files(relation) = handle else {
            return None;
        };
        let FileIndex::InMemory(index) = &relation.location else {
            return None;
        };
        let format = relation.format.short_name()?;
        if !self.is_supported_file_format_name(format) {
            return None;
        }
        Some(DefaultFileBasedRelation {
            relation,
            index,
            format: format.to_ascii_lowercase(),
        })
    }

    fn owned_properties(relation: &Relation) -> Option<&FileContentProperties> {
        match &relation.source_properties {
            SourceProperties::FileContent(p) => Some(p),
            SourceProperties::Custom { .. } => None,
        }
    }
}

impl SourceProvider for DefaultFileBasedSource {
    fn name(&self) -> &str {
        DEFAULT_PROVIDER_NAME
    }

    fn create_relation(
        &self,
        handle: &DatasetHandle,
        tracker: &FileIdTracker,
    ) -> SourceResult<Option<Relation>> {
        let Some(view) = self.supported(handle) else {
            tracing::debug!("default source declines {}", handle.describe());
            return Ok(None);
        };
        let relation = view.create_relation_metadata(tracker);
        tracing::debug!(
            "default source normalized {} ({} files)",
            handle.describe(),
            view.all_files().len()
        );
        Ok(Some(relation))
    }

    fn refresh_relation(&self, relation: &Relation) -> SourceResult<Option<Relation>> {
        let Some(previous) = Self::owned_properties(relation) else {
            return Ok(None);
        };
        let Some(handle) = self.reconstruct(relation)? else {
            return Ok(None);
        };
        let view = self.supported(&handle).ok_or_else(|| {
            SourceError::malformed(
                DEFAULT_PROVIDER_NAME,
                format!("reconstructed dataset is not supported: {}", handle.describe()),
            )
        })?;

        // 旧文件沿用原 id
        let tracker = FileIdTracker::new();
        tracker.add_file_infos(&previous.content.files);

        let mut refreshed = view.create_relation_metadata(&tracker);
        if let SourceProperties::FileContent(props) = &mut refreshed.source_properties {
            let update = props.content.diff(&previous.content);
            tracing::debug!(
                "default source refreshed {:?}: +{} -{} (max file id {:?})",
                relation.root_paths,
                update.appended.len(),
                update.deleted.len(),
                tracker.max_file_id()
            );
            props.update = (!update.is_empty()).then_some(update);
        }
        Ok(Some(refreshed))
    }

    fn signature(&self, handle: &DatasetHandle) -> SourceResult<Option<String>> {
        Ok(self.supported(handle).map(|view| view.signature()))
    }

    fn reconstruct(&self, relation: &Relation) -> SourceResult<Option<DatasetHandle>> {
        if Self::owned_properties(relation).is_none() {
            return Ok(None);
        }
        if !self.is_supported_file_format_name(&relation.file_format) {
            return Err(SourceError::malformed(
                DEFAULT_PROVIDER_NAME,
                format!("file format '{}' is no longer supported", relation.file_format),
            ));
        }
        let schema = DataSchema::from_json(&relation.data_schema_json)?;
        let handle = self.reader.read(ReadRequest {
            root_paths: relation.root_paths.iter().map(PathBuf::from).collect(),
            schema,
            format: relation.file_format.clone(),
            options: relation.options.clone(),
        })?;
        Ok(Some(handle))
    }
}

impl FileBasedSourceProvider for DefaultFileBasedSource {
    fn is_supported_relation(&self, handle: &DatasetHandle) -> SourceResult<Option<bool>> {
        Ok(self.supported(handle).map(|_| true))
    }

    fn get_relation<'a>(
        &self,
        handle: &'a DatasetHandle,
    ) -> SourceResult<Option<Box<dyn FileBasedRelationView + 'a>>> {
        Ok(self
            .supported(handle)
            .map(|v| Box::new(v) as Box<dyn FileBasedRelationView + 'a>))
    }

    fn internal_file_format_name(&self, relation: &Relation) -> SourceResult<Option<String>> {
        if Self::owned_properties(relation).is_none()
            || !self.is_supported_file_format_name(&relation.file_format)
        {
            return Ok(None);
        }
        Ok(Some(relation.file_format.clone()))
    }

    fn partition_base_path(&self, handle: &DatasetHandle) -> SourceResult<Option<String>> {
        Ok(self.supported(handle).and_then(|v| v.partition_base_path()))
    }

    fn lineage_pairs(
        &self,
        handle: &DatasetHandle,
        tracker: &FileIdTracker,
    ) -> SourceResult<Option<Vec<(String, u64)>>> {
        Ok(self.supported(handle).map(|v| v.lineage_pairs(tracker)))
    }

    fn has_parquet_as_source_format(&self, handle: &DatasetHandle) -> SourceResult<Option<bool>> {
        Ok(self
            .supported(handle)
            .map(|v| v.has_parquet_as_source_format()))
    }
}

/// 默认文件源认领后的只读视图
pub struct DefaultFileBasedRelation<'a> {
    relation: &'a FileRelation,
    index: &'a InMemoryFileIndex,
    format: String,
}

impl<'a> FileBasedRelationView for DefaultFileBasedRelation<'a> {
    fn provider(&self) -> &str {
        DEFAULT_PROVIDER_NAME
    }

    fn root_paths(&self) -> Vec<String> {
        self.index
            .root_paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }

    fn all_files(&self) -> &[FileDescriptor] {
        &self.index.files
    }

    fn options(&self) -> BTreeMap<String, String> {
        strip_path_option(self.relation.options.clone())
    }

    fn file_format(&self) -> String {
        self.format.clone()
    }

    fn data_schema(&self) -> &DataSchema {
        &self.relation.data_schema
    }

    fn partition_schema(&self) -> DataSchema {
        self.index.partition_spec.schema()
    }

    /// 分区数据集的 base path；显式 basePath 选项优先
    fn partition_base_path(&self) -> Option<String> {
        if !self.index.partition_spec.is_partitioned() {
            return None;
        }
        let explicit = self
            .relation
            .options
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(BASE_PATH_OPTION))
            .map(|(_, v)| v.clone());
        explicit.or_else(|| {
            self.index
                .partition_spec
                .base_path()
                .map(|p| p.to_string_lossy().into_owned())
        })
    }

    fn signature(&self) -> String {
        signature(&self.index.files)
    }

    fn create_relation_metadata(&self, tracker: &FileIdTracker) -> Relation {
        Relation::new(
            self.root_paths(),
            self.relation.data_schema.to_json(),
            self.format.clone(),
            self.options(),
            SourceProperties::FileContent(FileContentProperties {
                content: Content::from_files(&self.index.files, tracker),
                update: None,
            }),
        )
    }
}

//! 可插拔数据源：把不同格式的文件数据集规范化为 `Relation`，
//! 计算内容签名，并能仅凭落盘元数据重建可查询句柄。
//!
//! ## 约定（所有操作统一）
//! - `Ok(None)`：输入不归本 provider 管辖，调用方继续尝试下一个
//! - `Err(_)`：已认领的输入无法完成操作（schema 损坏、存储不可读……），直接上抛

pub mod default;
pub mod handle;
pub mod listing;
pub mod reader;
pub mod registry;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::SessionConf;
use crate::core::{
    DataSchema, FileDescriptor, FileIdTracker, Relation, SourceResult,
};

pub use default::{DefaultFileBasedRelation, DefaultFileBasedSource};
pub use handle::{DatasetHandle, FileFormat, FileIndex, FileRelation, InMemoryFileIndex};
pub use listing::{FileLister, FsFileLister};
pub use reader::{FsStorageReader, ReadRequest, StorageReader};
pub use registry::{BuilderCatalog, SourceProviderBuilder, SourceProviderRegistry};

/// provider 构建时注入的会话级上下文
#[derive(Clone)]
pub struct SourceContext {
    pub conf: Arc<SessionConf>,
    pub lister: Arc<dyn FileLister>,
    pub reader: Arc<dyn StorageReader>,
}

impl SourceContext {
    pub fn new(
        conf: Arc<SessionConf>,
        lister: Arc<dyn FileLister>,
        reader: Arc<dyn StorageReader>,
    ) -> Self {
        Self {
            conf,
            lister,
            reader,
        }
    }

    /// 本地文件系统：FsFileLister + FsStorageReader
    pub fn local(conf: Arc<SessionConf>) -> Self {
        let lister: Arc<dyn FileLister> = Arc::new(FsFileLister::new());
        let reader = Arc::new(FsStorageReader::new(lister.clone()));
        Self::new(conf, lister, reader)
    }

    /// 发现阶段：按路径/格式/schema 打开数据集
    pub fn discover(
        &self,
        root_paths: Vec<PathBuf>,
        format: &str,
        schema: DataSchema,
        options: BTreeMap<String, String>,
    ) -> SourceResult<DatasetHandle> {
        self.reader.read(ReadRequest {
            root_paths,
            schema,
            format: format.to_string(),
            options,
        })
    }
}

/// 数据源能力接口（每个存储格式家族实现一次）
pub trait SourceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// 规范化句柄；不认识的句柄返回 None
    fn create_relation(
        &self,
        handle: &DatasetHandle,
        tracker: &FileIdTracker,
    ) -> SourceResult<Option<Relation>>;

    /// 按当前存储状态重新推导 Relation
    fn refresh_relation(&self, relation: &Relation) -> SourceResult<Option<Relation>>;

    /// 直接从活句柄计算当前签名
    fn signature(&self, handle: &DatasetHandle) -> SourceResult<Option<String>>;

    /// `create_relation` 的逆：仅凭落盘元数据重建活句柄
    fn reconstruct(&self, relation: &Relation) -> SourceResult<Option<DatasetHandle>>;
}

/// 基于文件的数据源：在 SourceProvider 之上提供更窄的只读查询。
///
/// 每个查询独立可选：默认实现一律返回 `Ok(None)`。
pub trait FileBasedSourceProvider: SourceProvider {
    fn is_supported_relation(&self, _handle: &DatasetHandle) -> SourceResult<Option<bool>> {
        Ok(None)
    }

    fn get_relation<'a>(
        &self,
        _handle: &'a DatasetHandle,
    ) -> SourceResult<Option<Box<dyn FileBasedRelationView + 'a>>> {
        Ok(None)
    }

    /// 读取索引数据时使用的内部格式名
    fn internal_file_format_name(&self, _relation: &Relation) -> SourceResult<Option<String>> {
        Ok(None)
    }

    fn partition_base_path(&self, _handle: &DatasetHandle) -> SourceResult<Option<String>> {
        Ok(None)
    }

    /// (文件路径, 文件 id) 血缘对
    fn lineage_pairs(
        &self,
        _handle: &DatasetHandle,
        _tracker: &FileIdTracker,
    ) -> SourceResult<Option<Vec<(String, u64)>>> {
        Ok(None)
    }

    fn has_parquet_as_source_format(&self, _handle: &DatasetHandle) -> SourceResult<Option<bool>> {
        Ok(None)
    }
}

/// 已认领句柄的只读视图：文件列表、选项、签名等
pub trait FileBasedRelationView {
    fn provider(&self) -> &str;
    fn root_paths(&self) -> Vec<String>;
    fn all_files(&self) -> &[FileDescriptor];
    /// 已剔除 "path"
    fn options(&self) -> BTreeMap<String, String>;
    fn file_format(&self) -> String;
    fn data_schema(&self) -> &DataSchema;
    fn partition_schema(&self) -> DataSchema;
    fn partition_base_path(&self) -> Option<String>;
    fn signature(&self) -> String;
    fn create_relation_metadata(&self, tracker: &FileIdTracker) -> Relation;

    fn has_parquet_as_source_format(&self) -> bool {
        self.file_format() == "parquet"
    }

    fn lineage_pairs(&self, tracker: &FileIdTracker) -> Vec<(String, u64)> {
        self.all_files()
            .iter()
            .map(|f| (f.path_string(), tracker.add_file(f)))
            .collect()
    }
}

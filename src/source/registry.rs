use std::fmt;
use std::sync::Arc;

use crate::core::{FileIdTracker, Relation, SourceError, SourceResult};
use crate::source::default::{DefaultFileBasedSource, DEFAULT_PROVIDER_NAME};
use crate::source::handle::DatasetHandle;
use crate::source::{FileBasedRelationView, FileBasedSourceProvider, SourceContext};

/// provider 工厂：注册时调用一次，注入会话上下文
pub trait SourceProviderBuilder: Send + Sync {
    fn build(&self, ctx: &SourceContext) -> Arc<dyn FileBasedSourceProvider>;
}

impl<F> SourceProviderBuilder for F
where
    F: Fn(&SourceContext) -> Arc<dyn FileBasedSourceProvider> + Send + Sync,
{
    fn build(&self, ctx: &SourceContext) -> Arc<dyn FileBasedSourceProvider> {
        self(ctx)
    }
}

/// builder 名 -> 工厂（显式注册，不做反射式发现）
#[derive(Clone, Default)]
pub struct BuilderCatalog {
    builders: Vec<(String, Arc<dyn SourceProviderBuilder>)>,
}

impl BuilderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置 "default"
    pub fn with_defaults() -> Self {
        let mut c = Self::new();
        c.register(DEFAULT_PROVIDER_NAME, Arc::new(DefaultFileBasedSource::build));
        c
    }

    /// 同名覆盖（测试时替换实现）
    pub fn register(&mut self, name: &str, builder: Arc<dyn SourceProviderBuilder>) {
        let name = name.trim().to_ascii_lowercase();
        match self.builders.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = builder,
            None => self.builders.push((name, builder)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceProviderBuilder>> {
        let name = name.trim().to_ascii_lowercase();
        self.builders
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, b)| b.clone())
    }

}

/// 有序 provider 链
///
/// ## 契约（重要）
/// - 按注册顺序逐个尝试，第一个 `Some` 胜出；全部 `None` 时返回 `None`
/// - 任一 provider 返回 `Err` 立即上抛，后续 provider 不再尝试
/// - 不重排、不缓存“上次命中”的 provider、不并行派发
/// - 构建后只读，可在线程间无锁共享
pub struct SourceProviderRegistry {
    providers: Vec<Arc<dyn FileBasedSourceProvider>>,
}

impl fmt::Debug for SourceProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceProviderRegistry")
            .field("providers", &self.provider_names())
            .finish()
    }
}

impl SourceProviderRegistry {
    /// 按给定顺序构建，每个 builder 调用一次
    pub fn new(ctx: &SourceContext, builders: &[Arc<dyn SourceProviderBuilder>]) -> Self {
        let providers = builders.iter().map(|b| b.build(ctx)).collect();
        Self { providers }
    }

    /// 从会话配置读取 builder 顺序并解析
    pub fn from_conf(ctx: &SourceContext, catalog: &BuilderCatalog) -> SourceResult<Self> {
        let names = ctx.conf.source_builders();
        let builders = names
            .iter()
            .map(|n| {
                catalog
                    .get(n)
                    .ok_or_else(|| SourceError::UnknownBuilder(n.clone()))
            })
            .collect::<SourceResult<Vec<_>>>()?;
        let registry = Self::new(ctx, &builders);
        tracing::info!("Source providers registered: {:?}", registry.provider_names());
        Ok(registry)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// 返回第一个认领者及其结果
    fn first_claim<T, F>(
        &self,
        op: &str,
        f: F,
    ) -> SourceResult<Option<(&Arc<dyn FileBasedSourceProvider>, T)>>
    where
        F: Fn(&dyn FileBasedSourceProvider) -> SourceResult<Option<T>>,
    {
        for p in &self.providers {
            if let Some(v) = f(p.as_ref())? {
                tracing::debug!("{}: claimed by provider '{}'", op, p.name());
                return Ok(Some((p, v)));
            }
        }
        tracing::debug!("{}: no provider claimed the input", op);
        Ok(None)
    }

    fn first_match<T, F>(&self, op: &str, f: F) -> SourceResult<Option<T>>
    where
        F: Fn(&dyn FileBasedSourceProvider) -> SourceResult<Option<T>>,
    {
        Ok(self.first_claim(op, f)?.map(|(_, v)| v))
    }

    pub fn create_relation(
        &self,
        handle: &DatasetHandle,
        tracker: &FileIdTracker,
    ) -> SourceResult<Option<Relation>> {
        self.first_match("create_relation", |p| p.create_relation(handle, tracker))
    }

    pub fn refresh_relation(&self, relation: &Relation) -> SourceResult<Option<Relation>> {
        self.first_match("refresh_relation", |p| p.refresh_relation(relation))
    }

    pub fn signature(&self, handle: &DatasetHandle) -> SourceResult<Option<String>> {
        self.first_match("signature", |p| p.signature(handle))
    }

    pub fn reconstruct(&self, relation: &Relation) -> SourceResult<Option<DatasetHandle>> {
        self.first_match("reconstruct", |p| p.reconstruct(relation))
    }

    /// 同 reconstruct，并带回认领的 provider。
    ///
    /// 重建出的句柄后续的签名、视图查询应交给同一个 provider，
    /// 否则排在前面、认领范围更宽的 provider 会截走这些查询。
    pub fn reconstruct_with_provider(
        &self,
        relation: &Relation,
    ) -> SourceResult<Option<(Arc<dyn FileBasedSourceProvider>, DatasetHandle)>> {
        Ok(self
            .first_claim("reconstruct", |p| p.reconstruct(relation))?
            .map(|(p, handle)| (Arc::clone(p), handle)))
    }

    pub fn is_supported_relation(&self, handle: &DatasetHandle) -> SourceResult<Option<bool>> {
        self.first_match("is_supported_relation", |p| p.is_supported_relation(handle))
    }

    pub fn get_relation<'a>(
        &self,
        handle: &'a DatasetHandle,
    ) -> SourceResult<Option<Box<dyn FileBasedRelationView + 'a>>> {
        self.first_match("get_relation", |p| p.get_relation(handle))
    }

    pub fn internal_file_format_name(&self, relation: &Relation) -> SourceResult<Option<String>> {
        self.first_match("internal_file_format_name", |p| {
            p.internal_file_format_name(relation)
        })
    }

    pub fn partition_base_path(&self, handle: &DatasetHandle) -> SourceResult<Option<String>> {
        self.first_match("partition_base_path", |p| p.partition_base_path(handle))
    }

    pub fn lineage_pairs(
        &self,
        handle: &DatasetHandle,
        tracker: &FileIdTracker,
    ) -> SourceResult<Option<Vec<(String, u64)>>> {
        self.first_match("lineage_pairs", |p| p.lineage_pairs(handle, tracker))
    }

    pub fn has_parquet_as_source_format(
        &self,
        handle: &DatasetHandle,
    ) -> SourceResult<Option<bool>> {
        self.first_match("has_parquet_as_source_format", |p| {
            p.has_parquet_as_source_format(handle)
        })
    }

    /// 同 create_relation，但“无人认领”转为 Unsupported 错误
    pub fn require_relation(
        &self,
        handle: &DatasetHandle,
        tracker: &FileIdTracker,
    ) -> SourceResult<Relation> {
        self.create_relation(handle, tracker)?
            .ok_or_else(|| SourceError::Unsupported(handle.describe()))
    }

    pub fn require_signature(&self, handle: &DatasetHandle) -> SourceResult<String> {
        self.signature(handle)?
            .ok_or_else(|| SourceError::Unsupported(handle.describe()))
    }

    pub fn require_reconstruct(&self, relation: &Relation) -> SourceResult<DatasetHandle> {
        self.reconstruct(relation)?.ok_or_else(|| {
            SourceError::Unsupported(format!(
                "{} relation at {:?}",
                relation.file_format, relation.root_paths
            ))
        })
    }

    pub fn require_refresh(&self, relation: &Relation) -> SourceResult<Relation> {
        self.refresh_relation(relation)?.ok_or_else(|| {
            SourceError::Unsupported(format!(
                "{} relation at {:?}",
                relation.file_format, relation.root_paths
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceProvider;
    use crate::config::{SessionConf, FILE_BASED_BUILDERS};
    use crate::core::{DataSchema, SourceProperties};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 认领所有 Other 句柄的桩 provider
    struct StubProvider {
        name: String,
        claims: bool,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl StubProvider {
        fn relation(&self) -> Relation {
            Relation::new(
                vec![format!("/{}", self.name)],
                DataSchema::default().to_json(),
                "stub",
                BTreeMap::new(),
                SourceProperties::Custom {
                    provider: self.name.clone(),
                    payload: serde_json::Value::Null,
                },
            )
        }

        fn claim<T>(&self, v: T) -> SourceResult<Option<T>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SourceError::malformed(&self.name, "boom"));
            }
            Ok(self.claims.then_some(v))
        }
    }

    impl SourceProvider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn create_relation(
            &self,
            _handle: &DatasetHandle,
            _tracker: &FileIdTracker,
        ) -> SourceResult<Option<Relation>> {
            self.claim(self.relation())
        }

        fn refresh_relation(&self, _relation: &Relation) -> SourceResult<Option<Relation>> {
            self.claim(self.relation())
        }

        fn signature(&self, _handle: &DatasetHandle) -> SourceResult<Option<String>> {
            self.claim(self.name.clone())
        }

        fn reconstruct(&self, _relation: &Relation) -> SourceResult<Option<DatasetHandle>> {
            self.claim(DatasetHandle::Other {
                kind: self.name.clone(),
            })
        }
    }

    impl FileBasedSourceProvider for StubProvider {}

    fn stub(
        name: &str,
        claims: bool,
        fail: bool,
    ) -> (Arc<dyn SourceProviderBuilder>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let name = name.to_string();
        let builder = move |_: &SourceContext| -> Arc<dyn FileBasedSourceProvider> {
            Arc::new(StubProvider {
                name: name.clone(),
                claims,
                fail,
                calls: c.clone(),
            })
        };
        let builder: Arc<dyn SourceProviderBuilder> = Arc::new(builder);
        (builder, calls)
    }

    fn ctx() -> SourceContext {
        SourceContext::local(Arc::new(SessionConf::new()))
    }

    fn other() -> DatasetHandle {
        DatasetHandle::Other { kind: "x".into() }
    }

    #[test]
    fn first_registered_provider_wins() {
        let (a, a_calls) = stub("first", true, false);
        let (b, b_calls) = stub("second", true, false);
        let reg = SourceProviderRegistry::new(&ctx(), &[a, b]);

        let tracker = FileIdTracker::new();
        let rel = reg.create_relation(&other(), &tracker).unwrap().unwrap();
        assert_eq!(rel.root_paths, vec!["/first"]);
        assert_eq!(reg.signature(&other()).unwrap().as_deref(), Some("first"));
        assert_eq!(
            reg.reconstruct(&rel).unwrap(),
            Some(DatasetHandle::Other { kind: "first".into() })
        );
        assert_eq!(a_calls.load(Ordering::SeqCst), 3);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn falls_through_declining_providers() {
        let (a, a_calls) = stub("first", false, false);
        let (b, _) = stub("second", true, false);
        let reg = SourceProviderRegistry::new(&ctx(), &[a, b]);
        assert_eq!(reg.signature(&other()).unwrap().as_deref(), Some("second"));
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn all_declining_is_none_not_error() {
        let (a, _) = stub("first", false, false);
        let reg = SourceProviderRegistry::new(&ctx(), &[a]);
        assert!(reg.signature(&other()).unwrap().is_none());
        assert!(reg.is_supported_relation(&other()).unwrap().is_none());
        assert!(matches!(
            reg.require_signature(&other()),
            Err(SourceError::Unsupported(_))
        ));
    }

    #[test]
    fn hard_failure_stops_dispatch() {
        let (a, _) = stub("broken", true, true);
        let (b, b_calls) = stub("second", true, false);
        let reg = SourceProviderRegistry::new(&ctx(), &[a, b]);
        assert!(matches!(
            reg.signature(&other()),
            Err(SourceError::MalformedInput { .. })
        ));
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn narrow_queries_default_to_none() {
        let (a, _) = stub("first", true, false);
        let reg = SourceProviderRegistry::new(&ctx(), &[a]);
        assert!(reg.partition_base_path(&other()).unwrap().is_none());
        assert!(reg.has_parquet_as_source_format(&other()).unwrap().is_none());
        assert!(reg.get_relation(&other()).unwrap().is_none());
    }

    #[test]
    fn from_conf_follows_configured_order() {
        let ctx = ctx();
        let mut catalog = BuilderCatalog::with_defaults();
        let (a, _) = stub("custom", true, false);
        catalog.register("Custom", a);

        let reg = SourceProviderRegistry::from_conf(&ctx, &catalog).unwrap();
        assert_eq!(reg.provider_names(), vec!["default"]);

        ctx.conf.set(FILE_BASED_BUILDERS, "custom,default");
        let reg = SourceProviderRegistry::from_conf(&ctx, &catalog).unwrap();
        assert_eq!(reg.provider_names(), vec!["custom", "default"]);
        assert_eq!(reg.signature(&other()).unwrap().as_deref(), Some("custom"));

        ctx.conf.set(FILE_BASED_BUILDERS, "default,missing");
        assert!(matches!(
            SourceProviderRegistry::from_conf(&ctx, &catalog),
            Err(SourceError::UnknownBuilder(n)) if n == "missing"
        ));
    }

    #[test]
    fn default_source_through_registry() {
        let root = std::env::temp_dir().join(format!(
            "fd-sources-registry-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), b"hello").unwrap();

        let ctx = ctx();
        let reg = SourceProviderRegistry::from_conf(&ctx, &BuilderCatalog::with_defaults()).unwrap();
        let handle = ctx
            .discover(vec![root.clone()], "text", DataSchema::default(), BTreeMap::new())
            .unwrap();

        let tracker = FileIdTracker::new();
        let rel = reg.require_relation(&handle, &tracker).unwrap();
        assert_eq!(reg.internal_file_format_name(&rel).unwrap().as_deref(), Some("text"));
        let rebuilt = reg.require_reconstruct(&rel).unwrap();
        assert_eq!(
            reg.require_signature(&rebuilt).unwrap(),
            reg.require_signature(&handle).unwrap()
        );
        assert_eq!(
            reg.lineage_pairs(&handle, &tracker).unwrap().unwrap()[0].1,
            0
        );
        assert!(reg
            .require_relation(&DatasetHandle::Other { kind: "kafka".into() }, &tracker)
            .is_err());
    }
}

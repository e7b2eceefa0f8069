use crate::core::{Content, FileIdTracker, SourceError, SourceResult, Update};
use crate::source::SourceProviderRegistry;
use crate::storage::IndexLogEntry;

/// 新鲜度判定结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale {
        recorded: String,
        current: String,
        /// 相对落盘内容的文件增量（provider 不提供内容清单时为空）
        update: Update,
    },
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh)
    }
}

/// 重建落盘的 Relation，重算签名并与记录值比对。
///
/// 签名和文件清单都由重建该 Relation 的 provider 给出，不再走一遍注册链。
/// 无 provider 认领时返回 None；重建/列举失败直接上抛。
pub fn check_freshness(
    registry: &SourceProviderRegistry,
    entry: &IndexLogEntry,
) -> SourceResult<Option<Freshness>> {
    let Some((provider, handle)) = registry.reconstruct_with_provider(&entry.relation)? else {
        return Ok(None);
    };
    let Some(current) = provider.signature(&handle)? else {
        return Ok(None);
    };

    if current == entry.signature {
        return Ok(Some(Freshness::Fresh));
    }

    let update = match (entry.relation.content(), provider.get_relation(&handle)?) {
        (Some(previous), Some(view)) => {
            Content::from_files(view.all_files(), &FileIdTracker::new()).diff(previous)
        }
        _ => Update::default(),
    };

    tracing::info!(
        "Index '{}' is stale: +{} -{} files",
        entry.name,
        update.appended.len(),
        update.deleted.len()
    );

    Ok(Some(Freshness::Stale {
        recorded: entry.signature.clone(),
        current,
        update,
    }))
}

/// 刷新索引日志：重新推导 Relation 并记录新签名。
///
/// 签名在刷新之后单独列举计算；两次列举之间若有写入，下次检查会判为 stale，不会误判为新鲜。
pub fn refresh_entry(
    registry: &SourceProviderRegistry,
    entry: &IndexLogEntry,
) -> SourceResult<IndexLogEntry> {
    let relation = registry.require_refresh(&entry.relation)?;
    let (provider, handle) = registry
        .reconstruct_with_provider(&relation)?
        .ok_or_else(|| SourceError::Unsupported(format!("{:?}", relation.root_paths)))?;
    let signature = provider
        .signature(&handle)?
        .ok_or_else(|| SourceError::Unsupported(handle.describe()))?;
    Ok(IndexLogEntry::new(entry.name.clone(), relation, signature))
}

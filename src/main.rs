use clap::{Parser, Subcommand};
use fd_sources::core::DataSchema;
use fd_sources::{
    check_freshness, refresh_entry, BuilderCatalog, FileIdTracker, Freshness, IndexLogEntry,
    MetadataStore, SessionConf, SourceContext, SourceProviderRegistry,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fd-sources", version, about = "File-based source relations and content signatures")]
struct Cli {
    /// 配置文件（默认 <config_dir>/fd-sources/config.toml，存在时加载）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 覆盖配置项 key=value（可重复）
    #[arg(long = "conf", global = true, value_parser = parse_key_val)]
    conf: Vec<(String, String)>,

    /// 索引元数据目录
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 计算数据集当前签名
    Signature {
        #[arg(long)]
        format: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// 规范化数据集并记录到索引元数据
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        format: String,
        /// schema JSON 文件
        #[arg(long)]
        schema: Option<PathBuf>,
        /// 读选项 key=value（可重复；"path" 会被剔除）
        #[arg(long = "option", value_parser = parse_key_val)]
        options: Vec<(String, String)>,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// 比对记录签名与当前签名
    Check { name: String },
    /// 重新推导 Relation 并更新签名
    Refresh { name: String },
    /// 打印索引元数据
    Show { name: String },
    /// 列出已记录的索引
    List,
    /// 删除索引元数据
    Remove { name: String },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn load_conf(cli: &Cli) -> anyhow::Result<SessionConf> {
    let conf = match &cli.config {
        Some(path) => SessionConf::load_toml(path)?,
        None => match SessionConf::default_path().filter(|p| p.exists()) {
            Some(path) => SessionConf::load_toml(&path)?,
            None => SessionConf::new(),
        },
    };
    for (k, v) in &cli.conf {
        conf.set(k, v.clone());
    }
    Ok(conf)
}

fn store_dir(cli: &Cli) -> PathBuf {
    cli.store.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fd-sources")
            .join("indexes")
    })
}

async fn load_entry(store: &MetadataStore, name: &str) -> anyhow::Result<IndexLogEntry> {
    store
        .load(name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no valid index log for '{}' in {:?}", name, store.dir()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let conf = Arc::new(load_conf(&cli)?);
    let ctx = SourceContext::local(conf);
    let registry = SourceProviderRegistry::from_conf(&ctx, &BuilderCatalog::with_defaults())?;
    let store = MetadataStore::new(store_dir(&cli));

    match &cli.command {
        Command::Signature { format, paths } => {
            let handle =
                ctx.discover(paths.clone(), format, DataSchema::default(), BTreeMap::new())?;
            println!("{}", registry.require_signature(&handle)?);
        }
        Command::Create {
            name,
            format,
            schema,
            options,
            paths,
        } => {
            let schema = match schema {
                Some(p) => DataSchema::from_json(&std::fs::read_to_string(p)?)?,
                None => DataSchema::default(),
            };
            let options: BTreeMap<String, String> = options.iter().cloned().collect();
            let handle = ctx.discover(paths.clone(), format, schema, options)?;

            let relation = registry.require_relation(&handle, &FileIdTracker::new())?;
            let signature = registry.require_signature(&handle)?;
            let entry = IndexLogEntry::new(name.clone(), relation, signature);
            store.save(&entry).await?;
            info!("Created index log '{}' with signature {}", name, entry.signature);
            println!("{}", entry.signature);
        }
        Command::Check { name } => {
            let entry = load_entry(&store, name).await?;
            match check_freshness(&registry, &entry)? {
                Some(Freshness::Fresh) => println!("fresh {}", entry.signature),
                Some(Freshness::Stale {
                    recorded,
                    current,
                    update,
                }) => {
                    println!("stale {} -> {}", recorded, current);
                    for f in &update.appended {
                        println!("  + {}", f.name);
                    }
                    for f in &update.deleted {
                        println!("  - {}", f.name);
                    }
                }
                None => anyhow::bail!("no index-capable source provider found for '{}'", name),
            }
        }
        Command::Refresh { name } => {
            let entry = load_entry(&store, name).await?;
            let refreshed = refresh_entry(&registry, &entry)?;
            store.save(&refreshed).await?;
            println!("{}", refreshed.signature);
        }
        Command::Show { name } => {
            let entry = load_entry(&store, name).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Command::List => {
            for name in store.list().await? {
                println!("{}", name);
            }
        }
        Command::Remove { name } => {
            if !store.remove(name).await? {
                anyhow::bail!("no index log named '{}'", name);
            }
            info!("Removed index log '{}'", name);
        }
    }

    Ok(())
}

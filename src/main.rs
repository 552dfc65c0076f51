//! Demo binary: fork a small document tree, edit both sides, merge.

use evees::{
    default_registry, Client, Evees, MemoryCas, MemoryRemote, MergeConfig, OnMemoryClient,
    RecursiveContextMerge, RouterClient, UpdateRequest,
};
use evees_cas::Cid;
use evees_client::CacheClient;
use evees_core::{now_timestamp, CommitBuilder};
use serde_json::json;
use std::sync::Arc;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    if let Err(err) = rt.block_on(run()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> evees::Result<()> {
    let store = Arc::new(MemoryCas::new());
    let remote = Arc::new(MemoryRemote::new("memory", "alice", store.clone()));
    let router = Arc::new(RouterClient::new(vec![remote], store));
    let cache = Arc::new(CacheClient::new(router));
    let overlay = Arc::new(OnMemoryClient::new(cache));
    let evees = Evees::new(overlay, Arc::new(default_registry()), "alice");

    // A document: a root node with one nested page perspective.
    let page = node(&evees, "page1", "first page", vec![]).await?;
    let root = node(&evees, "root", "my document", vec![page.to_hex()]).await?;
    evees.client().flush().await?;
    println!("document {} with page {}", root.short(), page.short());

    // Fork the whole tree and edit the forked page.
    let fork = evees.fork_perspective(&root, None, None).await?;
    let fork_data = evees
        .perspective_data(&fork)
        .await?
        .ok_or_else(|| evees_core::EveesError::PerspectiveNotFound(fork))?;
    let forked_page_link = &evees.children_of(&fork_data.object)[0];
    let forked_page = Cid::from_hex(forked_page_link)
        .ok_or_else(|| evees_core::EveesError::Serialization(forked_page_link.clone()))?;
    commit_on(&evees, &forked_page, "first page, revised", vec![]).await?;
    println!("forked as {} and edited its page", fork.short());

    // Merge the fork back: the original page absorbs the edit, no
    // duplicate sibling appears.
    RecursiveContextMerge::new()
        .merge_perspectives(&root, &fork, &evees, &MergeConfig::new())
        .await?;
    evees.client().flush().await?;

    let merged = evees
        .perspective_data(&page)
        .await?
        .ok_or_else(|| evees_core::EveesError::PerspectiveNotFound(page))?;
    println!("merged page text: {}", merged.object["text"]);
    Ok(())
}

async fn node(
    evees: &Evees,
    context: &str,
    text: &str,
    links: Vec<String>,
) -> evees::Result<Cid> {
    let data = evees
        .client()
        .store_objects(vec![json!({ "text": text, "links": links })])
        .await?;
    let commit = CommitBuilder::new()
        .with_creator(evees.user_id())
        .with_timestamp(now_timestamp())
        .with_data(data[0].id)
        .build();
    let head = evees.store_commit(&commit).await?;
    evees
        .create_perspective(context, "memory", Some(head), None)
        .await
}

async fn commit_on(
    evees: &Evees,
    perspective_id: &Cid,
    text: &str,
    links: Vec<String>,
) -> evees::Result<()> {
    let data = evees
        .client()
        .store_objects(vec![json!({ "text": text, "links": links })])
        .await?;
    let old_head = evees.head_of(perspective_id).await?;
    let commit = CommitBuilder::new()
        .with_creator(evees.user_id())
        .with_timestamp(now_timestamp())
        .with_parents(old_head.into_iter().collect())
        .with_data(data[0].id)
        .build();
    let new_head = evees.store_commit(&commit).await?;
    evees
        .update_head(UpdateRequest {
            perspective_id: *perspective_id,
            new_head_id: new_head,
            old_head_id: old_head,
            from_perspective_id: None,
        })
        .await
}

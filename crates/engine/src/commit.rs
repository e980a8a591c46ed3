//! Commit pipeline orchestration (spec.md §4.7): the sixteen numbered steps,
//! built on the mechanics [`fsfs_durability::commit`] and
//! [`fsfs_concurrency`] already provide.

use crate::config::RepoConfig;
use crate::noderev;
use crate::tree::{self, EngineDeltaSource, HistoryIndex};
use crate::txn::Transaction;
use fsfs_concurrency::{get_writable_proto_rev, unlock_proto_rev, RepoWriteLock, TxnRegistry};
use fsfs_core::node::RepOrigin;
use fsfs_core::{Cancel, Error, NodeId, NodeKind, NodeRev, Rep, Result, Rev};
use fsfs_durability::{
    check_locks, choose_delta_base, fsync_proto_rev, insert_rep_cache_batch, publish_revision, publish_revprops,
    reconstruct, DeltaBase, InMemoryRepCache, RepCache, RepresentationWriter,
};
use fsfs_storage::changes_journal::{fold, read_all};
use fsfs_storage::current::{bump_current, read_current, CurrentContents, LegacyCounters};
use fsfs_storage::{Layout, RevisionTrailer};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Seek;
use tracing::info;

/// Bookkeeping carried through the recursive tree walk. `rep_cache` is
/// threaded as a plain argument to [`finalize_node`] rather than stored
/// here, so its borrow doesn't have to live as long as this context does.
struct FinalizeCtx<'a> {
    layout: &'a Layout,
    history: &'a mut HistoryIndex,
    in_memory: &'a mut InMemoryRepCache,
    config: &'a RepoConfig,
    txn_id: fsfs_core::TxnId,
    new_rev: Rev,
    youngest: Rev,
    initial_offset: u64,
    rep_rows: Vec<(String, Rep)>,
    id_rewrites: HashMap<NodeId, NodeId>,
    cancel: Option<&'a dyn Cancel>,
}

/// Runs the full commit pipeline for `txn` and returns the newly published
/// revision. Takes the pieces of [`crate::repo::Repo`] it needs by
/// reference rather than the whole struct so the borrow checker can see
/// this never aliases `registry`/`rep_cache` against each other.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
    layout: &Layout,
    registry: &TxnRegistry,
    rep_cache: &mut RepCache,
    config: &RepoConfig,
    history: &mut HistoryIndex,
    youngest: &mut Rev,
    mut txn: Transaction,
) -> Result<Rev> {
    txn.journal.flush()?;

    let old_rev = read_current(layout)?.rev();
    if txn.base_rev != old_rev {
        return Err(Error::TxnOutOfDate { base_rev: txn.base_rev.0, youngest: old_rev.0 });
    }

    let records = read_all(&layout.txn_changes_file(&txn.id))?;
    check_locks(&records, &txn.held_locks)?;
    let folded = fold(&records)?;

    let repo_lock = RepoWriteLock::try_acquire(layout)?;

    // Re-check under the write lock: another committer may have landed a
    // revision between our first read and acquiring the lock.
    let old_rev = read_current(layout)?.rev();
    if txn.base_rev != old_rev {
        drop(repo_lock);
        return Err(Error::TxnOutOfDate { base_rev: txn.base_rev.0, youngest: old_rev.0 });
    }
    let new_rev = old_rev.next();

    let (proto_rev, cookie) = get_writable_proto_rev(registry, layout, &txn.id)?;
    let initial_offset = proto_rev.metadata()?.len();

    let mut in_memory = InMemoryRepCache::new();
    let mut ctx = FinalizeCtx {
        layout,
        history,
        in_memory: &mut in_memory,
        config,
        txn_id: txn.id.clone(),
        new_rev,
        youngest: *youngest,
        initial_offset,
        rep_rows: Vec::new(),
        id_rewrites: HashMap::new(),
        cancel: None,
    };
    for (offset, chain_len) in &txn.pending_chain_lengths {
        ctx.history.record_chain_length(&placeholder_rep(new_rev, *offset), *chain_len);
    }

    let root_id = txn.root_id.clone();
    let (mut proto_rev, _final_root_id, root_offset) = finalize_node(&mut ctx, &*rep_cache, &mut txn.tree, proto_rev, &root_id)?;

    let changed_paths_offset = proto_rev.metadata()?.len();
    fsfs_storage::changes_journal::write_folded(&mut proto_rev, &folded)?;

    RevisionTrailer { root_offset, changed_paths_offset }.write(&mut proto_rev)?;

    fsync_proto_rev(&proto_rev)?;
    publish_revision(layout, &txn.id, new_rev)?;
    drop(proto_rev);
    unlock_proto_rev(cookie);

    publish_revprops(layout, &txn.id, new_rev)?;

    let new_current = match read_current(layout)? {
        CurrentContents::Modern(_) => CurrentContents::Modern(new_rev),
        CurrentContents::Legacy(_, counters) => CurrentContents::Legacy(
            new_rev,
            LegacyCounters {
                next_node_id: counters.next_node_id + txn.next_node_ctr,
                next_copy_id: counters.next_copy_id + txn.next_copy_ctr,
            },
        ),
    };
    bump_current(layout, &new_current)?;
    *youngest = new_rev;

    // The revision is durably committed at this point (current already
    // bumped), so a failure purging the workspace is logged, not propagated.
    registry.purge(&txn.id);
    match std::fs::remove_dir_all(layout.txn_dir(&txn.id)) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(txn = %txn.id, error = %e, "failed to purge transaction directory after commit"),
    }

    drop(repo_lock);

    update_history_paths(&mut ctx, &txn, &folded);

    insert_rep_cache_batch(rep_cache, &ctx.rep_rows)?;

    info!(rev = new_rev.0, txn = %txn.id, "committed revision");
    Ok(new_rev)
}

/// Depth-first, lexicographically-ordered finalization of every mutable
/// node under `id` (spec.md §4.7 step 5). An untouched (non-provisional)
/// node is returned unchanged without recursing further, since it was
/// never loaded into the mutable tree in the first place.
fn finalize_node(
    ctx: &mut FinalizeCtx,
    rep_cache: &RepCache,
    tree: &mut crate::tree::MutableTree,
    mut proto_rev: File,
    id: &NodeId,
) -> Result<(File, NodeId, u64)> {
    if !id.is_provisional() {
        let offset = proto_rev.stream_position()?;
        return Ok((proto_rev, id.clone(), offset));
    }
    if let Some(cancel) = ctx.cancel {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
    }

    let mut nr = tree.node(id).cloned().ok_or_else(|| Error::corrupt("missing mutable node during commit walk"))?;

    if nr.kind == NodeKind::Dir {
        let children = tree.children_of(id).cloned().unwrap_or_default();
        let mut new_children = BTreeMap::new();
        for (name, child_id) in children {
            let (f, final_child_id, _child_offset) = finalize_node(ctx, rep_cache, tree, proto_rev, &child_id)?;
            proto_rev = f;
            new_children.insert(name, final_child_id);
        }

        let predecessor_count = nr.predecessor_count;
        let base = if predecessor_count == 0 {
            None
        } else {
            let source = EngineDeltaSource { tree: &*tree, history: &*ctx.history };
            choose_delta_base(&source, id, predecessor_count, ctx.new_rev, false, ctx.config.delta_limits)?
        };
        let delta_base = match &base {
            Some(rep) => Some(DeltaBase { rep: rep.clone(), expanded_content: reconstruct(ctx.layout, rep)? }),
            None => None,
        };

        let content = tree::encode_entries(&new_children);
        let mut writer = RepresentationWriter::begin(proto_rev, ctx.txn_id.clone(), delta_base, None)?;
        writer.write(&content);
        let outcome = writer.close(ctx.layout, Some(rep_cache), Some(&mut *ctx.in_memory), ctx.youngest, ctx.config.enable_rep_sharing)?;
        proto_rev = outcome.proto_rev;

        let mut rep = outcome.rep;
        let was_literal = rep.is_mutable();
        finalize_rep(&mut rep, ctx.new_rev, &mut ctx.rep_rows);
        if was_literal {
            let chain_len = tree::next_chain_length(&*ctx.history, base.as_ref());
            ctx.history.record_chain_length(&rep, chain_len);
        }
        nr.data_rep = Some(rep);

        let final_id = id.finalize(ctx.new_rev);
        ctx.history.record_dir_listing(final_id.clone(), new_children);
        let offset = finish_node(ctx, &mut proto_rev, id, nr, final_id.clone())?;
        return Ok((proto_rev, final_id, offset));
    }

    if let Some(rep) = &mut nr.data_rep {
        if rep.is_mutable() {
            if rep.offset + rep.size > ctx.initial_offset {
                return Err(Error::corrupt("file representation extends past this commit's recorded proto-rev start"));
            }
            finalize_rep(rep, ctx.new_rev, &mut ctx.rep_rows);
        }
    }
    let final_id = id.finalize(ctx.new_rev);
    let offset = finish_node(ctx, &mut proto_rev, id, nr, final_id.clone())?;
    Ok((proto_rev, final_id, offset))
}

/// Rewrites `nr`'s id to its final permanent form, writes its node-rev
/// record at the proto-rev file's current position, and records both the
/// rewrite and the finalized node-rev in history (spec.md §4.7 step 5's
/// "rewrite the node id ... write the node-rev record"). Returns the offset
/// the record was written at.
fn finish_node(ctx: &mut FinalizeCtx, proto_rev: &mut File, provisional_id: &NodeId, mut nr: NodeRev, final_id: NodeId) -> Result<u64> {
    let offset = proto_rev.stream_position()?;
    nr.id = final_id.clone();
    noderev::write_placeholder(proto_rev, &nr)?;
    ctx.id_rewrites.insert(provisional_id.clone(), final_id.clone());
    ctx.history.record_node_rev(final_id, nr);
    Ok(offset)
}

/// Promotes a freshly-written mutable rep to committed at `new_rev`,
/// leaving an already-shared (already-`Committed`) rep untouched, and
/// queues it for the rep-cache batch insert if it was a fresh literal write.
fn finalize_rep(rep: &mut Rep, new_rev: Rev, rows: &mut Vec<(String, Rep)>) {
    if !rep.is_mutable() {
        return;
    }
    rep.finalize(new_rev, rep.offset);
    if let Some(sha1) = rep.sha1 {
        rows.push((hex_encode(&sha1), rep.clone()));
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn placeholder_rep(revision: Rev, offset: u64) -> Rep {
    Rep { revision, offset, size: 0, expanded_size: 0, md5: [0; 16], sha1: None, origin: RepOrigin::Committed, uniquifier: None }
}

/// After a successful commit, folds the committed-paths index forward:
/// forgets deleted/replaced subtrees, then records every path this
/// transaction actually touched under its final permanent id.
fn update_history_paths(ctx: &mut FinalizeCtx, txn: &Transaction, folded: &BTreeMap<String, fsfs_core::ChangeRecord>) {
    use fsfs_core::ChangeKind;
    for (path, change) in folded {
        if matches!(change.kind, ChangeKind::Delete | ChangeKind::Replace) {
            ctx.history.forget_path_prefix(path);
        }
    }
    for (path, id) in txn.tree.paths() {
        let final_id = ctx.id_rewrites.get(id).cloned().unwrap_or_else(|| id.clone());
        ctx.history.record_path(path.to_string(), final_id);
    }
}

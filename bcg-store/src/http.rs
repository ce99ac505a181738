//! Inbound consensus RPC: the `/raft/*` routes a peer's [`HttpNetwork`](crate::network::HttpNetwork) calls

use openraft::raft::{AppendEntriesRequest, InstallSnapshotRequest, VoteRequest};
use openraft::Raft;
use std::convert::Infallible;
use warp::{Filter, Rejection, Reply};

use crate::types::{NodeId, TypeConfig};

/// Largest consensus message accepted, snapshots included
const MAX_BODY: u64 = 16 * 1024 * 1024;

/// Routes serving append-entries, vote and install-snapshot.
///
/// Replies are the JSON form of the local raft's `Result`, so remote errors
/// reach the caller intact.
pub fn raft_routes(
    raft: Raft<TypeConfig>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let with_raft = warp::any().map(move || raft.clone());

    let append = warp::path!("raft" / "append")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY))
        .and(warp::body::json())
        .and(with_raft.clone())
        .and_then(handle_append);

    let vote = warp::path!("raft" / "vote")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY))
        .and(warp::body::json())
        .and(with_raft.clone())
        .and_then(handle_vote);

    let snapshot = warp::path!("raft" / "snapshot")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY))
        .and(warp::body::json())
        .and(with_raft)
        .and_then(handle_snapshot);

    append.or(vote).or(snapshot)
}

async fn handle_append(
    rpc: AppendEntriesRequest<TypeConfig>,
    raft: Raft<TypeConfig>,
) -> Result<impl Reply, Infallible> {
    let res = raft.append_entries(rpc).await;
    Ok(warp::reply::json(&res))
}

async fn handle_vote(
    rpc: VoteRequest<NodeId>,
    raft: Raft<TypeConfig>,
) -> Result<impl Reply, Infallible> {
    let res = raft.vote(rpc).await;
    Ok(warp::reply::json(&res))
}

async fn handle_snapshot(
    rpc: InstallSnapshotRequest<TypeConfig>,
    raft: Raft<TypeConfig>,
) -> Result<impl Reply, Infallible> {
    let res = raft.install_snapshot(rpc).await;
    Ok(warp::reply::json(&res))
}

//! Outbound consensus RPC over HTTP/JSON

use openraft::error::{
    InstallSnapshotError, NetworkError, RPCError, RaftError, RemoteError, Unreachable,
};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::types::{NodeId, StoreNode, TypeConfig};

/// Hands out HTTP connections to peers, sharing one client
#[derive(Debug, Clone)]
pub struct HttpNetworkFactory {
    client: Client,
}

impl HttpNetworkFactory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl RaftNetworkFactory<TypeConfig> for HttpNetworkFactory {
    type Network = HttpNetwork;

    async fn new_client(&mut self, target: NodeId, node: &StoreNode) -> Self::Network {
        HttpNetwork {
            addr: node.addr.clone(),
            client: self.client.clone(),
            target,
        }
    }
}

/// Connection to one peer's `/raft/*` endpoints
pub struct HttpNetwork {
    addr: String,
    client: Client,
    target: NodeId,
}

impl HttpNetwork {
    async fn request<Req, Resp, Err>(
        &self,
        path: &str,
        req: &Req,
        option: &RPCOption,
    ) -> Result<Result<Resp, Err>, RPCError<NodeId, StoreNode, Err>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
        Err: std::error::Error + DeserializeOwned,
    {
        let url = format!("http://{}/raft/{}", self.addr, path);
        debug!(target_node = self.target, %url, "sending raft rpc");

        let resp = self
            .client
            .post(&url)
            .timeout(option.hard_ttl())
            .json(req)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    RPCError::Unreachable(Unreachable::new(&err))
                } else {
                    RPCError::Network(NetworkError::new(&err))
                }
            })?;

        let res: Result<Resp, Err> = resp
            .json()
            .await
            .map_err(|err| RPCError::Network(NetworkError::new(&err)))?;
        Ok(res)
    }
}

impl RaftNetwork<TypeConfig> for HttpNetwork {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, StoreNode, RaftError<NodeId>>>
    {
        let res = self
            .request::<_, AppendEntriesResponse<NodeId>, RaftError<NodeId>>("append", &rpc, &option)
            .await?;
        res.map_err(|err| RPCError::RemoteError(RemoteError::new(self.target, err)))
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeId>,
        RPCError<NodeId, StoreNode, RaftError<NodeId, InstallSnapshotError>>,
    > {
        let res = self
            .request::<_, InstallSnapshotResponse<NodeId>, RaftError<NodeId, InstallSnapshotError>>(
                "snapshot", &rpc, &option,
            )
            .await?;
        res.map_err(|err| RPCError::RemoteError(RemoteError::new(self.target, err)))
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        option: RPCOption,
    ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, StoreNode, RaftError<NodeId>>> {
        let res = self
            .request::<_, VoteResponse<NodeId>, RaftError<NodeId>>("vote", &rpc, &option)
            .await?;
        res.map_err(|err| RPCError::RemoteError(RemoteError::new(self.target, err)))
    }
}

//! Abstract RPC surface to peers, plus the concrete HTTP implementation
//! built on `reqwest`. Every call carries the configured timeout;
//! connection and timeout errors map to [`ChordError::Transport`] /
//! [`ChordError::Timeout`] so callers decide retry policy.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ChordError, ChordResult};
use crate::node::{Identity, NodeAddr};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: u64,
    pub host: String,
    pub port: u16,
    /// Hop count carried along join forwarding, bounding the routing
    /// chain against stale-finger loops.
    #[serde(default)]
    pub hops: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindSuccessorRequest {
    pub id: u64,
    pub requester: NodeAddr,
    #[serde(default)]
    pub hops: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyRequest {
    #[serde(flatten)]
    pub candidate: Identity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredecessorResponse {
    pub predecessor: Option<Identity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub departing: Identity,
    pub predecessor: Option<Identity>,
    pub successor: Identity,
}

/// Key range for a migration transfer: `start_key` exclusive, `end_key`
/// inclusive, matching the arc convention used throughout the ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesInRangeRequest {
    pub start_key: u64,
    pub end_key: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesInRangeResponse {
    pub files: Vec<FileEntry>,
}

/// The peer-facing RPC surface. Concrete implementations may use HTTP,
/// gRPC, or any request/response protocol that preserves these
/// semantics.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn join(&self, target: &NodeAddr, joining: &Identity, hops: u32) -> ChordResult<Identity>;

    async fn find_successor(
        &self,
        target: &NodeAddr,
        key: u64,
        requester: &NodeAddr,
        hops: u32,
    ) -> ChordResult<Identity>;

    async fn notify(&self, target: &NodeAddr, candidate: &Identity) -> ChordResult<()>;

    async fn get_predecessor(&self, target: &NodeAddr) -> ChordResult<Option<Identity>>;

    async fn leave(
        &self,
        target: &NodeAddr,
        departing: &Identity,
        departing_predecessor: Option<Identity>,
        departing_successor: Identity,
    ) -> ChordResult<()>;

    async fn ping(&self, target: &NodeAddr) -> ChordResult<bool>;

    async fn forward_file(&self, target: &NodeAddr, name: &str, bytes: Vec<u8>) -> ChordResult<()>;

    async fn get_file(&self, target: &NodeAddr, name: &str) -> ChordResult<Option<Vec<u8>>>;

    async fn delete_file(&self, target: &NodeAddr, name: &str) -> ChordResult<bool>;

    /// Requests the files a peer holds within `(start_key, end_key]`, for
    /// range-based migration during membership changes. Not called by
    /// any ring or file operation yet; the wire schema is defined ahead
    /// of the transfer logic that will drive it.
    async fn files_in_range(
        &self,
        target: &NodeAddr,
        start_key: u64,
        end_key: u64,
    ) -> ChordResult<Vec<(String, Vec<u8>)>>;
}

/// HTTP-based transport for inter-node communication, mirroring the
/// source's `HttpTransport` built on a single shared client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        HttpTransport { client }
    }

    fn url(target: &NodeAddr, path: &str) -> String {
        format!("{}{}", target.to_url(), path)
    }

    fn map_err(target: &NodeAddr, err: reqwest::Error) -> ChordError {
        if err.is_timeout() {
            ChordError::Timeout(target.label())
        } else {
            ChordError::Transport(target.label(), err.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn join(&self, target: &NodeAddr, joining: &Identity, hops: u32) -> ChordResult<Identity> {
        let url = Self::url(target, "/chord/join");
        let body = JoinRequest {
            id: joining.id,
            host: joining.addr.host.clone(),
            port: joining.addr.port,
            hops,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_err(target, e))?;
        response
            .json::<Identity>()
            .await
            .map_err(|e| Self::map_err(target, e))
    }

    async fn find_successor(
        &self,
        target: &NodeAddr,
        key: u64,
        requester: &NodeAddr,
        hops: u32,
    ) -> ChordResult<Identity> {
        let url = Self::url(target, "/chord/successor");
        let body = FindSuccessorRequest { id: key, requester: requester.clone(), hops };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_err(target, e))?;
        response
            .json::<Identity>()
            .await
            .map_err(|e| Self::map_err(target, e))
    }

    async fn notify(&self, target: &NodeAddr, candidate: &Identity) -> ChordResult<()> {
        let url = Self::url(target, "/chord/notify");
        let body = NotifyRequest { candidate: candidate.clone() };
        self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_err(target, e))?;
        Ok(())
    }

    async fn get_predecessor(&self, target: &NodeAddr) -> ChordResult<Option<Identity>> {
        let url = Self::url(target, "/chord/predecessor");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::map_err(target, e))?;
        let parsed = response
            .json::<PredecessorResponse>()
            .await
            .map_err(|e| Self::map_err(target, e))?;
        Ok(parsed.predecessor)
    }

    async fn leave(
        &self,
        target: &NodeAddr,
        departing: &Identity,
        departing_predecessor: Option<Identity>,
        departing_successor: Identity,
    ) -> ChordResult<()> {
        let url = Self::url(target, "/chord/leave");
        let body = LeaveRequest {
            departing: departing.clone(),
            predecessor: departing_predecessor,
            successor: departing_successor,
        };
        self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_err(target, e))?;
        Ok(())
    }

    async fn ping(&self, target: &NodeAddr) -> ChordResult<bool> {
        let url = Self::url(target, "/chord/keepalive");
        match self.client.post(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => Err(Self::map_err(target, e)),
        }
    }

    async fn forward_file(&self, target: &NodeAddr, name: &str, bytes: Vec<u8>) -> ChordResult<()> {
        let url = Self::url(target, &format!("/files/forward/{name}"));
        let response = self
            .client
            .put(&url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| Self::map_err(target, e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ChordError::Transport(target.label(), format!("forward returned {}", response.status())))
        }
    }

    async fn get_file(&self, target: &NodeAddr, name: &str) -> ChordResult<Option<Vec<u8>>> {
        let url = Self::url(target, &format!("/files/{name}"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::map_err(target, e))?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let bytes = response.bytes().await.map_err(|e| Self::map_err(target, e))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn delete_file(&self, target: &NodeAddr, name: &str) -> ChordResult<bool> {
        let url = Self::url(target, &format!("/files/{name}"));
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Self::map_err(target, e))?;
        if response.status().as_u16() == 404 {
            return Ok(false);
        }
        Ok(response.status().is_success())
    }

    async fn files_in_range(
        &self,
        target: &NodeAddr,
        start_key: u64,
        end_key: u64,
    ) -> ChordResult<Vec<(String, Vec<u8>)>> {
        let url = Self::url(target, "/files/transfer");
        let body = FilesInRangeRequest { start_key, end_key };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_err(target, e))?;
        let parsed = response
            .json::<FilesInRangeResponse>()
            .await
            .map_err(|e| Self::map_err(target, e))?;
        Ok(parsed.files.into_iter().map(|f| (f.filename, f.content)).collect())
    }
}

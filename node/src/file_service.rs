//! Stateless file-operation routing on top of the ring and storage
//! services: hash the filename, decide local-vs-forward, dispatch.

use std::sync::Arc;

use tracing::{error, info};

use crate::identifier::hash_key;
use crate::ring_service::RingService;
use crate::storage::Storage;
use crate::transport::Transport;

pub struct FileService {
    ring: Arc<RingService>,
    storage: Arc<dyn Storage>,
    transport: Arc<dyn Transport>,
    m_bits: u32,
}

impl FileService {
    pub fn new(ring: Arc<RingService>, storage: Arc<dyn Storage>, transport: Arc<dyn Transport>, m_bits: u32) -> Self {
        FileService { ring, storage, transport, m_bits }
    }

    pub fn file_key(&self, name: &str) -> u64 {
        hash_key(name, self.m_bits)
    }

    /// `(success, location)` — location is the owning node's id as text,
    /// or an error message on failure, matching the source's tuple shape.
    pub async fn put(&self, name: &str, content: Vec<u8>) -> (bool, String) {
        let key = self.file_key(name);
        if self.ring.is_responsible_for(key).await {
            match self.storage.save(name, content).await {
                Ok(_) => {
                    let id = self.ring.identity().await.id;
                    info!(name, key, node = id, "stored file locally");
                    (true, id.to_string())
                }
                Err(e) => {
                    error!(name, error = %e, "failed to store file locally");
                    (false, e.to_string())
                }
            }
        } else {
            let target = match self.ring.lookup(key).await {
                Ok(target) => target,
                Err(e) => {
                    error!(name, error = %e, "failed to resolve owner for put");
                    return (false, e.to_string());
                }
            };
            match self.transport.forward_file(&target.addr, name, content).await {
                Ok(()) => {
                    info!(name, node = target.id, "forwarded file");
                    (true, target.id.to_string())
                }
                Err(e) => {
                    error!(name, target = target.id, error = %e, "failed to forward file");
                    (false, "forward failed".to_string())
                }
            }
        }
    }

    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        let key = self.file_key(name);
        if self.ring.is_responsible_for(key).await {
            self.storage.get(name).await.unwrap_or(None)
        } else {
            let target = match self.ring.lookup(key).await {
                Ok(target) => target,
                Err(e) => {
                    error!(name, error = %e, "failed to resolve owner for get");
                    return None;
                }
            };
            match self.transport.get_file(&target.addr, name).await {
                Ok(content) => content,
                Err(e) => {
                    error!(name, target = target.id, error = %e, "failed to get file from target");
                    None
                }
            }
        }
    }

    pub async fn delete(&self, name: &str) -> bool {
        let key = self.file_key(name);
        if self.ring.is_responsible_for(key).await {
            self.storage.delete(name).await.unwrap_or(false)
        } else {
            let target = match self.ring.lookup(key).await {
                Ok(target) => target,
                Err(e) => {
                    error!(name, error = %e, "failed to resolve owner for delete");
                    return false;
                }
            };
            match self.transport.delete_file(&target.addr, name).await {
                Ok(deleted) => deleted,
                Err(e) => {
                    error!(name, target = target.id, error = %e, "failed to delete file from target");
                    false
                }
            }
        }
    }

    /// Unconditional local save, used by the forwarding endpoint — the
    /// receiving node stores it even if ownership has since shifted.
    pub async fn store_local(&self, name: &str, content: Vec<u8>) -> Result<(), String> {
        self.storage.save(name, content).await.map(|_| ()).map_err(|e| e.to_string())
    }

    pub async fn list_local(&self) -> Vec<String> {
        self.storage.list().await.unwrap_or_default()
    }
}

// Copyright 2022 The template Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A single-process, in-memory reference [`Backend`]. Grounded on the
//! same role the teacher's `RAMBackend` plays for `zlog`: a backing with
//! no durability, useful for tests and for embedding the log in a single
//! process, implementing exactly the same state machine as a durable
//! backend would.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::{
    backend::Backend,
    entry::StripeObjectState,
    error::{Error, Result},
};

#[derive(Default)]
struct HeadObject {
    prefix: String,
    views: BTreeMap<u64, Vec<u8>>,
    unique_id_counter: u64,
}

#[derive(Default)]
struct Inner {
    /// name -> head_oid
    links: HashMap<String, String>,
    heads: HashMap<String, HeadObject>,
    stripes: HashMap<String, StripeObjectState>,
    next_head_id: u64,
}

/// In-memory [`Backend`]. Cheaply cloneable; all clones share the same
/// underlying state.
#[derive(Clone, Default)]
pub struct MemBackend {
    inner: std::sync::Arc<Mutex<Inner>>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Backend for MemBackend {
    fn meta(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("backend".to_string(), "mem".to_string());
        m
    }

    async fn initialize(&self, _opts: HashMap<String, String>) -> Result<()> {
        Ok(())
    }

    async fn unique_id(&self, head_oid: &str) -> Result<u64> {
        if head_oid.is_empty() {
            return Err(Error::InvalidArgument("empty head_oid".to_string()));
        }
        let mut inner = self.inner.lock();
        let head = inner
            .heads
            .get_mut(head_oid)
            .ok_or_else(|| Error::NotFound {
                oid: head_oid.to_string(),
            })?;
        let id = head.unique_id_counter;
        head.unique_id_counter += 1;
        Ok(id)
    }

    async fn create_log(&self, name: &str, view_payload: Vec<u8>) -> Result<(String, String)> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("empty log name".to_string()));
        }
        let mut inner = self.inner.lock();
        if inner.links.contains_key(name) {
            return Err(Error::Exists(name.to_string()));
        }
        let head_oid = format!("head.{}", inner.next_head_id);
        inner.next_head_id += 1;
        let prefix = format!("{}.stripe", name);

        let mut views = BTreeMap::new();
        views.insert(1, view_payload);
        inner.heads.insert(
            head_oid.clone(),
            HeadObject {
                prefix: prefix.clone(),
                views,
                unique_id_counter: 0,
            },
        );
        inner.links.insert(name.to_string(), head_oid.clone());

        Ok((head_oid, prefix))
    }

    async fn open_log(&self, name: &str) -> Result<(String, String)> {
        let inner = self.inner.lock();
        let head_oid = inner.links.get(name).ok_or_else(|| Error::NotFound {
            oid: name.to_string(),
        })?;
        let head = inner.heads.get(head_oid).ok_or_else(|| Error::NotFound {
            oid: head_oid.clone(),
        })?;
        Ok((head_oid.clone(), head.prefix.clone()))
    }

    async fn read_views(
        &self,
        head_oid: &str,
        start_epoch: u64,
        max: u32,
    ) -> Result<BTreeMap<u64, Vec<u8>>> {
        let inner = self.inner.lock();
        let head = inner.heads.get(head_oid).ok_or_else(|| Error::NotFound {
            oid: head_oid.to_string(),
        })?;
        Ok(head
            .views
            .range(start_epoch..)
            .take(max as usize)
            .map(|(e, p)| (*e, p.clone()))
            .collect())
    }

    async fn propose_view(&self, head_oid: &str, epoch: u64, payload: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock();
        let head = inner
            .heads
            .get_mut(head_oid)
            .ok_or_else(|| Error::NotFound {
                oid: head_oid.to_string(),
            })?;
        let max_epoch = head.views.keys().next_back().copied().unwrap_or(0);
        if epoch != max_epoch + 1 {
            return Err(Error::StaleEpoch {
                epoch,
                sealed_epoch: max_epoch,
            });
        }
        head.views.insert(epoch, payload);
        Ok(())
    }

    async fn read(&self, oid: &str, epoch: u64, position: u64) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        let stripe = inner.stripes.get(oid).ok_or_else(|| Error::NotFound {
            oid: oid.to_string(),
        })?;
        stripe.read(oid, epoch, position)
    }

    async fn write(&self, oid: &str, data: Vec<u8>, epoch: u64, position: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let stripe = inner.stripes.get_mut(oid).ok_or_else(|| Error::NotFound {
            oid: oid.to_string(),
        })?;
        stripe.write(oid, epoch, position, data)
    }

    async fn fill(&self, oid: &str, epoch: u64, position: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let stripe = inner.stripes.get_mut(oid).ok_or_else(|| Error::NotFound {
            oid: oid.to_string(),
        })?;
        stripe.fill(oid, epoch, position)
    }

    async fn trim(&self, oid: &str, epoch: u64, position: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let stripe = inner.stripes.get_mut(oid).ok_or_else(|| Error::NotFound {
            oid: oid.to_string(),
        })?;
        stripe.trim(oid, epoch, position)
    }

    async fn seal(&self, oid: &str, epoch: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let stripe = inner.stripes.entry(oid.to_string()).or_default();
        stripe.seal(epoch)
    }

    async fn max_pos(&self, oid: &str, epoch: u64) -> Result<(Option<u64>, bool)> {
        let inner = self.inner.lock();
        let stripe = inner.stripes.get(oid).ok_or_else(|| Error::NotFound {
            oid: oid.to_string(),
        })?;
        stripe.max_pos(epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_log_then_open_resolves_same_head() {
        let backend = MemBackend::new();
        let (hoid, prefix) = backend.create_log("L", b"view-1".to_vec()).await.unwrap();
        let (hoid2, prefix2) = backend.open_log("L").await.unwrap();
        assert_eq!(hoid, hoid2);
        assert_eq!(prefix, prefix2);
    }

    #[tokio::test]
    async fn create_log_twice_fails_with_exists() {
        let backend = MemBackend::new();
        backend.create_log("L", b"v".to_vec()).await.unwrap();
        let err = backend.create_log("L", b"v".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::Exists(_)));
    }

    #[tokio::test]
    async fn propose_view_requires_contiguous_epoch() {
        let backend = MemBackend::new();
        let (hoid, _) = backend.create_log("L", b"v1".to_vec()).await.unwrap();
        let err = backend
            .propose_view(&hoid, 3, b"v3".to_vec())
            .await
            .unwrap_err();
        assert!(err.is_stale_epoch());
        backend.propose_view(&hoid, 2, b"v2".to_vec()).await.unwrap();
    }

    #[tokio::test]
    async fn read_views_returns_no_gaps() {
        let backend = MemBackend::new();
        let (hoid, _) = backend.create_log("L", b"v1".to_vec()).await.unwrap();
        backend.propose_view(&hoid, 2, b"v2".to_vec()).await.unwrap();
        backend.propose_view(&hoid, 3, b"v3".to_vec()).await.unwrap();
        let views = backend.read_views(&hoid, 2, 10).await.unwrap();
        assert_eq!(views.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn seal_then_write_then_read() {
        let backend = MemBackend::new();
        backend.seal("oid", 1).await.unwrap();
        backend.write("oid", b"hello".to_vec(), 1, 0).await.unwrap();
        assert_eq!(backend.read("oid", 1, 0).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn write_without_seal_is_not_found() {
        let backend = MemBackend::new();
        let err = backend.write("oid", b"x".to_vec(), 1, 0).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn unique_id_increments() {
        let backend = MemBackend::new();
        let (hoid, _) = backend.create_log("L", b"v".to_vec()).await.unwrap();
        let a = backend.unique_id(&hoid).await.unwrap();
        let b = backend.unique_id(&hoid).await.unwrap();
        assert_eq!(b, a + 1);
    }
}

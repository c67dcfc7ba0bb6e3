//! In-process blob backend with real capability semantics.
//!
//! Issues `memory://{container}/{object}?sig={token}` URLs and serves PUT/GET
//! against them with the same status codes a cloud blob store would return:
//! 403 for an unknown, expired or wrong-permission signature, 404 for a
//! missing object. Used by tests and local runs in place of S3.

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use obx_core::{ObxError, ObxResult};

use crate::capability::{
    expiry_after, validate_request, BlobBackend, Capability, CapabilityIssuer, Permission,
};

/// Status + body returned by the in-memory endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl MemoryResponse {
    fn status(status: u16) -> Self {
        Self {
            status,
            body: Bytes::new(),
            content_type: None,
        }
    }
}

#[derive(Debug)]
struct Grant {
    object_name: String,
    permission: Permission,
    expires: Instant,
}

#[derive(Debug)]
struct StoredObject {
    body: Bytes,
    content_type: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    container_exists: bool,
    provision_calls: u32,
    objects: HashMap<String, StoredObject>,
    grants: HashMap<String, Grant>,
}

/// Cheap to clone; clones share the same store.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    container: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBlobStore {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep going
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn url_prefix(&self) -> String {
        format!("memory://{}/", self.container)
    }

    /// Serve a PUT against a capability URL.
    pub fn handle_put(&self, url: &str, body: Bytes, content_type: Option<&str>) -> MemoryResponse {
        let mut state = self.lock();
        let Some(object_name) = self.authorize(&state, url, Permission::Write) else {
            return MemoryResponse::status(403);
        };
        state.objects.insert(
            object_name,
            StoredObject {
                body,
                content_type: content_type.map(str::to_string),
            },
        );
        MemoryResponse::status(201)
    }

    /// Serve a GET against a capability URL.
    pub fn handle_get(&self, url: &str) -> MemoryResponse {
        let state = self.lock();
        let Some(object_name) = self.authorize(&state, url, Permission::Read) else {
            return MemoryResponse::status(403);
        };
        match state.objects.get(&object_name) {
            Some(obj) => MemoryResponse {
                status: 200,
                body: obj.body.clone(),
                content_type: obj.content_type.clone(),
            },
            None => MemoryResponse::status(404),
        }
    }

    /// The grant must exist, be unexpired, carry `needed`, and name the
    /// same object as the URL path.
    fn authorize(&self, state: &MemoryState, url: &str, needed: Permission) -> Option<String> {
        let rest = url.strip_prefix(&self.url_prefix())?;
        let (path, token) = rest.split_once("?sig=")?;
        let grant = state.grants.get(token)?;
        if grant.permission != needed || grant.object_name != path || Instant::now() >= grant.expires {
            return None;
        }
        Some(grant.object_name.clone())
    }

    pub fn contains(&self, object_name: &str) -> bool {
        self.lock().objects.contains_key(object_name)
    }

    pub fn object(&self, object_name: &str) -> Option<Bytes> {
        self.lock().objects.get(object_name).map(|o| o.body.clone())
    }

    /// Overwrite stored bytes directly, bypassing capabilities.
    pub fn tamper(&self, object_name: &str, body: Bytes) {
        if let Some(obj) = self.lock().objects.get_mut(object_name) {
            obj.body = body;
        }
    }

    pub fn container_exists(&self) -> bool {
        self.lock().container_exists
    }

    /// How many times the container was actually created
    pub fn provision_calls(&self) -> u32 {
        self.lock().provision_calls
    }

    /// Outstanding, possibly expired, grants.
    pub fn grant_count(&self) -> usize {
        self.lock().grants.len()
    }

    /// Expire every outstanding capability, as if their TTLs had elapsed.
    pub fn expire_capabilities(&self) {
        let now = Instant::now();
        for grant in self.lock().grants.values_mut() {
            grant.expires = now;
        }
    }

    fn issue(&self, object_name: &str, permission: Permission, ttl: Duration) -> Capability {
        let mut raw = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut raw);
        let token: String = raw.iter().map(|b| format!("{b:02x}")).collect();

        let now = Instant::now();
        let mut state = self.lock();
        state.grants.retain(|_, g| g.expires > now);
        if permission == Permission::Write && !state.container_exists {
            state.container_exists = true;
            state.provision_calls += 1;
        }
        state.grants.insert(
            token.clone(),
            Grant {
                object_name: object_name.to_string(),
                permission,
                expires: now + ttl,
            },
        );

        Capability {
            url: format!("{}{}?sig={}", self.url_prefix(), object_name, token),
            object_name: object_name.to_string(),
            permission,
            expires_at: expiry_after(ttl),
            headers: Vec::new(),
        }
    }
}

#[async_trait]
impl CapabilityIssuer for MemoryBlobStore {
    async fn issue_write_capability(
        &self,
        object_name: &str,
        ttl: Duration,
    ) -> ObxResult<Capability> {
        validate_request(object_name, ttl)?;
        Ok(self.issue(object_name, Permission::Write, ttl))
    }

    async fn issue_read_capability(
        &self,
        object_name: &str,
        ttl: Duration,
    ) -> ObxResult<Capability> {
        validate_request(object_name, ttl)?;
        Ok(self.issue(object_name, Permission::Read, ttl))
    }
}

#[async_trait]
impl BlobBackend for MemoryBlobStore {
    async fn delete_object(&self, object_name: &str) -> ObxResult<()> {
        if object_name.is_empty() {
            return Err(ObxError::invalid_input("object name is empty"));
        }
        self.lock().objects.remove(object_name);
        Ok(())
    }
}

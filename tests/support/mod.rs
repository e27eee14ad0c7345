#![allow(dead_code)]

use async_trait::async_trait;
use clonecell::backend::{Conductor, InMemoryTransport, RoleManifest};
use clonecell::protocol::{RpcRequest, RpcResponse};
use clonecell::{AdminChannel, AppChannel, CloneError, CloneRegistry, Result, Transport};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const APP_ID: &str = "clone-test";
pub const ROLE: &str = "clones";

pub async fn conductor(clone_limit: u32) -> Arc<Conductor> {
    let conductor = Arc::new(Conductor::new());
    conductor
        .install_app(APP_ID, vec![RoleManifest::new(ROLE, clone_limit)])
        .await
        .unwrap();
    conductor
}

/// What a test transport does to one operation.
#[derive(Clone)]
pub enum Fault {
    Reject(CloneError),
    Stall(Duration),
}

/// Records every operation and optionally interferes with one of them.
pub struct Interposer {
    inner: Arc<dyn Transport>,
    fault: Option<(&'static str, Fault)>,
    seen: Mutex<Vec<&'static str>>,
}

impl Interposer {
    pub fn passthrough(inner: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fault: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn faulty(inner: Arc<dyn Transport>, operation: &'static str, fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fault: Some((operation, fault)),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<&'static str> {
        self.seen.lock().unwrap().clone()
    }

    pub fn saw(&self, operation: &str) -> bool {
        self.seen().iter().any(|op| *op == operation)
    }
}

#[async_trait]
impl Transport for Interposer {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        let operation = request.operation();
        self.seen.lock().unwrap().push(operation);

        match &self.fault {
            Some((target, Fault::Reject(err))) if *target == operation => {
                Ok(RpcResponse::from(err.clone()))
            }
            Some((target, Fault::Stall(delay))) if *target == operation => {
                tokio::time::sleep(*delay).await;
                self.inner.call(request).await
            }
            _ => self.inner.call(request).await,
        }
    }

    fn endpoint(&self) -> String {
        format!("interposed {}", self.inner.endpoint())
    }
}

pub struct Harness {
    pub conductor: Arc<Conductor>,
    pub app: Arc<Interposer>,
    pub admin: Arc<Interposer>,
    pub registry: Arc<CloneRegistry>,
}

impl Harness {
    pub async fn new(clone_limit: u32) -> Self {
        let conductor = conductor(clone_limit).await;
        let app = Interposer::passthrough(InMemoryTransport::app(&conductor));
        let admin = Interposer::passthrough(InMemoryTransport::admin(&conductor));
        Self::assemble(conductor, app, admin, None)
    }

    pub async fn with_app_fault(clone_limit: u32, operation: &'static str, fault: Fault) -> Self {
        let conductor = conductor(clone_limit).await;
        let app = Interposer::faulty(InMemoryTransport::app(&conductor), operation, fault);
        let admin = Interposer::passthrough(InMemoryTransport::admin(&conductor));
        Self::assemble(conductor, app, admin, Some(Duration::from_millis(100)))
    }

    pub async fn with_admin_fault(clone_limit: u32, operation: &'static str, fault: Fault) -> Self {
        let conductor = conductor(clone_limit).await;
        let app = Interposer::passthrough(InMemoryTransport::app(&conductor));
        let admin = Interposer::faulty(InMemoryTransport::admin(&conductor), operation, fault);
        Self::assemble(conductor, app, admin, Some(Duration::from_millis(100)))
    }

    /// A second registry on the same conductor, as another session would hold.
    pub fn peer(&self) -> CloneRegistry {
        CloneRegistry::new(
            APP_ID,
            Arc::new(AppChannel::with_transport(
                InMemoryTransport::app(&self.conductor),
                None,
            )),
            Arc::new(AdminChannel::with_transport(
                InMemoryTransport::admin(&self.conductor),
                None,
            )),
        )
    }

    fn assemble(
        conductor: Arc<Conductor>,
        app: Arc<Interposer>,
        admin: Arc<Interposer>,
        call_timeout: Option<Duration>,
    ) -> Self {
        let app_channel = AppChannel::with_transport(app.clone(), call_timeout);
        let admin_channel = AdminChannel::with_transport(admin.clone(), call_timeout);
        let registry = Arc::new(CloneRegistry::new(
            APP_ID,
            Arc::new(app_channel),
            Arc::new(admin_channel),
        ));
        Self {
            conductor,
            app,
            admin,
            registry,
        }
    }
}

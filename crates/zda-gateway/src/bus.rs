//! Internal event bus
//!
//! A typed callback registry: one subscriber list per event variant,
//! each list typed to that variant's payload. Publication is
//! synchronous and in registration order; the first handler error
//! surfaces after all handlers have run. No persistence, no replay.

use crate::device::Capability;
use crate::error::GatewayError;
use crate::node::{Node, NodeDevice};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Internal lifecycle events fanned out to capability implementations
#[derive(Clone)]
pub(crate) enum InternalEvent {
    NodeJoin {
        node: Arc<Node>,
    },
    NodeLeave {
        node: Arc<Node>,
    },
    NodeEnumeration {
        node: Arc<Node>,
    },
    DeviceAdded {
        device: Arc<NodeDevice>,
    },
    DeviceRemoved {
        device: Arc<NodeDevice>,
    },
    DeviceCapabilityAdded {
        device: Arc<NodeDevice>,
        capability: Capability,
    },
    DeviceCapabilityRemoved {
        device: Arc<NodeDevice>,
        capability: Capability,
    },
}

pub(crate) type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send>>;

type NodeHandler = Arc<dyn Fn(CancellationToken, Arc<Node>) -> HandlerFuture + Send + Sync>;
type DeviceHandler = Arc<dyn Fn(CancellationToken, Arc<NodeDevice>) -> HandlerFuture + Send + Sync>;
type CapabilityHandler =
    Arc<dyn Fn(CancellationToken, Arc<NodeDevice>, Capability) -> HandlerFuture + Send + Sync>;

/// Per-variant subscriber lists
pub(crate) struct Callbacks {
    node_join: Mutex<Vec<NodeHandler>>,
    node_leave: Mutex<Vec<NodeHandler>>,
    node_enumeration: Mutex<Vec<NodeHandler>>,
    device_added: Mutex<Vec<DeviceHandler>>,
    device_removed: Mutex<Vec<DeviceHandler>>,
    capability_added: Mutex<Vec<CapabilityHandler>>,
    capability_removed: Mutex<Vec<CapabilityHandler>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self {
            node_join: Mutex::new(Vec::new()),
            node_leave: Mutex::new(Vec::new()),
            node_enumeration: Mutex::new(Vec::new()),
            device_added: Mutex::new(Vec::new()),
            device_removed: Mutex::new(Vec::new()),
            capability_added: Mutex::new(Vec::new()),
            capability_removed: Mutex::new(Vec::new()),
        }
    }

    pub fn add_node_join<F>(&self, handler: F)
    where
        F: Fn(CancellationToken, Arc<Node>) -> HandlerFuture + Send + Sync + 'static,
    {
        self.node_join.lock().unwrap().push(Arc::new(handler));
    }

    pub fn add_node_leave<F>(&self, handler: F)
    where
        F: Fn(CancellationToken, Arc<Node>) -> HandlerFuture + Send + Sync + 'static,
    {
        self.node_leave.lock().unwrap().push(Arc::new(handler));
    }

    pub fn add_node_enumeration<F>(&self, handler: F)
    where
        F: Fn(CancellationToken, Arc<Node>) -> HandlerFuture + Send + Sync + 'static,
    {
        self.node_enumeration.lock().unwrap().push(Arc::new(handler));
    }

    pub fn add_device_added<F>(&self, handler: F)
    where
        F: Fn(CancellationToken, Arc<NodeDevice>) -> HandlerFuture + Send + Sync + 'static,
    {
        self.device_added.lock().unwrap().push(Arc::new(handler));
    }

    pub fn add_device_removed<F>(&self, handler: F)
    where
        F: Fn(CancellationToken, Arc<NodeDevice>) -> HandlerFuture + Send + Sync + 'static,
    {
        self.device_removed.lock().unwrap().push(Arc::new(handler));
    }

    pub fn add_capability_added<F>(&self, handler: F)
    where
        F: Fn(CancellationToken, Arc<NodeDevice>, Capability) -> HandlerFuture
            + Send
            + Sync
            + 'static,
    {
        self.capability_added.lock().unwrap().push(Arc::new(handler));
    }

    pub fn add_capability_removed<F>(&self, handler: F)
    where
        F: Fn(CancellationToken, Arc<NodeDevice>, Capability) -> HandlerFuture
            + Send
            + Sync
            + 'static,
    {
        self.capability_removed.lock().unwrap().push(Arc::new(handler));
    }

    /// Dispatch an event to all subscribers of its variant
    pub async fn call(
        &self,
        ctx: &CancellationToken,
        event: InternalEvent,
    ) -> Result<(), GatewayError> {
        match event {
            InternalEvent::NodeJoin { node } => {
                Self::dispatch_node(&self.node_join, ctx, node).await
            }
            InternalEvent::NodeLeave { node } => {
                Self::dispatch_node(&self.node_leave, ctx, node).await
            }
            InternalEvent::NodeEnumeration { node } => {
                Self::dispatch_node(&self.node_enumeration, ctx, node).await
            }
            InternalEvent::DeviceAdded { device } => {
                Self::dispatch_device(&self.device_added, ctx, device).await
            }
            InternalEvent::DeviceRemoved { device } => {
                Self::dispatch_device(&self.device_removed, ctx, device).await
            }
            InternalEvent::DeviceCapabilityAdded { device, capability } => {
                Self::dispatch_capability(&self.capability_added, ctx, device, capability).await
            }
            InternalEvent::DeviceCapabilityRemoved { device, capability } => {
                Self::dispatch_capability(&self.capability_removed, ctx, device, capability).await
            }
        }
    }

    async fn dispatch_node(
        list: &Mutex<Vec<NodeHandler>>,
        ctx: &CancellationToken,
        node: Arc<Node>,
    ) -> Result<(), GatewayError> {
        let handlers: Vec<NodeHandler> = list.lock().unwrap().clone();
        let mut first_error = None;
        for handler in handlers {
            if let Err(err) = handler(ctx.clone(), node.clone()).await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn dispatch_device(
        list: &Mutex<Vec<DeviceHandler>>,
        ctx: &CancellationToken,
        device: Arc<NodeDevice>,
    ) -> Result<(), GatewayError> {
        let handlers: Vec<DeviceHandler> = list.lock().unwrap().clone();
        let mut first_error = None;
        for handler in handlers {
            if let Err(err) = handler(ctx.clone(), device.clone()).await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn dispatch_capability(
        list: &Mutex<Vec<CapabilityHandler>>,
        ctx: &CancellationToken,
        device: Arc<NodeDevice>,
        capability: Capability,
    ) -> Result<(), GatewayError> {
        let handlers: Vec<CapabilityHandler> = list.lock().unwrap().clone();
        let mut first_error = None;
        for handler in handlers {
            if let Err(err) = handler(ctx.clone(), device.clone(), capability).await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::IeeeAddress;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_node() -> Arc<Node> {
        Arc::new(Node::new(IeeeAddress([1, 2, 3, 4, 5, 6, 7, 8])))
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let callbacks = Callbacks::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let order = order.clone();
            callbacks.add_node_join(move |_, _| {
                let order = order.clone();
                Box::pin(async move {
                    order.lock().unwrap().push(tag);
                    Ok(())
                })
            });
        }

        let ctx = CancellationToken::new();
        callbacks
            .call(&ctx, InternalEvent::NodeJoin { node: test_node() })
            .await
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_first_error_surfaces_but_all_handlers_run() {
        let callbacks = Callbacks::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = calls.clone();
        callbacks.add_node_join(move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(GatewayError::DeviceNotOnGateway) })
        });

        let counted = calls.clone();
        callbacks.add_node_join(move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });

        let ctx = CancellationToken::new();
        let result = callbacks
            .call(&ctx, InternalEvent::NodeJoin { node: test_node() })
            .await;

        assert!(matches!(result, Err(GatewayError::DeviceNotOnGateway)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_variants_are_isolated() {
        let callbacks = Callbacks::new();
        let joins = Arc::new(AtomicUsize::new(0));

        let counted = joins.clone();
        callbacks.add_node_join(move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });

        let ctx = CancellationToken::new();
        callbacks
            .call(&ctx, InternalEvent::NodeLeave { node: test_node() })
            .await
            .unwrap();
        assert_eq!(joins.load(Ordering::SeqCst), 0);
    }
}

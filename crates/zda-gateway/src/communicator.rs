//! ZCL request/response correlation
//!
//! A thin layer over the provider's application messaging: it tags
//! outgoing frames with the node's transaction sequence, routes incoming
//! responses back to the awaiting requester by (source, endpoint,
//! sequence), and fans unsolicited frames out to cluster/command
//! subscribers.

use crate::bus::HandlerFuture;
use crate::error::GatewayError;
use crate::provider::{ApplicationMessage, IeeeAddress, Provider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use zcl_protocol::commands::{
    global, ConfigureReporting, ConfigureReportingResponse, DefaultResponse, ReadAttributes,
    ReadAttributesResponse, ReportingConfiguration,
};
use zcl_protocol::{AttributeRecord, Direction, Frame, FrameType, ZclError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MessageKey {
    node: IeeeAddress,
    endpoint: u8,
    sequence: u8,
}

type PendingMap = Arc<Mutex<HashMap<MessageKey, oneshot::Sender<Frame>>>>;

type MessageHandler = Arc<dyn Fn(IeeeAddress, u8, Frame) -> HandlerFuture + Send + Sync>;

struct Subscription {
    cluster_id: u16,
    command_id: u8,
    handler: MessageHandler,
}

/// Removes the pending entry if the requester stops waiting
struct PendingGuard {
    pending: PendingMap,
    key: MessageKey,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().unwrap().remove(&self.key);
    }
}

pub(crate) struct Communicator {
    provider: Arc<dyn Provider>,
    pending: PendingMap,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Communicator {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            pending: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for unsolicited frames on (cluster, command)
    pub fn subscribe<F>(&self, cluster_id: u16, command_id: u8, handler: F)
    where
        F: Fn(IeeeAddress, u8, Frame) -> HandlerFuture + Send + Sync + 'static,
    {
        self.subscriptions.lock().unwrap().push(Subscription {
            cluster_id,
            command_id,
            handler: Arc::new(handler),
        });
    }

    /// Route an incoming application message from the provider
    pub async fn process_incoming_message(
        &self,
        source: IeeeAddress,
        message: ApplicationMessage,
    ) {
        let frame = match Frame::deserialize(&message.data) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!("discarding undecodable zcl frame from {source}: {err}");
                return;
            }
        };

        if frame.frame_type == FrameType::Global && is_response_command(frame.command_id) {
            let key = MessageKey {
                node: source,
                endpoint: message.source_endpoint,
                sequence: frame.transaction_sequence,
            };
            if let Some(tx) = self.pending.lock().unwrap().remove(&key) {
                let _ = tx.send(frame);
                return;
            }
            tracing::debug!(
                "response with no awaiting requester: node={source} seq={}",
                frame.transaction_sequence
            );
            return;
        }

        let handlers: Vec<MessageHandler> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.cluster_id == message.cluster_id && s.command_id == frame.command_id)
            .map(|s| s.handler.clone())
            .collect();

        if handlers.is_empty() {
            tracing::debug!(
                "unhandled zcl frame: node={source} cluster={:#06x} command={:#04x}",
                message.cluster_id,
                frame.command_id
            );
            return;
        }

        for handler in handlers {
            if let Err(err) = handler(source, message.source_endpoint, frame.clone()).await {
                tracing::warn!("zcl subscription handler failed: {err}");
            }
        }
    }

    /// Send a frame and await the correlated response
    #[allow(clippy::too_many_arguments)]
    async fn request_response(
        &self,
        ctx: &CancellationToken,
        destination: IeeeAddress,
        require_ack: bool,
        cluster_id: u16,
        source_endpoint: u8,
        destination_endpoint: u8,
        frame: Frame,
    ) -> Result<Frame, GatewayError> {
        let key = MessageKey {
            node: destination,
            endpoint: destination_endpoint,
            sequence: frame.transaction_sequence,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(key, tx);
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            key,
        };

        let message = ApplicationMessage {
            profile_id: zcl_protocol::cluster::profile::HOME_AUTOMATION,
            cluster_id,
            source_endpoint,
            destination_endpoint,
            data: frame.serialize(),
        };

        self.provider
            .send_application_message(ctx, destination, require_ack, message)
            .await?;

        tokio::select! {
            response = rx => response.map_err(|_| GatewayError::ContextExpired),
            () = ctx.cancelled() => Err(GatewayError::ContextExpired),
        }
    }

    /// Read attributes from a node's cluster
    #[allow(clippy::too_many_arguments)]
    pub async fn read_attributes(
        &self,
        ctx: &CancellationToken,
        destination: IeeeAddress,
        require_ack: bool,
        cluster_id: u16,
        manufacturer: Option<u16>,
        source_endpoint: u8,
        destination_endpoint: u8,
        transaction_sequence: u8,
        attribute_ids: &[u16],
    ) -> Result<Vec<AttributeRecord>, GatewayError> {
        let frame = Frame::global(
            Direction::ClientToServer,
            manufacturer,
            transaction_sequence,
            global::READ_ATTRIBUTES,
            ReadAttributes {
                attribute_ids: attribute_ids.to_vec(),
            }
            .serialize(),
        );

        let response = self
            .request_response(
                ctx,
                destination,
                require_ack,
                cluster_id,
                source_endpoint,
                destination_endpoint,
                frame,
            )
            .await?;

        match response.command_id {
            global::READ_ATTRIBUTES_RESPONSE => {
                Ok(ReadAttributesResponse::parse(&response.payload)?.records)
            }
            global::DEFAULT_RESPONSE => {
                let default = DefaultResponse::parse(&response.payload)?;
                Err(GatewayError::CommandRejected(default.status))
            }
            other => Err(GatewayError::Codec(ZclError::UnexpectedCommand(other))),
        }
    }

    /// Configure attribute reporting on a node's cluster
    #[allow(clippy::too_many_arguments)]
    pub async fn configure_reporting(
        &self,
        ctx: &CancellationToken,
        destination: IeeeAddress,
        require_ack: bool,
        cluster_id: u16,
        manufacturer: Option<u16>,
        source_endpoint: u8,
        destination_endpoint: u8,
        transaction_sequence: u8,
        configuration: ReportingConfiguration,
    ) -> Result<(), GatewayError> {
        let frame = Frame::global(
            Direction::ClientToServer,
            manufacturer,
            transaction_sequence,
            global::CONFIGURE_REPORTING,
            ConfigureReporting {
                records: vec![configuration],
            }
            .serialize(),
        );

        let response = self
            .request_response(
                ctx,
                destination,
                require_ack,
                cluster_id,
                source_endpoint,
                destination_endpoint,
                frame,
            )
            .await?;

        match response.command_id {
            global::CONFIGURE_REPORTING_RESPONSE => {
                let parsed = ConfigureReportingResponse::parse(&response.payload)?;
                match parsed.failure() {
                    Some(status) => Err(GatewayError::CommandRejected(status)),
                    None => Ok(()),
                }
            }
            global::DEFAULT_RESPONSE => {
                let default = DefaultResponse::parse(&response.payload)?;
                if default.status == 0 {
                    Ok(())
                } else {
                    Err(GatewayError::CommandRejected(default.status))
                }
            }
            other => Err(GatewayError::Codec(ZclError::UnexpectedCommand(other))),
        }
    }

    /// Issue a cluster-local command without awaiting a response
    #[allow(clippy::too_many_arguments)]
    pub async fn send_command(
        &self,
        ctx: &CancellationToken,
        destination: IeeeAddress,
        require_ack: bool,
        cluster_id: u16,
        manufacturer: Option<u16>,
        source_endpoint: u8,
        destination_endpoint: u8,
        transaction_sequence: u8,
        command_id: u8,
        payload: Vec<u8>,
    ) -> Result<(), GatewayError> {
        let mut frame = Frame::cluster_specific(
            Direction::ClientToServer,
            manufacturer,
            transaction_sequence,
            command_id,
            payload,
        );
        frame.disable_default_response = true;

        let message = ApplicationMessage {
            profile_id: zcl_protocol::cluster::profile::HOME_AUTOMATION,
            cluster_id,
            source_endpoint,
            destination_endpoint,
            data: frame.serialize(),
        };

        self.provider
            .send_application_message(ctx, destination, require_ack, message)
            .await?;
        Ok(())
    }
}

fn is_response_command(command_id: u8) -> bool {
    matches!(
        command_id,
        global::READ_ATTRIBUTES_RESPONSE
            | global::WRITE_ATTRIBUTES_RESPONSE
            | global::CONFIGURE_REPORTING_RESPONSE
            | global::DEFAULT_RESPONSE
    )
}

//! Network join discovery capability
//!
//! Governs PermitJoin/DenyJoin on the provider with a timed auto-deny.
//! Only the gateway's own device accepts these operations.

use crate::device::{Device, DeviceIdentifier};
use crate::error::GatewayError;
use crate::events::{Event, EventSender};
use crate::provider::Provider;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Result of a `status` query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryStatus {
    pub discovering: bool,
    pub remaining_duration: Duration,
}

struct DiscoveryState {
    discovering: bool,
    expires_at: Option<Instant>,
    timer_active: bool,
}

pub struct DeviceDiscovery {
    provider: Arc<dyn Provider>,
    events: EventSender,
    self_identifier: DeviceIdentifier,
    self_snapshot: Device,
    state: Mutex<DiscoveryState>,
    timer: Mutex<Option<tokio::task::JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl DeviceDiscovery {
    pub(crate) fn new(
        provider: Arc<dyn Provider>,
        events: EventSender,
        self_identifier: DeviceIdentifier,
        self_snapshot: Device,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            events,
            self_identifier,
            self_snapshot,
            state: Mutex::new(DiscoveryState {
                discovering: false,
                expires_at: None,
                timer_active: false,
            }),
            timer: Mutex::new(None),
            cancel,
        }
    }

    /// Join the auto-deny timer after the gateway token is cancelled
    pub(crate) async fn shutdown(&self) {
        let handle = self.timer.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn ensure_self(&self, device: &Device) -> Result<(), GatewayError> {
        if device.identifier == self.self_identifier {
            Ok(())
        } else {
            Err(GatewayError::NotSelfDevice)
        }
    }

    /// Open the network for joining for `duration`
    ///
    /// A second call while already discovering extends the window to the
    /// later absolute expiry; an earlier one is ignored. Provider failure
    /// leaves internal state untouched.
    pub async fn allow(
        self: &Arc<Self>,
        ctx: &CancellationToken,
        device: &Device,
        duration: Duration,
    ) -> Result<(), GatewayError> {
        self.ensure_self(device)?;

        self.provider.permit_join(ctx, true).await?;

        // Expiry update and timer-spawn decision are one atomic step so
        // a timer observing an empty expiry cannot slip away unreplaced
        let spawn_timer = {
            let mut state = self.state.lock().unwrap();
            state.discovering = true;
            let requested = Instant::now() + duration;
            state.expires_at = Some(match state.expires_at {
                Some(current) if current > requested => current,
                _ => requested,
            });
            let spawn = !state.timer_active;
            state.timer_active = true;
            spawn
        };

        if spawn_timer {
            let discovery = self.clone();
            let cancel = self.cancel.child_token();
            let handle = tokio::spawn(async move {
                discovery.expiry_loop(cancel).await;
            });
            *self.timer.lock().unwrap() = Some(handle);
        }

        self.events.send(Event::DeviceDiscoveryAllowed {
            device: self.self_snapshot.clone(),
            duration,
        });
        tracing::info!("device discovery allowed for {:?}", duration);
        Ok(())
    }

    /// Close the network for joining
    pub async fn deny(&self, ctx: &CancellationToken, device: &Device) -> Result<(), GatewayError> {
        self.ensure_self(device)?;
        self.deny_join(ctx).await
    }

    /// Current discovery state and time remaining
    pub async fn status(
        &self,
        _ctx: &CancellationToken,
        device: &Device,
    ) -> Result<DiscoveryStatus, GatewayError> {
        self.ensure_self(device)?;

        let state = self.state.lock().unwrap();
        let remaining_duration = state
            .expires_at
            .map(|expiry| expiry.saturating_duration_since(Instant::now()))
            .unwrap_or_default();
        Ok(DiscoveryStatus {
            discovering: state.discovering,
            remaining_duration,
        })
    }

    async fn deny_join(&self, ctx: &CancellationToken) -> Result<(), GatewayError> {
        self.provider.deny_join(ctx).await?;

        {
            let mut state = self.state.lock().unwrap();
            state.discovering = false;
            state.expires_at = None;
        }

        self.events.send(Event::DeviceDiscoveryDenied {
            device: self.self_snapshot.clone(),
        });
        tracing::info!("device discovery denied");
        Ok(())
    }

    /// Auto-deny loop; one instance runs while a window is open
    async fn expiry_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let expiry = {
                let mut state = self.state.lock().unwrap();
                match state.expires_at {
                    Some(expiry) => expiry,
                    None => {
                        state.timer_active = false;
                        return;
                    }
                }
            };

            tokio::select! {
                () = cancel.cancelled() => {
                    self.state.lock().unwrap().timer_active = false;
                    return;
                }
                () = tokio::time::sleep_until(expiry.into()) => {}
            }

            // An extension may have moved the expiry while we slept
            let due = {
                let mut state = self.state.lock().unwrap();
                match state.expires_at {
                    Some(expiry) => expiry <= Instant::now(),
                    None => {
                        state.timer_active = false;
                        return;
                    }
                }
            };

            if due {
                let result = self.deny_join(&cancel).await;
                let mut state = self.state.lock().unwrap();
                match result {
                    Err(err) => {
                        tracing::warn!("auto-deny after discovery window failed: {err}");
                        state.timer_active = false;
                        return;
                    }
                    // A concurrent allow may have reopened the window
                    Ok(()) if state.expires_at.is_none() => {
                        state.timer_active = false;
                        return;
                    }
                    Ok(()) => {}
                }
            }
        }
    }
}

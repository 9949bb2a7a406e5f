// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Relay - the boundary API shared by the interface side and the packet
//! engine.
//!
//! One `Relay` owns the device registry and the interface execution context
//! for every device it creates. Construct it once at start-up and hand
//! clones (it is cheap to clone) to every caller:
//!
//! - the interface side calls [`Relay::create_device`] and then
//!   [`DeviceHandle::send`] for outgoing frames;
//! - the packet engine calls [`Relay::push`] for incoming frames and polls
//!   [`Relay::pull`] for outgoing ones.

use std::sync::Arc;

use crate::core::worker::spawn_relay_worker;
use crate::core::{
    compose_device_name, ContextReleased, DeviceContext, DeviceHandle, DeviceRegistry,
    DeviceStats, ExecutionContext, FrameBuffer, GlobalContext, InterfaceAdapter, RelayConfig,
    RelayError, Result,
};

#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    config: RelayConfig,
    registry: DeviceRegistry,
    context: Arc<dyn ExecutionContext>,
}

impl Relay {
    /// Relay with default configuration and a private [`GlobalContext`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                config: RelayConfig::default(),
                registry: DeviceRegistry::new(),
                context: Arc::new(GlobalContext::new()),
            }),
        }
    }

    /// Relay that enters the interface through `context`.
    pub fn with_context(config: RelayConfig, context: Arc<dyn ExecutionContext>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RelayInner {
                config,
                registry: DeviceRegistry::new(),
                context,
            }),
        })
    }

    pub fn with_config(config: RelayConfig) -> Result<Self> {
        Self::with_context(config, Arc::new(GlobalContext::new()))
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    /// The interface execution context shared by all of this relay's workers.
    pub fn context(&self) -> &Arc<dyn ExecutionContext> {
        &self.inner.context
    }

    /// Create the device `prefix + suffix` and start its relay worker.
    ///
    /// Callable from inside the interface context: the token is given up
    /// while the worker is being started and taken back before returning.
    /// On failure nothing is left registered and no worker keeps running.
    pub fn create_device(
        &self,
        suffix: &str,
        adapter: Arc<dyn InterfaceAdapter>,
    ) -> Result<DeviceHandle> {
        let _released = ContextReleased::new(&*self.inner.context);
        let config = &self.inner.config;

        let name = compose_device_name(&config.name_prefix, suffix, config.max_name_len)?;
        if self.inner.registry.contains(&name) {
            return Err(RelayError::DeviceExists(name));
        }

        let device = Arc::new(DeviceContext::new(name, adapter, config));
        let worker = spawn_relay_worker(&device, &self.inner.context, config)?;
        device.attach_worker(worker);

        if let Err(e) = self.inner.registry.register(Arc::clone(&device)) {
            // Lost a race with a concurrent create of the same name.
            device.shutdown();
            return Err(e);
        }

        tracing::info!("[{}] Device created", device.name());
        Ok(DeviceHandle::new(device))
    }

    /// Hand `packet` to the named device's interface.
    ///
    /// Fire and forget: the frame is copied, queued and delivered later by
    /// the device's relay worker. Allocation failure drops the frame and
    /// still returns `Ok`.
    pub fn push(&self, name: &str, packet: &[u8]) -> Result<()> {
        self.lookup(name, "push")?.push(packet);
        Ok(())
    }

    /// Take the oldest frame the named device's interface has sent, if any.
    ///
    /// Never blocks. Ownership of the returned buffer moves to the caller.
    pub fn pull(&self, name: &str) -> Result<Option<FrameBuffer>> {
        Ok(self.lookup(name, "pull")?.pull())
    }

    /// Interface-side handle for an existing device.
    pub fn device(&self, name: &str) -> Option<DeviceHandle> {
        self.inner.registry.lookup(name).map(DeviceHandle::new)
    }

    pub fn stats(&self, name: &str) -> Result<DeviceStats> {
        Ok(self.lookup(name, "stats")?.stats())
    }

    pub fn device_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    pub fn device_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Tear a device down.
    ///
    /// The device disappears from the registry first, so further `push` and
    /// `pull` calls fail with [`RelayError::DeviceNotFound`]. Frames already
    /// queued inbound are still delivered, then the worker is joined and any
    /// frames the engine never pulled are discarded. Returns the final
    /// counters.
    ///
    /// May be called by an adapter from inside `deliver` for its own device.
    /// The call then returns at once and the device reaches
    /// [`DeviceState::Stopped`](crate::DeviceState::Stopped) after its worker
    /// has delivered the remaining inbound frames; the returned counters are
    /// a snapshot taken before that.
    pub fn destroy_device(&self, name: &str) -> Result<DeviceStats> {
        let device = self
            .inner
            .registry
            .deregister(name)
            .ok_or_else(|| RelayError::DeviceNotFound(name.to_string()))?;

        // The worker needs the token to drain; don't hold it while joining.
        let _released = ContextReleased::new(&*self.inner.context);
        device.shutdown();

        let stats = device.stats();
        tracing::info!(
            "[{}] Device destroyed (delivered={}, pulled={}, dropped_in={}, dropped_out={})",
            name,
            stats.delivered,
            stats.pulled,
            stats.dropped_inbound,
            stats.dropped_outbound
        );
        Ok(stats)
    }

    /// Tear every device down, in creation order.
    pub fn shutdown(&self) {
        let devices = self.inner.registry.drain();
        if devices.is_empty() {
            return;
        }

        let _released = ContextReleased::new(&*self.inner.context);
        for device in devices {
            device.shutdown();
        }
        tracing::info!("Relay shut down");
    }

    fn lookup(&self, name: &str, op: &str) -> Result<Arc<DeviceContext>> {
        self.inner.registry.lookup(name).ok_or_else(|| {
            tracing::error!("{}: device {} not found", op, name);
            RelayError::DeviceNotFound(name.to_string())
        })
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl Drop for RelayInner {
    fn drop(&mut self) {
        let devices = self.registry.drain();
        if devices.is_empty() {
            return;
        }

        let _released = ContextReleased::new(&*self.context);
        for device in devices {
            device.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CaptureInterface, ContextToken, DeviceState};
    use std::time::{Duration, Instant};

    fn wait_until(mut f: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !f() {
            assert!(Instant::now() < deadline, "condition not met within 5s");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_create_composes_name() {
        let relay = Relay::new();
        let handle = relay
            .create_device("0", Arc::new(CaptureInterface::new()))
            .unwrap();

        assert_eq!(handle.name(), "virt0");
        assert_eq!(relay.device_names(), vec!["virt0"]);
    }

    #[test]
    fn test_create_name_too_long_registers_nothing() {
        let relay = Relay::new();
        let suffix = "x".repeat(40);
        let result = relay.create_device(&suffix, Arc::new(CaptureInterface::new()));

        assert!(matches!(result, Err(RelayError::NameTooLong { .. })));
        assert_eq!(relay.device_count(), 0);
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let relay = Relay::new();
        let iface = Arc::new(CaptureInterface::new());
        relay.create_device("eth0", iface.clone()).unwrap();

        let second = relay.create_device("eth0", Arc::new(CaptureInterface::new()));
        assert!(matches!(second, Err(RelayError::DeviceExists(ref n)) if n == "virteth0"));
        assert_eq!(relay.device_count(), 1);

        relay.push("virteth0", b"still works").unwrap();
        wait_until(|| iface.frame_count() == 1);
    }

    #[test]
    fn test_create_from_inside_context_gives_token_back() {
        let relay = Relay::new();
        let _token = ContextToken::acquire(&**relay.context());

        relay
            .create_device("0", Arc::new(CaptureInterface::new()))
            .unwrap();

        assert!(relay.context().is_held_by_current_thread());
    }

    #[test]
    fn test_push_and_pull_unknown_device() {
        let relay = Relay::new();
        assert!(matches!(
            relay.push("virt9", b"x"),
            Err(RelayError::DeviceNotFound(_))
        ));
        assert!(matches!(
            relay.pull("virt9"),
            Err(RelayError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_send_pull_round_trip() {
        let relay = Relay::new();
        let handle = relay
            .create_device("0", Arc::new(CaptureInterface::new()))
            .unwrap();

        assert!(relay.pull("virt0").unwrap().is_none());
        handle.send(&[b"dst+src|".as_slice(), b"payload".as_slice()]);

        let frame = relay.pull("virt0").unwrap().unwrap();
        assert_eq!(frame.as_bytes(), b"dst+src|payload");
        assert!(relay.pull("virt0").unwrap().is_none());
    }

    #[test]
    fn test_destroy_drains_inbound_and_discards_outbound() {
        let relay = Relay::new();
        let iface = Arc::new(CaptureInterface::new());
        let handle = relay.create_device("0", iface.clone()).unwrap();

        // Hold the context so the worker cannot deliver yet.
        let token = ContextToken::acquire(&**relay.context());
        for i in 0..5u8 {
            relay.push("virt0", &[i]).unwrap();
        }
        handle.send(&[b"unpulled".as_slice()]);
        drop(token);

        let stats = relay.destroy_device("virt0").unwrap();
        assert_eq!(stats.delivered, 5);
        assert_eq!(stats.dropped_outbound, 1);
        assert_eq!(handle.state(), DeviceState::Stopped);
        assert_eq!(iface.frame_count(), 5);

        assert!(matches!(
            relay.push("virt0", b"x"),
            Err(RelayError::DeviceNotFound(_))
        ));
        assert!(matches!(
            relay.destroy_device("virt0"),
            Err(RelayError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_destroy_from_inside_context_does_not_deadlock() {
        let relay = Relay::new();
        let iface = Arc::new(CaptureInterface::new());
        relay.create_device("0", iface.clone()).unwrap();

        let _token = ContextToken::acquire(&**relay.context());
        relay.push("virt0", b"queued").unwrap();

        let stats = relay.destroy_device("virt0").unwrap();
        assert_eq!(stats.delivered, 1);
        assert!(relay.context().is_held_by_current_thread());
    }

    #[test]
    fn test_name_can_be_reused_after_destroy() {
        let relay = Relay::new();
        relay
            .create_device("0", Arc::new(CaptureInterface::new()))
            .unwrap();
        relay.destroy_device("virt0").unwrap();

        let handle = relay
            .create_device("0", Arc::new(CaptureInterface::new()))
            .unwrap();
        assert_eq!(handle.state(), DeviceState::Active);
    }

    #[test]
    fn test_shutdown_stops_all_devices() {
        let relay = Relay::new();
        let a = relay
            .create_device("0", Arc::new(CaptureInterface::new()))
            .unwrap();
        let b = relay
            .create_device("1", Arc::new(CaptureInterface::new()))
            .unwrap();

        relay.shutdown();

        assert_eq!(relay.device_count(), 0);
        assert_eq!(a.state(), DeviceState::Stopped);
        assert_eq!(b.state(), DeviceState::Stopped);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RelayConfig {
            frames_per_schedule: 0,
            ..Default::default()
        };
        assert!(matches!(
            Relay::with_config(config),
            Err(RelayError::Configuration(_))
        ));
    }
}

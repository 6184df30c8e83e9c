//! MQTT control channel
//!
//! Subscribes to the device's call topic and forwards parsed `on`/`off`
//! signals to the session controller; exposes the data topic as a
//! best-effort publisher for telemetry. Reconnect policy lives entirely in
//! this module; the session core never sees broker connectivity.

use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::ControlError;
use crate::session::ControlSignal;

/// Best-effort publisher for outgoing control-channel payloads
pub trait ControlPublisher: Send + Sync {
    fn publish(&self, payload: &str) -> Result<(), ControlError>;
}

/// MQTT client bridging the broker to the session controller
pub struct MqttControlChannel {
    client: Client,
    data_topic: String,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MqttControlChannel {
    /// Connect to the configured broker and start the event-loop thread.
    /// `on_signal` is invoked from that thread for every parsed signal.
    pub fn connect<F>(config: &AppConfig, on_signal: F) -> Result<Self, ControlError>
    where
        F: Fn(ControlSignal) + Send + 'static,
    {
        let device_id = config.device.device_id.clone();
        let call_topic = config.call_topic();
        let data_topic = config.data_topic();

        let mut options = MqttOptions::new(
            device_id.clone(),
            config.control.broker_host.clone(),
            config.control.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(config.control.keepalive_secs));

        let (client, mut connection) = Client::new(options, 64);
        client
            .subscribe(call_topic.clone(), QoS::AtLeastOnce)
            .map_err(|e| ControlError::SubscribeFailed(e.to_string()))?;

        let running = Arc::new(AtomicBool::new(true));
        let running_for_loop = running.clone();
        let client_for_loop = client.clone();
        let data_topic_for_loop = data_topic.clone();

        let handle = thread::Builder::new()
            .name("mqtt-control".to_string())
            .spawn(move || {
                for notification in connection.iter() {
                    if !running_for_loop.load(Ordering::Relaxed) {
                        break;
                    }

                    match notification {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            tracing::info!("connected to MQTT broker");
                            // Subscriptions do not survive a reconnect
                            if let Err(e) =
                                client_for_loop.subscribe(call_topic.clone(), QoS::AtLeastOnce)
                            {
                                tracing::warn!("subscribe after connect failed: {}", e);
                            }
                            let announce = format!("{} joined system", device_id);
                            if let Err(e) = client_for_loop.publish(
                                data_topic_for_loop.clone(),
                                QoS::AtLeastOnce,
                                false,
                                announce,
                            ) {
                                tracing::warn!("join announcement failed: {}", e);
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            match std::str::from_utf8(&publish.payload) {
                                Ok(payload) => match ControlSignal::from_payload(payload) {
                                    Some(signal) => {
                                        tracing::debug!(?signal, "control signal received");
                                        on_signal(signal);
                                    }
                                    None => {
                                        tracing::warn!(payload, "ignoring unknown control payload")
                                    }
                                },
                                Err(_) => tracing::warn!("ignoring non-UTF8 control payload"),
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("mqtt connection error: {}", e);
                            thread::sleep(Duration::from_secs(1));
                        }
                    }
                }
            })
            .map_err(|e| ControlError::ConnectFailed(e.to_string()))?;

        Ok(Self {
            client,
            data_topic,
            running,
            thread_handle: Some(handle),
        })
    }

    /// Publisher handle for the device's data topic
    pub fn publisher(&self) -> Arc<dyn ControlPublisher> {
        Arc::new(MqttPublisher {
            client: self.client.clone(),
            topic: self.data_topic.clone(),
        })
    }

    /// Disconnect from the broker and join the event-loop thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.client.disconnect();

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MqttControlChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

struct MqttPublisher {
    client: Client,
    topic: String,
}

impl ControlPublisher for MqttPublisher {
    fn publish(&self, payload: &str) -> Result<(), ControlError> {
        self.client
            .publish(self.topic.clone(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| ControlError::PublishFailed(e.to_string()))
    }
}

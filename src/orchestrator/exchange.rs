use crate::client::ProtocolClient;
use crate::config::{TopicGroup, WaitConfig};
use crate::correlator::ArrivalCounter;
use crate::error::{ProbeError, Result};
use crate::payload::PayloadValues;
use crate::scratch::ScratchBuffer;
use crate::transport::SecureTransport;
use crate::types::PublishOptions;
use crate::QoS;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// How the wait for a published message to come back ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoOutcome {
    /// The arrival counter was non-zero after a drive slice
    Received(u32),
    /// Nothing arrived before the wait ran out; not a failure
    TimedOut,
}

/// Outcome of one topic group exchange
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub name: String,
    pub topic: String,
    pub subscribed: Vec<String>,
    pub failed_subscriptions: Vec<String>,
    pub failed_unsubscriptions: Vec<String>,
    /// Number of payload bytes published, if the publish went out
    pub published: Option<usize>,
    pub echo: Option<EchoOutcome>,
    /// Drive slices spent waiting for the echo
    pub slices: u64,
    /// The group-level failure that stopped the exchange
    pub error: Option<ProbeError>,
}

impl GroupReport {
    fn new(group: &TopicGroup) -> Self {
        Self {
            name: group.name.clone(),
            topic: group.topic.clone(),
            subscribed: Vec::new(),
            failed_subscriptions: Vec::new(),
            failed_unsubscriptions: Vec::new(),
            published: None,
            echo: None,
            slices: 0,
            error: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Borrowed session parts one group exchange runs on
pub(crate) struct GroupExchange<'a, T, C> {
    pub transport: &'a mut T,
    pub client: &'a mut C,
    pub counter: &'a ArrivalCounter,
    pub scratch: &'a mut ScratchBuffer,
    pub wait: WaitConfig,
}

impl<T, C> GroupExchange<'_, T, C>
where
    T: SecureTransport,
    C: ProtocolClient<T>,
{
    /// Subscribes every filter, publishes once, waits for an echo and
    /// unsubscribes every filter again
    ///
    /// Filter-level failures are logged and recorded. Only an encoding or
    /// publish failure fails the group, and even then every filter is
    /// unsubscribed before returning.
    pub async fn run(&mut self, group: &TopicGroup, values: &PayloadValues<'_>) -> GroupReport {
        let mut report = GroupReport::new(group);
        info!(group = %group.name, "Subscribing/publishing");

        let callback = self.counter.callback();
        for filter in &group.filters {
            info!(%filter, "MQTT subscribing");
            match self
                .client
                .subscribe(&mut *self.transport, filter, QoS::AtLeastOnce, Arc::clone(&callback))
                .await
            {
                Ok(granted) => {
                    info!(%filter, ?granted, "MQTT subscribes OK");
                    report.subscribed.push(filter.clone());
                }
                Err(e) => {
                    warn!(%filter, error = %e, "MQTT subscribes failed");
                    report.failed_subscriptions.push(filter.clone());
                }
            }
        }

        self.counter.reset();
        match self.publish(group, values).await {
            Ok(len) => {
                report.published = Some(len);
                let (outcome, slices) = self.wait_for_echo(&group.topic).await;
                report.echo = Some(outcome);
                report.slices = slices;
            }
            Err(e) => report.error = Some(e),
        }

        for filter in &group.filters {
            info!(%filter, "MQTT unsubscribing");
            match self.client.unsubscribe(&mut *self.transport, filter).await {
                Ok(()) => info!(%filter, "MQTT unsubscribes OK"),
                Err(e) => {
                    warn!(%filter, error = %e, "MQTT unsubscribes failed");
                    report.failed_unsubscriptions.push(filter.clone());
                }
            }
        }

        if report.is_success() {
            info!(group = %group.name, "Subscribes/publishes OK");
        }
        report
    }

    /// Renders the payload into the scratch buffer and publishes it
    async fn publish(&mut self, group: &TopicGroup, values: &PayloadValues<'_>) -> Result<usize> {
        let mut lease = self.scratch.lease();
        group
            .payload
            .render_into(&mut lease, values)
            .inspect_err(|e| error!(group = %group.name, error = %e, "Payload does not fit"))?;
        info!(payload = %String::from_utf8_lossy(lease.as_bytes()), "Message to publish");

        info!(topic = %group.topic, "MQTT publishing message");
        self.client
            .publish(
                &mut *self.transport,
                &group.topic,
                lease.as_bytes(),
                PublishOptions::at_least_once(),
            )
            .await
            .inspect_err(|e| error!(topic = %group.topic, error = %e, "MQTT publishes message failed"))?;
        info!(topic = %group.topic, "MQTT publishes message OK");
        Ok(lease.len())
    }

    /// Drives the client in slices until something arrives or the wait
    /// runs out, returning the outcome and the number of slices used
    async fn wait_for_echo(&mut self, topic: &str) -> (EchoOutcome, u64) {
        info!(%topic, "MQTT receives message with subscribed topic...");
        let deadline = Instant::now() + self.wait.echo_timeout();
        let max_slices = self.wait.max_slices();
        let mut slices = 0;
        loop {
            slices += 1;
            if let Err(e) = self.client.yield_for(&mut *self.transport, self.wait.slice()).await {
                warn!(%topic, error = %e, "MQTT yield failed while waiting");
                return (EchoOutcome::TimedOut, slices);
            }
            if self.counter.has_arrivals() {
                info!(%topic, count = self.counter.count(), "MQTT receives message with subscribed topic OK");
                return (EchoOutcome::Received(self.counter.count()), slices);
            }
            if slices >= max_slices || Instant::now() >= deadline {
                warn!(%topic, "MQTT receives message with subscribed topic TIMEOUT");
                return (EchoOutcome::TimedOut, slices);
            }
        }
    }
}

//! Stream dispatcher - the single consumption loop
//!
//! Drains the internal message queue, runs decode / extract / assemble
//! against the registry snapshot taken for that message, and fans the
//! frame out to every attached consumer.
//!
//! State machine: `Idle -> Running -> Stopped`. `Stopped` is terminal; a
//! new run needs a new dispatcher bound to the same queue.

use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use contracts::{ContractError, Frame, RawMessage, SinkConfig, SinkType};
use extraction::{assemble, decode, extract, FieldSpecRegistry};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink, NetworkSink};

/// Dispatcher lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Built, not started
    Idle,
    /// Draining the queue
    Running,
    /// Cancelled or input closed
    Stopped,
}

/// Counters returned when a run ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages taken off the queue
    pub messages: u64,
    /// Frames handed to consumers
    pub frames: u64,
    /// Messages skipped because the payload did not decode
    pub decode_errors: u64,
    /// Fields marked absent across all frames
    pub absent_fields: u64,
}

/// Single-consumer loop between the message queue and the consumers
pub struct StreamDispatcher {
    input_rx: Receiver<RawMessage>,
    registry: Arc<FieldSpecRegistry>,
    handles: Vec<SinkHandle>,
    state: DispatcherState,
    seq: u64,
    stats: DispatchStats,
}

impl StreamDispatcher {
    pub fn new(input_rx: Receiver<RawMessage>, registry: Arc<FieldSpecRegistry>) -> Self {
        Self::with_handles(input_rx, registry, Vec::new())
    }

    /// Create a dispatcher with consumers already attached
    pub fn with_handles(
        input_rx: Receiver<RawMessage>,
        registry: Arc<FieldSpecRegistry>,
        handles: Vec<SinkHandle>,
    ) -> Self {
        Self {
            input_rx,
            registry,
            handles,
            state: DispatcherState::Idle,
            seq: 0,
            stats: DispatchStats::default(),
        }
    }

    /// Attach another consumer
    pub fn attach(&mut self, handle: SinkHandle) {
        debug!(sink = %handle.name(), "consumer attached");
        self.handles.push(handle);
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn consumer_count(&self) -> usize {
        self.handles.len()
    }

    /// Metrics for all consumers
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run the loop until `cancel` fires or the queue closes
    ///
    /// # Errors
    /// `InvalidState` unless the dispatcher is `Idle`.
    #[instrument(name = "dispatcher_run", skip(self, cancel), fields(consumers = self.handles.len()))]
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<DispatchStats, DispatcherError> {
        if self.state != DispatcherState::Idle {
            return Err(DispatcherError::InvalidState { state: self.state });
        }
        self.state = DispatcherState::Running;
        info!(consumers = self.handles.len(), "Dispatcher started");

        let input = self.input_rx.clone();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("cancellation received");
                    break;
                }
                next = input.recv() => match next {
                    Ok(message) => self.handle_message(message),
                    Err(_) => {
                        info!("input queue closed");
                        break;
                    }
                },
            }
        }

        self.state = DispatcherState::Stopped;
        info!(
            messages = self.stats.messages,
            frames = self.stats.frames,
            decode_errors = self.stats.decode_errors,
            "Dispatcher stopped"
        );
        Ok(self.stats)
    }

    fn handle_message(&mut self, message: RawMessage) {
        self.stats.messages += 1;

        let tree = match decode(&message.payload) {
            Ok(tree) => tree,
            Err(e) => {
                self.stats.decode_errors += 1;
                ::metrics::counter!("mqtt_stream_decode_errors_total").increment(1);
                warn!(topic = %message.topic, error = %e, "Undecodable payload, message skipped");
                return;
            }
        };

        let specs = self.registry.current();
        let record = extract(&tree, &specs);

        let absent = record.absent_count() as u64;
        if absent > 0 {
            self.stats.absent_fields += absent;
            ::metrics::counter!("mqtt_stream_absent_fields_total").increment(absent);
        }

        let mut frame = assemble(&record, &specs, Utc::now());
        self.seq += 1;
        frame.seq = self.seq;

        self.dispatch_frame(frame);
        self.stats.frames += 1;
        ::metrics::counter!("mqtt_stream_frames_total").increment(1);

        if self.stats.frames.is_multiple_of(100) {
            debug!(frames = self.stats.frames, "Dispatcher progress");
        }
    }

    fn dispatch_frame(&self, frame: Frame) {
        for handle in &self.handles {
            handle.try_send(frame.clone());
        }
    }

    /// Stop every consumer worker after it drains its queue
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown().await;
        }
        info!("Dispatcher shutdown complete");
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub async fn create_sink_handle(
    config: &SinkConfig,
    write_timeout: Duration,
) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            Ok(SinkHandle::spawn_with_timeout(
                sink,
                config.queue_capacity,
                write_timeout,
            ))
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params).map_err(|e| {
                DispatcherError::sink_creation(
                    &config.name,
                    config.sink_type,
                    ContractError::sink_connection(&config.name, e.to_string()),
                )
            })?;
            Ok(SinkHandle::spawn_with_timeout(
                sink,
                config.queue_capacity,
                write_timeout,
            ))
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .await
                .map_err(|e| DispatcherError::sink_creation(&config.name, config.sink_type, e))?;
            Ok(SinkHandle::spawn_with_timeout(
                sink,
                config.queue_capacity,
                write_timeout,
            ))
        }
    }
}

/// Create handles for every configured consumer
#[instrument(
    name = "dispatcher_create_sink_handles",
    skip(configs),
    fields(sink_count = configs.len())
)]
pub async fn create_sink_handles(
    configs: &[SinkConfig],
    write_timeout: Duration,
) -> Result<Vec<SinkHandle>, DispatcherError> {
    let mut handles = Vec::with_capacity(configs.len());
    for config in configs {
        handles.push(create_sink_handle(config, write_timeout).await?);
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::tests::MockSink;
    use crate::sinks::ChannelSink;
    use contracts::{ColumnValues, FieldSpec, FieldSpecSet, ScalarType};
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn registry(rules: &[(&str, &str, ScalarType)]) -> Arc<FieldSpecRegistry> {
        let specs = rules
            .iter()
            .map(|(path, name, ty)| FieldSpec::new(*path, *name, *ty))
            .collect();
        Arc::new(FieldSpecRegistry::with_set(
            FieldSpecSet::new("sensors/a", specs).unwrap(),
        ))
    }

    fn temperature_registry() -> Arc<FieldSpecRegistry> {
        registry(&[("$.temp", "temperature", ScalarType::Number)])
    }

    fn msg(payload: &'static str) -> RawMessage {
        RawMessage::new("sensors/a", payload.as_bytes())
    }

    async fn recv_n(rx: &mut mpsc::Receiver<Frame>, n: usize) -> Vec<Frame> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let frame = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("frame not delivered in time")
                .expect("channel closed");
            out.push(frame);
        }
        out
    }

    fn temperature(frame: &Frame) -> Option<f64> {
        match &frame.column("temperature")?.values {
            ColumnValues::Number(v) => v[0],
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_frames_delivered_in_order() {
        let (tx, rx) = async_channel::bounded(16);
        let (sink, mut frames) = ChannelSink::channel("host", 16);
        let mut dispatcher = StreamDispatcher::with_handles(
            rx,
            temperature_registry(),
            vec![SinkHandle::spawn(sink, 16)],
        );

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let stats = dispatcher.run(run_cancel).await.unwrap();
            (dispatcher, stats)
        });

        for p in [r#"{"temp":1}"#, r#"{"temp":2}"#, r#"{"temp":3}"#] {
            tx.send(msg(p)).await.unwrap();
        }

        let received = recv_n(&mut frames, 3).await;
        let values: Vec<_> = received.iter().map(temperature).collect();
        assert_eq!(values, vec![Some(1.0), Some(2.0), Some(3.0)]);
        let seqs: Vec<_> = received.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        cancel.cancel();
        let (dispatcher, stats) = task.await.unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert_eq!(stats.messages, 3);
        assert_eq!(stats.frames, 3);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_decode_error_skips_message() {
        let (tx, rx) = async_channel::bounded(16);
        let (sink, mut frames) = ChannelSink::channel("host", 16);
        let mut dispatcher = StreamDispatcher::with_handles(
            rx,
            temperature_registry(),
            vec![SinkHandle::spawn(sink, 16)],
        );

        tx.send(msg("{not json")).await.unwrap();
        tx.send(msg(r#"{"temp":5}"#)).await.unwrap();
        tx.close();

        let stats = dispatcher.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.frames, 1);

        let received = recv_n(&mut frames, 1).await;
        assert_eq!(temperature(&received[0]), Some(5.0));
        assert_eq!(received[0].seq, 1);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_absent_fields_counted() {
        let (tx, rx) = async_channel::bounded(4);
        let mut dispatcher = StreamDispatcher::new(
            rx,
            registry(&[
                ("$.a", "a", ScalarType::Number),
                ("$.b", "b", ScalarType::String),
            ]),
        );

        tx.send(msg(r#"{"a":1}"#)).await.unwrap();
        tx.send(msg("{}")).await.unwrap();
        tx.close();

        let stats = dispatcher.run(CancellationToken::new()).await.unwrap();
        assert_eq!(stats.absent_fields, 3);
        assert_eq!(stats.frames, 2);
    }

    #[tokio::test]
    async fn test_stopped_dispatcher_cannot_restart() {
        let (_tx, rx) = async_channel::bounded::<RawMessage>(4);
        let mut dispatcher = StreamDispatcher::new(rx, temperature_registry());
        assert_eq!(dispatcher.state(), DispatcherState::Idle);

        let cancel = CancellationToken::new();
        cancel.cancel();
        dispatcher.run(cancel).await.unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);

        let err = dispatcher.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::InvalidState {
                state: DispatcherState::Stopped
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_waiting_loop() {
        let (_tx, rx) = async_channel::bounded::<RawMessage>(4);
        let mut dispatcher = StreamDispatcher::new(rx, temperature_registry());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let stats = timeout(Duration::from_secs(2), dispatcher.run(cancel))
            .await
            .expect("dispatcher did not stop")
            .unwrap();
        assert_eq!(stats, DispatchStats::default());
    }

    #[tokio::test]
    async fn test_slow_consumer_does_not_stall_others() {
        let (tx, rx) = async_channel::bounded(64);

        let (mut slow, slow_writes) = MockSink::new("slow");
        slow.delay_ms = 500;
        let (fast, mut frames) = ChannelSink::channel("fast", 64);

        let mut dispatcher = StreamDispatcher::with_handles(
            rx,
            temperature_registry(),
            vec![
                SinkHandle::spawn_with_timeout(slow, 2, Duration::from_millis(50)),
                SinkHandle::spawn(fast, 64),
            ],
        );

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            dispatcher.run(run_cancel).await.unwrap();
            dispatcher
        });

        for _ in 0..20 {
            tx.send(msg(r#"{"temp":1}"#)).await.unwrap();
        }

        let received = timeout(Duration::from_millis(400), recv_n(&mut frames, 20))
            .await
            .expect("fast consumer stalled by slow one");
        assert_eq!(received.len(), 20);

        cancel.cancel();
        let dispatcher = task.await.unwrap();
        let metrics: HashMap<_, _> = dispatcher.metrics().into_iter().collect();
        assert!(metrics["slow"].dropped_count > 0);
        assert_eq!(metrics["fast"].dropped_count, 0);
        assert_eq!(slow_writes.load(Ordering::Relaxed), 0);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_registry_swap_applies_to_next_message() {
        let (tx, rx) = async_channel::bounded(4);
        let registry = temperature_registry();
        let (sink, mut frames) = ChannelSink::channel("host", 4);
        let mut dispatcher = StreamDispatcher::with_handles(
            rx,
            Arc::clone(&registry),
            vec![SinkHandle::spawn(sink, 4)],
        );

        tx.send(msg(r#"{"temp":1,"hum":40}"#)).await.unwrap();
        tx.close();
        registry.replace(
            FieldSpecSet::new(
                "sensors/a",
                vec![FieldSpec::new("$.hum", "humidity", ScalarType::Number)],
            )
            .unwrap(),
        );

        dispatcher.run(CancellationToken::new()).await.unwrap();
        let received = recv_n(&mut frames, 1).await;
        assert!(received[0].column("humidity").is_some());
        assert!(received[0].column("temperature").is_none());
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_sink_handles_from_config() {
        let configs = vec![SinkConfig {
            name: "test_log".to_string(),
            sink_type: SinkType::Log,
            queue_capacity: 50,
            params: HashMap::new(),
        }];

        let handles = create_sink_handles(&configs, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].name(), "test_log");

        for handle in handles {
            handle.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_network_sink_without_valid_addr_fails() {
        let mut params = HashMap::new();
        params.insert("addr".to_string(), "not an addr".to_string());
        let config = SinkConfig {
            name: "udp".to_string(),
            sink_type: SinkType::Network,
            queue_capacity: 4,
            params,
        };

        let err = create_sink_handle(&config, Duration::from_millis(100))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            DispatcherError::SinkCreation {
                kind: SinkType::Network,
                ..
            }
        ));
        assert_eq!(err.sink_name(), Some("udp"));
    }
}

//! MQTT datasource facade
//!
//! Serves host requests on top of the streaming core: a query swaps the
//! rule set and retopics the subscription, a stream run drives the
//! dispatcher from the shared internal queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use config_loader::ConfigLoader;
use contracts::{
    CheckHealthResult, DataQuery, DataResponse, DatasourceSettings, FieldSpecSet, Frame,
    HealthStatus, MessageBroker, PublishStreamStatus, QueryDataRequest, QueryDataResponse,
    StreamSettings, SubscribeStreamStatus, Topic, STREAM_PATH,
};
use dispatcher::{DispatchStats, SinkHandle, StreamDispatcher};
use extraction::FieldSpecRegistry;
use ingestion::{MessageQueue, QueueMetricsSnapshot, TopicSubscriptionManager};
use observability::ConsumerCounters;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{DatasourceError, Result};

const HEALTH_OK_MESSAGE: &str = "Data source is working";
const HEALTH_ERROR_MESSAGE: &str = "Not connected to MQTT broker";

/// One datasource instance bound to one broker connection
pub struct MqttDatasource {
    settings: DatasourceSettings,
    stream: StreamSettings,
    registry: Arc<FieldSpecRegistry>,
    subscriptions: TopicSubscriptionManager,
    streaming: AtomicBool,
}

impl MqttDatasource {
    pub fn new(
        settings: DatasourceSettings,
        stream: StreamSettings,
        broker: Arc<dyn MessageBroker>,
    ) -> Self {
        let queue = Arc::new(MessageQueue::from_settings(&stream));
        if !broker.is_connected() {
            warn!(endpoint = %broker.endpoint(), "broker not connected, health will report an error");
        }

        Self {
            settings,
            stream,
            registry: Arc::new(FieldSpecRegistry::new()),
            subscriptions: TopicSubscriptionManager::new(broker, queue),
            streaming: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &DatasourceSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<FieldSpecRegistry> {
        &self.registry
    }

    pub fn active_topic(&self) -> Option<Topic> {
        self.subscriptions.active_topic()
    }

    pub fn queue_metrics(&self) -> QueueMetricsSnapshot {
        self.subscriptions.queue().metrics().snapshot()
    }

    /// Messages waiting in the internal queue
    pub fn pending_messages(&self) -> usize {
        self.subscriptions.queue().len()
    }

    /// Live channel address returned in query responses
    pub fn stream_channel(&self) -> String {
        self.settings.stream_channel()
    }

    pub fn consumer_timeout(&self) -> Duration {
        Duration::from_millis(self.stream.consumer_timeout_ms)
    }

    /// Handle a batch of queries
    ///
    /// Every query gets its own entry keyed by `ref_id`; one failing query
    /// does not fail the others. When several succeed, the last one applied
    /// determines the active topic and rule set.
    #[instrument(name = "datasource_query_data", skip(self, request), fields(queries = request.queries.len()))]
    pub fn query_data(&self, request: QueryDataRequest) -> QueryDataResponse {
        let mut response = QueryDataResponse::default();

        for query in &request.queries {
            let result = match self.apply_query(query) {
                Ok(frame) => DataResponse {
                    frames: vec![frame],
                    error: None,
                },
                Err(e) => {
                    warn!(
                        ref_id = %query.ref_id,
                        category = e.category(),
                        error = %e,
                        "query rejected"
                    );
                    DataResponse::error(e.to_string())
                }
            };
            observability::record_query(result.is_ok());
            response.responses.insert(query.ref_id.clone(), result);
        }

        response
    }

    /// Parse, validate and apply one query
    ///
    /// The rule set is swapped before the retopic so that the first message
    /// of the new topic is already extracted with the new rules.
    pub fn apply_query(&self, query: &DataQuery) -> Result<Frame> {
        let model = ConfigLoader::parse_query(&query.json)?;
        let specs = ConfigLoader::build_field_specs(&model)?;
        self.apply_field_specs(specs)?;
        Ok(Frame::channel_reference(self.stream_channel()))
    }

    /// Install a validated rule set and subscribe to its topic
    pub fn apply_field_specs(&self, specs: FieldSpecSet) -> Result<()> {
        let topic = specs.topic().to_string();
        let fields = specs.len();
        self.registry.replace(specs);
        self.subscriptions.retopic(&topic)?;
        info!(topic = %topic, fields, version = self.registry.version(), "query applied");
        Ok(())
    }

    pub fn check_health(&self) -> CheckHealthResult {
        let connected = self.subscriptions.broker().is_connected();
        observability::record_health(connected);

        if connected {
            CheckHealthResult {
                status: HealthStatus::Ok,
                message: HEALTH_OK_MESSAGE.to_string(),
            }
        } else {
            CheckHealthResult {
                status: HealthStatus::Error,
                message: HEALTH_ERROR_MESSAGE.to_string(),
            }
        }
    }

    /// Whether a consumer may attach to `path`
    pub fn subscribe_stream(&self, path: &str) -> SubscribeStreamStatus {
        if path != STREAM_PATH {
            debug!(path, "unknown stream path");
            return SubscribeStreamStatus::PermissionDenied;
        }
        if !self.subscriptions.broker().is_connected() {
            return SubscribeStreamStatus::PermissionDenied;
        }
        SubscribeStreamStatus::Ok
    }

    /// The stream is read-only for clients
    pub fn publish_stream(&self, path: &str, _payload: &[u8]) -> PublishStreamStatus {
        debug!(path, "publish denied");
        PublishStreamStatus::PermissionDenied
    }

    /// Deliver frames to `handles` until `cancel` fires
    ///
    /// Consumer workers are drained and stopped before this returns. The
    /// subscription stays active, so a later run picks up where this one
    /// stopped.
    ///
    /// # Errors
    /// `StreamNotFound` for a path other than the stream path, `StreamBusy`
    /// while another run is active.
    #[instrument(name = "datasource_run_stream", skip(self, handles, cancel), fields(consumers = handles.len()))]
    pub async fn run_stream(
        &self,
        path: &str,
        handles: Vec<SinkHandle>,
        cancel: CancellationToken,
    ) -> Result<DispatchStats> {
        if path != STREAM_PATH {
            return Err(DatasourceError::StreamNotFound {
                path: path.to_string(),
            });
        }
        let _running = StreamGuard::acquire(&self.streaming).ok_or_else(|| {
            DatasourceError::StreamBusy {
                path: path.to_string(),
            }
        })?;

        let receiver = self.subscriptions.queue().receiver();
        let mut dispatcher =
            StreamDispatcher::with_handles(receiver, Arc::clone(&self.registry), handles);

        let outcome = dispatcher.run(cancel).await;

        for (name, snapshot) in dispatcher.metrics() {
            debug!(
                sink = %name,
                last_seq = ?snapshot.last_seq,
                lost = snapshot.lost(),
                mean_write_us = snapshot.mean_write_latency.as_micros() as u64,
                "consumer summary"
            );
            observability::record_consumer_counters(
                &name,
                ConsumerCounters {
                    queue_len: snapshot.queue_len,
                    writes: snapshot.write_count,
                    failures: snapshot.failure_count,
                    dropped: snapshot.dropped_count,
                    timeouts: snapshot.timeout_count,
                },
            );
        }
        dispatcher.shutdown().await;

        let stats = outcome?;
        info!(
            messages = stats.messages,
            frames = stats.frames,
            decode_errors = stats.decode_errors,
            "stream run finished"
        );
        Ok(stats)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Tear down the active subscription
    #[instrument(name = "datasource_dispose", skip(self))]
    pub fn dispose(&self) {
        if let Err(e) = self.subscriptions.close() {
            warn!(error = %e, "unsubscribe failed during dispose");
        }
        info!("datasource disposed");
    }
}

/// Clears the running flag when a stream run ends, however it ends
struct StreamGuard<'a>(&'a AtomicBool);

impl<'a> StreamGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

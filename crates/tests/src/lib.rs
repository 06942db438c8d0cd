//! # Integration Tests
//!
//! End-to-end tests across the workspace crates:
//! in-memory broker -> subscription -> queue -> dispatcher -> sinks.

#[cfg(test)]
mod harness {
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        ColumnValues, DataQuery, DatasourceSettings, Frame, QueryDataRequest, StreamSettings,
    };
    use datasource::MqttDatasource;
    use dispatcher::{ChannelSink, DispatchStats, SinkHandle};
    use ingestion::InMemoryBroker;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    /// A datasource wired to an in-memory broker with a channel consumer attached
    pub struct Harness {
        pub broker: Arc<InMemoryBroker>,
        pub datasource: Arc<MqttDatasource>,
        pub frames: mpsc::Receiver<Frame>,
        pub cancel: CancellationToken,
        pub stream: JoinHandle<datasource::Result<DispatchStats>>,
    }

    impl Harness {
        pub fn start(stream: StreamSettings, extra: Vec<SinkHandle>) -> Self {
            let broker = Arc::new(InMemoryBroker::new("tcp://localhost:1883"));
            let datasource = Arc::new(MqttDatasource::new(
                DatasourceSettings::new("localhost:1883"),
                stream,
                broker.clone(),
            ));

            let (sink, frames) = ChannelSink::channel("e2e", 4096);
            let mut handles = vec![SinkHandle::spawn(sink, 4096)];
            handles.extend(extra);

            let cancel = CancellationToken::new();
            let stream = {
                let datasource = Arc::clone(&datasource);
                let cancel = cancel.clone();
                tokio::spawn(async move { datasource.run_stream("stream", handles, cancel).await })
            };

            Self {
                broker,
                datasource,
                frames,
                cancel,
                stream,
            }
        }

        pub fn query(&self, json: &str) {
            let response = self.datasource.query_data(QueryDataRequest {
                queries: vec![DataQuery::new("A", json)],
            });
            assert!(
                response.responses["A"].is_ok(),
                "query rejected: {:?}",
                response.responses["A"].error
            );
        }

        pub async fn next_frame(&mut self) -> Frame {
            tokio::time::timeout(RECV_TIMEOUT, self.frames.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("frame channel closed")
        }

        pub async fn stop(self) -> DispatchStats {
            self.cancel.cancel();
            self.stream.await.unwrap().unwrap()
        }
    }

    pub fn number(frame: &Frame, name: &str) -> Option<f64> {
        match &frame.column(name)?.values {
            ColumnValues::Number(values) => values[0],
            _ => None,
        }
    }

    pub fn string(frame: &Frame, name: &str) -> Option<String> {
        match &frame.column(name)?.values {
            ColumnValues::String(values) => values[0].clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use contracts::{
        ColumnValues, ContractError, DataSink, DropPolicy, Frame, SinkConfig, SinkType,
        StreamSettings,
    };
    use dispatcher::SinkHandle;
    use observability::StreamMetricsAggregator;

    use super::harness::{number, string, Harness, RECV_TIMEOUT};

    const TEMP_QUERY: &str = r#"{"topic":"sensors/a","jsonpathOptions":[
        {"jsonpath":"$.temp","alias":"temperature","dataType":"number"}
    ]}"#;

    #[tokio::test]
    async fn test_numeric_field_with_arrival_time() {
        let mut h = Harness::start(StreamSettings::default(), Vec::new());
        h.query(TEMP_QUERY);

        let before = Utc::now();
        h.broker.publish("sensors/a", r#"{"temp": 21.5}"#);
        let frame = h.next_frame().await;

        assert_eq!(number(&frame, "temperature"), Some(21.5));
        assert_eq!(frame.time_column_count(), 1);
        match &frame.time_column().unwrap().values {
            ColumnValues::Time(ts) => assert!(ts[0] >= before && ts[0] <= Utc::now()),
            other => panic!("unexpected time column: {other:?}"),
        }

        h.stop().await;
    }

    #[tokio::test]
    async fn test_time_taken_from_message() {
        let mut h = Harness::start(StreamSettings::default(), Vec::new());
        h.query(
            r#"{"topic":"sensors/a","jsonpathOptions":[
                {"jsonpath":"$.ts","alias":"time","dataType":"string"},
                {"jsonpath":"$.val","alias":"value","dataType":"number"}
            ]}"#,
        );

        h.broker
            .publish("sensors/a", r#"{"ts":"2024-01-01T00:00:00Z","val":3}"#);
        let frame = h.next_frame().await;

        assert_eq!(frame.time_column_count(), 1);
        assert_eq!(
            frame.time_column().unwrap().values,
            ColumnValues::Time(vec![Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()])
        );
        assert_eq!(number(&frame, "value"), Some(3.0));

        h.stop().await;
    }

    #[tokio::test]
    async fn test_missing_path_yields_empty_field() {
        let mut h = Harness::start(StreamSettings::default(), Vec::new());
        h.query(
            r#"{"topic":"sensors/a","jsonpathOptions":[
                {"jsonpath":"$.missing","alias":"x","dataType":"string"},
                {"jsonpath":"$.present","alias":"y","dataType":"string"}
            ]}"#,
        );

        h.broker.publish("sensors/a", r#"{"present": {"k": [1, 2]}}"#);
        let frame = h.next_frame().await;

        assert_eq!(string(&frame, "x"), None);
        assert_eq!(string(&frame, "y").as_deref(), Some(r#"{"k":[1,2]}"#));
        assert_eq!(frame.time_column_count(), 1);

        let stats = h.stop().await;
        assert_eq!(stats.absent_fields, 1);
    }

    #[tokio::test]
    async fn test_frames_keep_publish_order() {
        let mut h = Harness::start(StreamSettings::default(), Vec::new());
        h.query(TEMP_QUERY);

        for i in 0..50 {
            h.broker.publish("sensors/a", format!(r#"{{"temp": {i}}}"#));
        }

        let mut aggregator = StreamMetricsAggregator::new();
        for i in 0..50 {
            let frame = h.next_frame().await;
            assert_eq!(number(&frame, "temperature"), Some(i as f64));
            aggregator.update(&frame, Utc::now());
        }
        assert_eq!(aggregator.seq_gaps, 0);
        assert_eq!(aggregator.last_seq, 50);

        h.stop().await;
    }

    #[tokio::test]
    async fn test_undecodable_message_skipped() {
        let mut h = Harness::start(StreamSettings::default(), Vec::new());
        h.query(TEMP_QUERY);

        h.broker.publish("sensors/a", r#"{"temp": 1}"#);
        h.broker.publish("sensors/a", "not json at all");
        h.broker.publish("sensors/a", r#"{"temp": 2}"#);

        assert_eq!(number(&h.next_frame().await, "temperature"), Some(1.0));
        let second = h.next_frame().await;
        assert_eq!(number(&second, "temperature"), Some(2.0));
        assert_eq!(second.seq, 2);

        let stats = h.stop().await;
        assert_eq!(stats.messages, 3);
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.frames, 2);
    }

    #[tokio::test]
    async fn test_same_topic_query_keeps_single_subscription() {
        let mut h = Harness::start(StreamSettings::default(), Vec::new());
        h.query(TEMP_QUERY);
        h.query(TEMP_QUERY);

        assert_eq!(h.broker.subscription_count(), 1);

        h.broker.publish("sensors/a", r#"{"temp": 5}"#);
        h.next_frame().await;
        h.broker.publish("sensors/a", r#"{"temp": 6}"#);
        assert_eq!(number(&h.next_frame().await, "temperature"), Some(6.0));

        let stats = h.stop().await;
        assert_eq!(stats.frames, 2);
    }

    #[tokio::test]
    async fn test_query_swaps_rules_between_messages() {
        let mut h = Harness::start(StreamSettings::default(), Vec::new());
        h.query(TEMP_QUERY);
        h.broker.publish("sensors/a", r#"{"temp": 1, "hum": 40}"#);
        let first = h.next_frame().await;
        assert!(first.column("humidity").is_none());

        h.query(
            r#"{"topic":"sensors/a","jsonpathOptions":[
                {"jsonpath":"$.hum","alias":"humidity","dataType":"number"}
            ]}"#,
        );
        h.broker.publish("sensors/a", r#"{"temp": 2, "hum": 41}"#);
        let second = h.next_frame().await;
        assert_eq!(number(&second, "humidity"), Some(41.0));
        assert!(second.column("temperature").is_none());

        h.stop().await;
    }

    #[tokio::test]
    async fn test_retopic_stops_old_topic() {
        let mut h = Harness::start(StreamSettings::default(), Vec::new());
        let query = |topic: &str| {
            format!(
                r#"{{"topic":"{topic}","jsonpathOptions":[
                    {{"jsonpath":"$.src","alias":"src","dataType":"string"}}
                ]}}"#
            )
        };

        h.query(&query("sensors/a"));
        h.broker.publish("sensors/a", r#"{"src":"a1"}"#);
        assert_eq!(string(&h.next_frame().await, "src").as_deref(), Some("a1"));

        h.query(&query("sensors/b"));
        assert_eq!(h.broker.publish("sensors/a", r#"{"src":"a2"}"#), 0);
        h.broker.publish("sensors/b", r#"{"src":"b1"}"#);

        assert_eq!(string(&h.next_frame().await, "src").as_deref(), Some("b1"));
        assert_eq!(h.broker.subscribed_topics(), vec!["sensors/b"]);

        h.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_old_topic_message_after_retopic_returns() {
        let mut h = Harness::start(
            StreamSettings {
                queue_capacity: 100_000,
                ..Default::default()
            },
            Vec::new(),
        );
        let query = |topic: &str| {
            format!(
                r#"{{"topic":"{topic}","jsonpathOptions":[
                    {{"jsonpath":"$.src","alias":"src","dataType":"string"}},
                    {{"jsonpath":"$.n","alias":"n","dataType":"number"}}
                ]}}"#
            )
        };
        h.query(&query("sensors/a"));

        // Publish on the old topic from a plain thread while the retopic runs
        let next_seq = Arc::new(AtomicU64::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let publisher = {
            let broker = Arc::clone(&h.broker);
            let next_seq = Arc::clone(&next_seq);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let n = next_seq.fetch_add(1, Ordering::AcqRel);
                    broker.publish("sensors/a", format!(r#"{{"src":"a","n":{n}}}"#));
                    if n >= 3_000 {
                        break;
                    }
                }
            })
        };

        while next_seq.load(Ordering::Acquire) < 100 {
            tokio::task::yield_now().await;
        }
        h.query(&query("sensors/b"));
        let cutoff = next_seq.load(Ordering::Acquire);

        stop.store(true, Ordering::Release);
        publisher.join().unwrap();
        h.broker.publish("sensors/b", r#"{"src":"b","n":0}"#);

        loop {
            let frame = h.next_frame().await;
            let src = string(&frame, "src");
            if src.as_deref() == Some("b") {
                break;
            }
            let n = number(&frame, "n").unwrap();
            assert!(
                (n as u64) < cutoff,
                "message {n} published after retopic returned (cutoff {cutoff})"
            );
        }

        h.stop().await;
    }

    /// Consumer that takes `delay` per write
    struct SlowSink {
        delay: Duration,
        writes: Arc<AtomicU64>,
    }

    impl DataSink for SlowSink {
        fn name(&self) -> &str {
            "slow"
        }

        async fn write(&mut self, _frame: &Frame) -> Result<(), ContractError> {
            tokio::time::sleep(self.delay).await;
            self.writes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_consumer_does_not_stall_others() {
        let writes = Arc::new(AtomicU64::new(0));
        let slow = SinkHandle::spawn_with_timeout(
            SlowSink {
                delay: Duration::from_millis(200),
                writes: Arc::clone(&writes),
            },
            1,
            Duration::from_secs(1),
        );
        let mut h = Harness::start(StreamSettings::default(), vec![slow]);
        h.query(TEMP_QUERY);

        let started = std::time::Instant::now();
        for i in 0..20 {
            h.broker.publish("sensors/a", format!(r#"{{"temp": {i}}}"#));
        }
        for i in 0..20 {
            assert_eq!(number(&h.next_frame().await, "temperature"), Some(i as f64));
        }
        assert!(started.elapsed() < RECV_TIMEOUT);

        let stats = h.stop().await;
        assert_eq!(stats.frames, 20);
        assert!(writes.load(Ordering::Relaxed) < 20);
    }

    #[tokio::test]
    async fn test_drop_newest_policy_keeps_oldest() {
        let broker = Arc::new(ingestion::InMemoryBroker::new("tcp://localhost:1883"));
        let datasource = datasource::MqttDatasource::new(
            contracts::DatasourceSettings::new("localhost:1883"),
            StreamSettings {
                queue_capacity: 2,
                drop_policy: DropPolicy::DropNewest,
                ..Default::default()
            },
            broker.clone(),
        );
        let response = datasource.query_data(contracts::QueryDataRequest {
            queries: vec![contracts::DataQuery::new("A", TEMP_QUERY)],
        });
        assert!(response.responses["A"].is_ok());

        // No stream running yet, so the queue fills up
        for i in 0..5 {
            broker.publish("sensors/a", format!(r#"{{"temp": {i}}}"#));
        }
        let queue = datasource.queue_metrics();
        assert_eq!(queue.received, 5);
        assert_eq!(queue.dropped, 3);

        let (sink, mut rx) = dispatcher::ChannelSink::channel("late", 8);
        let cancel = tokio_util::sync::CancellationToken::new();
        let datasource = Arc::new(datasource);
        let runner = {
            let datasource = Arc::clone(&datasource);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                datasource
                    .run_stream("stream", vec![SinkHandle::spawn(sink, 8)], cancel)
                    .await
            })
        };

        for expected in [0.0, 1.0] {
            let frame = tokio::time::timeout(RECV_TIMEOUT, rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(number(&frame, "temperature"), Some(expected));
        }

        cancel.cancel();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_replay_into_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");
        let config = SinkConfig {
            name: "file".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 100,
            params: [("path".to_string(), path.display().to_string())].into(),
        };
        let file = dispatcher::create_sink_handle(&config, Duration::from_secs(1))
            .await
            .unwrap();

        let mut h = Harness::start(StreamSettings::default(), vec![file]);
        h.query(TEMP_QUERY);

        let records = ingestion::parse_records(
            r#"
            # two readings and one for another topic
            {"topic": "sensors/a", "payload": {"temp": 1.5}}
            {"topic": "sensors/other", "payload": {"temp": 99}}
            {"topic": "sensors/a", "payload": "{\"temp\": \"2.5\"}"}
            "#,
        )
        .unwrap();
        let replay = ingestion::ReplayPublisher::new(Arc::clone(&h.broker))
            .run(&records, tokio_util::sync::CancellationToken::new())
            .await;
        assert_eq!(replay.published, 3);
        assert_eq!(replay.deliveries, 2);

        assert_eq!(number(&h.next_frame().await, "temperature"), Some(1.5));
        assert_eq!(number(&h.next_frame().await, "temperature"), Some(2.5));
        h.stop().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["seq"], 2);
    }
}

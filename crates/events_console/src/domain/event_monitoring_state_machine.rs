use common::domain::MonitorParams;
use message_decoder::{parse_all, DecodeType, SchemaResolver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::{
    merge_messages, ConsoleError, DecoderConfig, DecoderInfoParams, DeviceEventsAction,
    DeviceEventsState, FormMode, MonitorApi, Notification, Notifier,
};

/// Result of one `start` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Fetched { added: usize },
    Failed,
    /// The call was superseded or stopped; its result was dropped
    Discarded,
}

/// Drives the events view: monitor calls, history merging and decoder
/// configuration. State is published through a `watch` channel.
///
/// Operations never hold a lock across a network call. Each `start` takes
/// a fresh request marker and its result is applied only if the marker is
/// still current when it completes.
pub struct EventMonitoringStateMachine {
    api: Arc<dyn MonitorApi>,
    resolver: Arc<dyn SchemaResolver>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<DeviceEventsState>,
    next_request: AtomicU64,
}

impl EventMonitoringStateMachine {
    pub fn new(
        api: Arc<dyn MonitorApi>,
        resolver: Arc<dyn SchemaResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(DeviceEventsState::default());
        Self {
            api,
            resolver,
            notifier,
            state,
            next_request: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceEventsState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DeviceEventsState {
        self.state.borrow().clone()
    }

    pub fn form_mode(&self) -> FormMode {
        self.state.borrow().form_mode
    }

    pub async fn dispatch(&self, action: DeviceEventsAction) -> FormMode {
        match action {
            DeviceEventsAction::StartEventsMonitoring(params) => {
                self.start(&params).await;
            }
            DeviceEventsAction::StopEventsMonitoring => self.stop().await,
            DeviceEventsAction::ClearEventsMonitoring => self.clear(),
            DeviceEventsAction::SetDecoderInfo(params) => self.set_decoder_info(params).await,
            DeviceEventsAction::SetDefaultDecodeInfo => self.set_default_decode_info(),
        }
        self.form_mode()
    }

    #[instrument(skip(self, params), fields(device_id = %params.device_id))]
    pub async fn start(&self, params: &MonitorParams) -> StartOutcome {
        let request = self.next_request.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|state| {
            state.form_mode = FormMode::Working;
            state.in_flight = Some(request);
        });

        let result = self.api.monitor(params).await;

        match result {
            Ok(batch) => {
                // Decode with whatever decoder is current at completion
                let prototype = self.state.borrow().content_type.active_prototype().cloned();
                let decoded = parse_all(batch.messages, prototype.as_ref());

                let mut added = None;
                self.state.send_if_modified(|state| {
                    if state.in_flight != Some(request) {
                        return false;
                    }
                    let before = state.message.len();
                    state.message = merge_messages(std::mem::take(&mut state.message), decoded);
                    state.form_mode = FormMode::Fetched;
                    state.in_flight = None;
                    added = Some(state.message.len() - before);
                    true
                });

                match added {
                    Some(added) => {
                        debug!(added, status = batch.status.as_str(), "monitor batch merged");
                        StartOutcome::Fetched { added }
                    }
                    None => {
                        debug!(request, "discarding stale monitor result");
                        StartOutcome::Discarded
                    }
                }
            }
            Err(error) => {
                let applied = self.state.send_if_modified(|state| {
                    if state.in_flight != Some(request) {
                        return false;
                    }
                    state.form_mode = FormMode::Failed;
                    state.in_flight = None;
                    true
                });

                if !applied {
                    debug!(request, error = %error, "discarding stale monitor failure");
                    return StartOutcome::Discarded;
                }
                warn!(error = %error, "monitor call failed");
                self.notifier.notify(Notification::error(format!(
                    "Failed to monitor device events: {}",
                    error
                )));
                StartOutcome::Failed
            }
        }
    }

    /// Tear down the proxy session. History is kept.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.state.send_modify(|state| {
            state.form_mode = FormMode::Updating;
            state.in_flight = None;
        });

        let result = self.api.stop().await;
        let next_mode = match &result {
            Ok(()) => FormMode::Upserted,
            Err(_) => FormMode::Failed,
        };
        // A start issued meanwhile owns the mode now
        self.state.send_if_modified(|state| {
            if state.form_mode != FormMode::Updating {
                return false;
            }
            state.form_mode = next_mode;
            true
        });

        match result {
            Ok(()) => info!("events monitoring stopped"),
            Err(error) => {
                warn!(error = %error, "stop call failed");
                self.notifier.notify(Notification::error(format!(
                    "Failed to stop monitoring device events: {}",
                    error
                )));
            }
        }
    }

    pub fn clear(&self) {
        self.state.send_modify(|state| state.message.clear());
    }

    #[instrument(skip(self, params), fields(decode_type = %params.decode_type))]
    pub async fn set_decoder_info(&self, params: DecoderInfoParams) {
        self.state
            .send_modify(|state| state.form_mode = FormMode::Working);

        match self.resolve_decoder(params).await {
            Ok(config) => {
                info!(
                    prototype = ?config.decoder_prototype.as_ref().map(|p| p.full_name()),
                    "decoder updated"
                );
                self.state.send_modify(|state| {
                    state.content_type = config;
                    state.form_mode = FormMode::SetDecoderSucceeded;
                });
            }
            Err(error) => {
                warn!(error = %error, "decoder update failed");
                self.state
                    .send_modify(|state| state.form_mode = FormMode::SetDecoderFailed);
                self.notifier.notify(Notification::error(format!(
                    "Failed to set decoder: {}",
                    error
                )));
            }
        }
    }

    pub fn set_default_decode_info(&self) {
        self.state
            .send_modify(|state| state.content_type = DecoderConfig::default());
    }

    async fn resolve_decoder(&self, params: DecoderInfoParams) -> Result<DecoderConfig, ConsoleError> {
        if params.decode_type == DecodeType::Json {
            return Ok(DecoderConfig::default());
        }

        let schema = params.schema.ok_or_else(|| {
            ConsoleError::InvalidDecoderInfo("a schema is required for protobuf decoding".to_string())
        })?;
        let type_name = params
            .type_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                ConsoleError::InvalidDecoderInfo("a message type name is required".to_string())
            })?;

        let resolved = self.resolver.resolve(&schema, &type_name).await?;
        Ok(DecoderConfig {
            decode_type: DecodeType::Protobuf,
            decoder_proto_file: Some(resolved.source_text),
            decoder_prototype: Some(resolved.prototype),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockMonitorApi, MockNotifier, MonitorApi};
    use crate::domain::ConsoleResult;
    use async_trait::async_trait;
    use common::domain::{Message, MessageBody, MonitorBatch};
    use message_decoder::{DecoderRegistry, MockSchemaResolver, SchemaSource};
    use serde_json::{json, Map};
    use std::collections::VecDeque;
    use tokio::sync::Notify;

    const READING_SCHEMA: &str = r#"
        syntax = "proto3";
        package telemetry.v1;
        message Reading { string sensor = 1; int32 value = 2; }
    "#;

    fn raw(enqueued_time: &str, bytes: &[u8]) -> Message {
        Message {
            body: Some(MessageBody::RawBuffer(bytes.to_vec())),
            enqueued_time: enqueued_time.to_string(),
            properties: Map::new(),
            system_properties: None,
        }
    }

    fn params() -> MonitorParams {
        MonitorParams::new("Endpoint=nats://localhost:4222;EntityPath=telemetry", "dev-1")
    }

    fn batches(batches: Vec<Vec<Message>>) -> MockMonitorApi {
        let mut queue: VecDeque<Vec<Message>> = batches.into();
        let mut api = MockMonitorApi::new();
        api.expect_monitor()
            .returning(move |_| Ok(MonitorBatch::collected(queue.pop_front().unwrap_or_default())));
        api
    }

    fn quiet_notifier() -> Arc<dyn Notifier> {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();
        Arc::new(notifier)
    }

    fn unused_resolver() -> Arc<dyn SchemaResolver> {
        let mut resolver = MockSchemaResolver::new();
        resolver.expect_resolve().never();
        Arc::new(resolver)
    }

    fn machine(api: MockMonitorApi) -> EventMonitoringStateMachine {
        EventMonitoringStateMachine::new(Arc::new(api), unused_resolver(), quiet_notifier())
    }

    fn times(state: &DeviceEventsState) -> Vec<&str> {
        state.message.iter().map(|m| m.enqueued_time.as_str()).collect()
    }

    #[tokio::test]
    async fn test_start_decodes_and_merges_newest_first() {
        let machine = machine(batches(vec![vec![
            raw("2024-05-01T10:00:01.000Z", b"test"),
            raw("2024-05-01T10:00:02.000Z", b"more"),
        ]]));

        let outcome = machine.start(&params()).await;
        assert_eq!(outcome, StartOutcome::Fetched { added: 2 });

        let state = machine.state();
        assert_eq!(state.form_mode, FormMode::Fetched);
        assert_eq!(state.in_flight, None);
        assert_eq!(
            times(&state),
            vec!["2024-05-01T10:00:02.000Z", "2024-05-01T10:00:01.000Z"]
        );
        // Without a prototype raw buffers are shown as text
        assert_eq!(state.message[1].body, Some(MessageBody::Decoded(json!("test"))));
    }

    #[tokio::test]
    async fn test_repoll_overlap_is_not_duplicated() {
        let machine = machine(batches(vec![
            vec![
                raw("2024-05-01T10:00:01.000Z", b"a"),
                raw("2024-05-01T10:00:02.000Z", b"b"),
            ],
            vec![
                raw("2024-05-01T10:00:01.000Z", b"a"),
                raw("2024-05-01T10:00:03.000Z", b"c"),
            ],
        ]));

        machine.start(&params()).await;
        let outcome = machine.start(&params()).await;

        assert_eq!(outcome, StartOutcome::Fetched { added: 1 });
        assert_eq!(
            times(&machine.state()),
            vec![
                "2024-05-01T10:00:03.000Z",
                "2024-05-01T10:00:02.000Z",
                "2024-05-01T10:00:01.000Z"
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_start_keeps_history_and_notifies() {
        let mut api = MockMonitorApi::new();
        let mut calls = 0;
        api.expect_monitor().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(MonitorBatch::collected(vec![raw("2024-05-01T10:00:01.000Z", b"a")]))
            } else {
                Err(ConsoleError::Api("status 502: connection refused".to_string()))
            }
        });
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| n.text.contains("connection refused"))
            .times(1)
            .returning(|_| ());

        let machine =
            EventMonitoringStateMachine::new(Arc::new(api), unused_resolver(), Arc::new(notifier));

        machine.start(&params()).await;
        let outcome = machine.start(&params()).await;

        assert_eq!(outcome, StartOutcome::Failed);
        let state = machine.state();
        assert_eq!(state.form_mode, FormMode::Failed);
        assert_eq!(state.message.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_keeps_history() {
        let mut api = batches(vec![vec![raw("2024-05-01T10:00:01.000Z", b"a")]]);
        api.expect_stop().times(1).returning(|| Ok(()));
        let machine = machine(api);

        machine.start(&params()).await;
        machine.stop().await;

        let state = machine.state();
        assert_eq!(state.form_mode, FormMode::Upserted);
        assert_eq!(state.message.len(), 1);

        machine.clear();
        assert!(machine.state().message.is_empty());
    }

    #[tokio::test]
    async fn test_failed_stop_notifies() {
        let mut api = MockMonitorApi::new();
        api.expect_stop()
            .returning(|| Err(ConsoleError::Api("status 500: boom".to_string())));
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| ());

        let machine =
            EventMonitoringStateMachine::new(Arc::new(api), unused_resolver(), Arc::new(notifier));
        let mode = machine.dispatch(DeviceEventsAction::StopEventsMonitoring).await;

        assert_eq!(mode, FormMode::Failed);
    }

    /// Holds every monitor call until released
    struct GatedApi {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl MonitorApi for GatedApi {
        async fn monitor(&self, _params: &MonitorParams) -> ConsoleResult<MonitorBatch> {
            self.gate.notified().await;
            Ok(MonitorBatch::collected(vec![raw("2024-05-01T10:00:01.000Z", b"late")]))
        }

        async fn stop(&self) -> ConsoleResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_result_arriving_after_stop_is_discarded() {
        let gate = Arc::new(Notify::new());
        let machine = Arc::new(EventMonitoringStateMachine::new(
            Arc::new(GatedApi { gate: gate.clone() }),
            unused_resolver(),
            quiet_notifier(),
        ));

        let starting = machine.clone();
        let in_flight = tokio::spawn(async move { starting.start(&params()).await });
        tokio::task::yield_now().await;
        while machine.state().in_flight.is_none() {
            tokio::task::yield_now().await;
        }

        machine.stop().await;
        gate.notify_one();

        assert_eq!(in_flight.await.unwrap(), StartOutcome::Discarded);
        let state = machine.state();
        assert_eq!(state.form_mode, FormMode::Upserted);
        assert!(state.message.is_empty());
    }

    #[tokio::test]
    async fn test_json_decoder_never_touches_the_registry() {
        let machine = machine(MockMonitorApi::new());
        let mode = machine
            .dispatch(DeviceEventsAction::SetDecoderInfo(DecoderInfoParams::json()))
            .await;

        assert_eq!(mode, FormMode::SetDecoderSucceeded);
        assert_eq!(machine.state().content_type, DecoderConfig::default());
    }

    #[tokio::test]
    async fn test_protobuf_decoder_applies_to_later_batches() {
        // sensor = "t1", value = 7
        let reading = [0x0A, 0x02, b't', b'1', 0x10, 0x07];
        let machine = EventMonitoringStateMachine::new(
            Arc::new(batches(vec![vec![raw("2024-05-01T10:00:01.000Z", &reading)]])),
            Arc::new(DecoderRegistry::new()),
            quiet_notifier(),
        );

        machine
            .set_decoder_info(DecoderInfoParams::protobuf(
                SchemaSource::Text(READING_SCHEMA.to_string()),
                ".telemetry.v1.Reading",
            ))
            .await;
        let state = machine.state();
        assert_eq!(state.form_mode, FormMode::SetDecoderSucceeded);
        assert_eq!(state.content_type.decode_type, DecodeType::Protobuf);
        assert_eq!(state.content_type.decoder_proto_file.as_deref(), Some(READING_SCHEMA));

        machine.start(&params()).await;
        assert_eq!(
            machine.state().message[0].body,
            Some(MessageBody::Decoded(json!({"sensor": "t1", "value": 7})))
        );

        machine.set_default_decode_info();
        assert_eq!(machine.state().content_type, DecoderConfig::default());
    }

    #[tokio::test]
    async fn test_bad_schema_keeps_previous_decoder() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| n.text.contains("NoSuchType"))
            .times(1)
            .returning(|_| ());
        let machine = EventMonitoringStateMachine::new(
            Arc::new(MockMonitorApi::new()),
            Arc::new(DecoderRegistry::new()),
            Arc::new(notifier),
        );

        machine
            .set_decoder_info(DecoderInfoParams::protobuf(
                SchemaSource::Text(READING_SCHEMA.to_string()),
                "Reading",
            ))
            .await;
        let before = machine.state().content_type;

        machine
            .set_decoder_info(DecoderInfoParams::protobuf(
                SchemaSource::Text(READING_SCHEMA.to_string()),
                "NoSuchType",
            ))
            .await;

        let state = machine.state();
        assert_eq!(state.form_mode, FormMode::SetDecoderFailed);
        assert_eq!(state.content_type, before);
    }

    #[tokio::test]
    async fn test_protobuf_without_schema_fails() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| ());
        let machine = EventMonitoringStateMachine::new(
            Arc::new(MockMonitorApi::new()),
            unused_resolver(),
            Arc::new(notifier),
        );

        let mode = machine
            .dispatch(DeviceEventsAction::SetDecoderInfo(DecoderInfoParams {
                decode_type: DecodeType::Protobuf,
                schema: None,
                type_name: Some("Reading".to_string()),
            }))
            .await;
        assert_eq!(mode, FormMode::SetDecoderFailed);
    }

    #[tokio::test]
    async fn test_subscribers_see_mode_changes() {
        let machine = machine(batches(vec![Vec::new()]));
        let mut updates = machine.subscribe();

        machine.start(&params()).await;

        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().form_mode, FormMode::Fetched);
    }
}

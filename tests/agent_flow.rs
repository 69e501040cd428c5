//! Agent lifecycle integration tests: item registration, publishing,
//! persistence, and teardown, driven through a recording transport.

use chrono::TimeZone;
use std::sync::Arc;
use tether::RegistrationState;
use tether::prelude::*;
use tether_types::ItemKind;
use tether_types::test_utils::{PluginCall, RecordingPlugin};

async fn agent_with(
    plugin: Arc<RecordingPlugin>,
    workers: usize,
) -> (tempfile::TempDir, Agent) {
    let dir = tempfile::tempdir().expect("tempdir");
    let agent = Agent::builder(plugin)
        .data_dir(dir.path())
        .workers(workers)
        .initialize()
        .await
        .expect("initialize");
    (dir, agent)
}

#[tokio::test]
async fn register_publish_deregister() {
    let plugin = Arc::new(RecordingPlugin::new());
    let (_dir, agent) = agent_with(Arc::clone(&plugin), 0).await;

    let temp = agent.telemetry_create("temp", ValueKind::Float32).unwrap();
    agent.telemetry_register(&temp).await.unwrap();
    let taken_at = chrono::Utc.timestamp_opt(1_700_000_000, 0).single();
    agent
        .telemetry_publish(&temp, 23.5f32, taken_at)
        .await
        .unwrap();
    agent.telemetry_deregister(&temp).await.unwrap();

    let calls = plugin.calls();
    let registers = plugin.count(|c| matches!(c, PluginCall::Register(_)));
    let deregisters = plugin.count(|c| matches!(c, PluginCall::Deregister(_)));
    assert_eq!(registers, 1);
    assert_eq!(deregisters, 1);

    let publishes: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            PluginCall::Publish { telemetry, sample } => Some((telemetry.clone(), sample.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(publishes.len(), 1);
    let (telemetry, sample) = &publishes[0];
    assert_eq!(telemetry, "temp");
    assert_eq!(sample.value, Value::Float32(23.5));
    assert_eq!(sample.timestamp.map(|t| t.timestamp()), Some(1_700_000_000));
}

#[tokio::test]
async fn register_is_idempotent_and_deregister_is_not() {
    let plugin = Arc::new(RecordingPlugin::new());
    let (_dir, agent) = agent_with(Arc::clone(&plugin), 0).await;

    let temp = agent.telemetry_create("temp", ValueKind::Float32).unwrap();
    agent.telemetry_register(&temp).await.unwrap();
    agent.telemetry_register(&temp).await.unwrap();
    // Second create with the same name lands on the same pool entry.
    let again = agent.telemetry_create("temp", ValueKind::Float32).unwrap();
    assert_eq!(again.name(), temp.name());
    assert_eq!(plugin.count(|c| matches!(c, PluginCall::Register(_))), 1);

    agent.telemetry_deregister(&temp).await.unwrap();
    assert_eq!(
        agent.telemetry_deregister(&temp).await,
        Err(Status::NotInitialized)
    );
}

#[tokio::test]
async fn plugin_refusal_leaves_items_pending() {
    let plugin = Arc::new(RecordingPlugin::new());
    let (_dir, agent) = agent_with(Arc::clone(&plugin), 0).await;

    let temp = agent.telemetry_create("temp", ValueKind::Float32).unwrap();
    plugin.fail_register(true);
    assert_eq!(agent.telemetry_register(&temp).await, Err(Status::Failure));
    assert_eq!(
        agent.telemetry_state(&temp).unwrap(),
        RegistrationState::RegisterPending
    );

    // Retrying while pending stays pending on failure, registers on
    // success.
    assert_eq!(agent.telemetry_register(&temp).await, Err(Status::Failure));
    assert_eq!(
        agent.telemetry_state(&temp).unwrap(),
        RegistrationState::RegisterPending
    );
    plugin.fail_register(false);
    agent.telemetry_register(&temp).await.unwrap();
    assert_eq!(
        agent.telemetry_state(&temp).unwrap(),
        RegistrationState::Registered
    );

    plugin.fail_deregister(true);
    assert_eq!(agent.telemetry_deregister(&temp).await, Err(Status::Failure));
    assert_eq!(
        agent.telemetry_state(&temp).unwrap(),
        RegistrationState::DeregisterPending
    );
}

#[tokio::test]
async fn publish_checks_registration_and_kind() {
    let plugin = Arc::new(RecordingPlugin::new());
    let (_dir, agent) = agent_with(Arc::clone(&plugin), 0).await;

    let temp = agent.telemetry_create("temp", ValueKind::Float32).unwrap();
    assert_eq!(
        agent.telemetry_publish(&temp, 1.0f32, None).await,
        Err(Status::NotInitialized)
    );

    agent.telemetry_register(&temp).await.unwrap();
    // Lossless coercion to the declared kind; the transport sees Float32.
    agent.telemetry_publish(&temp, 23i32, None).await.unwrap();
    assert_eq!(
        agent.telemetry_publish(&temp, "not a number", None).await,
        Err(Status::BadRequest)
    );

    let published = plugin
        .calls()
        .into_iter()
        .find_map(|c| match c {
            PluginCall::Publish { sample, .. } => Some(sample),
            _ => None,
        })
        .expect("one publish");
    assert_eq!(published.value, Value::Float32(23.0));
}

#[tokio::test]
async fn alarms_register_and_raise() {
    let plugin = Arc::new(RecordingPlugin::new());
    let (_dir, agent) = agent_with(Arc::clone(&plugin), 0).await;

    let overheat = agent.alarm_create("overheat").unwrap();
    assert_eq!(
        agent.alarm_raise(&overheat, 3, Some("too hot")).await,
        Err(Status::NotInitialized)
    );
    agent.alarm_register(&overheat).await.unwrap();
    agent.alarm_raise(&overheat, 3, Some("too hot")).await.unwrap();

    let notified = plugin
        .calls()
        .into_iter()
        .find_map(|c| match c {
            PluginCall::Notify { alarm, event } => Some((alarm, event)),
            _ => None,
        })
        .expect("one notify");
    assert_eq!(notified.0, "overheat");
    assert_eq!(notified.1.severity, 3);
    assert_eq!(notified.1.message.as_deref(), Some("too hot"));
    assert!(notified.1.timestamp.is_some());
}

#[tokio::test]
async fn retry_pending_replays_recorded_intent_after_reconnect() {
    let plugin = Arc::new(RecordingPlugin::new());
    let (_dir, agent) = agent_with(Arc::clone(&plugin), 0).await;

    let temp = agent.telemetry_create("temp", ValueKind::Float32).unwrap();
    let overheat = agent.alarm_create("overheat").unwrap();

    plugin.fail_register(true);
    let _ = agent.telemetry_register(&temp).await;
    let _ = agent.alarm_register(&overheat).await;
    assert_eq!(
        agent.telemetry_state(&temp).unwrap(),
        RegistrationState::RegisterPending
    );

    // The transport comes back; the sweep replays both registrations.
    plugin.fail_register(false);
    agent.retry_pending().await;
    assert_eq!(
        agent.telemetry_state(&temp).unwrap(),
        RegistrationState::Registered
    );
    assert_eq!(
        agent.alarm_state(&overheat).unwrap(),
        RegistrationState::Registered
    );

    // A sweep with nothing pending calls no plugin hooks.
    let before = plugin.calls().len();
    agent.retry_pending().await;
    assert_eq!(plugin.calls().len(), before);
}

#[tokio::test]
async fn device_identity_is_stable_across_restarts() {
    let plugin = Arc::new(RecordingPlugin::new());
    let dir = tempfile::tempdir().unwrap();

    let agent = Agent::builder(Arc::clone(&plugin) as Arc<dyn tether_types::Plugin>)
        .data_dir(dir.path())
        .workers(0)
        .initialize()
        .await
        .unwrap();
    let first_id = agent.device_id().to_owned();
    assert!(!first_id.is_empty());
    agent.terminate(DurationMs::ZERO).await.unwrap();

    let agent = Agent::builder(plugin)
        .data_dir(dir.path())
        .workers(0)
        .initialize()
        .await
        .unwrap();
    assert_eq!(agent.device_id(), first_id);
}

#[tokio::test]
async fn configuration_file_loads_into_the_option_store() {
    let plugin = Arc::new(RecordingPlugin::new());
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(
        dir.path().join("tether.conf.json"),
        r#"{"mqtt": {"host": "cloud.example"}, "publish_interval": 30}"#,
    )
    .await
    .unwrap();

    let agent = Agent::builder(plugin)
        .data_dir(dir.path())
        .workers(0)
        .initialize()
        .await
        .unwrap();

    assert_eq!(
        agent.option_get::<String>("mqtt.host", Convert::Exact).unwrap(),
        "cloud.example"
    );
    assert_eq!(
        agent.option_get::<i64>("publish_interval", Convert::Exact),
        Ok(30)
    );
    // Application overrides land in the same store.
    agent.option_set("publish_interval", 10i64).unwrap();
    assert_eq!(
        agent.option_get::<u32>("publish_interval", Convert::Loose),
        Ok(10)
    );
}

#[tokio::test]
async fn file_transfers_validate_then_forward() {
    let plugin = Arc::new(RecordingPlugin::new());
    let (dir, agent) = agent_with(Arc::clone(&plugin), 0).await;

    let source = dir.path().join("readings.log");
    tokio::fs::write(&source, b"1,2,3\n").await.unwrap();

    agent
        .file_upload("readings", &source, OptionStore::new())
        .await
        .unwrap();
    assert_eq!(
        agent
            .file_upload("missing", dir.path().join("absent.log"), OptionStore::new())
            .await,
        Err(Status::FileOpenFailed)
    );
    agent
        .file_download("firmware", dir.path().join("firmware.bin"), OptionStore::new())
        .await
        .unwrap();

    let transfers = plugin.count(|c| matches!(c, PluginCall::Transfer(_)));
    assert_eq!(transfers, 2);
}

#[tokio::test]
async fn terminate_fails_pending_requests_and_tears_down() {
    let plugin = Arc::new(RecordingPlugin::new());
    let (_dir, agent) = agent_with(Arc::clone(&plugin), 0).await;

    let temp = agent.telemetry_create("temp", ValueKind::Float32).unwrap();
    agent.telemetry_register(&temp).await.unwrap();

    agent
        .request_execute(ActionRequest::new("reboot"))
        .unwrap();
    agent
        .request_execute(ActionRequest::new("reset"))
        .unwrap();

    agent.terminate(DurationMs::from_secs(5)).await.unwrap();

    let results = plugin.transmitted();
    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(result.status, tether_types::CompletionStatus::Failed(Status::Failure));
        assert_eq!(
            result
                .param_value::<String>(tether_types::PARAM_ERROR, Convert::Exact)
                .unwrap(),
            "library shutting down"
        );
    }

    // The registered channel was deregistered and the transport released.
    assert_eq!(plugin.count(|c| matches!(c, PluginCall::Deregister(_))), 1);
    assert_eq!(plugin.count(|c| matches!(c, PluginCall::Disconnect)), 1);

    // New work is refused after shutdown.
    assert_eq!(
        agent.request_execute(ActionRequest::new("late")),
        Err(Status::NotInitialized)
    );
}

#[tokio::test]
async fn loopback_transport_end_to_end() {
    use tether_plugin_loopback::LoopbackPlugin;

    let plugin = Arc::new(LoopbackPlugin::new());
    let dir = tempfile::tempdir().unwrap();
    let agent = Agent::builder(Arc::clone(&plugin) as Arc<dyn tether_types::Plugin>)
        .data_dir(dir.path())
        .workers(0)
        .initialize()
        .await
        .unwrap();

    agent.connect(DurationMs::from_secs(1)).await.unwrap();
    assert!(plugin.is_connected());

    let temp = agent.telemetry_create("temp", ValueKind::Float32).unwrap();
    agent.telemetry_register(&temp).await.unwrap();
    agent.telemetry_publish(&temp, 21.0f32, None).await.unwrap();

    let probe = agent.action_create("probe").unwrap();
    agent
        .action_register_callback(
            &probe,
            Arc::new(FnHandler::new(|request: &mut ActionRequest| {
                request.set_param("pong", true);
                Ok(())
            })),
        )
        .await
        .unwrap();
    agent.request_execute(ActionRequest::new("probe")).unwrap();
    agent.iterate(DurationMs::ZERO).await.unwrap();

    let counts = plugin.counts();
    assert_eq!(counts.registered, 2);
    assert_eq!(counts.published, 1);
    assert_eq!(counts.transmitted, 1);
    assert_eq!(counts.iterated, 1);

    let results = plugin.recent_results();
    assert_eq!(results.len(), 1);
    assert!(results[0].status.is_success());
    assert_eq!(results[0].param_value::<bool>("pong", Convert::Exact), Ok(true));

    agent.terminate(DurationMs::from_secs(5)).await.unwrap();
    assert!(!plugin.is_connected());
}

#[tokio::test]
async fn connect_and_disconnect_forward_to_the_plugin() {
    let plugin = Arc::new(RecordingPlugin::new());
    let (_dir, agent) = agent_with(Arc::clone(&plugin), 0).await;

    agent.connect(DurationMs::from_secs(1)).await.unwrap();
    agent.disconnect(DurationMs::from_secs(1)).await.unwrap();
    assert_eq!(plugin.count(|c| matches!(c, PluginCall::Connect)), 1);
    assert_eq!(plugin.count(|c| matches!(c, PluginCall::Disconnect)), 1);

    plugin.fail_connect(true);
    assert_eq!(
        agent.connect(DurationMs::from_secs(1)).await,
        Err(Status::Failure)
    );
}

#[tokio::test]
async fn action_registration_reports_kind_and_declaration() {
    let plugin = Arc::new(RecordingPlugin::new());
    let (_dir, agent) = agent_with(Arc::clone(&plugin), 0).await;

    let echo = agent.action_create("echo").unwrap();
    agent
        .action_parameter_add(&echo, "in", Direction::InRequired, ValueKind::String)
        .unwrap();
    agent
        .action_parameter_add(&echo, "out", Direction::Out, ValueKind::String)
        .unwrap();
    agent
        .action_register_callback(
            &echo,
            Arc::new(FnHandler::new(|_req: &mut ActionRequest| Ok(()))),
        )
        .await
        .unwrap();

    let registered = plugin
        .calls()
        .into_iter()
        .find_map(|c| match c {
            PluginCall::Register(info) => Some(info),
            _ => None,
        })
        .expect("one register");
    assert_eq!(registered.kind, ItemKind::Action);
    assert_eq!(registered.params.len(), 2);
    assert_eq!(registered.params[0].name, "in");

    // Adding a parameter after registration turns the next register into
    // a plugin update.
    agent
        .action_parameter_add(&echo, "verbose", Direction::In, ValueKind::Bool)
        .unwrap();
    agent.action_register(&echo).await.unwrap();
    assert_eq!(plugin.count(|c| matches!(c, PluginCall::Register(_))), 2);
}

// End-to-end runs of the consumer over a feed file and an in-memory registry
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tempfile::TempDir;
use vm2dhcp::config::Config;
use vm2dhcp::daemon::{replay, Dispatch, EventStreamConsumer, Watermark};
use vm2dhcp::filtering::{FilterStage, RejectReason};
use vm2dhcp::inventory::MacAddress;
use vm2dhcp::reconcile::{DhcpOptions, ReconcileStatus};
use vm2dhcp::registry::{MemoryRegistry, RegistryCall};
use vm2dhcp::source::{FeedRecord, FeedSource};

const NTP_FIELD: &str =
    r#"{"record": "field", "key": 101, "name": "dhcp.ntp-server", "scope": "virtual_machine"}"#;
const HOST_FIELD: &str =
    r#"{"record": "field", "key": 102, "name": "dhcp.ntp-server", "scope": "host_system"}"#;

fn vm_event(key: i64, kind: &str, created_at: &str, name: &str, guest_id: &str) -> String {
    format!(
        r#"{{"record": "event", "key": {key}, "kind": "{kind}", "created_at": "{created_at}", "vm": {{"config": {{"name": "{name}", "guest_id": "{guest_id}", "devices": [{{"type": "disk", "label": "Hard disk 1"}}, {{"type": "ethernet", "label": "Network adapter 1", "mac_address": "00:11:22:33:44:55"}}]}}, "networks": ["prod"], "custom_values": [{{"key": 101, "value": "10.0.0.9"}}, {{"key": 102, "value": "10.9.9.9"}}]}}}}"#
    )
}

fn write_feed(dir: &TempDir, lines: &[String]) -> PathBuf {
    let path = dir.path().join("events.jsonl");
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn config() -> Config {
    let mut config = Config::default();
    config.platform.networks = vec!["prod".to_string()];
    config
}

fn consumer(feed: PathBuf, registry: MemoryRegistry) -> EventStreamConsumer<FeedSource, MemoryRegistry> {
    EventStreamConsumer::from_config(&config(), FeedSource::new(feed), registry).unwrap()
}

fn mac() -> MacAddress {
    "00:11:22:33:44:55".parse().unwrap()
}

fn time(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_created_vm_is_registered() {
    let dir = TempDir::new().unwrap();
    let feed = write_feed(
        &dir,
        &[
            NTP_FIELD.to_string(),
            HOST_FIELD.to_string(),
            vm_event(1, "created", "2024-05-01T10:00:01Z", "db1.corp.local", "rhel8_64Guest"),
        ],
    );
    let registry = MemoryRegistry::new("dhcp.test").recording(true);
    let mut consumer = consumer(feed, registry.clone());

    let watermark = replay(&mut consumer, time("2024-05-01T11:00:00Z")).await;

    assert_eq!(watermark.last_read(), time("2024-05-01T10:00:01Z"));
    let expected = DhcpOptions::from([
        ("domain-name".to_string(), "corp.local".to_string()),
        ("host-name".to_string(), "db1".to_string()),
        ("ntp-server".to_string(), "10.0.0.9".to_string()),
    ]);
    assert_eq!(
        registry.calls(),
        vec![
            RegistryCall::Connect,
            RegistryCall::DeleteHost(mac()),
            RegistryCall::CreateHost(mac(), expected),
            RegistryCall::Disconnect,
        ]
    );
    assert_eq!(
        registry.host(&mac()).unwrap().statements,
        "option domain-name \"corp.local\";option host-name \"db1\";option ntp-server \"10.0.0.9\";"
    );
}

#[tokio::test]
async fn test_update_replaces_existing_reservation() {
    let dir = TempDir::new().unwrap();
    let feed = write_feed(
        &dir,
        &[
            NTP_FIELD.to_string(),
            vm_event(1, "renamed", "2024-05-01T10:00:01Z", "db2.corp.local", "rhel8_64Guest"),
        ],
    );
    let registry = MemoryRegistry::new("dhcp.test").recording(true);
    registry.insert_host(
        mac(),
        DhcpOptions::from([("host-name".to_string(), "db1".to_string())]),
    );
    let mut consumer = consumer(feed, registry.clone());

    replay(&mut consumer, time("2024-05-01T11:00:00Z")).await;

    let host = registry.host(&mac()).unwrap();
    assert_eq!(host.options.get("host-name").map(String::as_str), Some("db2"));
    assert_eq!(registry.hosts().len(), 1);
}

#[tokio::test]
async fn test_removed_vm_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let feed = write_feed(
        &dir,
        &[vm_event(1, "removed", "2024-05-01T10:00:01Z", "db1.corp.local", "rhel8_64Guest")],
    );
    let registry = MemoryRegistry::new("dhcp.test").recording(true);
    let mut consumer = consumer(feed, registry.clone());

    let watermark = replay(&mut consumer, time("2024-05-01T11:00:00Z")).await;

    assert!(registry.calls().is_empty());
    assert_eq!(consumer.stats().ignored, 1);
    for stage in FilterStage::ORDER {
        assert_eq!(consumer.chain().stats().stage(stage).evaluations(), 0);
    }
    // still read, so never read again
    assert_eq!(watermark.window_start(), time("2024-05-01T10:00:02Z"));
}

#[tokio::test]
async fn test_event_without_vm_stops_at_first_stage() {
    let dir = TempDir::new().unwrap();
    let feed = write_feed(
        &dir,
        &[r#"{"record": "event", "key": 1, "kind": "created", "created_at": "2024-05-01T10:00:01Z"}"#
            .to_string()],
    );
    let registry = MemoryRegistry::new("dhcp.test").recording(true);
    let mut consumer = consumer(feed, registry.clone());

    replay(&mut consumer, time("2024-05-01T11:00:00Z")).await;

    let stats = consumer.chain().stats();
    assert_eq!(stats.rejected(RejectReason::NoVm), 1);
    for stage in &FilterStage::ORDER[1..] {
        assert_eq!(stats.stage(*stage).evaluations(), 0);
    }
    assert!(registry.calls().is_empty());
}

#[tokio::test]
async fn test_windows_guest_is_rejected() {
    let dir = TempDir::new().unwrap();
    let feed = write_feed(
        &dir,
        &[
            NTP_FIELD.to_string(),
            vm_event(1, "created", "2024-05-01T10:00:01Z", "ad1.corp.local", "windows2019srv_64Guest"),
            vm_event(2, "power_state_changed", "2024-05-01T10:00:02Z", "db1", "rhel8_64Guest"),
        ],
    );
    let registry = MemoryRegistry::new("dhcp.test").recording(true);
    let mut consumer = consumer(feed, registry.clone());

    replay(&mut consumer, time("2024-05-01T11:00:00Z")).await;

    let stats = consumer.chain().stats();
    assert_eq!(stats.rejected(RejectReason::UnsupportedOs), 1);
    assert_eq!(stats.rejected(RejectReason::BadName), 1);
    assert_eq!(consumer.stats().rejected, 2);
    assert!(registry.calls().is_empty());
}

#[tokio::test]
async fn test_events_are_read_once() {
    let dir = TempDir::new().unwrap();
    let feed = write_feed(
        &dir,
        &[
            NTP_FIELD.to_string(),
            vm_event(1, "created", "2024-05-01T10:00:01Z", "db1.corp.local", "rhel8_64Guest"),
        ],
    );
    let registry = MemoryRegistry::new("dhcp.test").recording(true);
    let mut consumer = consumer(feed, registry.clone());

    let watermark = consumer
        .poll_once(
            Watermark::starting_at(time("2024-05-01T10:00:00Z")),
            time("2024-05-01T10:00:30Z"),
        )
        .await;
    let watermark = consumer
        .poll_once(watermark, time("2024-05-01T10:01:00Z"))
        .await;

    assert_eq!(consumer.stats().events_read, 1);
    assert_eq!(consumer.stats().windows_opened, 2);
    assert_eq!(watermark.window_start(), time("2024-05-01T10:00:02Z"));
}

#[tokio::test]
async fn test_events_before_start_are_not_replayed() {
    let dir = TempDir::new().unwrap();
    let feed = write_feed(
        &dir,
        &[vm_event(1, "created", "2024-05-01T09:59:59Z", "db1.corp.local", "rhel8_64Guest")],
    );
    let mut consumer = consumer(feed, MemoryRegistry::new("dhcp.test").recording(true));

    consumer
        .poll_once(
            Watermark::starting_at(time("2024-05-01T10:00:00Z")),
            time("2024-05-01T10:00:30Z"),
        )
        .await;

    assert_eq!(consumer.stats().events_read, 0);
}

#[tokio::test]
async fn test_undecodable_line_does_not_block_stream() {
    let dir = TempDir::new().unwrap();
    let feed = write_feed(
        &dir,
        &[
            NTP_FIELD.to_string(),
            r#"{"record": "event", "key": 1, "kind": "suspended", "created_at": "2024-04-01T08:00:00Z"}"#
                .to_string(),
            vm_event(2, "created", "2024-05-01T10:00:05Z", "db1.corp.local", "rhel8_64Guest"),
        ],
    );
    let registry = MemoryRegistry::new("dhcp.test").recording(true);
    let mut consumer = consumer(feed, registry.clone());

    let mut watermark = Watermark::starting_at(time("2024-05-01T10:00:00Z"));
    for second in 1..=20 {
        let now = time("2024-05-01T10:00:00Z") + chrono::Duration::seconds(second);
        watermark = consumer.poll_once(watermark, now).await;
    }

    assert_eq!(consumer.stats().window_failures, 0);
    assert_eq!(consumer.stats().events_read, 1);
    assert!(registry.host(&mac()).is_some());
    assert_eq!(consumer.source().malformed_lines(), 1);
    assert_eq!(watermark.window_start(), time("2024-05-01T10:00:06Z"));
}

#[tokio::test]
async fn test_missing_feed_skips_ahead() {
    let dir = TempDir::new().unwrap();
    let mut consumer = consumer(dir.path().join("absent.jsonl"), MemoryRegistry::new("dhcp.test").recording(true));

    let watermark = consumer
        .poll_once(
            Watermark::starting_at(time("2024-05-01T10:00:00Z")),
            time("2024-05-01T10:00:30Z"),
        )
        .await;

    assert_eq!(watermark.window_start(), time("2024-05-01T10:00:01Z"));
    assert_eq!(consumer.stats().window_failures, 1);
}

#[tokio::test]
async fn test_connect_failure_leaves_registry_untouched() {
    let dir = TempDir::new().unwrap();
    let feed = write_feed(
        &dir,
        &[
            NTP_FIELD.to_string(),
            vm_event(1, "created", "2024-05-01T10:00:01Z", "db1.corp.local", "rhel8_64Guest"),
        ],
    );
    let registry = MemoryRegistry::new("dhcp.test").recording(true);
    registry.refuse_connections(true);
    let mut consumer = consumer(feed, registry.clone());

    let watermark = replay(&mut consumer, time("2024-05-01T11:00:00Z")).await;

    assert!(registry.hosts().is_empty());
    assert_eq!(watermark.last_read(), time("2024-05-01T10:00:01Z"));
    assert_eq!(consumer.stats().reconciled, 1);
}

#[tokio::test]
async fn test_dispatch_ignores_removal() {
    let dir = TempDir::new().unwrap();
    let mut consumer = consumer(write_feed(&dir, &[]), MemoryRegistry::new("dhcp.test").recording(true));

    let line = vm_event(1, "removed", "2024-05-01T10:00:01Z", "db1.corp.local", "rhel8_64Guest");
    let FeedRecord::Event(event) = serde_json::from_str::<FeedRecord>(&line).unwrap() else {
        panic!("expected an event record");
    };

    assert_eq!(consumer.dispatch(&event).await, Dispatch::Ignored);
}

#[tokio::test]
async fn test_dispatch_reports_registration() {
    let dir = TempDir::new().unwrap();
    let mut consumer = consumer(
        write_feed(&dir, &[NTP_FIELD.to_string()]),
        MemoryRegistry::new("dhcp.test").recording(true),
    );

    let line = vm_event(1, "created", "2024-05-01T10:00:01Z", "db1.corp.local", "rhel8_64Guest");
    let FeedRecord::Event(event) = serde_json::from_str::<FeedRecord>(&line).unwrap() else {
        panic!("expected an event record");
    };

    match consumer.dispatch(&event).await {
        Dispatch::Reconciled(report) => {
            assert_eq!(report.status, ReconcileStatus::Completed);
            assert_eq!(report.absent, 1);
            assert_eq!(report.created, 1);
        }
        other => panic!("unexpected dispatch: {:?}", other),
    }
}

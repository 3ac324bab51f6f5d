use chrono::Utc;
use std::sync::{Arc, Mutex};
use vigil::*;

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<OutboundMessage>>>);

impl Recorder {
    fn sent(&self) -> Vec<OutboundMessage> {
        self.0.lock().unwrap().clone()
    }
}

impl MailTransport for Recorder {
    fn send(&self, message: &OutboundMessage) -> Result<()> {
        self.0.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct FailingTransport;

impl MailTransport for FailingTransport {
    fn send(&self, _message: &OutboundMessage) -> Result<()> {
        Err(AlarmError::Delivery("relay unreachable".into()))
    }
}

fn snapshot_with(temp: f64) -> Snapshot {
    let mut s = Snapshot::new(Utc::now());
    s.set("outTemp", temp);
    s
}

#[test]
fn test_temperature_scenario() {
    // rule "outTemp >= 30.0" over [28, 31, 31, 29, 32]
    // states [CLEAR, SET, SET, CLEAR, SET], edges at cycles 2, 4, 5
    let yaml = r#"
sender: "wx@example.com"
recipients: ["ops@example.com"]
alarms:
  - name: "Hot"
    rule: "outTemp >= 30.0"
    on_set: {}
    on_clear: {}
"#;
    let recorder = Recorder::default();
    let mut engine =
        Engine::new(Config::from_yaml(yaml).unwrap(), Box::new(recorder.clone())).unwrap();

    let mut states = Vec::new();
    for temp in [28.0, 31.0, 31.0, 29.0, 32.0] {
        engine.process(&snapshot_with(temp));
        states.push(engine.alarm_states()[0].1);
    }

    assert_eq!(
        states,
        vec![
            AlarmState::Clear,
            AlarmState::Set,
            AlarmState::Set,
            AlarmState::Clear,
            AlarmState::Set,
        ]
    );

    let sent = recorder.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].subject, "Alarm [SET] Hot");
    assert_eq!(sent[1].subject, "Alarm [CLR] Hot");
    assert_eq!(sent[2].subject, "Alarm [SET] Hot");
}

#[test]
fn test_steady_state_sends_nothing() {
    let yaml = r#"
sender: "wx@example.com"
recipients: ["ops@example.com"]
alarms:
  - name: "Hot"
    rule: "outTemp >= 30.0"
    on_set: {}
    on_clear: {}
"#;
    let recorder = Recorder::default();
    let mut engine =
        Engine::new(Config::from_yaml(yaml).unwrap(), Box::new(recorder.clone())).unwrap();

    for _ in 0..10 {
        engine.process(&snapshot_with(35.0));
    }
    // only the level is persistent; the single first-run edge is
    // suppressed by the default (empty) notify_first policy
    assert!(recorder.sent().is_empty());
    assert_eq!(engine.alarm_states()[0].1, AlarmState::Set);
}

#[test]
fn test_first_run_policy() {
    let yaml = r#"
sender: "wx@example.com"
recipients: ["ops@example.com"]
notify_first: [set]
alarms:
  - name: "Hot"
    rule: "outTemp >= 30.0"
    on_set: {}
    on_clear: {}
  - name: "Cold"
    rule: "outTemp <= 5.0"
    on_set: {}
    on_clear: {}
"#;
    let recorder = Recorder::default();
    let mut engine =
        Engine::new(Config::from_yaml(yaml).unwrap(), Box::new(recorder.clone())).unwrap();

    engine.process(&snapshot_with(35.0));

    // Hot starts SET (listed in notify_first), Cold starts CLEAR (not listed)
    let sent = recorder.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.contains("Hot"));
    assert_eq!(engine.alarm_states()[1].1, AlarmState::Clear);
}

#[test]
fn test_suppress_first_overrides_policy() {
    let yaml = r#"
sender: "wx@example.com"
recipients: ["ops@example.com"]
notify_first: [set]
alarms:
  - name: "Freezing"
    rule: "outTemp <= 0.0"
    on_set:
      suppress_first: true
"#;
    let recorder = Recorder::default();
    let mut engine =
        Engine::new(Config::from_yaml(yaml).unwrap(), Box::new(recorder.clone())).unwrap();

    engine.process(&snapshot_with(-3.0));
    assert!(recorder.sent().is_empty());
    assert_eq!(engine.alarm_states()[0].1, AlarmState::Set);

    // a real edge later is unaffected by suppress_first
    engine.process(&snapshot_with(4.0));
    engine.process(&snapshot_with(-1.0));
    assert_eq!(recorder.sent().len(), 1);
}

#[test]
fn test_four_cycle_edges() {
    let yaml = r#"
sender: "wx@example.com"
recipients: ["ops@example.com"]
alarms:
  - name: "Hot"
    rule: "outTemp >= 30.0"
    on_set: {}
    on_clear: {}
"#;
    let recorder = Recorder::default();
    let mut engine =
        Engine::new(Config::from_yaml(yaml).unwrap(), Box::new(recorder.clone())).unwrap();

    // CLEAR, SET, CLEAR, SET: first cycle suppressed, then three edges
    for temp in [20.0, 35.0, 20.0, 35.0] {
        engine.process(&snapshot_with(temp));
    }

    let subjects: Vec<String> = recorder.sent().iter().map(|m| m.subject.clone()).collect();
    assert_eq!(
        subjects,
        vec!["Alarm [SET] Hot", "Alarm [CLR] Hot", "Alarm [SET] Hot"]
    );
}

#[test]
fn test_broken_rule_never_blocks_other_alarms() {
    let yaml = r#"
sender: "wx@example.com"
recipients: ["ops@example.com"]
alarms:
  - name: "Broken"
    rule: "noSuchField > 1"
    on_set: {}
    on_clear: {}
  - name: "Hot"
    rule: "outTemp >= 30.0"
    on_set: {}
    on_clear: {}
"#;
    let recorder = Recorder::default();
    let mut engine =
        Engine::new(Config::from_yaml(yaml).unwrap(), Box::new(recorder.clone())).unwrap();

    let outcome = engine.process(&snapshot_with(20.0));
    assert_eq!(outcome.failures, 1);
    assert_eq!(outcome.evaluated, 1);

    let outcome = engine.process(&snapshot_with(35.0));
    assert_eq!(outcome.failures, 1);
    assert_eq!(outcome.notifications, 1);

    // the broken alarm never left UNKNOWN
    assert_eq!(engine.alarm_states()[0].1, AlarmState::Unknown);
    assert_eq!(engine.alarm_states()[1].1, AlarmState::Set);
}

#[test]
fn test_delivery_failure_keeps_state_and_other_alarms() {
    let yaml = r#"
sender: "wx@example.com"
recipients: ["ops@example.com"]
alarms:
  - name: "Hot"
    rule: "outTemp >= 30.0"
    on_set: {}
    on_clear: {}
  - name: "Warm"
    rule: "outTemp >= 25.0"
    on_set: {}
    on_clear: {}
"#;
    let mut engine =
        Engine::new(Config::from_yaml(yaml).unwrap(), Box::new(FailingTransport)).unwrap();

    engine.process(&snapshot_with(20.0));
    let outcome = engine.process(&snapshot_with(35.0));

    // both edges attempted, both deliveries failed, both states committed
    assert_eq!(outcome.notifications, 0);
    assert_eq!(engine.stats().delivery_failures, 2);
    assert_eq!(engine.alarm_states()[0].1, AlarmState::Set);
    assert_eq!(engine.alarm_states()[1].1, AlarmState::Set);

    // no re-send on the next cycle: the transition is already committed
    engine.process(&snapshot_with(35.0));
    assert_eq!(engine.stats().delivery_failures, 2);
}

#[test]
fn test_missing_direction_block_sends_nothing() {
    let yaml = r#"
sender: "wx@example.com"
recipients: ["ops@example.com"]
alarms:
  - name: "Hot"
    rule: "outTemp >= 30.0"
    on_set: {}
"#;
    let recorder = Recorder::default();
    let mut engine =
        Engine::new(Config::from_yaml(yaml).unwrap(), Box::new(recorder.clone())).unwrap();

    engine.process(&snapshot_with(20.0));
    engine.process(&snapshot_with(35.0));
    engine.process(&snapshot_with(20.0)); // clear edge, but no on_clear block

    let sent = recorder.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Alarm [SET] Hot");
    assert_eq!(engine.alarm_states()[0].1, AlarmState::Clear);
}

#[test]
fn test_overrides_shape_the_message() {
    let yaml = r#"
sender: "wx@example.com"
recipients: ["ops@example.com"]
alarms:
  - name: "Battery LOW"
    rule: "int(txBatteryStatus) & 0x02"
    on_set:
      recipients: ["hw@shop.example"]
      subject_prefix: "Order: "
      subject: "{_NAME}"
      body_prefix: "Please provide 4xAAA batteries\n"
      body: "status: {txBatteryStatus}\n"
    on_clear:
      subject: "Battery okay"
"#;
    let recorder = Recorder::default();
    let mut engine =
        Engine::new(Config::from_yaml(yaml).unwrap(), Box::new(recorder.clone())).unwrap();

    let mut ok = Snapshot::new(Utc::now());
    ok.set("txBatteryStatus", 0i64);
    let mut low = Snapshot::new(Utc::now());
    low.set("txBatteryStatus", 2i64);

    engine.process(&ok);
    engine.process(&low);
    engine.process(&ok);

    let sent = recorder.sent();
    assert_eq!(sent.len(), 2);

    // on_set: overridden recipients, prefix, body
    assert_eq!(sent[0].recipients, vec!["hw@shop.example".to_string()]);
    assert_eq!(sent[0].subject, "Order: Battery LOW");
    assert!(sent[0].body.starts_with("Please provide 4xAAA batteries\n"));
    assert!(sent[0].body.contains("status: 2"));

    // on_clear: only subject overridden, everything else global
    assert_eq!(sent[1].recipients, vec!["ops@example.com".to_string()]);
    assert_eq!(sent[1].subject, "Alarm [CLR] Battery okay");
}

#[test]
fn test_degraded_render_still_delivers() {
    let yaml = r#"
sender: "wx@example.com"
recipients: ["ops@example.com"]
alarms:
  - name: "Hot"
    rule: "outTemp >= 30.0"
    on_set:
      body: "pressure was {barometer}\n"
"#;
    let recorder = Recorder::default();
    let mut engine =
        Engine::new(Config::from_yaml(yaml).unwrap(), Box::new(recorder.clone())).unwrap();

    engine.process(&snapshot_with(20.0));
    engine.process(&snapshot_with(35.0));

    let sent = recorder.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("<unresolved:barometer>"));
}

#[test]
fn test_config_from_file() {
    use std::io::Write;

    let yaml = r#"
unit_system: US
server: "mail.example.com:25"
sender: "Wx <wx@example.com>"
recipients: ["Ops <ops@example.com>"]
alarms:
  - name: "Hot"
    rule: "outTemp >= 86.0"
    on_set: {}
"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.unit_system, UnitSystem::Us);
    assert_eq!(config.server, "mail.example.com:25");
    assert_eq!(config.alarms.len(), 1);
}

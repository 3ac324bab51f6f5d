use chrono::Utc;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vigil::*;

struct CountingTransport(Arc<AtomicUsize>);

impl MailTransport for CountingTransport {
    fn send(&self, _message: &OutboundMessage) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn engine(notify_first: &str, counter: Arc<AtomicUsize>) -> Engine {
    let yaml = format!(
        r#"
sender: "wx@example.com"
recipients: ["ops@example.com"]
notify_first: {notify_first}
alarms:
  - name: "Flag"
    rule: "flag"
    on_set: {{}}
    on_clear: {{}}
"#
    );
    let config = Config::from_yaml(&yaml).unwrap();
    Engine::new(config, Box::new(CountingTransport(counter))).unwrap()
}

fn run(engine: &mut Engine, sequence: &[bool]) {
    for &flag in sequence {
        let mut snap = Snapshot::new(Utc::now());
        snap.set("flag", flag);
        engine.process(&snap);
    }
}

fn edge_count(sequence: &[bool]) -> usize {
    sequence.windows(2).filter(|w| w[0] != w[1]).count()
}

proptest! {
    // With first-run notifications for both states, the notification
    // count is exactly 1 (first observation) plus the number of edges.
    #[test]
    fn notifications_equal_edges_plus_first(sequence in prop::collection::vec(any::<bool>(), 1..40)) {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut engine = engine("[set, clear]", counter.clone());
        run(&mut engine, &sequence);
        prop_assert_eq!(counter.load(Ordering::SeqCst), 1 + edge_count(&sequence));
    }

    // With the default policy the first observation is silent, so the
    // count is exactly the number of edges.
    #[test]
    fn notifications_equal_edges_when_first_suppressed(sequence in prop::collection::vec(any::<bool>(), 1..40)) {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut engine = engine("[]", counter.clone());
        run(&mut engine, &sequence);
        prop_assert_eq!(counter.load(Ordering::SeqCst), edge_count(&sequence));
    }

    // Final engine state always mirrors the last evaluation.
    #[test]
    fn state_tracks_last_evaluation(sequence in prop::collection::vec(any::<bool>(), 1..40)) {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut engine = engine("[]", counter);
        run(&mut engine, &sequence);
        let expected = if *sequence.last().unwrap() { AlarmState::Set } else { AlarmState::Clear };
        prop_assert_eq!(engine.alarm_states()[0].1, expected);
    }
}

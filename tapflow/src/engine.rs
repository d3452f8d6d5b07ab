use std::sync::Arc;

use tapflow_common::{first_match, FlowRecord, FrameMeta, Inspection, Mode, Verdict};

use crate::channel::EventSender;
use crate::config::EngineConfig;
use crate::table::RuleTable;

/// What the engine decided about one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not IPv4; nothing was recorded.
    PassThrough,
    /// Structurally unsound; the record was abandoned and the frame flows on.
    Discard,
    /// A complete record was built and matched against the rule table.
    Flow {
        verdict: Verdict,
        matched_rule: Option<u32>,
    },
}

/// Host-side flow pipeline: decode, classify, match, publish.
///
/// Several packet sources may drive one engine concurrently; every
/// invocation works on its own rule snapshot and the event channel
/// never blocks.
pub struct FlowEngine {
    config: EngineConfig,
    rules: Arc<RuleTable>,
    events: EventSender<FlowRecord>,
}

impl FlowEngine {
    pub fn new(
        config: EngineConfig,
        rules: Arc<RuleTable>,
        events: EventSender<FlowRecord>,
    ) -> Self {
        Self {
            config,
            rules,
            events,
        }
    }

    /// Run one frame through the pipeline and return what happened to it.
    pub fn process(&self, frame: &[u8], meta: FrameMeta) -> Outcome {
        let mut record = match tapflow_common::inspect(frame, meta) {
            Inspection::PassThrough => return Outcome::PassThrough,
            Inspection::Discard => return Outcome::Discard,
            Inspection::Flow(record) => record,
        };

        let snapshot = self.rules.snapshot();
        let matched = first_match(&record, &snapshot[..], self.config.scan_limit);
        let verdict = match (matched, self.config.mode) {
            (Some(_), Mode::Enforce) => Verdict::Drop,
            _ => Verdict::Allow,
        };
        record.matched_rule = matched.map(|slot| slot as i32).unwrap_or(-1);
        record.verdict = verdict as i32;

        // An enforced drop suppresses its record, like the kernel side
        // discarding a reserved ring buffer entry.
        if verdict == Verdict::Allow {
            self.events.publish(record);
        }

        Outcome::Flow {
            verdict,
            matched_rule: matched,
        }
    }
}

#[cfg(test)]
mod tests {
    use tapflow_common::{Direction, DpiProtocol, FlowRule, RULE_SLOTS};

    use super::*;
    use crate::channel::{channel, EventReceiver};

    const IPPROTO_TCP: u8 = 6;
    const IPPROTO_UDP: u8 = 17;

    fn ipv4_frame(protocol: u8, l4: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.push(0x45);
        frame.push(0);
        frame.extend_from_slice(&(20 + l4.len() as u16).to_be_bytes());
        frame.extend_from_slice(&[0; 4]);
        frame.push(64);
        frame.push(protocol);
        frame.extend_from_slice(&[0; 2]);
        frame.extend_from_slice(&[10, 0, 0, 1]);
        frame.extend_from_slice(&[10, 0, 0, 2]);
        frame.extend_from_slice(l4);
        frame
    }

    fn udp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let mut l4 = Vec::new();
        l4.extend_from_slice(&src_port.to_be_bytes());
        l4.extend_from_slice(&dst_port.to_be_bytes());
        l4.extend_from_slice(&(8 + payload.len() as u16).to_be_bytes());
        l4.extend_from_slice(&[0; 2]);
        l4.extend_from_slice(payload);
        ipv4_frame(IPPROTO_UDP, &l4)
    }

    fn tcp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let mut l4 = Vec::new();
        l4.extend_from_slice(&src_port.to_be_bytes());
        l4.extend_from_slice(&dst_port.to_be_bytes());
        l4.extend_from_slice(&[0; 8]);
        l4.push(0x50);
        l4.extend_from_slice(&[0; 7]);
        l4.extend_from_slice(payload);
        ipv4_frame(IPPROTO_TCP, &l4)
    }

    // A single-question query for example.com, type A.
    fn dns_query() -> Vec<u8> {
        let mut payload = vec![0u8; 12];
        payload.push(7);
        payload.extend_from_slice(b"example");
        payload.push(3);
        payload.extend_from_slice(b"com");
        payload.push(0);
        payload.extend_from_slice(&1u16.to_be_bytes());
        payload.extend_from_slice(&1u16.to_be_bytes());
        udp_frame(50531, 53, &payload)
    }

    fn ingress() -> FrameMeta {
        FrameMeta {
            timestamp: 1,
            ifindex: 2,
            direction: Direction::Ingress,
        }
    }

    fn dns_block_rule() -> FlowRule {
        // dst_port + protocol + direction + icmp_type all match on an
        // ingress DNS query, so the threshold lands on 4.
        FlowRule::new()
            .with_dst_port(53)
            .with_protocol(IPPROTO_UDP)
            .with_direction(Direction::Ingress)
            .with_threshold(4)
    }

    fn engine(
        mode: Mode,
        scan_limit: u32,
        capacity: usize,
    ) -> (FlowEngine, Arc<RuleTable>, EventReceiver<FlowRecord>) {
        let rules = Arc::new(RuleTable::new());
        let (tx, rx) = channel(capacity);
        let config = EngineConfig { mode, scan_limit };
        (
            FlowEngine::new(config, Arc::clone(&rules), tx),
            rules,
            rx,
        )
    }

    #[test]
    fn enforced_match_drops_and_suppresses_the_record() {
        let (engine, rules, rx) = engine(Mode::Enforce, RULE_SLOTS as u32, 8);
        rules.set(0, dns_block_rule()).unwrap();

        let outcome = engine.process(&dns_query(), ingress());

        assert_eq!(
            outcome,
            Outcome::Flow {
                verdict: Verdict::Drop,
                matched_rule: Some(0),
            }
        );
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn unmatched_traffic_is_allowed_and_published() {
        let (engine, rules, rx) = engine(Mode::Enforce, RULE_SLOTS as u32, 8);
        rules.set(0, dns_block_rule()).unwrap();

        let frame = tcp_frame(40000, 80, b"GET /index.html HTTP/1.1\r\n");
        let outcome = engine.process(&frame, ingress());

        assert_eq!(
            outcome,
            Outcome::Flow {
                verdict: Verdict::Allow,
                matched_rule: None,
            }
        );
        let record = rx.try_recv().unwrap();
        assert_eq!(record.verdict, Verdict::Allow as i32);
        assert_eq!(record.matched_rule, -1);
        assert_eq!(record.dpi_protocol, DpiProtocol::Http as u8);
        assert_eq!(record.dst_port, 80);
    }

    #[test]
    fn observe_mode_publishes_the_match_without_dropping() {
        let (engine, rules, rx) = engine(Mode::Observe, RULE_SLOTS as u32, 8);
        rules.set(5, dns_block_rule()).unwrap();

        let outcome = engine.process(&dns_query(), ingress());

        assert_eq!(
            outcome,
            Outcome::Flow {
                verdict: Verdict::Allow,
                matched_rule: Some(5),
            }
        );
        let record = rx.try_recv().unwrap();
        assert_eq!(record.matched_rule, 5);
        assert_eq!(record.verdict, Verdict::Allow as i32);
        assert_eq!(record.dpi_protocol, DpiProtocol::Dns as u8);
    }

    #[test]
    fn non_ip_frames_pass_through_unrecorded() {
        let (engine, _rules, rx) = engine(Mode::Enforce, RULE_SLOTS as u32, 8);
        let mut arp = vec![0u8; 12];
        arp.extend_from_slice(&[0x08, 0x06]);
        arp.extend_from_slice(&[0; 28]);

        assert_eq!(engine.process(&arp, ingress()), Outcome::PassThrough);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn malformed_frames_are_discarded_unrecorded() {
        let (engine, _rules, rx) = engine(Mode::Enforce, RULE_SLOTS as u32, 8);
        let truncated = &ipv4_frame(IPPROTO_TCP, &[0u8; 20])[..40];

        assert_eq!(engine.process(truncated, ingress()), Outcome::Discard);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn scan_limit_hides_rules_past_the_bound() {
        let (engine, rules, _rx) = engine(Mode::Enforce, 10, 8);
        rules.set(20, dns_block_rule()).unwrap();

        let outcome = engine.process(&dns_query(), ingress());
        assert_eq!(
            outcome,
            Outcome::Flow {
                verdict: Verdict::Allow,
                matched_rule: None,
            }
        );

        let (full, rules, _rx) = self::engine(Mode::Enforce, RULE_SLOTS as u32, 8);
        rules.set(20, dns_block_rule()).unwrap();
        assert_eq!(
            full.process(&dns_query(), ingress()),
            Outcome::Flow {
                verdict: Verdict::Drop,
                matched_rule: Some(20),
            }
        );
    }

    #[test]
    fn overflowing_the_channel_counts_drops_but_keeps_deciding() {
        let (engine, _rules, rx) = engine(Mode::Enforce, RULE_SLOTS as u32, 1);
        let frame = tcp_frame(40000, 80, b"GET / HTTP/1.1\r\n");

        let first = engine.process(&frame, ingress());
        let second = engine.process(&frame, ingress());

        assert!(matches!(first, Outcome::Flow { verdict: Verdict::Allow, .. }));
        assert_eq!(first, second);
        assert_eq!(rx.dropped(), 1);
        assert!(rx.try_recv().is_some());
        assert!(rx.try_recv().is_none());
    }
}

use std::collections::HashSet;

use driftwood_coordinator::bus::publisher::PUBLISH_TOPICS;
use driftwood_coordinator::bus::subscriber::INGEST_TOPICS;
use driftwood_proto::SYNC_TOPICS;

#[test]
fn coordinator_topics_cover_the_protocol() {
    let declared: HashSet<&'static str> = SYNC_TOPICS.iter().copied().collect();
    let wired: HashSet<&'static str> = INGEST_TOPICS
        .iter()
        .chain(PUBLISH_TOPICS.iter())
        .copied()
        .collect();
    assert_eq!(
        declared, wired,
        "coordinator should listen and publish on exactly the protocol topics"
    );
    assert!(
        INGEST_TOPICS.iter().all(|topic| !PUBLISH_TOPICS.contains(topic)),
        "request and status directions must not share a topic"
    );
}

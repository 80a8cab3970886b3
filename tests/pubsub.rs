//! Integration tests for the publisher and channel subscriber over the in-memory transport.

mod common;

use common::init_tracing;
use control_pubsub::{
    ActorChannel, ActorId, ActorRecord, ActorState, Callbacks, ChannelSubscriber, ChannelType,
    Endpoint, Envelope, ErrorInfoChannel, ErrorRecord, InMemoryTransport, JobChannel, JobId,
    JobRecord, KeyId, NodeId, NodeInfoRecord, NodeState, Payload, PubSubError, Publisher,
    StatusCallback, SubscriberConfig, Transport, ViolationPolicy, WorkerDeltaRecord, WorkerId,
};
use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;
use std::sync::Arc;

struct Fixture {
    transport: Arc<InMemoryTransport>,
    publisher: Publisher<InMemoryTransport>,
    subscriber: ChannelSubscriber<InMemoryTransport>,
}

fn fixture(policy: ViolationPolicy) -> Fixture {
    init_tracing();
    let endpoint = Endpoint::new("10.0.0.1", 6379);
    let transport = Arc::new(InMemoryTransport::new(endpoint.clone()));
    let config = SubscriberConfig {
        endpoint,
        violation_policy: policy,
    };
    Fixture {
        publisher: Publisher::new(Arc::clone(&transport)),
        subscriber: ChannelSubscriber::new(Arc::clone(&transport), config),
        transport,
    }
}

fn actor_id(n: u8) -> ActorId {
    ActorId::from_binary(&[n; ActorId::SIZE]).unwrap()
}

fn job_id(n: u8) -> JobId {
    JobId::from_binary(&[n; JobId::SIZE]).unwrap()
}

fn actor(name: &str, state: ActorState) -> ActorRecord {
    ActorRecord {
        state,
        name: name.to_string(),
        ..Default::default()
    }
}

fn done_channel() -> (StatusCallback, Receiver<Result<(), String>>) {
    let (tx, rx) = unbounded();
    let done: StatusCallback = Box::new(move |status: control_pubsub::Result<()>| {
        let _ = tx.send(status.map_err(|e| e.to_string()));
    });
    (done, rx)
}

#[test]
fn test_actor_subscription_sees_only_its_actor() {
    let f = fixture(ViolationPolicy::Abort);
    let (a1, a2) = (actor_id(1), actor_id(2));

    let (tx, rx) = unbounded();
    f.subscriber
        .subscribe_actor(
            a1,
            move |id, record| {
                let _ = tx.send((id, record.state));
            },
            None,
        )
        .unwrap();

    f.publisher
        .publish_actor(&a1, actor("one", ActorState::Alive), None)
        .unwrap();
    f.publisher
        .publish_actor(&a2, actor("two", ActorState::Alive), None)
        .unwrap();
    f.publisher
        .publish_actor(&a1, actor("one", ActorState::Dead), None)
        .unwrap();

    let seen: Vec<_> = rx.try_iter().collect();
    assert_eq!(seen, vec![(a1, ActorState::Alive), (a1, ActorState::Dead)]);
}

#[test]
fn test_other_actor_subscriber_receives_nothing() {
    let f = fixture(ViolationPolicy::Abort);
    let (a1, a2) = (actor_id(1), actor_id(2));

    let (a1_tx, a1_rx) = unbounded();
    f.subscriber
        .subscribe_actor(a1, move |id, record| drop(a1_tx.send((id, record))), None)
        .unwrap();
    let (a2_tx, a2_rx) = unbounded();
    f.subscriber
        .subscribe_actor(a2, move |id, record| drop(a2_tx.send((id, record))), None)
        .unwrap();

    let payload = actor("p", ActorState::Alive);
    f.publisher.publish_actor(&a1, payload.clone(), None).unwrap();

    assert_eq!(a1_rx.try_iter().collect::<Vec<_>>(), vec![(a1, payload)]);
    assert!(a2_rx.try_recv().is_err());
}

#[test]
fn test_job_channel_never_sees_actor_updates() {
    let f = fixture(ViolationPolicy::Abort);

    let (tx, rx) = unbounded();
    f.subscriber
        .subscribe_all_jobs(
            move |id, record| {
                let _ = tx.send((id, record.entrypoint));
            },
            None,
        )
        .unwrap();

    f.publisher
        .publish_actor(&actor_id(1), actor("one", ActorState::Alive), None)
        .unwrap();
    f.publisher
        .publish_job(
            &job_id(7),
            JobRecord {
                entrypoint: "python main.py".to_string(),
                ..Default::default()
            },
            None,
        )
        .unwrap();

    let seen: Vec<_> = rx.try_iter().collect();
    assert_eq!(seen, vec![(job_id(7), "python main.py".to_string())]);
}

#[test]
fn test_node_and_worker_wrappers_deliver_records() {
    let f = fixture(ViolationPolicy::Abort);

    let nodes = Arc::new(Mutex::new(Vec::new()));
    let workers = Arc::new(Mutex::new(Vec::new()));
    {
        let nodes = Arc::clone(&nodes);
        f.subscriber
            .subscribe_all_node_info(move |record| nodes.lock().push(record.state), None)
            .unwrap();
        let workers = Arc::clone(&workers);
        f.subscriber
            .subscribe_all_worker_failures(
                move |record| workers.lock().push(record.exit_detail),
                None,
            )
            .unwrap();
    }

    let node = NodeId::from_binary(&[3; NodeId::SIZE]).unwrap();
    f.publisher
        .publish_node_info(
            &node,
            NodeInfoRecord {
                state: NodeState::Dead,
                ..Default::default()
            },
            None,
        )
        .unwrap();
    let worker = WorkerId::from_binary(&[4; WorkerId::SIZE]).unwrap();
    f.publisher
        .publish_worker_failure(
            &worker,
            WorkerDeltaRecord {
                exit_detail: "oom".to_string(),
                ..Default::default()
            },
            None,
        )
        .unwrap();

    assert_eq!(*nodes.lock(), vec![NodeState::Dead]);
    assert_eq!(*workers.lock(), vec!["oom".to_string()]);
}

#[test]
fn test_resubscribe_replaces_callback() {
    let f = fixture(ViolationPolicy::Abort);
    let a1 = actor_id(1);

    let (first_tx, first_rx) = unbounded();
    f.subscriber
        .subscribe_actor(a1, move |_, r| drop(first_tx.send(r.name)), None)
        .unwrap();
    let (second_tx, second_rx) = unbounded();
    f.subscriber
        .subscribe_actor(a1, move |_, r| drop(second_tx.send(r.name)), None)
        .unwrap();

    f.publisher
        .publish_actor(&a1, actor("x", ActorState::Alive), None)
        .unwrap();

    assert!(first_rx.try_recv().is_err());
    assert_eq!(second_rx.try_recv().unwrap(), "x");
    assert_eq!(f.subscriber.subscription_count(), 1);
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let f = fixture(ViolationPolicy::Abort);
    let a1 = actor_id(1);

    let (tx, rx) = unbounded();
    f.subscriber
        .subscribe_actor(a1, move |_, r| drop(tx.send(r.name)), None)
        .unwrap();
    assert!(!f.subscriber.is_actor_unsubscribed(&a1));

    f.subscriber.unsubscribe_actor(&a1).unwrap();
    assert!(f.subscriber.is_actor_unsubscribed(&a1));
    assert_eq!(f.subscriber.subscription_count(), 0);

    f.publisher
        .publish_actor(&a1, actor("late", ActorState::Alive), None)
        .unwrap();
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_never_subscribed_is_unsubscribed() {
    let f = fixture(ViolationPolicy::Abort);
    assert!(f.subscriber.is_actor_unsubscribed(&actor_id(9)));
}

#[test]
fn test_unsubscribe_channel() {
    let f = fixture(ViolationPolicy::Abort);

    let (tx, rx) = unbounded();
    f.subscriber
        .subscribe_all_jobs(move |id, _| drop(tx.send(id)), None)
        .unwrap();
    f.subscriber.unsubscribe_channel::<JobChannel>().unwrap();

    f.publisher
        .publish_job(&job_id(1), JobRecord::default(), None)
        .unwrap();

    assert!(rx.try_recv().is_err());
    assert_eq!(f.transport.stats().channel_subscriptions, 0);
}

#[test]
fn test_done_callbacks_report_success() {
    let f = fixture(ViolationPolicy::Abort);

    let (sub_done, sub_rx) = done_channel();
    f.subscriber
        .subscribe_all_jobs(|_, _| {}, Some(sub_done))
        .unwrap();
    assert_eq!(sub_rx.try_recv().unwrap(), Ok(()));

    let (pub_done, pub_rx) = done_channel();
    f.publisher
        .publish_job(&job_id(1), JobRecord::default(), Some(pub_done))
        .unwrap();
    assert_eq!(pub_rx.try_recv().unwrap(), Ok(()));
}

#[test]
fn test_unreachable_endpoint_reports_failure() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new(Endpoint::new("10.0.0.1", 6379)));
    let subscriber = ChannelSubscriber::new(
        Arc::clone(&transport),
        SubscriberConfig::new(Endpoint::new("10.0.0.2", 6379)),
    );

    let (failure_tx, failure_rx) = unbounded();
    let (done, done_rx) = done_channel();
    let callbacks = Callbacks::<ActorChannel>::new(|_, _| {})
        .on_done(done)
        .on_failure(move |_, error| {
            let _ = failure_tx.send(error.to_string());
        });
    subscriber.subscribe(actor_id(1), callbacks).unwrap();

    assert!(done_rx.try_recv().unwrap().is_err());
    assert!(failure_rx.try_recv().unwrap().contains("10.0.0.2:6379"));
    assert_eq!(subscriber.subscription_count(), 0);
}

#[test]
fn test_lost_subscription_invokes_failure_callback() {
    let f = fixture(ViolationPolicy::Abort);
    let a1 = actor_id(1);

    let (failure_tx, failure_rx) = unbounded();
    let callbacks = Callbacks::<ActorChannel>::new(|_, _| {}).on_failure(move |key, _| {
        let _ = failure_tx.send(key.clone());
    });
    f.subscriber.subscribe(a1, callbacks).unwrap();

    let key = KeyId(a1.binary());
    assert!(f.transport.fail_subscription(
        ChannelType::Actor,
        Some(&key),
        PubSubError::Unreachable(Endpoint::new("10.0.0.1", 6379)),
    ));

    assert_eq!(failure_rx.try_recv().unwrap(), key);
    assert!(f.subscriber.is_actor_unsubscribed(&a1));
    assert_eq!(f.subscriber.subscription_count(), 0);
}

#[test]
fn test_wrong_channel_delivery_propagates() {
    let f = fixture(ViolationPolicy::Propagate);

    let (tx, rx) = unbounded();
    f.subscriber
        .subscribe_all_jobs(move |id, _| drop(tx.send(id)), None)
        .unwrap();

    let stray = Envelope::new(
        ChannelType::Actor,
        KeyId(job_id(1).binary()),
        Payload::Actor(ActorRecord::default()),
    );
    let err = f
        .transport
        .deliver_raw(ChannelType::Job, None, stray)
        .unwrap_err();

    assert!(err.is_protocol_violation());
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_wrong_key_delivery_propagates() {
    let f = fixture(ViolationPolicy::Propagate);
    let (a1, a2) = (actor_id(1), actor_id(2));

    f.subscriber.subscribe_actor(a1, |_, _| {}, None).unwrap();

    let stray = Envelope::new(
        ChannelType::Actor,
        KeyId(a2.binary()),
        Payload::Actor(ActorRecord::default()),
    );
    let err = f
        .transport
        .deliver_raw(ChannelType::Actor, Some(&KeyId(a1.binary())), stray)
        .unwrap_err();

    assert!(err.is_protocol_violation());
}

#[test]
fn test_undecodable_key_propagates() {
    let f = fixture(ViolationPolicy::Propagate);
    f.subscriber.subscribe_all_jobs(|_, _| {}, None).unwrap();

    let bad = Envelope::new(
        ChannelType::Job,
        KeyId::from("not-four-bytes"),
        Payload::Job(JobRecord::default()),
    );
    let err = f
        .transport
        .deliver_raw(ChannelType::Job, None, bad)
        .unwrap_err();

    assert!(matches!(err, PubSubError::InvalidKey(_)));
}

#[test]
fn test_published_violation_is_counted() {
    let f = fixture(ViolationPolicy::Propagate);
    f.subscriber.subscribe_all_jobs(|_, _| {}, None).unwrap();

    // A job key that doesn't decode reaches the subscriber through routing.
    f.transport.publish(Envelope::new(
        ChannelType::Job,
        KeyId::from("xx"),
        Payload::Job(JobRecord::default()),
    ));

    assert_eq!(f.transport.stats().delivery_errors, 1);
}

#[test]
#[should_panic(expected = "Protocol violation")]
fn test_abort_policy_panics_on_violation() {
    let f = fixture(ViolationPolicy::Abort);
    f.subscriber.subscribe_all_jobs(|_, _| {}, None).unwrap();

    let stray = Envelope::new(
        ChannelType::Actor,
        KeyId(job_id(1).binary()),
        Payload::Actor(ActorRecord::default()),
    );
    let _ = f.transport.deliver_raw(ChannelType::Job, None, stray);
}

#[test]
fn test_dropped_subscriber_stops_dispatch() {
    let f = fixture(ViolationPolicy::Abort);

    let (tx, rx) = unbounded();
    f.subscriber
        .subscribe_all_jobs(move |id, _| drop(tx.send(id)), None)
        .unwrap();
    let Fixture {
        transport,
        publisher,
        subscriber,
    } = f;
    drop(subscriber);

    publisher
        .publish_job(&job_id(1), JobRecord::default(), None)
        .unwrap();

    assert!(rx.try_recv().is_err());
    assert_eq!(transport.stats().delivery_errors, 0);
}

#[test]
fn test_error_channel_string_keys() {
    let f = fixture(ViolationPolicy::Abort);

    let (tx, rx) = unbounded();
    f.subscriber
        .subscribe_channel(Callbacks::<ErrorInfoChannel>::new(move |key, record| {
            let _ = tx.send((key, record.error_message));
        }))
        .unwrap();

    f.publisher
        .publish_error(
            "01000000",
            ErrorRecord {
                error_message: "task failed".to_string(),
                ..Default::default()
            },
            None,
        )
        .unwrap();

    assert_eq!(
        rx.try_recv().unwrap(),
        ("01000000".to_string(), "task failed".to_string())
    );
}

#[test]
fn test_debug_string_lists_registrations() {
    let f = fixture(ViolationPolicy::Abort);
    f.subscriber.subscribe_all_jobs(|_, _| {}, None).unwrap();
    f.subscriber.subscribe_actor(actor_id(1), |_, _| {}, None).unwrap();
    f.publisher
        .publish_job(&job_id(1), JobRecord::default(), None)
        .unwrap();

    let summary = f.publisher.debug_string();
    let parsed: serde_json::Value = serde_json::from_str(&summary).unwrap();

    assert_eq!(parsed["endpoint"], "10.0.0.1:6379");
    assert_eq!(parsed["channel_subscriptions"], 1);
    assert_eq!(parsed["key_subscriptions"], 1);
    assert_eq!(parsed["by_channel"]["ACTOR"], 1);
    assert_eq!(parsed["published"], 1);
}

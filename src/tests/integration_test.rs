use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::broker::{Broker, InlineDispatcher, SpawnDispatcher};
use crate::subscriber::{InboxPolicy, Subscriber};
use crate::utils::error::Error;

const TOPICS: [&str; 3] = ["alpha", "beta", "gamma"];

fn spawned<T: Send + Sync + 'static>(max_in_flight: usize, policy: InboxPolicy) -> Arc<Broker<T>> {
    Arc::new(Broker::with_dispatcher(
        Arc::new(SpawnDispatcher::new(max_in_flight)),
        policy,
    ))
}

/// Every registered subscriber's topic set agrees with the topic index,
/// and removed subscribers hold no topics.
fn assert_indices_in_sync<T: Send + Sync + 'static>(
    broker: &Broker<T>,
    subscribers: &[Arc<Subscriber<T>>],
) {
    for topic in TOPICS {
        let expected = subscribers
            .iter()
            .filter(|s| broker.subscriber(s.id()).is_some() && s.is_subscribed(topic))
            .count();
        assert_eq!(broker.subscriber_count(topic), expected, "topic {topic}");
    }
    for subscriber in subscribers {
        if broker.subscriber(subscriber.id()).is_none() {
            assert!(subscriber.list_topics().is_empty());
            assert!(!subscriber.is_active());
        } else {
            for topic in subscriber.list_topics() {
                assert!(broker.subscriber_count(&topic) >= 1);
            }
        }
    }
}

#[tokio::test]
async fn scenario_single_subscriber_receives_tagged_message() {
    let broker = Broker::<String>::default();
    let s1 = broker.add_subscriber().unwrap();
    broker.subscribe(&s1, "news").unwrap();

    broker.publish("news", "hello".to_string()).await;

    let received = timeout(Duration::from_secs(1), s1.receive())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(received.topic(), "news");
    assert_eq!(received.payload(), "hello");
}

#[tokio::test]
async fn scenario_publish_without_subscribers_is_a_no_op() {
    let broker = Broker::<String>::default();
    let dispatched = broker.publish("news", "x".to_string()).await;
    assert_eq!(dispatched.targets(), 0);
    assert_eq!(broker.subscriber_count("news"), 0);
}

#[tokio::test]
async fn scenario_only_remaining_subscriber_receives() {
    let broker = Broker::<String>::default();
    let s1 = broker.add_subscriber().unwrap();
    let s2 = broker.add_subscriber().unwrap();
    broker.subscribe(&s1, "t").unwrap();
    broker.subscribe(&s2, "t").unwrap();

    broker.remove_subscriber(&s1);
    broker.publish("t", "y".to_string()).await.wait().await;

    assert_eq!(s2.receive().await.unwrap().payload(), "y");
    assert!(matches!(s1.receive().await, Err(Error::ChannelClosed)));
}

#[tokio::test]
async fn consumer_loop_ends_with_channel_closed() {
    let broker = Arc::new(Broker::<u32>::with_dispatcher(
        Arc::new(InlineDispatcher),
        InboxPolicy::Unbounded,
    ));
    let subscriber = broker.add_subscriber().unwrap();
    broker.subscribe(&subscriber, "ticks").unwrap();

    let consumer = {
        let subscriber = subscriber.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            loop {
                match subscriber.receive().await {
                    Ok(message) => seen.push(*message.payload()),
                    Err(Error::ChannelClosed) => break,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            seen
        })
    };

    for tick in 0..50 {
        broker.publish("ticks", tick).await;
    }
    broker.remove_subscriber(&subscriber);

    let seen = timeout(Duration::from_secs(2), consumer)
        .await
        .expect("consumer never saw the close")
        .unwrap();
    assert_eq!(seen, (0..50).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_churn_keeps_indices_in_sync() {
    let broker = spawned::<u64>(32, InboxPolicy::DropNewest { capacity: 8 });
    let subscribers: Vec<_> = (0..8).map(|_| broker.add_subscriber().unwrap()).collect();

    let mut tasks = Vec::new();
    for (i, subscriber) in subscribers.iter().enumerate() {
        let broker = broker.clone();
        let subscriber = subscriber.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..200_usize {
                let topic = TOPICS[(i + round) % TOPICS.len()];
                if round % 3 == 0 {
                    broker.unsubscribe(&subscriber, topic);
                } else {
                    // fails once the remover below has taken this subscriber out
                    let _ = broker.subscribe(&subscriber, topic);
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for p in 0..4_u64 {
        let broker = broker.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..200_u64 {
                let topic = TOPICS[((p + round) % TOPICS.len() as u64) as usize];
                broker.publish(topic, round).await;
                tokio::task::yield_now().await;
            }
        }));
    }
    {
        let broker = broker.clone();
        let doomed = vec![subscribers[6].clone(), subscribers[7].clone()];
        tasks.push(tokio::spawn(async move {
            for subscriber in doomed {
                tokio::time::sleep(Duration::from_millis(2)).await;
                broker.remove_subscriber(&subscriber);
            }
        }));
    }

    for task in tasks {
        timeout(Duration::from_secs(10), task)
            .await
            .expect("task hung")
            .unwrap();
    }

    assert_eq!(broker.subscriber_total(), 6);
    assert_indices_in_sync(&broker, &subscribers);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publishers_reach_every_subscriber() {
    let broker = spawned::<(u8, u16)>(8, InboxPolicy::Unbounded);
    let subscribers: Vec<_> = (0..5).map(|_| broker.add_subscriber().unwrap()).collect();
    for subscriber in &subscribers {
        broker.subscribe(subscriber, "shared").unwrap();
    }

    let mut publishers = Vec::new();
    for p in 0..4_u8 {
        let broker = broker.clone();
        publishers.push(tokio::spawn(async move {
            let mut handles = Vec::new();
            for i in 0..50_u16 {
                handles.push(broker.publish("shared", (p, i)).await);
            }
            for handle in handles {
                assert_eq!(handle.wait().await.delivered, 5);
            }
        }));
    }
    for publisher in publishers {
        publisher.await.unwrap();
    }

    for subscriber in &subscribers {
        let mut seen = HashSet::new();
        while let Some(message) = subscriber.try_receive().unwrap() {
            seen.insert(*message.payload());
        }
        assert_eq!(seen.len(), 200);
        assert_eq!(subscriber.stats().delivered, 200);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn publish_racing_subscribe_may_include_or_exclude() {
    for _ in 0..20 {
        let broker = spawned::<u8>(4, InboxPolicy::Unbounded);
        let subscriber = broker.add_subscriber().unwrap();

        let subscribing = {
            let broker = broker.clone();
            let subscriber = subscriber.clone();
            tokio::spawn(async move { broker.subscribe(&subscriber, "race").unwrap() })
        };
        let dispatched = broker.publish("race", 1).await;
        subscribing.await.unwrap();
        let report = dispatched.wait().await;

        // both orders are valid; what matters is that the outcome is consistent
        let received = usize::from(subscriber.try_receive().unwrap().is_some());
        assert!(report.delivered <= 1);
        assert_eq!(received, report.delivered);
        assert_eq!(broker.subscriber_count("race"), 1);
    }
}

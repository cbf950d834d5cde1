use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, atomic::AtomicU64},
};

use anyhow::{Context, Result};
use tokio::sync::Notify;

use crate::{
    bus::{MessageBus, SubscriptionHandle},
    queues::{FifoDropOldestQueue, IsolatedForwarder, QueueKind, StartupTasks},
    routes::{Route, RouteInbox},
    workers::{FifoInput, FifoReceiver, StateCell, SubscriptionState, WorkerInputs},
};

pub struct SubscriptionSpec {
    pub subscriber_id: &'static str,
    pub inputs: Vec<InputSpec>,
}

pub struct InputSpec {
    pub topic: &'static str,
    pub queue_kind: QueueKind,
}

/// Worker inputs keyed by subscriber, handed out once each.
pub struct WorkerWiring {
    inputs: HashMap<&'static str, WorkerInputs>,
}

impl WorkerWiring {
    pub fn take(&mut self, subscriber_id: &'static str) -> Result<WorkerInputs> {
        self.inputs
            .remove(subscriber_id)
            .with_context(|| format!("no inputs wired for subscriber_id={}", subscriber_id))
    }
}

pub struct BusWiring {
    pub wiring: WorkerWiring,
    pub subscriptions: Vec<SubscriptionHandle>,
    pub routes: Vec<Route>,
    pub states: Vec<StateCell>,
    pub tasks: StartupTasks,
}

fn validate(subs: &[SubscriptionSpec]) -> Result<()> {
    let mut seen_subscribers: HashSet<&'static str> = HashSet::new();
    for s in subs {
        if s.subscriber_id.trim().is_empty() {
            anyhow::bail!("empty subscriber_id");
        }
        if !seen_subscribers.insert(s.subscriber_id) {
            anyhow::bail!("duplicate subscriber_id={}", s.subscriber_id);
        }
        if s.inputs.is_empty() {
            anyhow::bail!("subscriber_id={} has no inputs", s.subscriber_id);
        }

        let mut seen_topics: HashSet<&'static str> = HashSet::new();
        for i in &s.inputs {
            if i.topic.trim().is_empty() {
                anyhow::bail!("subscriber_id={} has empty topic", s.subscriber_id);
            }
            if !seen_topics.insert(i.topic) {
                anyhow::bail!(
                    "subscriber_id={} has duplicate input topic={}",
                    s.subscriber_id,
                    i.topic
                );
            }

            match i.queue_kind {
                QueueKind::FifoDropOldest { capacity } => {
                    anyhow::ensure!(capacity > 0, "capacity must be > 0")
                }
                QueueKind::Isolated {
                    inbox,
                    output_buffer,
                } => {
                    anyhow::ensure!(inbox > 0, "inbox must be > 0");
                    anyhow::ensure!(output_buffer > 0, "output_buffer must be > 0")
                }
            }
        }
    }
    Ok(())
}

/// Collects subscriber specs, then creates one inbox per input and subscribes
/// it on the bus.
#[derive(Default)]
pub struct SubscriptionBuilder {
    subs: Vec<SubscriptionSpec>,
}

impl SubscriptionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(mut self, s: SubscriptionSpec) -> Self {
        self.subs.push(s);
        self
    }

    pub async fn build(self, bus: &dyn MessageBus) -> Result<BusWiring> {
        validate(&self.subs)?;

        let mut wiring: HashMap<&'static str, WorkerInputs> = HashMap::new();
        let mut subscriptions = Vec::new();
        let mut all_routes = Vec::new();
        let mut states = Vec::new();
        let mut tasks = StartupTasks::default();

        for spec in self.subs {
            let notify_any = Arc::new(Notify::new());
            let state = StateCell::new(spec.subscriber_id);
            state.set(SubscriptionState::Connecting);
            let mut fifos = Vec::new();

            for input in spec.inputs {
                let drops_total = Arc::new(AtomicU64::new(0));

                let (inbox, receiver) = match input.queue_kind {
                    QueueKind::FifoDropOldest { capacity } => {
                        let q =
                            Arc::new(FifoDropOldestQueue::new(capacity, Arc::clone(&notify_any)));
                        let rx = q.receiver();
                        (
                            RouteInbox::FifoDropOldest(q),
                            FifoReceiver::FifoDropOldest(rx),
                        )
                    }
                    QueueKind::Isolated {
                        inbox,
                        output_buffer,
                    } => {
                        let (fwd, out_rx, drain_task) =
                            IsolatedForwarder::new(inbox, output_buffer, Arc::clone(&notify_any));
                        tasks.tokio.push(drain_task);
                        (RouteInbox::Isolated(fwd), FifoReceiver::Isolated(out_rx))
                    }
                };

                let route = Route {
                    subscriber_id: spec.subscriber_id,
                    topic: input.topic,
                    inbox,
                    drops_total,
                };

                let handle = match bus.subscribe(route.clone()).await {
                    Ok(handle) => handle,
                    Err(e) => {
                        state.set(SubscriptionState::Closed);
                        for h in subscriptions {
                            SubscriptionHandle::unsubscribe(h).await;
                        }
                        return Err(e).with_context(|| {
                            format!(
                                "subscriber_id={} could not subscribe to {}",
                                spec.subscriber_id, input.topic
                            )
                        });
                    }
                };

                subscriptions.push(handle);
                all_routes.push(route);
                fifos.push(FifoInput {
                    topic: input.topic,
                    receiver,
                });
            }

            wiring.insert(
                spec.subscriber_id,
                WorkerInputs {
                    fifos,
                    notify_any,
                    fifo_index: 0,
                    state: state.clone(),
                },
            );
            states.push(state);
        }

        Ok(BusWiring {
            wiring: WorkerWiring { inputs: wiring },
            subscriptions,
            routes: all_routes,
            states,
            tasks,
        })
    }
}

//! Watches workloads, maintains the supervised set, and wires the scheduler,
//! decision engine, rollout driver and notifier together under one
//! in-flight-per-workload actor.

use crate::decision;
use crate::models::{annotations, SupervisedWorkload, UpdateStrategy, WebhookEvent, WebhookEventType};
use crate::notifier::{Notifier, WebhookNotifier};
use crate::registry::RegistryGateway;
use crate::rollout;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{error, info, warn};

use crate::scheduler::CronScheduler;

const ACTOR_CHANNEL_CAPACITY: usize = 1;

pub struct Reconciler {
    client: Client,
    gateway: RegistryGateway,
    notifier: Arc<WebhookNotifier>,
    scheduler: CronScheduler,
    supervised: Mutex<HashMap<String, SupervisedWorkload>>,
    actors: Mutex<HashMap<String, mpsc::Sender<oneshot::Sender<()>>>>,
}

impl Reconciler {
    pub fn new(client: Client, gateway: RegistryGateway, notifier: Arc<WebhookNotifier>) -> Arc<Self> {
        Arc::new(Self {
            client,
            gateway,
            notifier,
            scheduler: CronScheduler::new(),
            supervised: Mutex::new(HashMap::new()),
            actors: Mutex::new(HashMap::new()),
        })
    }

    /// Runs forever, watching every `Deployment` in the cluster and keeping
    /// the supervised set, scheduler jobs, and actors in sync. `kube::runtime::watcher`
    /// already reconnects with backoff on stream errors; a stream close here
    /// is treated as one more error and the watch is restarted.
    pub async fn run(self: Arc<Self>) {
        let api: Api<Deployment> = Api::all(self.client.clone());
        let mut stream = watcher(api, watcher::Config::default()).boxed();

        loop {
            match stream.next().await {
                Some(Ok(watcher::Event::Apply(dep))) | Some(Ok(watcher::Event::InitApply(dep))) => {
                    self.handle_upsert(dep).await;
                },
                Some(Ok(watcher::Event::Delete(dep))) => self.handle_delete(dep).await,
                Some(Ok(watcher::Event::Init)) | Some(Ok(watcher::Event::InitDone)) => {},
                Some(Err(err)) => {
                    warn!(%err, "workload watch stream error, reconnecting");
                },
                None => {
                    warn!("workload watch stream closed, restarting watch");
                    let api: Api<Deployment> = Api::all(self.client.clone());
                    stream = watcher(api, watcher::Config::default()).boxed();
                },
            }
        }
    }

    async fn handle_upsert(self: &Arc<Self>, dep: Deployment) {
        let namespace = dep.namespace().unwrap_or_default();
        let name = dep.name_any();
        let key = SupervisedWorkload::make_key(&namespace, &name);

        let annotations_map = dep.metadata.annotations.clone().unwrap_or_default();
        let enabled = annotations_map
            .get(annotations::ENABLED)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if !enabled {
            return;
        }

        let cron_expr = annotations_map
            .get(annotations::CRON)
            .cloned()
            .unwrap_or_else(|| annotations::DEFAULT_CRON.to_string());
        let strategy = annotations_map
            .get(annotations::STRATEGY)
            .map(|v| UpdateStrategy::from_annotation(v))
            .unwrap_or_default();

        let containers = dep
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .map(|ps| ps.containers.as_slice())
            .unwrap_or(&[]);
        let Some(current_image) = containers.first().and_then(|c| c.image.clone()) else {
            return;
        };
        let image_pull_secrets = dep
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|ps| ps.image_pull_secrets.as_ref())
            .map(|secrets| secrets.iter().filter_map(|s| s.name.clone()).collect())
            .unwrap_or_default();

        let entry = SupervisedWorkload {
            namespace: namespace.clone(),
            name: name.clone(),
            cron_expr: cron_expr.clone(),
            strategy,
            current_image,
            image_pull_secrets,
            last_checked: None,
        };

        let is_new = !self.supervised.lock().await.contains_key(&key);
        self.supervised.lock().await.insert(key.clone(), entry);
        if is_new {
            crate::metrics::WORKLOADS_SUPERVISED.inc();
        }
        self.ensure_actor(&key).await;

        let this = Arc::clone(self);
        let key_for_job = key.clone();
        self.scheduler
            .schedule_job(
                &key,
                &cron_expr,
                Arc::new(move || {
                    let this = Arc::clone(&this);
                    let key = key_for_job.clone();
                    Box::pin(async move {
                        this.trigger_check(&key).await;
                    })
                }),
            )
            .await;

        let mut details = HashMap::new();
        details.insert("cronExpression".to_string(), serde_json::json!(cron_expr));
        details.insert("updateStrategy".to_string(), serde_json::json!(format!("{:?}", strategy)));
        self.notifier
            .send(&WebhookEvent::new(
                WebhookEventType::DeploymentDetected,
                namespace,
                name,
                "",
                details,
            ))
            .await;
    }

    async fn handle_delete(&self, dep: Deployment) {
        let namespace = dep.namespace().unwrap_or_default();
        let name = dep.name_any();
        let key = SupervisedWorkload::make_key(&namespace, &name);

        self.supervised.lock().await.remove(&key);
        self.actors.lock().await.remove(&key);
        self.scheduler.cancel_job(&key).await;
    }

    async fn ensure_actor(self: &Arc<Self>, key: &str) -> mpsc::Sender<oneshot::Sender<()>> {
        let mut actors = self.actors.lock().await;
        if let Some(tx) = actors.get(key) {
            return tx.clone();
        }

        let (tx, mut rx) = mpsc::channel::<oneshot::Sender<()>>(ACTOR_CHANNEL_CAPACITY);
        let this = Arc::clone(self);
        let key_owned = key.to_string();
        tokio::spawn(async move {
            while let Some(ack) = rx.recv().await {
                this.check(&key_owned).await;
                let _ = ack.send(());
            }
        });

        actors.insert(key.to_string(), tx.clone());
        tx
    }

    /// Send a check request to the workload's actor and wait for it to
    /// finish, so a cron firing that arrives mid-check queues behind it.
    async fn trigger_check(self: &Arc<Self>, key: &str) {
        let tx = self.ensure_actor(key).await;
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(ack_tx).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    async fn check(&self, key: &str) {
        let Some(entry) = self.supervised.lock().await.get(key).cloned() else {
            warn!(key, "check fired for an unregistered workload, skipping");
            return;
        };
        crate::metrics::RECONCILE_CHECKS_TOTAL.inc();

        let decision = decision::check_for_update(
            &self.gateway,
            Some(&self.client),
            &entry.current_image,
            entry.strategy,
            &entry.namespace,
            &entry.image_pull_secrets,
            Some(&entry.current_image),
        )
        .await;

        let Some(new_image) = decision.new_image else {
            info!(key, reason = %decision.reason, "no update");
            return;
        };

        let rollout_result = rollout::update_deployment(
            &self.client,
            &self.notifier,
            &entry.namespace,
            &entry.name,
            &new_image,
            &entry.current_image,
        )
        .await;

        match rollout_result {
            Ok(()) => {
                // Critical anti-stale-cache step: write the cache right after
                // the rollout driver call succeeds, not from the watcher alone.
                if let Some(supervised) = self.supervised.lock().await.get_mut(key) {
                    supervised.current_image = new_image;
                }
            },
            Err(err) => {
                error!(key, %err, "rollout failed");
            },
        }
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

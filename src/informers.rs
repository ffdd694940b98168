//! Cached views of the operand workloads and the ClusterCSIDriver instance
//!
//! Two informer groups are started: one scoped to the operator namespace
//! (driver Deployments and DaemonSets) and one cluster-wide (the
//! ClusterCSIDriver instance). Controllers only read the stores.

use std::fmt::Debug;
use std::hash::Hash;

use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::api::DynamicObject;
use kube::runtime::reflector::{self, store::Writer, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::cluster::cluster_csi_driver_resource;

/// Read-only caches shared with the controllers
#[derive(Clone)]
pub struct InformerStores {
    pub deployments: Store<Deployment>,
    pub daemon_sets: Store<DaemonSet>,
    pub cluster_csi_drivers: Store<DynamicObject>,
}

/// A group of watchers started and stopped together
pub struct InformerFactory {
    name: &'static str,
    watchers: Vec<BoxFuture<'static, ()>>,
}

impl InformerFactory {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            watchers: Vec::new(),
        }
    }

    fn add(&mut self, watcher: BoxFuture<'static, ()>) {
        self.watchers.push(watcher);
    }

    /// Run every watcher until the token is cancelled
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let name = self.name;
        let watchers = self.watchers;

        tokio::spawn(async move {
            info!("Starting {} informers", name);
            tokio::select! {
                _ = future::join_all(watchers) => {
                    warn!("{} informers exited", name);
                }
                _ = shutdown.cancelled() => {
                    info!("{} informers stopped", name);
                }
            }
        })
    }
}

/// Informers for the namespaced operand workloads and the cluster-wide operator config
pub fn build_informers(
    client: &Client,
    namespace: &str,
    instance_name: &str,
) -> (InformerStores, InformerFactory, InformerFactory) {
    let mut namespaced = InformerFactory::new("namespaced");
    let mut cluster = InformerFactory::new("cluster");

    let (deployments, writer) = reflector::store::<Deployment>();
    namespaced.add(reflect(
        Api::namespaced(client.clone(), namespace),
        watcher::Config::default(),
        writer,
        "Deployment",
    ));

    let (daemon_sets, writer) = reflector::store::<DaemonSet>();
    namespaced.add(reflect(
        Api::namespaced(client.clone(), namespace),
        watcher::Config::default(),
        writer,
        "DaemonSet",
    ));

    let resource = cluster_csi_driver_resource();
    let writer = Writer::<DynamicObject>::new(resource.clone());
    let cluster_csi_drivers = writer.as_reader();
    cluster.add(reflect(
        Api::all_with(client.clone(), &resource),
        watcher::Config::default().fields(&format!("metadata.name={}", instance_name)),
        writer,
        "ClusterCSIDriver",
    ));

    let stores = InformerStores {
        deployments,
        daemon_sets,
        cluster_csi_drivers,
    };

    (stores, namespaced, cluster)
}

fn reflect<K>(
    api: Api<K>,
    config: watcher::Config,
    writer: Writer<K>,
    kind: &'static str,
) -> BoxFuture<'static, ()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone + Send + Sync,
{
    watcher(api, config)
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .for_each(move |event| {
            if let Err(e) = event {
                warn!("{} watch error: {}", kind, e);
            }
            future::ready(())
        })
        .boxed()
}

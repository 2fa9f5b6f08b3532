//! Status capability against route objects populated by an ingress controller

mod common;

use std::sync::Arc;

use common::{service, MemoryStore};
use ingress_router::{BackendId, BackendStatus, EnsureRequest, IngressService, Router, RouterConfig};
use k8s_openapi::api::core::v1::{Event, ObjectReference};
use k8s_openapi::api::networking::v1::{
    IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus,
};

const PRIMARY: &str = "ingress-router-shop-ingress";

async fn setup() -> (Arc<MemoryStore>, IngressService) {
    let store = Arc::new(MemoryStore::new());
    store.add_service(service("default", "shop-web", "shop", None, 8080));
    let router = IngressService::new(store.clone(), RouterConfig::default());
    router
        .ensure(&BackendId::new("shop"), EnsureRequest::default())
        .await
        .unwrap();
    (store, router)
}

#[tokio::test]
async fn test_fresh_route_is_not_ready_with_event_detail() {
    let (store, router) = setup().await;
    let uid = store
        .ingress("default", PRIMARY)
        .and_then(|i| i.metadata.uid)
        .unwrap();
    store.add_event(Event {
        involved_object: ObjectReference {
            uid: Some(uid),
            ..Default::default()
        },
        reason: Some("Sync".to_string()),
        message: Some("Scheduled for sync".to_string()),
        ..Default::default()
    });

    let report = router
        .status()
        .expect("ingress router reports status")
        .get_backend_status(&BackendId::new("shop"))
        .await
        .unwrap();
    assert_eq!(report.status, BackendStatus::NotReady);
    assert_eq!(report.detail.as_deref(), Some("Sync: Scheduled for sync"));
}

#[tokio::test]
async fn test_route_with_address_is_ready() {
    let (store, router) = setup().await;
    let mut primary = store.ingress("default", PRIMARY).unwrap();
    primary.status = Some(IngressStatus {
        load_balancer: Some(IngressLoadBalancerStatus {
            ingress: Some(vec![IngressLoadBalancerIngress {
                ip: Some("192.0.2.10".to_string()),
                ..Default::default()
            }]),
        }),
    });
    store.put_ingress("default", primary);

    let report = router
        .status()
        .unwrap()
        .get_backend_status(&BackendId::new("shop"))
        .await
        .unwrap();
    assert_eq!(report.status, BackendStatus::Ready);
}

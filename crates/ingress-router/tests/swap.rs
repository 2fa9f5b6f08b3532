//! Swap involution, rollback and the removal guard

mod common;

use std::sync::Arc;

use common::{backend_of, service, MemoryStore};
use ingress_router::route::swap_partner;
use ingress_router::{
    BackendId, EnsureRequest, IngressService, Router, RouterConfig, RouterError, StoreError,
};

const SHOP: &str = "ingress-router-shop-ingress";
const BLOG: &str = "ingress-router-blog-ingress";

async fn setup() -> (Arc<MemoryStore>, IngressService) {
    let store = Arc::new(MemoryStore::new());
    store.add_service(service("default", "shop-web", "shop", None, 8080));
    store.add_service(service("default", "blog-web", "blog", None, 9090));
    let router = IngressService::new(store.clone(), RouterConfig::default());

    for app in ["shop", "blog"] {
        router
            .ensure(&BackendId::new(app), EnsureRequest::default())
            .await
            .unwrap();
    }
    (store, router)
}

fn target(store: &MemoryStore, name: &str) -> Option<(String, i32)> {
    store.ingress("default", name).as_ref().and_then(backend_of)
}

fn partner(store: &MemoryStore, name: &str) -> Option<String> {
    store
        .ingress("default", name)
        .as_ref()
        .and_then(swap_partner)
        .map(str::to_string)
}

#[tokio::test]
async fn test_swap_exchanges_backends() {
    let (store, router) = setup().await;
    let (shop, blog) = (BackendId::new("shop"), BackendId::new("blog"));

    router.swap(&shop, &blog).await.unwrap();

    assert_eq!(target(&store, SHOP), Some(("blog-web".to_string(), 9090)));
    assert_eq!(target(&store, BLOG), Some(("shop-web".to_string(), 8080)));
    assert_eq!(partner(&store, SHOP).as_deref(), Some("blog"));
    assert_eq!(partner(&store, BLOG).as_deref(), Some("shop"));
}

#[tokio::test]
async fn test_swap_twice_restores_original_state() {
    let (store, router) = setup().await;
    let (shop, blog) = (BackendId::new("shop"), BackendId::new("blog"));
    let before = (
        store.ingress("default", SHOP).and_then(|i| i.spec),
        store.ingress("default", BLOG).and_then(|i| i.spec),
    );

    router.swap(&shop, &blog).await.unwrap();
    router.swap(&shop, &blog).await.unwrap();

    let after = (
        store.ingress("default", SHOP).and_then(|i| i.spec),
        store.ingress("default", BLOG).and_then(|i| i.spec),
    );
    assert_eq!(before, after);
    assert_eq!(partner(&store, SHOP), None);
    assert_eq!(partner(&store, BLOG), None);
}

#[tokio::test]
async fn test_ensure_keeps_swapped_backend() {
    let (store, router) = setup().await;
    let (shop, blog) = (BackendId::new("shop"), BackendId::new("blog"));
    router.swap(&shop, &blog).await.unwrap();
    let writes = store.writes();

    router.ensure(&shop, EnsureRequest::default()).await.unwrap();

    assert_eq!(target(&store, SHOP), Some(("blog-web".to_string(), 9090)));
    assert_eq!(store.writes(), writes);
}

#[tokio::test]
async fn test_failed_second_write_rolls_back_first() {
    let (store, router) = setup().await;
    let (shop, blog) = (BackendId::new("shop"), BackendId::new("blog"));
    let blog_before = store.ingress("default", BLOG);
    store.fail_replaces_of(BLOG);

    let err = router.swap(&shop, &blog).await.unwrap_err();

    assert!(matches!(err, RouterError::Store(StoreError::Conflict { .. })));
    assert_eq!(target(&store, SHOP), Some(("shop-web".to_string(), 8080)));
    assert_eq!(partner(&store, SHOP), None);
    assert_eq!(store.ingress("default", BLOG), blog_before);
}

#[tokio::test]
async fn test_failed_rollback_is_reported() {
    let (store, router) = setup().await;
    let (shop, blog) = (BackendId::new("shop"), BackendId::new("blog"));
    store.fail_replaces_of(BLOG);
    store.fail_replaces_of_after(SHOP, 1);

    let err = router.swap(&shop, &blog).await.unwrap_err();

    assert!(matches!(
        err,
        RouterError::SwapRollbackFailed {
            source: StoreError::Conflict { .. },
            rollback: StoreError::Conflict { .. },
        }
    ));
    // Half-applied swap stays visible for manual repair
    assert_eq!(partner(&store, SHOP).as_deref(), Some("blog"));
    assert_eq!(partner(&store, BLOG), None);
}

#[tokio::test]
async fn test_swap_with_missing_route_writes_nothing() {
    let (store, router) = setup().await;
    let writes = store.writes();

    let err = router
        .swap(&BackendId::new("shop"), &BackendId::new("ghost"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(store.writes(), writes);
}

#[tokio::test]
async fn test_swap_with_third_app_refused() {
    let (store, router) = setup().await;
    store.add_service(service("default", "wiki-web", "wiki", None, 7070));
    let (shop, blog, wiki) = (
        BackendId::new("shop"),
        BackendId::new("blog"),
        BackendId::new("wiki"),
    );
    router.ensure(&wiki, EnsureRequest::default()).await.unwrap();
    router.swap(&shop, &blog).await.unwrap();
    let writes = store.writes();

    for (src, dst) in [(&shop, &wiki), (&wiki, &blog)] {
        let err = router.swap(src, dst).await.unwrap_err();
        assert!(matches!(err, RouterError::AppSwapped { .. }));
    }

    assert_eq!(store.writes(), writes);
    assert_eq!(partner(&store, SHOP).as_deref(), Some("blog"));
    assert_eq!(partner(&store, BLOG).as_deref(), Some("shop"));
    assert_eq!(partner(&store, "ingress-router-wiki-ingress"), None);
}

#[tokio::test]
async fn test_remove_refused_while_swapped() {
    let (store, router) = setup().await;
    let (shop, blog) = (BackendId::new("shop"), BackendId::new("blog"));
    router.swap(&shop, &blog).await.unwrap();

    let err = router.remove(&shop).await.unwrap_err();
    assert!(matches!(
        err,
        RouterError::AppSwapped { ref app, ref partner } if app == "shop" && partner == "blog"
    ));
    assert!(store.ingress("default", SHOP).is_some());

    router.swap(&shop, &blog).await.unwrap();
    router.remove(&shop).await.unwrap();
    assert!(store.ingress("default", SHOP).is_none());
}

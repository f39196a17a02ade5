mod common;

use std::{
    fs::File,
    time::{Duration, SystemTime},
};

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use northwind_bi::{
    dashboard::{DashboardData, DashboardState, Filters, TableCache, router},
    persist, pipeline,
};
use tower::ServiceExt;

use common::TestWorkspace;

fn built_workspace() -> (TestWorkspace, northwind_bi::config::PipelineConfig) {
    let workspace = TestWorkspace::northwind();
    let config = workspace.config();
    pipeline::run_all(&config, false).expect("pipeline");
    (workspace, config)
}

fn load(config: &northwind_bi::config::PipelineConfig) -> DashboardData {
    let mut frame = persist::read_parquet(&config.final_parquet()).expect("parquet");
    persist::coerce_timestamps(&mut frame);
    DashboardData::from_frame(frame)
}

#[test]
fn kpis_ignore_filters_and_views_follow_them() {
    let (_workspace, config) = built_workspace();
    let data = load(&config);

    let kpis = data.kpis();
    assert_eq!(kpis.total_orders, 3);
    assert_eq!(kpis.delivered, 1);
    assert_eq!(kpis.undelivered, 2);
    assert!((kpis.delivery_rate - 100.0 / 3.0).abs() < 1e-9);

    assert_eq!(data.options().years, vec![1996, 1998]);
    assert_eq!(data.options().employees, vec!["3", "5", "6"]);

    let all = data.view(&Filters::default());
    assert_eq!(all.detail.rows.len(), 4);
    assert_eq!(all.kpis, kpis);
    let months = all
        .monthly
        .iter()
        .map(|m| (m.name.as_str(), m.orders))
        .collect::<Vec<_>>();
    assert_eq!(months, vec![("June", 1), ("July", 2)]);
    assert_eq!(all.delivered_by_country.len(), 1);
    assert_eq!(all.delivered_by_country[0].country, "France");
    assert_eq!(all.undelivered_by_country.len(), 2);
    assert_eq!(all.scatter.len(), 3);

    let only_1998 = data.view(&Filters::from_query("applied=1&year=1998&employee=3&employee=5"));
    assert_eq!(only_1998.detail.rows.len(), 1);
    assert_eq!(only_1998.kpis, kpis);

    let nothing = data.view(&Filters::from_query("applied=1&employee=5"));
    assert!(nothing.detail.rows.is_empty());
    assert!(nothing.monthly.is_empty());
}

#[test]
fn empty_customer_selection_does_not_filter() {
    let (_workspace, config) = built_workspace();
    let data = load(&config);

    let unfiltered = data.filtered(&Filters::from_query("applied=1&year=1996&year=1998&employee=3&employee=5&employee=6"));
    assert_eq!(unfiltered.len(), 4);

    let vinet = data.filtered(&Filters::from_query("customer=VINET"));
    assert_eq!(vinet.len(), 2);
    assert!(vinet.iter().all(|line| line.customer.as_deref() == Some("VINET")));
}

#[test]
fn cache_reloads_only_after_the_file_changes() {
    let (_workspace, config) = built_workspace();
    let path = config.final_parquet();
    let mut cache = TableCache::new();

    let first = cache.get(&path).expect("first load");
    let second = cache.get(&path).expect("cached");
    assert_eq!(cache.loads(), 1);
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    let later = SystemTime::now() + Duration::from_secs(120);
    File::options()
        .write(true)
        .open(&path)
        .expect("open parquet")
        .set_modified(later)
        .expect("touch parquet");

    let third = cache.get(&path).expect("reload");
    assert_eq!(cache.loads(), 2);
    assert!(!std::sync::Arc::ptr_eq(&first, &third));
    assert_eq!(third.lines().len(), 4);
}

#[test]
fn cache_reports_missing_table() {
    let workspace = TestWorkspace::empty();
    let mut cache = TableCache::new();
    let err = cache
        .get(&workspace.path().join("final/northwind_bi.parquet"))
        .expect_err("no table yet");
    assert!(err.to_string().contains("does not exist"));
    assert_eq!(cache.loads(), 0);
}

#[tokio::test]
async fn index_renders_filtered_page() {
    let (_workspace, config) = built_workspace();
    let app = router(DashboardState::new(config.final_parquet(), "Northwind BI"));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/?applied=1&year=1996&employee=5&employee=6&customer=VINET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();

    assert!(html.contains("<h1>Northwind BI</h1>"));
    assert!(html.contains("<option value=\"1996\" selected>1996</option>"));
    assert!(html.contains("<option value=\"1998\">1998</option>"));
    assert!(html.contains("<option value=\"VINET\" selected>VINET</option>"));
    assert!(html.contains("Vins et alcools Chevalier"));
    assert!(!html.contains("Hanari Carnes"));
    assert!(html.contains("33.33%"));
}

#[tokio::test]
async fn index_without_data_is_unavailable() {
    let workspace = TestWorkspace::empty();
    let app = router(DashboardState::new(
        workspace.path().join("missing.parquet"),
        "Northwind BI",
    ));
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

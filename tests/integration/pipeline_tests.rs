//! Integration tests for the harvesting pipeline
//!
//! These tests use wiremock to stand up a fake classifieds site and drive
//! complete runs into an on-disk SQLite database.

use lot_harvester::config::{parse_config, Config};
use lot_harvester::crawler::InstantSleeper;
use lot_harvester::storage::{open_storage, RunStatus, SqliteStorage, Storage};
use lot_harvester::{Coordinator, HarvestError, RunParams};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer, db_path: &Path) -> Config {
    parse_config(&format!(
        r#"
[source]
search-url = "{}/search?category=1"
page-size = 2

[scraper]
workers = 2
batch-size = 2
request-timeout = 5

[output]
database-path = "{}"
"#,
        server.uri(),
        db_path.display()
    ))
    .expect("test config is valid")
}

fn coordinator(server: &MockServer, dir: &TempDir) -> Coordinator<SqliteStorage> {
    let db_path = dir.path().join("listings.db");
    let config = test_config(server, &db_path);
    let storage = open_storage(&db_path).expect("database opens");
    Coordinator::new(config, "test-hash", storage).with_sleeper(Arc::new(InstantSleeper))
}

fn search_page(total: u32, ids: &[u32]) -> String {
    let cards: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<a class="link product-card horizontal" href="/auto/{}.html">car {}</a>"#,
                id, id
            )
        })
        .collect();
    format!(
        r#"<html><body><div id="SortButtonContentCount">Знайдено {} оголошень</div>{}</body></html>"#,
        total, cards
    )
}

fn detail_page(title: &str, price: &str) -> String {
    format!(
        r#"<html><body>
            <div id="sideTitleTitle">{}</div>
            <div id="sidePrice">{} $ · 620 000 грн</div>
            <div id="basicInfoTableMainInfo0">120 тис. км</div>
            <div id="sellerInfoUserName">Олена</div>
            <div id="photoSlider"><img data-src="https://cdn.example.com/1.jpg"></div>
            <span class="common-badge alpha medium">1 з 12</span>
            <div id="badges">AA 1234 BBWVWZZZ1JZ3W386752</div>
        </body></html>"#,
        title, price
    )
}

async fn mount_search(server: &MockServer, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", page))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, id: u32, body: String) {
    Mock::given(method("GET"))
        .and(path(format!("/auto/{}.html", id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_run_stores_listings() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_search(&server, "0", search_page(3, &[1, 2])).await;
    mount_search(&server, "1", search_page(3, &[3])).await;
    mount_detail(&server, 1, detail_page("Volkswagen Passat 2018", "15 500")).await;
    mount_detail(&server, 2, detail_page("Skoda Octavia 2019", "14 200")).await;
    Mock::given(method("GET"))
        .and(path("/auto/3.html"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server, &dir);
    let report = coordinator
        .run(RunParams {
            workers: 2,
            page_limit: None,
        })
        .await
        .expect("run succeeds");

    assert_eq!(report.total_pages, 2);
    assert_eq!(report.counts.pages_scanned, 2);
    assert_eq!(report.counts.links_queued, 3);
    assert_eq!(report.counts.listings_saved, 2);
    assert_eq!(report.counts.links_dropped, 1);
    assert!(!coordinator.run_state().is_running());

    let storage = coordinator.storage();
    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_listings().unwrap(), 2);

    let passat = storage
        .get_listing(&format!("{}/auto/1.html", server.uri()))
        .unwrap()
        .expect("listing stored");
    assert_eq!(passat.title, "Volkswagen Passat 2018");
    assert_eq!(passat.price_usd, 15500);
    assert_eq!(passat.odometer_km, 120000);
    assert_eq!(passat.seller_name.as_deref(), Some("Олена"));
    assert_eq!(passat.phone_number, None);
    assert_eq!(
        passat.primary_image_url.as_deref(),
        Some("https://cdn.example.com/1.jpg")
    );
    assert_eq!(passat.image_count, 12);
    assert_eq!(passat.plate_number.as_deref(), Some("AA 1234 BB"));
    assert_eq!(passat.vin.as_deref(), Some("WVWZZZ1JZ3W386752"));
    assert!(passat.last_seen_at.is_some());

    let run = storage.get_latest_run().unwrap().expect("run recorded");
    assert_eq!(run.id, report.run_id);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(run.counts, report.counts);
}

#[tokio::test]
async fn test_rate_limited_detail_is_retried() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_search(&server, "0", search_page(1, &[7])).await;
    Mock::given(method("GET"))
        .and(path("/auto/7.html"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auto/7.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("BMW X5", "40 000")))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server, &dir);
    let report = coordinator
        .run(RunParams {
            workers: 1,
            page_limit: None,
        })
        .await
        .unwrap();

    assert_eq!(report.counts.listings_saved, 1);
    assert_eq!(report.counts.links_dropped, 0);
}

#[tokio::test]
async fn test_persistent_rate_limit_drops_link_without_failing_run() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_search(&server, "0", search_page(2, &[1, 2])).await;
    mount_detail(&server, 1, detail_page("Audi A4", "12 000")).await;
    Mock::given(method("GET"))
        .and(path("/auto/2.html"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let coordinator = coordinator(&server, &dir);
    let report = coordinator
        .run(RunParams {
            workers: 2,
            page_limit: None,
        })
        .await
        .unwrap();

    assert_eq!(report.counts.listings_saved, 1);
    assert_eq!(report.counts.links_dropped, 1);
}

#[tokio::test]
async fn test_page_limit_bounds_search_pages() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_search(&server, "0", search_page(6, &[1, 2])).await;
    for page in ["1", "2"] {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_string(search_page(6, &[9])))
            .expect(0)
            .mount(&server)
            .await;
    }
    mount_detail(&server, 1, detail_page("Ford Focus", "7 000")).await;
    mount_detail(&server, 2, detail_page("Opel Astra", "6 500")).await;

    let coordinator = coordinator(&server, &dir);
    let report = coordinator
        .run(RunParams {
            workers: 1,
            page_limit: Some(1),
        })
        .await
        .unwrap();

    assert_eq!(report.total_pages, 3);
    assert_eq!(report.counts.pages_scanned, 1);
    assert_eq!(report.counts.listings_saved, 2);
}

#[tokio::test]
async fn test_second_run_refreshes_existing_listing() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/auto/1.html", server.uri());

    mount_search(&server, "0", search_page(1, &[1])).await;
    mount_detail(&server, 1, detail_page("Toyota Camry", "21 000")).await;

    let coordinator = coordinator(&server, &dir);
    let params = RunParams {
        workers: 1,
        page_limit: None,
    };
    coordinator.run(params).await.unwrap();
    let first_seen = coordinator
        .storage()
        .lock()
        .unwrap()
        .get_listing(&url)
        .unwrap()
        .unwrap()
        .last_seen_at;

    server.reset().await;
    mount_search(&server, "0", search_page(1, &[1])).await;
    mount_detail(&server, 1, detail_page("Toyota Camry", "19 500")).await;

    let second = coordinator.run(params).await.unwrap();

    let storage = coordinator.storage();
    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_listings().unwrap(), 1);
    let listing = storage.get_listing(&url).unwrap().unwrap();
    assert_eq!(listing.price_usd, 19500);
    assert!(listing.last_seen_at >= first_seen);
    assert_eq!(storage.get_latest_run().unwrap().unwrap().id, second.run_id);
}

#[tokio::test]
async fn test_overlapping_run_is_rejected() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(search_page(1, &[1]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    mount_detail(&server, 1, detail_page("Mazda 6", "16 000")).await;

    let coordinator = coordinator(&server, &dir);
    let params = RunParams {
        workers: 1,
        page_limit: None,
    };

    let handle = coordinator.start_run(params).expect("first run starts");
    assert!(coordinator.run_state().is_running());

    let rejected = coordinator.start_run(params);
    assert!(matches!(rejected, Err(HarvestError::RunConflict(_))));
    assert!(coordinator.run_state().is_running());

    let report = handle.await.unwrap().expect("first run completes");
    assert_eq!(report.counts.listings_saved, 1);
    assert!(!coordinator.run_state().is_running());
}

#[tokio::test]
async fn test_missing_count_element_scans_single_page() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_search(
        &server,
        "0",
        r#"<html><body><a class="link product-card horizontal" href="/auto/5.html">car</a></body></html>"#
            .to_string(),
    )
    .await;
    mount_detail(&server, 5, detail_page("Kia Ceed", "9 900")).await;

    let coordinator = coordinator(&server, &dir);
    let report = coordinator
        .run(RunParams {
            workers: 3,
            page_limit: None,
        })
        .await
        .unwrap();

    assert_eq!(report.total_pages, 1);
    assert_eq!(report.counts.listings_saved, 1);
}

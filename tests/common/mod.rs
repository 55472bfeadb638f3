//! Common wiremock scaffolding for lending-service integration tests.
//!
//! Mounts the service protocol endpoint by endpoint (login, the three-step
//! borrow handshake, return, details page, reader manifest, page images) so
//! each test can compose exactly the site it needs.

#![allow(dead_code)]

use std::io::Cursor;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lendfetch::{HttpLendingService, ServiceConfig};

/// Title identifier every mock site serves
pub const TITLE: &str = "test-book";

/// Display title the mock manifest reports (sanitizes to `Wire_Book`)
pub const BOOK_TITLE: &str = "Wire Book";

/// Client pointed at a mock server
pub fn client_for(server: &MockServer) -> HttpLendingService {
    HttpLendingService::new(&ServiceConfig {
        base_url: server.uri(),
        ..ServiceConfig::default()
    })
    .unwrap()
}

/// A minimal in-memory JPEG with a uniform shade, for document-mode tests
pub fn tiny_jpeg(shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([shade, shade, shade]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Jpeg(90))
        .unwrap();
    bytes
}

/// Mount a login endpoint answering with the given JSON body.
pub async fn mount_login(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/account/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount login and logout endpoints that always succeed.
pub async fn mount_session(server: &MockServer) {
    mount_login(server, serde_json::json!({ "status": "ok" })).await;
    Mock::given(method("GET"))
        .and(path("/account/logout"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Mount the borrow handshake: grant access, browse, create token.
///
/// The create-token step carries an `expect(1)` so a dropped server verifies
/// exactly one borrow happened.
pub async fn mount_borrow(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/services/loans/loan/searchInside.php"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/loans/loan/"))
        .and(body_string_contains("browse_book"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/loans/loan/"))
        .and(body_string_contains("create_token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": token })),
        )
        .expect(1)
        .mount(server)
        .await;
}

/// Mount a browse step that refuses the loan with the given response.
pub async fn mount_borrow_refusal(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/services/loans/loan/searchInside.php"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/loans/loan/"))
        .and(body_string_contains("browse_book"))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mount the loan return endpoint, expecting exactly `expected_calls` returns.
pub async fn mount_release(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/services/loans/loan/"))
        .and(body_string_contains("return_loan"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": true })),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Mount the details page and reader manifest for a title with `page_count`
/// pages whose locators point back at the mock server.
pub async fn mount_catalog(server: &MockServer, page_count: usize) {
    let details = format!(
        r#"<html><script>var br = {{"url":"{}/manifest?id={TITLE}"}};</script></html>"#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path(format!("/details/{TITLE}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(details))
        .mount(server)
        .await;

    let locators: Vec<String> = (0..page_count)
        .map(|i| format!("{}/pages/{i}.jpg", server.uri()))
        .collect();
    // Locators are grouped two to a spread, the way the reader lays them out.
    let spreads: Vec<serde_json::Value> = locators
        .chunks(2)
        .map(|chunk| {
            serde_json::Value::Array(
                chunk
                    .iter()
                    .map(|uri| serde_json::json!({ "uri": uri }))
                    .collect(),
            )
        })
        .collect();
    let manifest = serde_json::json!({
        "data": {
            "metadata": {
                "imagecount": page_count,
                "title": BOOK_TITLE,
                "creator": "A. Writer",
            },
            "brOptions": {
                "bookTitle": BOOK_TITLE,
                "data": spreads,
            }
        }
    });
    Mock::given(method("GET"))
        .and(path("/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
        .mount(server)
        .await;
}

/// Mount one page image endpoint.
pub async fn mount_page(server: &MockServer, index: usize, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/pages/{index}.jpg")))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Response carrying a page payload.
pub fn page_body(payload: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "image/jpeg")
        .set_body_bytes(payload.to_vec())
}

/// Mount a complete healthy site: session, borrow, release, catalog, and one
/// page endpoint per payload. Pages listed in `broken` answer with the given
/// HTTP status instead of their payload.
pub async fn mount_site(server: &MockServer, payloads: &[Vec<u8>], broken: &[(usize, u16)]) {
    mount_session(server).await;
    mount_borrow(server, "loan-token-1").await;
    mount_release(server, 1).await;
    mount_catalog(server, payloads.len()).await;
    for (index, payload) in payloads.iter().enumerate() {
        match broken.iter().find(|(broken_index, _)| *broken_index == index) {
            Some((_, status)) => {
                mount_page(server, index, ResponseTemplate::new(*status)).await;
            }
            None => mount_page(server, index, page_body(payload)).await,
        }
    }
}

//! End-to-end cache revalidation: a fresh response is cached, then a
//! subsequent request past its max-age revalidates via `If-None-Match` and
//! gets stamped `X-Cache: REVALIDATED` on a 304.

use corewire::config::ProxyConfig;
use corewire::{Client, HeaderMap, Method, Request};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn cache_miss_then_revalidated_hit() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/resource"))
		.and(header("If-None-Match", "\"v1\""))
		.respond_with(ResponseTemplate::new(304).insert_header("ETag", "\"v1\""))
		.with_priority(1)
		.up_to_n_times(1)
		.mount(&server)
		.await;

	Mock::given(method("GET"))
		.and(path("/resource"))
		.respond_with(
			ResponseTemplate::new(200)
				.insert_header("Cache-Control", "no-cache")
				.insert_header("ETag", "\"v1\"")
				.set_body_bytes(b"resource-body".to_vec()),
		)
		.with_priority(10)
		.up_to_n_times(1)
		.mount(&server)
		.await;

	let client = Client::builder()
		.proxy(ProxyConfig {
			use_environment_variables: false,
			..Default::default()
		})
		.build()
		.unwrap();

	let uri = Url::parse(&format!("{}/resource", server.uri())).unwrap();
	let first = client
		.send(Request::new(Method::Get, uri.clone(), HeaderMap::new()).unwrap())
		.await
		.unwrap();
	assert_eq!(first.status, 200);
	assert_eq!(first.body, b"resource-body");
	assert_eq!(first.headers.get("X-Cache"), Some("MISS"));

	let second = client
		.send(Request::new(Method::Get, uri, HeaderMap::new()).unwrap())
		.await
		.unwrap();
	assert_eq!(second.status, 200);
	assert_eq!(second.body, b"resource-body");
	assert_eq!(second.headers.get("X-Cache"), Some("REVALIDATED"));
}

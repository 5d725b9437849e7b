//! End-to-end per-attempt timeout: a server that accepts the connection but
//! never responds must surface as `ErrorKind::Timeout`, not hang forever.

use std::time::Duration;

use corewire::config::ProxyConfig;
use corewire::error::ErrorKind;
use corewire::{Client, HeaderMap, Method, Request};
use tokio::net::TcpListener;
use url::Url;

#[tokio::test]
async fn slow_server_triggers_timeout() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	let server = tokio::spawn(async move {
		// Accept and hold the connection open without ever writing a
		// response, forcing the client's deadline to fire.
		let (_sock, _) = listener.accept().await.unwrap();
		tokio::time::sleep(Duration::from_secs(5)).await;
	});

	let mut retry = corewire::config::RetryConfig::default();
	retry.max_retries = 0;
	let client = Client::builder()
		.retry(retry)
		.proxy(ProxyConfig {
			use_environment_variables: false,
			..Default::default()
		})
		.build()
		.unwrap();

	let uri = Url::parse(&format!("http://{addr}/slow")).unwrap();
	let request = Request::new(Method::Get, uri, HeaderMap::new())
		.unwrap()
		.with_timeout(Duration::from_millis(100));

	let err = client.send(request).await.unwrap_err();
	assert_eq!(err.kind, ErrorKind::Timeout);

	server.abort();
}

//! End-to-end non-keepalive cleanup: a server answering `Connection: close`
//! must never have its connection reused by the pool for a later request.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use corewire::config::ProxyConfig;
use corewire::{Client, HeaderMap, Method, Request};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

#[tokio::test]
async fn connection_close_forces_fresh_dial_on_next_request() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let accepted = Arc::new(AtomicUsize::new(0));

	let accepted_clone = accepted.clone();
	let server = tokio::spawn(async move {
		for _ in 0..2 {
			let (mut sock, _) = listener.accept().await.unwrap();
			accepted_clone.fetch_add(1, Ordering::SeqCst);
			let mut buf = vec![0u8; 4096];
			let n = sock.read(&mut buf).await.unwrap();
			assert!(n > 0);
			sock
				.write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 2\r\n\r\nok")
				.await
				.unwrap();
		}
	});

	let client = Client::builder()
		.proxy(ProxyConfig {
			use_environment_variables: false,
			..Default::default()
		})
		.build()
		.unwrap();
	let uri = Url::parse(&format!("http://{addr}/")).unwrap();

	for _ in 0..2 {
		let response = client
			.send(Request::new(Method::Get, uri.clone(), HeaderMap::new()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status, 200);
		assert_eq!(response.body, b"ok");
	}

	server.await.unwrap();
	assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

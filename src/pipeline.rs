//! Interceptor chain executor (§4.4).
//!
//! Grounded on the teacher's layered `tower::Service` stack
//! (`src/proxy/httpproxy.rs` composes `ServiceBuilder` layers around a
//! terminal connector); here the onion is built explicitly rather than via
//! `tower`, since each layer needs to call `next` a variable number of times
//! (retry) rather than exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::RequestContext;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::transport::Transport;

/// A single middleware layer. Invoked at most once per pipeline call; the
/// implementation decides how many times (zero or more) to invoke `next`.
#[async_trait]
pub trait Interceptor: Send + Sync {
	async fn intercept(
		&self,
		request: Request,
		ctx: Arc<RequestContext>,
		ct: CancellationToken,
		next: Next<'_>,
	) -> Result<Response, Error>;
}

/// The remainder of the chain from a given interceptor's point of view.
/// Calling `next.call(...)` invokes the next interceptor, or the transport
/// if this is the last one (§4.4).
pub struct Next<'a> {
	interceptors: &'a [Arc<dyn Interceptor>],
	transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
	pub async fn call(
		&self,
		request: Request,
		ctx: Arc<RequestContext>,
		ct: CancellationToken,
	) -> Result<Response, Error> {
		match self.interceptors.split_first() {
			Some((head, rest)) => {
				let next = Next {
					interceptors: rest,
					transport: self.transport,
				};
				head.intercept(request, ctx, ct, next).await
			},
			None => self.transport.send(request, ctx, ct).await,
		}
	}
}

/// A pipeline bound to a fixed interceptor stack and terminal transport,
/// built once per client at construction (§4.4). Zero interceptors means
/// every call dispatches straight to the transport.
pub struct Pipeline {
	interceptors: Vec<Arc<dyn Interceptor>>,
	transport: Arc<dyn Transport>,
}

impl Pipeline {
	pub fn new(interceptors: Vec<Arc<dyn Interceptor>>, transport: Arc<dyn Transport>) -> Self {
		Self {
			interceptors,
			transport,
		}
	}

	pub async fn run(
		&self,
		request: Request,
		ctx: Arc<RequestContext>,
		ct: CancellationToken,
	) -> Result<Response, Error> {
		let next = Next {
			interceptors: &self.interceptors,
			transport: self.transport.as_ref(),
		};
		next.call(request, ctx, ct).await
	}
}

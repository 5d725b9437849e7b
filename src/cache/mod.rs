//! HTTP response cache: freshness, conditional revalidation, `X-Cache`
//! stamping (§4.8).

pub mod interceptor;
pub mod storage;

pub use interceptor::CacheInterceptor;
pub use storage::{CacheEntry, CacheKey, CacheStorage, InMemoryCacheStorage};

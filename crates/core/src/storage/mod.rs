pub mod backend;
pub mod cache_key;
pub mod ttl_cache;

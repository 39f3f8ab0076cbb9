pub mod fetcher;
pub mod hasher;

pub use fetcher::HttpFetcher;
pub use hasher::MultiHasher;

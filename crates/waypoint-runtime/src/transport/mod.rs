mod http;

pub use http::HttpDirectoryTransport;

//! Object-storage URL resolution for solution assets.

const MEDIA_SEGMENT: &str = "media";

/// Maps stored asset filenames onto fully-qualified retrieval URLs.
#[derive(Debug, Clone)]
pub struct AssetUrlResolver {
    prefix: String,
}

impl AssetUrlResolver {
    pub fn new(endpoint: &str, bucket: &str) -> Self {
        let endpoint = endpoint.trim_end_matches('/');
        let bucket = bucket.trim_matches('/');
        Self {
            prefix: format!("{endpoint}/{bucket}/{MEDIA_SEGMENT}/"),
        }
    }

    pub fn resolve(&self, filename: &str) -> String {
        let mut url = String::with_capacity(self.prefix.len() + filename.len());
        url.push_str(&self.prefix);
        url.push_str(filename);
        url
    }
}

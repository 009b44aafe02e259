//! HTTP implementations of the fetch seams.
//!
//! Both types hold a `reqwest::Client`, which is reference counted, so each
//! fetch clones it into its own `'static` future.

use std::sync::Arc;

use tilemodels_decode::{DecodedTexture, decode_texture};

use crate::{
    asset::ModelAsset,
    error::{Error, Result},
    source::{AssetParser, FetchFuture, ModelLoader, ModelRequest, TileSource},
    types::TileId,
};

/// Fetch raw bytes from a URL.
///
/// # Errors
///
/// Returns an error if the request fails or the status is not a success.
pub async fn fetch_bytes(http: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    tracing::debug!(url, "fetching");

    let response = http.get(url).send().await.map_err(|e| Error::Http {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let data = response.bytes().await.map_err(|e| Error::Http {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    Ok(data.to_vec())
}

/// Tile source filling a `{z}/{x}/{y}` URL template.
#[derive(Debug, Clone)]
pub struct HttpTileSource {
    http: reqwest::Client,
    template: String,
}

impl HttpTileSource {
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), template)
    }

    #[must_use]
    pub fn with_http(http: reqwest::Client, template: impl Into<String>) -> Self {
        Self {
            http,
            template: template.into(),
        }
    }

    /// URL of `tile`. `{ratio}` becomes `1` and `{r}` is removed.
    #[must_use]
    pub fn url(&self, tile: TileId) -> String {
        self.template
            .replace("{z}", &tile.z.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
            .replace("{ratio}", "1")
            .replace("{r}", "")
    }
}

impl TileSource for HttpTileSource {
    fn fetch_tile(&self, tile: TileId) -> FetchFuture<Vec<u8>> {
        let http = self.http.clone();
        let url = self.url(tile);
        Box::pin(async move { fetch_bytes(&http, &url).await })
    }
}

/// Model loader fetching over HTTP and parsing with `P`.
pub struct HttpModelLoader<P: AssetParser> {
    http: reqwest::Client,
    parser: Arc<P>,
}

impl<P: AssetParser> HttpModelLoader<P> {
    #[must_use]
    pub fn new(parser: P) -> Self {
        Self::with_http(reqwest::Client::new(), parser)
    }

    #[must_use]
    pub fn with_http(http: reqwest::Client, parser: P) -> Self {
        Self {
            http,
            parser: Arc::new(parser),
        }
    }
}

impl<P: AssetParser> ModelLoader for HttpModelLoader<P> {
    fn load_model(&self, request: &ModelRequest) -> FetchFuture<ModelAsset> {
        let http = self.http.clone();
        let parser = Arc::clone(&self.parser);
        let request = request.clone();
        Box::pin(async move {
            let data = fetch_bytes(&http, &request.url).await?;
            let mut asset = parser.parse(&request.kind, &request.url, &data)?;
            asset.prepare(!parser.keeps_materials(&request.kind));
            Ok(asset)
        })
    }

    fn load_texture(&self, url: &str) -> FetchFuture<DecodedTexture> {
        let http = self.http.clone();
        let url = url.to_string();
        Box::pin(async move {
            let data = fetch_bytes(&http, &url).await?;
            decode_texture(&data).map_err(|e| Error::Texture {
                url,
                message: e.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_template() {
        let source = HttpTileSource::new("https://tiles.example.com/{z}/{x}/{y}{r}.pbf?scale={ratio}");
        assert_eq!(
            source.url(TileId::new(17, 104_380, 57_745)),
            "https://tiles.example.com/17/104380/57745.pbf?scale=1"
        );
    }

    #[test]
    fn test_url_template_without_placeholders() {
        let source = HttpTileSource::new("https://tiles.example.com/static.pbf");
        assert_eq!(source.url(TileId::new(1, 0, 0)), "https://tiles.example.com/static.pbf");
    }
}
